use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::SubscriberStore;
use crate::errors::StoreError;

/// In-process list store.
///
/// Backs the `memory` scheme; records live as long as the store does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a list, head first. Readable even after close.
    pub fn snapshot(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        Ok(self
            .lists
            .lock()
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn remove(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let mut lists = self.lists.lock();
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };
        let removed = match list.iter().position(|v| v == value) {
            Some(idx) => {
                list.remove(idx);
                1
            }
            None => 0,
        };
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(removed)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn behaves_like_a_list() {
        let store = MemoryStore::new();
        store.push("subs", "a").await.unwrap();
        store.push("subs", "b").await.unwrap();
        store.push("subs", "a").await.unwrap();

        assert_eq!(store.range("subs", 2).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.remove("subs", "a").await.unwrap(), 1);
        assert_eq!(store.snapshot("subs"), vec!["b", "a"]);
        assert_eq!(store.remove("subs", "missing").await.unwrap(), 0);
        assert!(store.range("other", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_calls_after_close() {
        let store = MemoryStore::new();
        store.push("subs", "a").await.unwrap();
        store.close().await.unwrap();

        assert_eq!(store.close().await, Err(StoreError::Closed));
        assert_eq!(store.push("subs", "b").await, Err(StoreError::Closed));
        assert_eq!(store.snapshot("subs"), vec!["a"]);
    }
}
