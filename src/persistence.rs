//! Durable record of subscriber registrations.
//!
//! Records are JSON-encoded [`SubscriberRecord`]s pushed to the head of one
//! well-known list, so every transport sharing the store sees the same
//! registration history and a restarted hub can read it back.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{RecordFailure, StoreError, TransportError};
use crate::store::{RetentionPolicy, StoreConfig, SubscriberStore};
use crate::subscriber::SubscriberRecord;

pub struct RecordLog {
    store: Arc<dyn SubscriberStore>,
    key: String,
    window: usize,
    timeout: Duration,
    retention: RetentionPolicy,
}

impl RecordLog {
    pub fn new(store: Arc<dyn SubscriberStore>, config: &StoreConfig) -> Self {
        Self {
            store,
            key: config.key.clone(),
            window: config.window,
            timeout: config.timeout,
            retention: config.retention,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Serializes `record` without touching the store.
    pub fn encode(record: &SubscriberRecord) -> Result<String, TransportError> {
        record
            .to_json()
            .map_err(|e| TransportError::Codec(e.to_string()))
    }

    /// Appends an already-encoded record.
    pub async fn persist(&self, encoded: &str) -> Result<(), StoreError> {
        self.bounded(self.store.push(&self.key, encoded)).await
    }

    /// Reads the most recent records, up to the configured window.
    pub async fn load(&self) -> Result<Vec<String>, StoreError> {
        self.bounded(self.store.range(&self.key, self.window)).await
    }

    /// Removes one exact encoded record.
    pub async fn forget(&self, encoded: &str) -> Result<usize, StoreError> {
        self.bounded(self.store.remove(&self.key, encoded)).await
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.bounded(self.store.close()).await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

/// Decodes raw records, keeping every failure instead of dropping it.
pub fn decode_records(raw: Vec<String>) -> (Vec<SubscriberRecord>, Vec<RecordFailure>) {
    let mut records = Vec::with_capacity(raw.len());
    let mut failures = Vec::new();

    for (index, value) in raw.into_iter().enumerate() {
        match SubscriberRecord::from_json(&value) {
            Ok(record) => records.push(record),
            Err(e) => failures.push(RecordFailure {
                index,
                raw: value,
                reason: e.to_string(),
            }),
        }
    }

    (records, failures)
}
