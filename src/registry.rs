//! In-memory set of live subscribers plus the lifecycle flag.
//!
//! Both live behind one lock so that every operation checks liveness and
//! mutates membership in the same critical section.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::errors::TransportError;
use crate::lifecycle::LifecycleState;
use crate::subscriber::Subscriber;
use crate::update::Update;

/// Marker returned before any update has been dispatched.
pub const EARLIEST_EVENT_ID: &str = "earliest";

struct Entry {
    handle: Weak<dyn Subscriber>,
    /// Encoded record as persisted, kept so it can be removed again.
    encoded: Option<String>,
}

struct RegistryState {
    lifecycle: LifecycleState,
    entries: HashMap<String, Entry>,
    last_event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Newly registered. `stale` is the record of a previous registration
    /// under the same id whose subscriber had already gone away.
    Inserted { stale: Option<String> },
    /// A live subscriber with this id is already registered; nothing changed.
    AlreadyRegistered,
}

/// Subscriber removed from the registry, with its persisted record if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub id: String,
    pub encoded: Option<String>,
}

pub struct SubscriberRegistry {
    inner: RwLock<RegistryState>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryState {
                lifecycle: LifecycleState::Open,
                entries: HashMap::new(),
                last_event_id: EARLIEST_EVENT_ID.to_string(),
            }),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.read().lifecycle
    }

    /// Registers a weak handle to `subscriber` unless the registry is closed.
    pub fn insert(
        &self,
        subscriber: &Arc<dyn Subscriber>,
        encoded: Option<String>,
    ) -> Result<Admission, TransportError> {
        let mut inner = self.inner.write();
        if !inner.lifecycle.is_open() {
            return Err(TransportError::Closed);
        }

        let id = subscriber.id().to_string();
        let live = inner
            .entries
            .get(&id)
            .map(|entry| entry.handle.strong_count() > 0);
        let stale = match live {
            Some(true) => return Ok(Admission::AlreadyRegistered),
            Some(false) => inner.entries.remove(&id).and_then(|e| e.encoded),
            None => None,
        };

        inner.entries.insert(
            id,
            Entry {
                handle: Arc::downgrade(subscriber),
                encoded,
            },
        );
        Ok(Admission::Inserted { stale })
    }

    /// Delivers `update` to every registered subscriber.
    ///
    /// Assigns the update an id if it has none, records it as the last
    /// dispatched event and returns the subscribers that were pruned because
    /// they reported disconnection or were dropped by their owner.
    pub fn broadcast(&self, update: &mut Update) -> Result<Vec<Removed>, TransportError> {
        let mut inner = self.inner.write();
        if !inner.lifecycle.is_open() {
            return Err(TransportError::Closed);
        }

        let event_id = update.assign_id().to_string();
        let update: &Update = update;

        let gone: Vec<String> = inner
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let connected = entry
                    .handle
                    .upgrade()
                    .map(|s| s.dispatch(update, false))
                    .unwrap_or(false);
                (!connected).then(|| id.clone())
            })
            .collect();

        let removed = gone
            .into_iter()
            .filter_map(|id| {
                inner
                    .entries
                    .remove(&id)
                    .map(|entry| Removed { id, encoded: entry.encoded })
            })
            .collect();

        inner.last_event_id = event_id;
        Ok(removed)
    }

    /// Moves the registry to `Closed`, disconnecting and draining every subscriber.
    ///
    /// Returns an empty list when it was already closed.
    pub fn close(&self) -> Vec<Removed> {
        let mut inner = self.inner.write();
        if !inner.lifecycle.is_open() {
            return Vec::new();
        }
        inner.lifecycle = LifecycleState::Closed;

        inner
            .entries
            .drain()
            .map(|(id, entry)| {
                if let Some(subscriber) = entry.handle.upgrade() {
                    subscriber.disconnect();
                }
                Removed { id, encoded: entry.encoded }
            })
            .collect()
    }

    /// The last dispatched event id, or `Closed`.
    pub fn last_event_id(&self) -> Result<String, TransportError> {
        let inner = self.inner.read();
        if !inner.lifecycle.is_open() {
            return Err(TransportError::Closed);
        }
        Ok(inner.last_event_id.clone())
    }

    /// Whether this exact handle (not merely its id) is still registered.
    pub fn holds(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.inner
            .read()
            .entries
            .get(subscriber.id())
            .is_some_and(|entry| std::ptr::addr_eq(entry.handle.as_ptr(), Arc::as_ptr(subscriber)))
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().entries.contains_key(id)
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
