use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::update::Update;

/// A connected client interested in an update stream.
///
/// The subscriber owns its connection. Transports only keep weak handles
/// to it and talk to it through this trait.
pub trait Subscriber: Send + Sync {
    /// Unique key used for registry membership.
    fn id(&self) -> &str;

    /// Attempts delivery of `update`.
    ///
    /// Returns `false` once the subscriber is no longer connected; the
    /// transport then drops it from its registry. `force_close` asks the
    /// subscriber to end its stream right after this update.
    fn dispatch(&self, update: &Update, force_close: bool) -> bool;

    /// Tears the connection down. Must be safe to call more than once.
    fn disconnect(&self);

    /// Snapshot used for persistence.
    fn record(&self) -> SubscriberRecord;
}

/// Interchange form of a subscriber, as stored in the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub id: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub allowed_private_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl SubscriberRecord {
    pub fn new<T: Into<String>>(id: impl Into<String>, topics: impl IntoIterator<Item = T>) -> Self {
        Self {
            id: id.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            allowed_private_topics: Vec::new(),
            remote_addr: None,
            last_event_id: None,
            payload: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_private_topics<T: Into<String>>(mut self, topics: impl IntoIterator<Item = T>) -> Self {
        self.allowed_private_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// In-process subscriber delivering into a bounded tokio channel.
///
/// A full channel means the consumer fell behind; the subscriber then
/// disconnects itself rather than stalling the broadcast.
pub struct LocalSubscriber {
    record: SubscriberRecord,
    sender: Mutex<Option<mpsc::Sender<Update>>>,
    delivered: AtomicU64,
}

impl LocalSubscriber {
    pub fn new(record: SubscriberRecord, buffer_size: usize) -> (Arc<Self>, mpsc::Receiver<Update>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let subscriber = Arc::new(Self {
            record,
            sender: Mutex::new(Some(tx)),
            delivered: AtomicU64::new(0),
        });
        (subscriber, rx)
    }

    pub fn is_connected(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Subscriber for LocalSubscriber {
    fn id(&self) -> &str {
        &self.record.id
    }

    fn dispatch(&self, update: &Update, force_close: bool) -> bool {
        let mut sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return false;
        };

        match tx.try_send(update.clone()) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) | Err(mpsc::error::TrySendError::Closed(_)) => {
                sender.take();
                return false;
            }
        }

        if force_close {
            sender.take();
            return false;
        }
        true
    }

    fn disconnect(&self) {
        self.sender.lock().take();
    }

    fn record(&self) -> SubscriberRecord {
        self.record.clone()
    }
}
