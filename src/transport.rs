//! Transport facade: fans updates out to subscribers and keeps a durable
//! record of their registrations in the backing store.
//!
//! ```text
//! add_subscriber ─► registry.insert (lock) ─► RecordLog::persist
//! dispatch       ─► registry.broadcast (lock) ─► RecordLog::forget (pruned)
//! get_subscribers ─► RecordLog::load ─► decode_records
//! close          ─► ShutdownLatch ─► registry.close (lock) ─► forget ─► store close
//! ```
//!
//! The registry lock is never held across an `.await`. Store I/O instead
//! holds the store gate shared; `close` takes it exclusively, so it waits
//! for in-flight calls and nothing reaches the store once it is released.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::errors::{DecodeFailure, Result, StoreError, TransportError};
use crate::lifecycle::{LifecycleState, ShutdownLatch};
use crate::logging::Logger;
use crate::persistence::{decode_records, RecordLog};
use crate::registry::{Admission, SubscriberRegistry};
use crate::store::{RetentionPolicy, StoreConfig, SubscriberStore};
use crate::subscriber::{Subscriber, SubscriberRecord};
use crate::topic::TopicSelectorStore;
use crate::update::Update;

/// Persisted subscribers together with the last dispatched event id.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberList {
    pub last_event_id: String,
    pub subscribers: Vec<SubscriberRecord>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `update` to every registered subscriber, pruning the ones
    /// that report disconnection. Assigns an id to the update if it has none.
    async fn dispatch(&self, update: &mut Update) -> Result<()>;

    /// Registers `subscriber` and persists its record.
    ///
    /// The transport keeps a weak handle only; dropping the last `Arc`
    /// unregisters the subscriber on the next dispatch.
    async fn add_subscriber(&self, subscriber: &Arc<dyn Subscriber>) -> Result<()>;

    /// Reads back the most recently persisted subscriber records.
    async fn get_subscribers(&self) -> Result<SubscriberList>;

    /// Shuts the transport down. Idempotent; every caller sees the same result.
    async fn close(&self) -> Result<()>;

    fn topic_selectors(&self) -> &Arc<TopicSelectorStore>;
}

/// [`Transport`] over any [`SubscriberStore`].
pub struct StoreTransport {
    registry: SubscriberRegistry,
    records: RecordLog,
    /// `true` while the store client may be used.
    gate: RwLock<bool>,
    /// Records drained on close that still have to be removed from the store.
    orphans: Mutex<Vec<String>>,
    latch: ShutdownLatch<Result<()>>,
    logger: Arc<dyn Logger>,
    topic_selectors: Arc<TopicSelectorStore>,
}

impl StoreTransport {
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        config: &StoreConfig,
        logger: Arc<dyn Logger>,
        topic_selectors: Arc<TopicSelectorStore>,
    ) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            records: RecordLog::new(store, config),
            gate: RwLock::new(true),
            orphans: Mutex::new(Vec::new()),
            latch: ShutdownLatch::new(),
            logger,
            topic_selectors,
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.registry.lifecycle()
    }

    /// Number of subscribers currently registered in memory.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn last_event_id(&self) -> Result<String> {
        self.registry.last_event_id()
    }

    fn reconciles(&self) -> bool {
        self.records.retention() == RetentionPolicy::Reconcile
    }

    /// Removes records of subscribers that left; returns the first failure.
    async fn forget_all(&self, encoded: impl IntoIterator<Item = String>) -> std::result::Result<(), StoreError> {
        let mut first_err = None;
        for record in encoded {
            if let Err(e) = self.records.forget(&record).await {
                self.logger
                    .error(&format!("unable to remove subscriber record: {}", e));
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn teardown(&self) -> Result<()> {
        let drained = self.registry.close();
        if !drained.is_empty() {
            self.logger
                .debug(&format!("disconnected {} subscribers", drained.len()));
        }
        self.orphans
            .lock()
            .extend(drained.into_iter().filter_map(|r| r.encoded));

        // Wait for in-flight store calls
        let mut gate = self.gate.write().await;
        if !*gate {
            return Ok(());
        }

        // A record leaves `orphans` only after its removal returned, so a
        // cancelled teardown picks it up again on the next run.
        let mut forget_err = None;
        if self.reconciles() {
            loop {
                let Some(record) = self.orphans.lock().last().cloned() else {
                    break;
                };
                if let Err(e) = self.records.forget(&record).await {
                    self.logger
                        .error(&format!("unable to remove subscriber record: {}", e));
                    forget_err.get_or_insert(e);
                }
                self.orphans.lock().pop();
            }
        }

        let closed = match self.records.close().await {
            // Closed by an earlier, cancelled run.
            Ok(()) | Err(StoreError::Closed) => Ok(()),
            Err(e) => {
                self.logger.error(&format!("unable to close the store: {}", e));
                Err(TransportError::Teardown(e))
            }
        };
        *gate = false;
        closed?;

        match forget_err {
            Some(e) => Err(TransportError::Teardown(e)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for StoreTransport {
    async fn dispatch(&self, update: &mut Update) -> Result<()> {
        self.logger.debug("dispatch");

        let gate = if self.reconciles() {
            Some(self.gate.read().await)
        } else {
            None
        };

        let pruned = self.registry.broadcast(update)?;
        if pruned.is_empty() {
            return Ok(());
        }
        self.logger
            .debug(&format!("pruned {} disconnected subscribers", pruned.len()));

        match gate {
            // Delivery already happened; failures are only logged.
            Some(open) if *open => {
                let _ = self
                    .forget_all(pruned.into_iter().filter_map(|r| r.encoded))
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn add_subscriber(&self, subscriber: &Arc<dyn Subscriber>) -> Result<()> {
        self.logger.debug("add subscriber");

        let encoded = RecordLog::encode(&subscriber.record());
        let gate = self.gate.read().await;

        let admission = self
            .registry
            .insert(subscriber, encoded.as_ref().ok().cloned())?;
        let encoded = encoded.inspect_err(|e| {
            self.logger
                .error(&format!("unable to encode subscriber {}: {}", subscriber.id(), e));
        })?;

        let stale = match admission {
            Admission::AlreadyRegistered => return Ok(()),
            Admission::Inserted { stale } => stale,
        };
        if !*gate {
            return Err(TransportError::Closed);
        }

        if let Some(stale) = stale.filter(|_| self.reconciles()) {
            self.forget_all([stale]).await?;
        }

        self.records.persist(&encoded).await.map_err(|e| {
            self.logger
                .error(&format!("unable to persist subscriber {}: {}", subscriber.id(), e));
            TransportError::Store(e)
        })?;

        // Pruned or drained while the record was in flight: the removal
        // already ran and found nothing, so take the record back here.
        if self.reconciles() && !self.registry.holds(subscriber) {
            self.logger
                .debug(&format!("subscriber {} left during registration", subscriber.id()));
            self.forget_all([encoded]).await?;
        }
        Ok(())
    }

    async fn get_subscribers(&self) -> Result<SubscriberList> {
        self.logger.debug("get subscribers");

        let gate = self.gate.read().await;
        let last_event_id = self.registry.last_event_id()?;
        if !*gate {
            return Err(TransportError::Closed);
        }

        let raw = self.records.load().await.map_err(|e| {
            self.logger.error(&format!("unable to read subscribers: {}", e));
            TransportError::Store(e)
        })?;
        drop(gate);

        let (subscribers, failures) = decode_records(raw);
        let list = SubscriberList {
            last_event_id,
            subscribers,
        };
        if failures.is_empty() {
            return Ok(list);
        }

        for failure in &failures {
            self.logger.error(&format!(
                "unable to decode subscriber record {}: {}",
                failure.index, failure.reason
            ));
        }
        Err(TransportError::Decode(DecodeFailure {
            partial: list,
            failures,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.logger.info("close");
        self.latch.run(|| self.teardown()).await
    }

    fn topic_selectors(&self) -> &Arc<TopicSelectorStore> {
        &self.topic_selectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;
    use crate::store::{MemoryStore, StoreLocation};
    use crate::subscriber::LocalSubscriber;

    fn transport_with(store: Arc<MemoryStore>, retention: RetentionPolicy) -> StoreTransport {
        let mut config = StoreConfig::new(StoreLocation::Path("/events.db".into()));
        config.retention = retention;
        StoreTransport::new(
            store,
            &config,
            Arc::new(NullLogger),
            Arc::new(TopicSelectorStore::default()),
        )
    }

    fn subscriber(id: &str) -> (Arc<dyn Subscriber>, tokio::sync::mpsc::Receiver<Update>) {
        let (sub, rx) = LocalSubscriber::new(SubscriberRecord::new(id, ["https://example.com/{id}"]), 8);
        let sub: Arc<dyn Subscriber> = sub;
        (sub, rx)
    }

    #[tokio::test]
    async fn pruned_subscribers_lose_their_record() {
        let store = Arc::new(MemoryStore::new());
        let transport = transport_with(store.clone(), RetentionPolicy::Reconcile);
        let (a, _rx_a) = subscriber("a");
        let (b, rx_b) = subscriber("b");
        transport.add_subscriber(&a).await.unwrap();
        transport.add_subscriber(&b).await.unwrap();
        assert_eq!(store.snapshot("subscribers").len(), 2);

        drop(rx_b);
        transport
            .dispatch(&mut Update::new(["https://example.com/1"], "x"))
            .await
            .unwrap();

        let list = transport.get_subscribers().await.unwrap();
        assert_eq!(list.subscribers, vec![a.record()]);
        assert_eq!(transport.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn audit_log_keeps_every_record() {
        let store = Arc::new(MemoryStore::new());
        let transport = transport_with(store.clone(), RetentionPolicy::AuditLog);
        let (a, rx_a) = subscriber("a");
        transport.add_subscriber(&a).await.unwrap();

        drop(rx_a);
        transport.dispatch(&mut Update::new(["t"], "x")).await.unwrap();
        assert_eq!(transport.subscriber_count(), 0);

        transport.close().await.unwrap();
        assert_eq!(store.snapshot("subscribers").len(), 1);
    }

    #[tokio::test]
    async fn readding_a_live_subscriber_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let transport = transport_with(store.clone(), RetentionPolicy::Reconcile);
        let (a, _rx) = subscriber("a");
        transport.add_subscriber(&a).await.unwrap();
        transport.add_subscriber(&a).await.unwrap();
        assert_eq!(store.snapshot("subscribers").len(), 1);
    }

    #[tokio::test]
    async fn close_removes_this_transports_records_only() {
        let store = Arc::new(MemoryStore::new());
        store.push("subscribers", "{\"from\":\"another hub\"}").await.unwrap();

        let transport = transport_with(store.clone(), RetentionPolicy::Reconcile);
        let (a, mut rx) = subscriber("a");
        transport.add_subscriber(&a).await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(store.snapshot("subscribers"), vec!["{\"from\":\"another hub\"}"]);
        assert!(store.is_closed());
        assert!(rx.recv().await.is_none());
        assert_eq!(transport.lifecycle(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn marker_tracks_last_dispatched_update() {
        let transport = transport_with(Arc::new(MemoryStore::new()), RetentionPolicy::Reconcile);
        assert_eq!(transport.last_event_id().unwrap(), "earliest");

        let mut update = Update::new(["t"], "x").with_id("first");
        transport.dispatch(&mut update).await.unwrap();
        let mut update = Update::new(["t"], "y");
        transport.dispatch(&mut update).await.unwrap();

        let list = transport.get_subscribers().await.unwrap();
        assert_eq!(Some(list.last_event_id), update.id);
    }
}
