//! Scheme → constructor registry.
//!
//! The host builds one [`TransportRegistry`] at startup, registers the
//! schemes it supports and creates transports from addresses such as
//! `redis://cache:6379?key=subscribers`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{FactoryError, TransportError};
use crate::logging::Logger;
use crate::store::{MemoryStore, RedisStore, StoreConfig, TransportAddress};
use crate::topic::TopicSelectorStore;
use crate::transport::{StoreTransport, Transport};

pub type TransportConstructor = Arc<
    dyn Fn(&TransportAddress, Arc<dyn Logger>, Arc<TopicSelectorStore>) -> Result<Arc<dyn Transport>, TransportError>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct TransportRegistry {
    constructors: HashMap<String, TransportConstructor>,
}

impl TransportRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `redis` and `memory` schemes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.constructors.insert("redis".into(), Arc::new(new_redis_transport));
        registry.constructors.insert("memory".into(), Arc::new(new_memory_transport));
        registry
    }

    pub fn register<F>(&mut self, scheme: &str, constructor: F) -> Result<(), FactoryError>
    where
        F: Fn(&TransportAddress, Arc<dyn Logger>, Arc<TopicSelectorStore>) -> Result<Arc<dyn Transport>, TransportError>
            + Send
            + Sync
            + 'static,
    {
        let scheme = scheme.to_ascii_lowercase();
        if self.constructors.contains_key(&scheme) {
            return Err(FactoryError::DuplicateScheme(scheme));
        }
        self.constructors.insert(scheme, Arc::new(constructor));
        Ok(())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.constructors.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Parses `address` and builds a transport with the constructor registered for its scheme.
    pub fn create(
        &self,
        address: &str,
        logger: Arc<dyn Logger>,
        topic_selectors: Arc<TopicSelectorStore>,
    ) -> Result<Arc<dyn Transport>, FactoryError> {
        let parsed = TransportAddress::parse(address).map_err(|reason| FactoryError::InvalidAddress {
            address: address.to_string(),
            reason,
        })?;
        let constructor = self
            .constructors
            .get(&parsed.scheme)
            .ok_or_else(|| FactoryError::UnknownScheme(parsed.scheme.clone()))?;

        Ok((constructor.as_ref())(&parsed, logger, topic_selectors)?)
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Builds a Redis-backed transport. The pool connects lazily.
pub fn new_redis_transport(
    address: &TransportAddress,
    logger: Arc<dyn Logger>,
    topic_selectors: Arc<TopicSelectorStore>,
) -> Result<Arc<dyn Transport>, TransportError> {
    logger.debug("new redis transport");

    let config = StoreConfig::from_address(address)?;
    let store = RedisStore::new(&config)
        .map_err(|e| TransportError::construction(address.redacted(), e.to_string()))?;

    Ok(Arc::new(StoreTransport::new(
        Arc::new(store),
        &config,
        logger,
        topic_selectors,
    )))
}

/// Builds a transport over a fresh in-process store.
pub fn new_memory_transport(
    address: &TransportAddress,
    logger: Arc<dyn Logger>,
    topic_selectors: Arc<TopicSelectorStore>,
) -> Result<Arc<dyn Transport>, TransportError> {
    logger.debug("new memory transport");

    let config = StoreConfig::from_address(address)?;
    Ok(Arc::new(StoreTransport::new(
        Arc::new(MemoryStore::new()),
        &config,
        logger,
        topic_selectors,
    )))
}
