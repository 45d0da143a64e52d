//! Pluggable transport for a live-update hub.
//!
//! A [`Transport`] fans updates out to connected subscribers and records
//! their registrations in a backing store (Redis, or an in-process store)
//! so they survive restarts. Transports are built through a
//! [`TransportRegistry`] keyed by address scheme.

pub mod errors;
pub mod factory;
pub mod lifecycle;
pub mod logging;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod subscriber;
pub mod topic;
pub mod transport;
pub mod update;

pub use errors::{DecodeFailure, FactoryError, RecordFailure, StoreError, TransportError};
pub use factory::{new_memory_transport, new_redis_transport, TransportConstructor, TransportRegistry};
pub use lifecycle::{LifecycleState, ShutdownLatch};
pub use logging::{FacadeLogger, LogConfig, LogLevel, Logger, NullLogger, QueueLogger};
pub use registry::EARLIEST_EVENT_ID;
pub use store::{
    MemoryStore, RedisStore, RetentionPolicy, StoreConfig, StoreLocation, SubscriberStore,
    TransportAddress,
};
pub use subscriber::{LocalSubscriber, Subscriber, SubscriberRecord};
pub use topic::TopicSelectorStore;
pub use transport::{StoreTransport, SubscriberList, Transport};
pub use update::Update;
