//! Error types shared by the transport, its store and the factory.
//!
//! - [`StoreError`]: failures talking to the backing store.
//! - [`TransportError`]: everything a [`Transport`](crate::transport::Transport) call can return.
//! - [`FactoryError`]: failures resolving or registering a scheme.
//!
//! All of them provide `as_label()` for logs.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`SubscriberStore`](crate::store::SubscriberStore).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not build the pool or check out a connection.
    #[error("store pool error: {0}")]
    Pool(String),

    /// The store rejected or failed a command.
    #[error("store command failed: {0}")]
    Command(String),

    /// The call did not finish within its deadline.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store client has already been released.
    #[error("store client is closed")]
    Closed,
}

impl StoreError {
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Pool(_) => "store_pool",
            StoreError::Command(_) => "store_command",
            StoreError::Timeout(_) => "store_timeout",
            StoreError::Closed => "store_closed",
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Command(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

/// One persisted record that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position in the window read from the store (0 = most recent).
    pub index: usize,
    pub raw: String,
    pub reason: String,
}

/// Partial listing: the records that decoded, plus every one that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub partial: crate::transport::SubscriberList,
    pub failures: Vec<RecordFailure>,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} persisted subscriber records could not be decoded",
            self.failures.len(),
            self.failures.len() + self.partial.subscribers.len()
        )?;
        if let Some(first) = self.failures.first() {
            write!(f, " (record {}: {})", first.index, first.reason)?;
        }
        Ok(())
    }
}

/// Errors returned by transport operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The transport could not be built from its address.
    #[error("{address}: {reason}")]
    Construction { address: String, reason: String },

    /// Any operation attempted once shutdown has begun.
    #[error("transport is closed")]
    Closed,

    /// Writing or reading the backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A subscriber record could not be serialized.
    #[error("unable to encode subscriber record: {0}")]
    Codec(String),

    /// Some persisted records could not be decoded.
    #[error("{0}")]
    Decode(DecodeFailure),

    /// Shutdown completed but releasing the store client failed.
    #[error("unable to close the store: {0}")]
    Teardown(StoreError),
}

impl TransportError {
    pub(crate) fn construction(address: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::Construction {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Construction { .. } => "transport_construction",
            TransportError::Closed => "transport_closed",
            TransportError::Store(e) => e.as_label(),
            TransportError::Codec(_) => "record_encode",
            TransportError::Decode(_) => "record_decode",
            TransportError::Teardown(_) => "transport_teardown",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Errors raised by the [`TransportRegistry`](crate::factory::TransportRegistry).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactoryError {
    #[error("a transport is already registered for scheme {0:?}")]
    DuplicateScheme(String),

    #[error("no transport registered for scheme {0:?}")]
    UnknownScheme(String),

    #[error("invalid transport address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FactoryError {
    pub fn as_label(&self) -> &'static str {
        match self {
            FactoryError::DuplicateScheme(_) => "factory_duplicate_scheme",
            FactoryError::UnknownScheme(_) => "factory_unknown_scheme",
            FactoryError::InvalidAddress { .. } => "factory_invalid_address",
            FactoryError::Transport(e) => e.as_label(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
