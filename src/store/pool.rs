use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;

use super::{StoreConfig, SubscriberStore};
use crate::errors::StoreError;

/// Redis-backed store using a `deadpool-redis` connection pool.
///
/// Building the pool does not open a connection; the first command does.
pub struct RedisStore {
    pool: Pool,
    closed: AtomicBool,
}

impl RedisStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(config.redis_url());
        cfg.pool = Some(PoolConfig {
            max_size: config.pool_size,
            timeouts: Timeouts {
                wait: Some(config.timeout),
                create: Some(config.timeout),
                recycle: Some(config.timeout),
            },
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(format!("Failed to create pool: {}", e)))?;

        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(self.pool.get().await?)
    }

    pub fn status(&self) -> deadpool_redis::Status {
        self.pool.status()
    }
}

#[async_trait]
impl SubscriberStore for RedisStore {
    async fn push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _len: i64 = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let stop = isize::try_from(limit - 1).unwrap_or(isize::MAX);
        Ok(conn.lrange(key, 0, stop).await?)
    }

    async fn remove(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection().await?;
        Ok(conn.lrem(key, 1, value).await?)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.pool.close();
        Ok(())
    }
}
