//! The external key/value store interface.
//!
//! The core only ever calls `get`; concrete drivers other than the one kept
//! here for exercising the interface (etcd, BoltDB) are out of scope.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::KvError;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
}

/// A store that never has anything — used when no KV backend is configured.
/// `Resolve` then falls straight through to `CATCH_ALL` or `ErrUnknownService`.
pub struct NullKvStore;

#[async_trait]
impl KvStore for NullKvStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(None)
    }
}

/// Ambient example driver against a Redis/Valkey backend, using a
/// multiplexed async connection so concurrent `resolve` calls share one
/// socket.
pub struct RedisKvStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(address: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(format!("redis://{}", address))
            .map_err(|e| KvError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| KvError::Transient(e.to_string()))?;
        Ok(value)
    }
}
