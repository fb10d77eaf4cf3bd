//! Field-hash store client.
//!
//! The mapper only ever talks to the backend through [`FieldHashStore`], a trimmed-down
//! Redis-style command set: hashes, scalar keys, sets, atomic hash increments and glob
//! enumeration of top-level keys. Backends are free to order `keys` results however they like.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod pattern;
pub mod redis_store;

pub use memory::InMemoryFieldHashStore;
pub use redis_store::RedisFieldHashStore;

pub type StoreHandle = Arc<dyn FieldHashStore>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("operation against a key holding the wrong kind of value: `{key}`")]
    WrongType { key: String },
    #[error("no such key: `{0}`")]
    NoSuchKey(String),
    #[error("hash value is not an integer: `{key}`.`{field}`")]
    NotAnInteger { key: String, field: String },
    #[error("increment or decrement would overflow: `{key}`.`{field}`")]
    Overflow { key: String, field: String },
    #[error("invalid key pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("unsupported store backend `{0}`")]
    UnsupportedBackend(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait FieldHashStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Returns `true` when the field did not exist before.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> Result<i64, StoreError>;

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn hlen(&self, key: &str) -> Result<usize, StoreError>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes every listed key and returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn rename(&self, old: &str, new: &str) -> Result<(), StoreError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn smembers(&self, key: &str) -> Result<BTreeSet<String>, StoreError>;
}
