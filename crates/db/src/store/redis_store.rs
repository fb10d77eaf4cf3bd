use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};

use super::{FieldHashStore, StoreError};

/// Backend talking to a Redis server over one multiplexed connection.
///
/// Commands are issued one at a time with no `MULTI`; the mapper never relies on
/// transactions.
#[derive(Clone)]
pub struct RedisFieldHashStore {
    connection: MultiplexedConnection,
}

impl RedisFieldHashStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|error| {
            StoreError::UnsupportedBackend(format!("invalid redis URL: {error}"))
        })?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        Ok(Self { connection })
    }

    fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ErrorReply {
    WrongType,
    NoSuchKey,
    NotAnInteger,
    Overflow,
    Other,
}

fn classify(code: Option<&str>, message: &str) -> ErrorReply {
    let message = message.to_ascii_lowercase();
    if code == Some("WRONGTYPE") || message.contains("wrong kind of value") {
        ErrorReply::WrongType
    } else if message.contains("no such key") {
        ErrorReply::NoSuchKey
    } else if message.contains("not an integer") {
        ErrorReply::NotAnInteger
    } else if message.contains("overflow") {
        ErrorReply::Overflow
    } else {
        ErrorReply::Other
    }
}

fn store_error(error: RedisError, key: &str, field: &str) -> StoreError {
    let message = error.detail().map(str::to_string).unwrap_or_else(|| error.to_string());
    match classify(error.code(), &message) {
        ErrorReply::WrongType => StoreError::WrongType { key: key.to_string() },
        ErrorReply::NoSuchKey => StoreError::NoSuchKey(key.to_string()),
        ErrorReply::NotAnInteger => {
            StoreError::NotAnInteger { key: key.to_string(), field: field.to_string() }
        }
        ErrorReply::Overflow => {
            StoreError::Overflow { key: key.to_string(), field: field.to_string() }
        }
        ErrorReply::Other => StoreError::Unavailable(error.to_string()),
    }
}

#[async_trait]
impl FieldHashStore for RedisFieldHashStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection();
        connection.hget(key, field).await.map_err(|error| store_error(error, key, field))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection();
        let added: i64 = connection
            .hset(key, field, value)
            .await
            .map_err(|error| store_error(error, key, field))?;
        Ok(added > 0)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection();
        let removed: i64 =
            connection.hdel(key, field).await.map_err(|error| store_error(error, key, field))?;
        Ok(removed > 0)
    }

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> Result<i64, StoreError> {
        let mut connection = self.connection();
        connection.hincr(key, field, amount).await.map_err(|error| store_error(error, key, field))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut connection = self.connection();
        connection.hkeys(key).await.map_err(|error| store_error(error, key, ""))
    }

    async fn hlen(&self, key: &str) -> Result<usize, StoreError> {
        let mut connection = self.connection();
        connection.hlen(key).await.map_err(|error| store_error(error, key, ""))
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection();
        connection.hexists(key, field).await.map_err(|error| store_error(error, key, field))
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut connection = self.connection();
        let fields: HashMap<String, String> =
            connection.hgetall(key).await.map_err(|error| store_error(error, key, ""))?;
        Ok(fields.into_iter().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection();
        connection.get(key).await.map_err(|error| store_error(error, key, ""))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut connection = self.connection();
        connection.set::<_, _, ()>(key, value).await.map_err(|error| store_error(error, key, ""))
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        // DEL with no arguments is a protocol error
        if keys.is_empty() {
            return Ok(0);
        }
        let mut connection = self.connection();
        connection
            .del(keys.to_vec())
            .await
            .map_err(|error| store_error(error, &keys.join(" "), ""))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection();
        connection.exists(key).await.map_err(|error| store_error(error, key, ""))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut connection = self.connection();
        connection.keys(pattern).await.map_err(|error| store_error(error, pattern, ""))
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let mut connection = self.connection();
        connection.rename::<_, _, ()>(old, new).await.map_err(|error| store_error(error, old, ""))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection();
        let added: i64 =
            connection.sadd(key, member).await.map_err(|error| store_error(error, key, ""))?;
        Ok(added > 0)
    }

    async fn smembers(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        let mut connection = self.connection();
        let members: HashSet<String> =
            connection.smembers(key).await.map_err(|error| store_error(error, key, ""))?;
        Ok(members.into_iter().collect())
    }
}
