use std::sync::Arc;

use tracing::debug;

use super::entity::{AsIdentity, Entity};
use super::entity_type::EntityType;
use super::MapperError;
use crate::store::{pattern, StoreHandle};

/// Scalar `index key -> identity key` entries under a dedicated prefix, resolving to entities
/// of `target`. The index itself is stateless; every call goes to the store.
#[derive(Clone)]
pub struct SecondaryIndex {
    prefix: String,
    target: Arc<EntityType>,
    store: StoreHandle,
}

impl SecondaryIndex {
    pub fn new(prefix: impl Into<String>, target: Arc<EntityType>, store: StoreHandle) -> Self {
        Self { prefix: prefix.into(), target, store }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn entry_key(&self, key: &str) -> String {
        if key.starts_with(&self.prefix) {
            key.to_string()
        } else {
            format!("{}{key}", self.prefix)
        }
    }

    fn pattern(&self) -> String {
        format!("{}*", pattern::escape(&self.prefix))
    }

    /// Stored identity key for `key`, without resolving it.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, MapperError> {
        Ok(self.store.get(&self.entry_key(key)).await?)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Entity>, MapperError> {
        Ok(self.get_raw(key).await?.map(|identity| self.resolve(&identity)))
    }

    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), MapperError>
    where
        T: AsIdentity + ?Sized,
    {
        self.store.set(&self.entry_key(key), value.as_identity()).await?;
        Ok(())
    }

    /// Moves the entry stored under `old` to `new`, keeping the identity it points at.
    pub async fn rename(&self, old: &str, new: &str) -> Result<(), MapperError> {
        self.store.rename(&self.entry_key(old), &self.entry_key(new)).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, MapperError> {
        Ok(self.store.del(&[self.entry_key(key)]).await? > 0)
    }

    pub async fn contains(&self, key: &str) -> Result<bool, MapperError> {
        Ok(self.store.exists(&self.entry_key(key)).await?)
    }

    /// Whether the entry for `key` currently resolves to `identity`.
    pub async fn points_at<T>(&self, key: &str, identity: &T) -> Result<bool, MapperError>
    where
        T: AsIdentity + ?Sized,
    {
        Ok(self.get_raw(key).await?.as_deref() == Some(identity.as_identity()))
    }

    pub async fn len(&self) -> Result<usize, MapperError> {
        Ok(self.store.keys(&self.pattern()).await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, MapperError> {
        Ok(self.len().await? == 0)
    }

    /// Local (prefix-stripped) keys present when the call was made.
    pub async fn enumerate(&self) -> Result<IndexKeys, MapperError> {
        let keys = self.store.keys(&self.pattern()).await?;
        Ok(IndexKeys { prefix_len: self.prefix.len(), keys: keys.into_iter() })
    }

    /// Cursor over `(key, entity)` pairs; each step resolves one entry.
    pub async fn items(&self) -> Result<IndexCursor, MapperError> {
        let keys = self.store.keys(&self.pattern()).await?;
        Ok(IndexCursor { index: self.clone(), keys, position: 0 })
    }

    pub async fn delete_all(&self) -> Result<usize, MapperError> {
        let keys = self.store.keys(&self.pattern()).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let deleted = self.store.del(&keys).await?;
        debug!(event_name = "db.index.purged", prefix = %self.prefix, deleted, "index entries deleted");
        Ok(deleted)
    }

    fn resolve(&self, identity: &str) -> Entity {
        Entity::attach(Arc::clone(&self.target), Arc::clone(&self.store), identity)
    }
}

/// Snapshot of index keys, stripped of the index prefix as they are yielded.
#[derive(Debug)]
pub struct IndexKeys {
    prefix_len: usize,
    keys: std::vec::IntoIter<String>,
}

impl Iterator for IndexKeys {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.keys.next().map(|mut key| key.split_off(self.prefix_len))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

/// Lazily resolves a snapshot of index entries. Entries deleted after the snapshot was taken
/// are skipped.
pub struct IndexCursor {
    index: SecondaryIndex,
    keys: Vec<String>,
    position: usize,
}

impl IndexCursor {
    pub async fn next(&mut self) -> Result<Option<(String, Entity)>, MapperError> {
        while let Some(key) = self.keys.get(self.position) {
            self.position += 1;
            let local = key[self.index.prefix.len()..].to_string();
            if let Some(entity) = self.index.get(key).await? {
                return Ok(Some((local, entity)));
            }
        }
        Ok(None)
    }

    /// Starts over from the first key of the same snapshot.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn remaining(&self) -> usize {
        self.keys.len().saturating_sub(self.position)
    }
}
