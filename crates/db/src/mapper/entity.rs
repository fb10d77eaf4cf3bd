use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::entity_type::EntityType;
use super::field::{FromValue, Value};
use super::index::SecondaryIndex;
use super::MapperError;
use crate::store::StoreHandle;

/// Full, prefixed key of one entity hash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(pub String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything an index entry can point at.
pub trait AsIdentity {
    fn as_identity(&self) -> &str;
}

impl AsIdentity for str {
    fn as_identity(&self) -> &str {
        self
    }
}

impl AsIdentity for String {
    fn as_identity(&self) -> &str {
        self
    }
}

impl AsIdentity for IdentityKey {
    fn as_identity(&self) -> &str {
        &self.0
    }
}

impl AsIdentity for Entity {
    fn as_identity(&self) -> &str {
        self.identity.as_str()
    }
}

/// Handle on one stored entity. Holding a handle does not imply the entity exists.
///
/// Field writes are not transactional. [`Entity::set`] on an indexed field reads the old
/// value, decides between moving and creating the index entry, then writes; two writers
/// racing on the same field of the same entity can leave a stale index entry behind. Callers
/// are expected to have a single writer per entity.
#[derive(Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    store: StoreHandle,
    identity: IdentityKey,
}

impl Entity {
    pub(crate) fn attach(entity_type: Arc<EntityType>, store: StoreHandle, id: &str) -> Self {
        let identity = IdentityKey(entity_type.identity_key(id));
        Self { entity_type, store, identity }
    }

    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    pub fn local_id(&self) -> &str {
        self.entity_type.local_id(self.identity.as_str())
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Re-asserting the current identity (local or prefixed form) is a no-op; anything else
    /// fails because identities never change.
    pub fn assign_identity(&mut self, id: &str) -> Result<(), MapperError> {
        let candidate = self.entity_type.identity_key(id);
        if candidate == self.identity.0 {
            return Ok(());
        }
        Err(MapperError::IdentityImmutable {
            current: self.identity.0.clone(),
            attempted: candidate,
        })
    }

    pub async fn get(&self, field: &str) -> Result<Option<Value>, MapperError> {
        match self.store.hget(self.identity.as_str(), field).await? {
            Some(raw) => Ok(Some(self.entity_type.decode(field, &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_as<T: FromValue>(&self, field: &str) -> Result<Option<T>, MapperError> {
        Ok(self.get(field).await?.and_then(T::from_value))
    }

    pub async fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), MapperError> {
        let encoded = value.into().encode();
        let key = self.identity.as_str();

        if self.entity_type.is_primary(field) {
            if let Some(current) = self.store.hget(key, field).await? {
                if current != encoded {
                    return Err(MapperError::PrimaryFieldImmutable {
                        entity_type: self.entity_type.name().to_string(),
                        field: field.to_string(),
                        current,
                        attempted: encoded,
                    });
                }
            }
        }

        if let Some(index) = self.index_for(field) {
            let previous = self.store.hget(key, field).await?.filter(|old| *old != encoded);
            let owned = match &previous {
                Some(old) => index.points_at(old, &self.identity).await?,
                None => false,
            };

            match previous {
                Some(old) if owned => {
                    index.rename(&old, &encoded).await?;
                    debug!(
                        event_name = "db.index.renamed",
                        entity = %self.identity,
                        field,
                        "index entry moved to new value"
                    );
                }
                previous => {
                    if let Some(old) = previous {
                        debug!(
                            event_name = "db.index.stale_left",
                            entity = %self.identity,
                            field,
                            old_value = %old,
                            "previous index entry not owned by entity; leaving it untouched"
                        );
                    }
                    index.set(&encoded, &self.identity).await?;
                    debug!(
                        event_name = "db.index.created",
                        entity = %self.identity,
                        field,
                        "index entry written"
                    );
                }
            }
        }

        self.store.hset(key, field, &encoded).await?;
        Ok(())
    }

    /// Removes `field`, and for an indexed field the index entry this entity owns for it.
    pub async fn delete(&self, field: &str) -> Result<bool, MapperError> {
        if let Some(index) = self.index_for(field) {
            self.release_index_entry(field, &index).await?;
        }
        Ok(self.store.hdel(self.identity.as_str(), field).await?)
    }

    /// Atomic counter update; returns the new value. Counters are never indexed.
    pub async fn increment_by(&self, field: &str, amount: i64) -> Result<i64, MapperError> {
        Ok(self.store.hincrby(self.identity.as_str(), field, amount).await?)
    }

    pub async fn contains(&self, field: &str) -> Result<bool, MapperError> {
        Ok(self.store.hexists(self.identity.as_str(), field).await?)
    }

    pub async fn field_names(&self) -> Result<Vec<String>, MapperError> {
        Ok(self.store.hkeys(self.identity.as_str()).await?)
    }

    pub async fn len(&self) -> Result<usize, MapperError> {
        Ok(self.store.hlen(self.identity.as_str()).await?)
    }

    pub async fn is_empty(&self) -> Result<bool, MapperError> {
        Ok(self.len().await? == 0)
    }

    /// Raw stored fields, undecoded.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, String>, MapperError> {
        Ok(self.store.hgetall(self.identity.as_str()).await?)
    }

    pub async fn exists(&self) -> Result<bool, MapperError> {
        Ok(self.store.exists(self.identity.as_str()).await?)
    }

    /// Deletes the entity hash together with every index entry it still owns.
    pub async fn delete_instance(&self) -> Result<bool, MapperError> {
        let indexed: Vec<String> =
            self.entity_type.indexes().map(|(field, _)| field.to_string()).collect();
        for field in indexed {
            if let Some(index) = self.index_for(&field) {
                self.release_index_entry(&field, &index).await?;
            }
        }

        let removed = self.store.del(&[self.identity.0.clone()]).await? > 0;
        debug!(event_name = "db.entity.deleted", entity = %self.identity, removed, "entity deleted");
        Ok(removed)
    }

    fn index_for(&self, field: &str) -> Option<SecondaryIndex> {
        self.entity_type.index_prefix(field).map(|prefix| {
            SecondaryIndex::new(prefix, Arc::clone(&self.entity_type), Arc::clone(&self.store))
        })
    }

    async fn release_index_entry(
        &self,
        field: &str,
        index: &SecondaryIndex,
    ) -> Result<(), MapperError> {
        let Some(current) = self.store.hget(self.identity.as_str(), field).await? else {
            return Ok(());
        };

        if index.points_at(&current, &self.identity).await? {
            index.delete(&current).await?;
        } else {
            warn!(
                event_name = "db.index.foreign_entry",
                entity = %self.identity,
                field,
                value = %current,
                "index entry for field value belongs to another entity; not deleting it"
            );
        }
        Ok(())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("entity_type", &self.entity_type.name())
            .field("identity", &self.identity)
            .finish()
    }
}
