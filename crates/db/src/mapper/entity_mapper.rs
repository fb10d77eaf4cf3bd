use std::sync::Arc;

use tracing::info;

use super::entity::Entity;
use super::entity_type::EntityType;
use super::index::SecondaryIndex;
use super::MapperError;
use crate::store::{pattern, StoreHandle};

/// Binds an [`EntityType`] to a store.
#[derive(Clone)]
pub struct EntityMapper {
    entity_type: Arc<EntityType>,
    store: StoreHandle,
}

impl EntityMapper {
    pub fn new(entity_type: EntityType, store: StoreHandle) -> Self {
        Self::from_arc(Arc::new(entity_type), store)
    }

    pub fn from_arc(entity_type: Arc<EntityType>, store: StoreHandle) -> Self {
        Self { entity_type, store }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn entity_type_arc(&self) -> Arc<EntityType> {
        Arc::clone(&self.entity_type)
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Handle for `id` (local or prefixed) without any store access.
    pub fn attach(&self, id: &str) -> Entity {
        Entity::attach(Arc::clone(&self.entity_type), Arc::clone(&self.store), id)
    }

    /// Handle for `id`. With a primary field declared, the local id is written into it, which
    /// also creates the entity.
    pub async fn load(&self, id: &str) -> Result<Entity, MapperError> {
        let entity = self.attach(id);
        if let Some(primary) = self.entity_type.primary_field() {
            let local = entity.local_id().to_string();
            entity.set(primary, local).await?;
        }
        Ok(entity)
    }

    pub async fn exists(&self, id: &str) -> Result<bool, MapperError> {
        Ok(self.store.exists(&self.entity_type.identity_key(id)).await?)
    }

    pub fn index(&self, field: &str) -> Result<SecondaryIndex, MapperError> {
        let prefix =
            self.entity_type.index_prefix(field).ok_or_else(|| MapperError::NoSuchIndex {
                entity_type: self.entity_type.name().to_string(),
                field: field.to_string(),
            })?;
        Ok(SecondaryIndex::new(prefix, Arc::clone(&self.entity_type), Arc::clone(&self.store)))
    }

    /// Point lookup through the primary field or a declared index.
    pub async fn find_by_index(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<Entity>, MapperError> {
        if self.entity_type.is_primary(field) {
            if !self.exists(value).await? {
                return Ok(None);
            }
            return self.load(value).await.map(Some);
        }

        self.index(field)?.get(value).await
    }

    /// Snapshot of every stored entity of this type, in store order.
    pub async fn enumerate(&self) -> Result<Enumeration, MapperError> {
        let keys = self.store.keys(&self.key_pattern()).await?;
        Ok(Enumeration {
            entity_type: Arc::clone(&self.entity_type),
            store: Arc::clone(&self.store),
            keys,
        })
    }

    /// Deletes every entity of this type and purges its indexes. An empty collection is left
    /// untouched, indexes included.
    pub async fn delete_all_of_type(&self) -> Result<usize, MapperError> {
        let keys = self.store.keys(&self.key_pattern()).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut index_entries = 0;
        for (field, _) in self.entity_type.indexes() {
            index_entries += self.index(field)?.delete_all().await?;
        }

        let deleted = self.store.del(&keys).await?;
        info!(
            event_name = "db.collection.purged",
            entity_type = self.entity_type.name(),
            deleted,
            index_entries,
            "entity collection deleted"
        );
        Ok(deleted)
    }

    fn key_pattern(&self) -> String {
        format!("{}*", pattern::escape(self.entity_type.prefix()))
    }
}

/// Identity keys captured by [`EntityMapper::enumerate`]. Iterating builds handles on demand
/// and can be repeated; entities created or deleted after the snapshot are not reflected.
pub struct Enumeration {
    entity_type: Arc<EntityType>,
    store: StoreHandle,
    keys: Vec<String>,
}

impl Enumeration {
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.keys
            .iter()
            .map(|key| Entity::attach(Arc::clone(&self.entity_type), Arc::clone(&self.store), key))
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl IntoIterator for Enumeration {
    type Item = Entity;
    type IntoIter = Box<dyn Iterator<Item = Entity> + Send>;

    fn into_iter(self) -> Self::IntoIter {
        let Self { entity_type, store, keys } = self;
        Box::new(
            keys.into_iter()
                .map(move |key| Entity::attach(Arc::clone(&entity_type), Arc::clone(&store), &key)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::EntityMapper;
    use crate::mapper::{EntityType, FieldDescriptor, MapperError, Value};
    use crate::store::{FieldHashStore, InMemoryFieldHashStore, StoreHandle};

    fn account_type() -> EntityType {
        EntityType::builder("Account")
            .field("login", FieldDescriptor::text().primary())
            .field("email", FieldDescriptor::text().indexed())
            .field("team", FieldDescriptor::text().indexed())
            .build()
            .expect("valid type")
    }

    fn setup() -> (StoreHandle, EntityMapper) {
        let store: StoreHandle = Arc::new(InMemoryFieldHashStore::new());
        let mapper = EntityMapper::new(account_type(), Arc::clone(&store));
        (store, mapper)
    }

    #[tokio::test]
    async fn load_records_primary_field_from_local_id() {
        let (store, mapper) = setup();

        let by_local = mapper.load("alice").await.expect("load local");
        let by_key = mapper.load("account:alice").await.expect("load prefixed");

        assert_eq!(by_local, by_key);
        assert_eq!(by_local.identity().as_str(), "account:alice");
        assert_eq!(
            by_local.get("login").await.expect("login"),
            Some(Value::Text("alice".to_string()))
        );
        assert!(store.exists("account:alice").await.expect("created by load"));
    }

    #[tokio::test]
    async fn primary_field_cannot_be_reassigned() {
        let (_, mapper) = setup();
        let alice = mapper.load("alice").await.expect("load");

        alice.set("login", "alice").await.expect("same value is accepted");
        let error = alice.set("login", "mallory").await.expect_err("different value");
        assert!(matches!(error, MapperError::PrimaryFieldImmutable { .. }));
        assert_eq!(alice.get_as::<String>("login").await.expect("login"), Some("alice".into()));
    }

    #[tokio::test]
    async fn load_fails_when_stored_primary_disagrees() {
        let (store, mapper) = setup();
        store.hset("account:alice", "login", "someone-else").await.expect("raw write");

        let error = mapper.load("alice").await.err().expect("conflict");
        assert!(matches!(error, MapperError::PrimaryFieldImmutable { .. }));
    }

    #[tokio::test]
    async fn attach_without_primary_does_not_touch_store() {
        let store: StoreHandle = Arc::new(InMemoryFieldHashStore::new());
        let mapper = EntityMapper::new(
            EntityType::builder("Note").prefix("note:").build().expect("valid type"),
            Arc::clone(&store),
        );

        let note = mapper.load("n1").await.expect("load");
        assert!(!note.exists().await.expect("exists"));
        assert!(!mapper.exists("n1").await.expect("mapper exists"));

        note.set("body", "hello").await.expect("set");
        assert!(mapper.exists("n1").await.expect("exists after write"));
        assert!(mapper.exists("note:n1").await.expect("exists by key"));
    }

    #[tokio::test]
    async fn find_by_index_resolves_primary_and_declared_indexes() {
        let (_, mapper) = setup();
        let alice = mapper.load("alice").await.expect("load");
        alice.set("email", "alice@example.com").await.expect("set email");

        assert_eq!(
            mapper.find_by_index("login", "alice").await.expect("by login"),
            Some(alice.clone())
        );
        assert_eq!(
            mapper.find_by_index("email", "alice@example.com").await.expect("by email"),
            Some(alice)
        );
        assert_eq!(mapper.find_by_index("email", "nobody@example.com").await.expect("miss"), None);
    }

    #[tokio::test]
    async fn find_by_primary_for_missing_id_is_absent_and_creates_nothing() {
        let (store, mapper) = setup();

        assert_eq!(mapper.find_by_index("login", "ghost").await.expect("lookup"), None);
        assert!(!store.exists("account:ghost").await.expect("not created"));
    }

    #[tokio::test]
    async fn find_by_undeclared_field_fails() {
        let (_, mapper) = setup();

        let error = mapper.find_by_index("nickname", "al").await.expect_err("no index");
        assert_eq!(
            error,
            MapperError::NoSuchIndex {
                entity_type: "Account".to_string(),
                field: "nickname".to_string()
            }
        );
    }

    #[tokio::test]
    async fn enumerate_yields_each_entity_once_and_restarts() {
        let (_, mapper) = setup();
        for login in ["alice", "bob", "carol"] {
            let account = mapper.load(login).await.expect("load");
            account.set("email", format!("{login}@example.com")).await.expect("set email");
        }

        let enumeration = mapper.enumerate().await.expect("enumerate");
        assert_eq!(enumeration.len(), 3);

        let first: BTreeSet<String> =
            enumeration.iter().map(|account| account.local_id().to_string()).collect();
        let second: BTreeSet<String> =
            enumeration.iter().map(|account| account.identity().to_string()).collect();

        let expected: BTreeSet<String> =
            ["alice", "bob", "carol"].into_iter().map(str::to_string).collect();
        assert_eq!(first, expected);
        assert_eq!(second.len(), 3);

        let owned: Vec<_> = enumeration.into_iter().collect();
        assert_eq!(owned.len(), 3);
    }

    #[tokio::test]
    async fn delete_all_of_type_purges_entities_and_indexes() {
        let (store, mapper) = setup();
        for login in ["alice", "bob"] {
            let account = mapper.load(login).await.expect("load");
            account.set("email", format!("{login}@example.com")).await.expect("set email");
            account.set("team", format!("team-{login}")).await.expect("set team");
        }
        store.set("unrelated", "keep me").await.expect("neighbour");

        assert_eq!(mapper.delete_all_of_type().await.expect("delete all"), 2);
        assert!(mapper.enumerate().await.expect("enumerate").is_empty());
        assert!(mapper.index("email").expect("email").is_empty().await.expect("email empty"));
        assert!(mapper.index("team").expect("team").is_empty().await.expect("team empty"));
        assert_eq!(store.keys("*").await.expect("keys"), vec!["unrelated".to_string()]);
    }

    #[tokio::test]
    async fn delete_all_of_type_on_empty_collection_mutates_nothing() {
        let (store, mapper) = setup();
        // an orphaned index entry survives because there is nothing to delete
        store.set("account_email:orphan@example.com", "account:orphan").await.expect("orphan");

        assert_eq!(mapper.delete_all_of_type().await.expect("delete all"), 0);
        assert!(store.exists("account_email:orphan@example.com").await.expect("orphan kept"));
    }
}
