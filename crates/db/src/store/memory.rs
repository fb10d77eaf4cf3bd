use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::pattern::KeyPattern;
use super::{FieldHashStore, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Entry {
    Scalar(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

/// Process-local backend with Redis semantics for the subset of commands the mapper uses.
#[derive(Default)]
pub struct InMemoryFieldHashStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryFieldHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn key_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType { key: key.to_string() }
}

fn hash_of<'a>(
    entries: &'a HashMap<String, Entry>,
    key: &str,
) -> Result<Option<&'a HashMap<String, String>>, StoreError> {
    match entries.get(key) {
        None => Ok(None),
        Some(Entry::Hash(hash)) => Ok(Some(hash)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn hash_of_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<&'a mut HashMap<String, String>, StoreError> {
    let entry = entries.entry(key.to_string()).or_insert_with(|| Entry::Hash(HashMap::new()));
    match entry {
        Entry::Hash(hash) => Ok(hash),
        _ => Err(wrong_type(key)),
    }
}

#[async_trait]
impl FieldHashStore for InMemoryFieldHashStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(hash_of(&entries, key)?.and_then(|hash| hash.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let hash = hash_of_mut(&mut entries, key)?;
        Ok(hash.insert(field.to_string(), value.to_string()).is_none())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        let Entry::Hash(hash) = entry else {
            return Err(wrong_type(key));
        };

        let removed = hash.remove(field).is_some();
        if hash.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        let hash = hash_of_mut(&mut entries, key)?;

        let current = match hash.get(field) {
            None => 0,
            Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::NotAnInteger {
                key: key.to_string(),
                field: field.to_string(),
            })?,
        };
        let next = current.checked_add(amount).ok_or_else(|| StoreError::Overflow {
            key: key.to_string(),
            field: field.to_string(),
        })?;

        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(hash_of(&entries, key)?.map(|hash| hash.keys().cloned().collect()).unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> Result<usize, StoreError> {
        let entries = self.entries.read().await;
        Ok(hash_of(&entries, key)?.map(HashMap::len).unwrap_or(0))
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let entries = self.entries.read().await;
        Ok(hash_of(&entries, key)?.is_some_and(|hash| hash.contains_key(field)))
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let entries = self.entries.read().await;
        Ok(hash_of(&entries, key)?
            .map(|hash| hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Scalar(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry::Scalar(value.to_string()));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(keys.iter().filter(|key| entries.remove(key.as_str()).is_some()).count())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let pattern = KeyPattern::parse(pattern)?;
        let entries = self.entries.read().await;
        Ok(entries.keys().filter(|key| pattern.matches(key)).cloned().collect())
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries.remove(old).ok_or_else(|| StoreError::NoSuchKey(old.to_string()))?;
        entries.insert(new.to_string(), entry);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry::Set(HashSet::new()));
        match entry {
            Entry::Set(members) => Ok(members.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn smembers(&self, key: &str) -> Result<BTreeSet<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(BTreeSet::new()),
            Some(Entry::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::InMemoryFieldHashStore;
    use crate::store::{FieldHashStore, StoreError};

    #[tokio::test]
    async fn hash_fields_round_trip_and_last_delete_drops_key() {
        let store = InMemoryFieldHashStore::new();

        assert!(store.hset("user:alice", "name", "Alice").await.expect("hset"));
        assert!(!store.hset("user:alice", "name", "Alice L.").await.expect("hset again"));
        assert_eq!(
            store.hget("user:alice", "name").await.expect("hget"),
            Some("Alice L.".to_string())
        );
        assert_eq!(store.hlen("user:alice").await.expect("hlen"), 1);
        assert!(store.exists("user:alice").await.expect("exists"));

        assert!(store.hdel("user:alice", "name").await.expect("hdel"));
        assert!(!store.exists("user:alice").await.expect("exists after hdel"));
        assert_eq!(store.hget("user:alice", "name").await.expect("hget missing"), None);
    }

    #[tokio::test]
    async fn hincrby_starts_at_zero_and_rejects_non_integers() {
        let store = InMemoryFieldHashStore::new();

        assert_eq!(store.hincrby("user:bob", "commits", 3).await.expect("incr"), 3);
        assert_eq!(store.hincrby("user:bob", "commits", -1).await.expect("decr"), 2);

        store.hset("user:bob", "name", "Bob").await.expect("hset");
        let error = store.hincrby("user:bob", "name", 1).await.expect_err("not an integer");
        assert!(matches!(error, StoreError::NotAnInteger { .. }));

        store.hset("user:bob", "big", &i64::MAX.to_string()).await.expect("hset max");
        let error = store.hincrby("user:bob", "big", 1).await.expect_err("overflow");
        assert!(matches!(error, StoreError::Overflow { .. }));
    }

    #[tokio::test]
    async fn type_mismatches_are_reported() {
        let store = InMemoryFieldHashStore::new();
        store.set("scalar", "value").await.expect("set");
        store.hset("hash", "f", "v").await.expect("hset");

        assert!(matches!(store.hget("scalar", "f").await, Err(StoreError::WrongType { .. })));
        assert!(matches!(store.get("hash").await, Err(StoreError::WrongType { .. })));
        assert!(matches!(store.sadd("hash", "m").await, Err(StoreError::WrongType { .. })));

        // SET replaces whatever the key held.
        store.set("hash", "now scalar").await.expect("set over hash");
        assert_eq!(store.get("hash").await.expect("get"), Some("now scalar".to_string()));
    }

    #[tokio::test]
    async fn rename_moves_value_and_fails_on_missing_source() {
        let store = InMemoryFieldHashStore::new();
        store.set("idx:old", "user:alice").await.expect("set");

        store.rename("idx:old", "idx:new").await.expect("rename");
        assert_eq!(store.get("idx:old").await.expect("get old"), None);
        assert_eq!(store.get("idx:new").await.expect("get new"), Some("user:alice".to_string()));

        let error = store.rename("idx:old", "idx:other").await.expect_err("missing");
        assert_eq!(error, StoreError::NoSuchKey("idx:old".to_string()));
    }

    #[tokio::test]
    async fn keys_and_del_operate_on_pattern_snapshot() {
        let store = InMemoryFieldHashStore::new();
        store.hset("user:a", "n", "1").await.expect("hset a");
        store.hset("user:b", "n", "2").await.expect("hset b");
        store.set("user_email:a@example.com", "user:a").await.expect("set index");

        let keys: BTreeSet<String> =
            store.keys("user:*").await.expect("keys").into_iter().collect();
        assert_eq!(keys, BTreeSet::from(["user:a".to_string(), "user:b".to_string()]));

        let deleted = store
            .del(&["user:a".to_string(), "user:b".to_string(), "user:zzz".to_string()])
            .await
            .expect("del");
        assert_eq!(deleted, 2);
        assert_eq!(store.key_count().await, 1);
    }

    #[tokio::test]
    async fn set_membership_is_idempotent() {
        let store = InMemoryFieldHashStore::new();
        assert!(store.sadd("channels", "#general").await.expect("sadd"));
        assert!(!store.sadd("channels", "#general").await.expect("sadd again"));
        assert!(store.sadd("channels", "#random").await.expect("sadd other"));

        let members = store.smembers("channels").await.expect("smembers");
        assert_eq!(members, BTreeSet::from(["#general".to_string(), "#random".to_string()]));
        assert!(store.smembers("missing").await.expect("smembers missing").is_empty());
    }
}
