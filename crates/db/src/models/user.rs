use chrono::{DateTime, Utc};

use super::counters::{self, CommitStats};
use super::Model;
use crate::mapper::{Entity, EntityType, EntityTypeBuilder, FieldDescriptor, MapperError};

/// A committer, keyed by username and findable by email or Slack user id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    entity: Entity,
}

impl Model for User {
    type Args = ();

    fn schema() -> EntityTypeBuilder {
        counters::with_commit_counters(
            EntityType::builder("User")
                .field("username", FieldDescriptor::text().primary())
                .field("name", FieldDescriptor::text())
                .field("email", FieldDescriptor::text().indexed())
                .field("slack_user", FieldDescriptor::text().indexed()),
        )
    }

    fn from_entity(entity: Entity, _args: Self::Args) -> Self {
        Self { entity }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }
}

impl User {
    pub fn username(&self) -> &str {
        self.entity.local_id()
    }

    pub async fn name(&self) -> Result<Option<String>, MapperError> {
        self.entity.get_as("name").await
    }

    pub async fn set_name(&self, name: &str) -> Result<(), MapperError> {
        self.entity.set("name", name).await
    }

    pub async fn email(&self) -> Result<Option<String>, MapperError> {
        self.entity.get_as("email").await
    }

    pub async fn set_email(&self, email: &str) -> Result<(), MapperError> {
        self.entity.set("email", email).await
    }

    pub async fn slack_user(&self) -> Result<Option<String>, MapperError> {
        self.entity.get_as("slack_user").await
    }

    pub async fn set_slack_user(&self, slack_user: &str) -> Result<(), MapperError> {
        self.entity.set("slack_user", slack_user).await
    }

    pub async fn update_commits(&self, count: i64) -> Result<(), MapperError> {
        self.update_commits_at(count, Utc::now()).await
    }

    pub async fn update_commits_at(
        &self,
        count: i64,
        now: DateTime<Utc>,
    ) -> Result<(), MapperError> {
        counters::update_commits(&self.entity, count, now).await
    }

    pub async fn commit_stats(&self) -> Result<CommitStats, MapperError> {
        counters::commit_stats(&self.entity).await
    }

    pub async fn delete(&self) -> Result<bool, MapperError> {
        self.entity.delete_instance().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::User;
    use crate::models::{Collection, Model};
    use crate::store::{FieldHashStore, InMemoryFieldHashStore, StoreHandle};

    fn users() -> (StoreHandle, Collection<User>) {
        let store: StoreHandle = Arc::new(InMemoryFieldHashStore::new());
        let users = Collection::<User>::new(Arc::clone(&store)).expect("user schema");
        (store, users)
    }

    #[test]
    fn schema_derives_prefixes_from_type_name() {
        let entity_type = User::schema().build().expect("user schema");

        assert_eq!(entity_type.prefix(), "user:");
        assert_eq!(entity_type.primary_field(), Some("username"));
        assert_eq!(entity_type.index_prefix("email"), Some("user_email:"));
        assert_eq!(entity_type.index_prefix("slack_user"), Some("user_slack_user:"));
        assert_eq!(entity_type.index_prefix("name"), None);
    }

    #[tokio::test]
    async fn load_stores_username_and_lookups_resolve() {
        let (store, users) = users();
        let alice = users.load("alice", ()).await.expect("load");
        alice.set_name("Alice Liddell").await.expect("name");
        alice.set_email("alice@example.com").await.expect("email");
        alice.set_slack_user("U024BE7LH").await.expect("slack user");

        assert_eq!(alice.username(), "alice");
        assert_eq!(
            store.hget("user:alice", "username").await.expect("raw"),
            Some("alice".to_string())
        );
        assert_eq!(
            store.get("user_email:alice@example.com").await.expect("raw index"),
            Some("user:alice".to_string())
        );

        let by_email =
            users.find_by("email", "alice@example.com", ()).await.expect("by email").expect("hit");
        assert_eq!(by_email.name().await.expect("name"), Some("Alice Liddell".to_string()));
        let by_slack = users.find_by("slack_user", "U024BE7LH", ()).await.expect("by slack");
        assert_eq!(by_slack, Some(alice.clone()));
        let by_username = users.find_by("username", "alice", ()).await.expect("by username");
        assert_eq!(by_username, Some(alice));
    }

    #[tokio::test]
    async fn changing_email_moves_lookup() {
        let (_, users) = users();
        let alice = users.load("alice", ()).await.expect("load");
        alice.set_email("alice@old.example").await.expect("old email");
        alice.set_email("alice@new.example").await.expect("new email");

        assert!(users.find_by("email", "alice@old.example", ()).await.expect("old").is_none());
        assert!(users.find_by("email", "alice@new.example", ()).await.expect("new").is_some());
    }

    #[tokio::test]
    async fn commit_counters_accumulate_per_user() {
        let (_, users) = users();
        let bob = users.load("bob", ()).await.expect("load");
        let monday = Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap();

        bob.update_commits_at(3, monday).await.expect("first push");
        bob.update_commits_at(2, monday).await.expect("second push");

        let stats = bob.commit_stats().await.expect("stats");
        assert_eq!(stats.total, 5);
        assert_eq!(stats.daily, 5);
        assert_eq!(stats.days, 1);
        assert_eq!(stats.updated, Some(monday));
    }

    #[tokio::test]
    async fn enumerate_and_delete_all_cover_every_user() {
        let (store, users) = users();
        for username in ["alice", "bob"] {
            let user = users.load(username, ()).await.expect("load");
            user.set_email(&format!("{username}@example.com")).await.expect("email");
        }

        let records = users.enumerate(()).await.expect("enumerate");
        let mut names: Vec<String> =
            records.iter().map(|user| user.username().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["alice".to_string(), "bob".to_string()]);

        assert_eq!(users.delete_all().await.expect("delete all"), 2);
        assert!(store.keys("user*").await.expect("keys").is_empty());
    }

    #[tokio::test]
    async fn delete_releases_index_entries() {
        let (_, users) = users();
        let carol = users.load("carol", ()).await.expect("load");
        carol.set_email("carol@example.com").await.expect("email");

        assert!(carol.delete().await.expect("delete"));
        assert!(!users.exists("carol").await.expect("exists"));
        assert!(users.index("email").expect("index").is_empty().await.expect("empty"));
    }
}
