use super::Model;
use crate::mapper::{Entity, EntityType, EntityTypeBuilder, FieldDescriptor, MapperError};

/// A repository whose pushes are announced in Slack.
///
/// Construction takes the workspace-wide default channel, used by
/// [`Project::notification_channel`] when the project has none of its own.
#[derive(Clone, Debug)]
pub struct Project {
    entity: Entity,
    fallback_channel: Option<String>,
}

impl Model for Project {
    type Args = Option<String>;

    fn schema() -> EntityTypeBuilder {
        EntityType::builder("Project")
            .prefix("project:")
            .field("path", FieldDescriptor::text().indexed())
            .field("name", FieldDescriptor::text())
            .field("channel", FieldDescriptor::text())
            .field("notify", FieldDescriptor::boolean())
    }

    fn from_entity(entity: Entity, fallback_channel: Self::Args) -> Self {
        Self { entity, fallback_channel }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }
}

impl Project {
    pub fn id(&self) -> &str {
        self.entity.local_id()
    }

    pub async fn path(&self) -> Result<Option<String>, MapperError> {
        self.entity.get_as("path").await
    }

    pub async fn set_path(&self, path: &str) -> Result<(), MapperError> {
        self.entity.set("path", path).await
    }

    pub async fn name(&self) -> Result<Option<String>, MapperError> {
        self.entity.get_as("name").await
    }

    pub async fn set_name(&self, name: &str) -> Result<(), MapperError> {
        self.entity.set("name", name).await
    }

    pub async fn channel(&self) -> Result<Option<String>, MapperError> {
        self.entity.get_as("channel").await
    }

    pub async fn set_channel(&self, channel: &str) -> Result<(), MapperError> {
        self.entity.set("channel", channel).await
    }

    pub async fn clear_channel(&self) -> Result<bool, MapperError> {
        self.entity.delete("channel").await
    }

    /// Unset means notifications are off.
    pub async fn notify(&self) -> Result<bool, MapperError> {
        Ok(self.entity.get_as::<bool>("notify").await?.unwrap_or(false))
    }

    pub async fn set_notify(&self, notify: bool) -> Result<(), MapperError> {
        self.entity.set("notify", notify).await
    }

    pub fn fallback_channel(&self) -> Option<&str> {
        self.fallback_channel.as_deref()
    }

    pub async fn notification_channel(&self) -> Result<Option<String>, MapperError> {
        Ok(self.channel().await?.or_else(|| self.fallback_channel.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Project;
    use crate::models::{Collection, Model};
    use crate::store::{FieldHashStore, InMemoryFieldHashStore, StoreHandle};

    fn projects() -> (StoreHandle, Collection<Project>) {
        let store: StoreHandle = Arc::new(InMemoryFieldHashStore::new());
        let projects = Collection::<Project>::new(Arc::clone(&store)).expect("project schema");
        (store, projects)
    }

    #[test]
    fn schema_uses_explicit_prefix_without_primary() {
        let entity_type = Project::schema().build().expect("project schema");

        assert_eq!(entity_type.prefix(), "project:");
        assert_eq!(entity_type.primary_field(), None);
        assert_eq!(entity_type.index_prefix("path"), Some("project_path:"));
    }

    #[tokio::test]
    async fn load_without_primary_writes_nothing_until_first_field() {
        let (store, projects) = projects();
        let project = projects.load("42", None).await.expect("load");
        assert!(!projects.exists("42").await.expect("not yet stored"));

        project.set_path("infra/deploy").await.expect("path");
        assert!(store.exists("project:42").await.expect("stored"));
        assert_eq!(project.id(), "42");
    }

    #[tokio::test]
    async fn notify_is_boolean_and_defaults_off() {
        let (store, projects) = projects();
        let project = projects.load("7", None).await.expect("load");
        assert!(!project.notify().await.expect("default"));

        project.set_notify(true).await.expect("enable");
        assert!(project.notify().await.expect("enabled"));
        assert_eq!(store.hget("project:7", "notify").await.expect("raw"), Some("1".to_string()));
    }

    #[tokio::test]
    async fn notification_channel_falls_back_to_default() {
        let (_, projects) = projects();
        let fallback = Some("#commits".to_string());
        let project = projects.load("9", fallback.clone()).await.expect("load");
        project.set_name("api").await.expect("name");

        assert_eq!(project.notification_channel().await.expect("fallback"), fallback);

        project.set_channel("#api-team").await.expect("channel");
        assert_eq!(
            project.notification_channel().await.expect("own"),
            Some("#api-team".to_string())
        );

        assert!(project.clear_channel().await.expect("clear"));
        assert_eq!(project.fallback_channel(), Some("#commits"));
        assert_eq!(project.notification_channel().await.expect("fallback again"), fallback);
    }

    #[tokio::test]
    async fn find_by_path_carries_construction_args() {
        let (_, projects) = projects();
        let project = projects.load("11", None).await.expect("load");
        project.set_path("web/site").await.expect("path");

        let found = projects
            .find_by("path", "web/site", Some("#web".to_string()))
            .await
            .expect("lookup")
            .expect("hit");
        assert_eq!(found.id(), "11");
        assert_eq!(found.fallback_channel(), Some("#web"));

        let records = projects.enumerate(Some("#all".to_string())).await.expect("enumerate");
        assert_eq!(records.len(), 1);
        assert!(records.iter().all(|project| project.fallback_channel() == Some("#all")));
        assert_eq!(found.entity(), project.entity());
    }
}
