//! Slack name to id cache.
//!
//! Channels are stored as `#name -> id` scalars and collected in the `channels` set; members as
//! `@name -> id` scalars in the `users` set. Listings come from a [`DirectorySource`].

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use gitslack_core::config::SlackConfig;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{StoreError, StoreHandle};

const CHANNELS_SET: &str = "channels";
const USERS_SET: &str = "users";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory source failed: {0}")]
    Source(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryChannel {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryMember {
    pub id: String,
    pub name: String,
    pub is_bot: bool,
    pub deleted: bool,
}

#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<DirectoryChannel>, DirectoryError>;
    async fn list_users(&self) -> Result<Vec<DirectoryMember>, DirectoryError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectoryOptions {
    pub include_bots: bool,
    pub include_deleted: bool,
}

impl From<&SlackConfig> for DirectoryOptions {
    fn from(config: &SlackConfig) -> Self {
        Self { include_bots: config.include_bots, include_deleted: config.include_deleted }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectoryCounts {
    pub channels: usize,
    pub users: usize,
}

#[derive(Clone)]
pub struct SlackDirectory {
    store: StoreHandle,
    source: Arc<dyn DirectorySource>,
    options: DirectoryOptions,
}

impl SlackDirectory {
    pub fn new(store: StoreHandle, source: Arc<dyn DirectorySource>) -> Self {
        Self::with_options(store, source, DirectoryOptions::default())
    }

    pub fn with_options(
        store: StoreHandle,
        source: Arc<dyn DirectorySource>,
        options: DirectoryOptions,
    ) -> Self {
        Self { store, source, options }
    }

    pub fn options(&self) -> DirectoryOptions {
        self.options
    }

    /// Writes every listed channel; returns how many were cached.
    pub async fn refresh_channels(&self) -> Result<usize, DirectoryError> {
        let channels = self.source.list_channels().await.map_err(|error| {
            warn!(
                event_name = "db.directory.source_failed",
                listing = "channels",
                error = %error,
                "channel listing failed"
            );
            error
        })?;

        for channel in &channels {
            let name = qualified('#', &channel.name);
            self.store.set(&name, &channel.id).await?;
            self.store.sadd(CHANNELS_SET, &name).await?;
        }

        info!(
            event_name = "db.directory.channels_refreshed",
            cached = channels.len(),
            "channel directory refreshed"
        );
        Ok(channels.len())
    }

    /// Writes listed members, skipping bots and deleted accounts unless the options admit them.
    pub async fn refresh_users(&self) -> Result<usize, DirectoryError> {
        let members = self.source.list_users().await.map_err(|error| {
            warn!(
                event_name = "db.directory.source_failed",
                listing = "users",
                error = %error,
                "user listing failed"
            );
            error
        })?;

        let mut cached = 0;
        for member in &members {
            if member.is_bot && !self.options.include_bots {
                continue;
            }
            if member.deleted && !self.options.include_deleted {
                continue;
            }

            let name = qualified('@', &member.name);
            self.store.set(&name, &member.id).await?;
            self.store.sadd(USERS_SET, &name).await?;
            cached += 1;
        }

        info!(
            event_name = "db.directory.users_refreshed",
            listed = members.len(),
            cached,
            "user directory refreshed"
        );
        Ok(cached)
    }

    /// Startup warm-up of both listings.
    pub async fn load_all(&self) -> Result<DirectoryCounts, DirectoryError> {
        Ok(DirectoryCounts {
            channels: self.refresh_channels().await?,
            users: self.refresh_users().await?,
        })
    }

    pub async fn channel_id(&self, channel: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.store.get(&qualified('#', channel)).await?)
    }

    /// Looks the member up, refreshing the user listing once on a miss.
    pub async fn user_id(&self, username: &str) -> Result<Option<String>, DirectoryError> {
        let key = qualified('@', username);
        if let Some(id) = self.store.get(&key).await? {
            return Ok(Some(id));
        }

        self.refresh_users().await?;
        Ok(self.store.get(&key).await?)
    }

    /// Cached `#name` entries, refreshed first when forced or when nothing is cached yet.
    pub async fn channels(&self, force_refresh: bool) -> Result<BTreeSet<String>, DirectoryError> {
        let cached = self.store.smembers(CHANNELS_SET).await?;
        if !force_refresh && !cached.is_empty() {
            return Ok(cached);
        }

        self.refresh_channels().await?;
        Ok(self.store.smembers(CHANNELS_SET).await?)
    }

    pub async fn users(&self) -> Result<BTreeSet<String>, DirectoryError> {
        Ok(self.store.smembers(USERS_SET).await?)
    }
}

fn qualified(sigil: char, name: &str) -> String {
    if name.starts_with(sigil) {
        name.to_string()
    } else {
        format!("{sigil}{name}")
    }
}
