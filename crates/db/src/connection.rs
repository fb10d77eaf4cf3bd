use std::sync::Arc;

use gitslack_core::config::StoreConfig;
use tracing::debug;

use crate::store::{InMemoryFieldHashStore, RedisFieldHashStore, StoreError, StoreHandle};

pub async fn connect(store_url: &str) -> Result<StoreHandle, StoreError> {
    let url = store_url.trim();
    let (scheme, _) = url
        .split_once("://")
        .ok_or_else(|| StoreError::UnsupportedBackend(format!("`{url}` is not a store URL")))?;

    match scheme.to_ascii_lowercase().as_str() {
        "memory" => {
            debug!(event_name = "db.store.connected", backend = "memory", "store handle created");
            Ok(Arc::new(InMemoryFieldHashStore::new()))
        }
        "redis" => {
            let store = RedisFieldHashStore::connect(url).await?;
            debug!(event_name = "db.store.connected", backend = "redis", "store handle created");
            Ok(Arc::new(store))
        }
        "rediss" => Err(StoreError::UnsupportedBackend(
            "TLS connections (`rediss://`) are not enabled in this build".to_string(),
        )),
        other => Err(StoreError::UnsupportedBackend(format!(
            "scheme `{other}` has no client in this build (expected memory:// or redis://)"
        ))),
    }
}

pub async fn connect_with_config(config: &StoreConfig) -> Result<StoreHandle, StoreError> {
    connect(&config.url).await
}
