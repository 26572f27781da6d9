use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ConnectionConfig, DbError, open_source};
use crate::schema::SchemaSnapshot;
use crate::schema::cache::SchemaCache;

/// Loads schema snapshots for registered connections, serving them from the
/// injected cache until they expire or are refreshed.
pub struct SchemaManager {
    cache: Arc<dyn SchemaCache>,
}

impl SchemaManager {
    pub fn new(cache: Arc<dyn SchemaCache>) -> Self {
        Self { cache }
    }

    /// Changing the connection string of a config yields a new key.
    pub fn cache_key(config: &ConnectionConfig) -> String {
        let mut hasher = DefaultHasher::new();
        config.connection_string.hash(&mut hasher);
        format!("schema_{}_{:016x}", config.id, hasher.finish())
    }

    pub async fn get_schema(&self, config: &ConnectionConfig) -> Result<Arc<SchemaSnapshot>, DbError> {
        let key = Self::cache_key(config);
        if let Some(snapshot) = self.cache.get(&key).await {
            debug!("Schema cache hit for {}", key);
            return Ok(snapshot);
        }

        info!("Loading schema for connection {} ({})", config.id, config.dialect);
        let source = open_source(config)?;
        let snapshot = Arc::new(source.introspect().await?);
        self.cache.set(key, Arc::clone(&snapshot)).await;
        Ok(snapshot)
    }

    /// Drops every cached snapshot of connection `id`.
    pub async fn invalidate(&self, id: i64) {
        self.cache.invalidate(&format!("schema_{}_", id)).await;
    }

    pub async fn refresh(&self, config: &ConnectionConfig) -> Result<Arc<SchemaSnapshot>, DbError> {
        self.invalidate(config.id).await;
        self.get_schema(config).await
    }
}
