use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use super::SchemaSnapshot;

/// Default lifetime of a cached snapshot.
pub const DEFAULT_SCHEMA_TTL: Duration = Duration::from_secs(60 * 60);

/// Snapshot cache keyed by connection identity. Readers always observe a
/// complete snapshot: a refresh replaces the `Arc` in one write.
#[async_trait]
pub trait SchemaCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Arc<SchemaSnapshot>>;
    async fn set(&self, key: String, snapshot: Arc<SchemaSnapshot>);
    async fn invalidate(&self, key_prefix: &str);
    fn ttl(&self) -> Duration;
}

struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    stored_at: Instant,
}

pub struct MemorySchemaCache {
    entries: RwLock<HashMap<String, CachedSnapshot>>,
    ttl: Duration,
}

impl MemorySchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for MemorySchemaCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEMA_TTL)
    }
}

#[async_trait]
impl SchemaCache for MemorySchemaCache {
    async fn get(&self, key: &str) -> Option<Arc<SchemaSnapshot>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            debug!("Schema cache entry {} expired", key);
            return None;
        }
        Some(Arc::clone(&entry.snapshot))
    }

    async fn set(&self, key: String, snapshot: Arc<SchemaSnapshot>) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CachedSnapshot {
                snapshot,
                stored_at: Instant::now(),
            },
        );
    }

    async fn invalidate(&self, key_prefix: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(key_prefix));
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDescriptor;

    fn snapshot(table: &str) -> Arc<SchemaSnapshot> {
        Arc::new(SchemaSnapshot::new(vec![TableDescriptor::new("main", table)]))
    }

    #[tokio::test]
    async fn returns_stored_snapshot_until_replaced() {
        let cache = MemorySchemaCache::default();
        assert!(cache.get("schema_1").await.is_none());

        cache.set("schema_1".into(), snapshot("a")).await;
        assert_eq!(cache.get("schema_1").await.unwrap().tables[0].name, "a");

        cache.set("schema_1".into(), snapshot("b")).await;
        assert_eq!(cache.get("schema_1").await.unwrap().tables[0].name, "b");
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_refresh() {
        let cache = MemorySchemaCache::default();
        cache.set("k".into(), snapshot("old")).await;

        let held = cache.get("k").await.unwrap();
        cache.set("k".into(), snapshot("new")).await;

        assert_eq!(held.tables[0].name, "old");
        assert_eq!(cache.get("k").await.unwrap().tables[0].name, "new");
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let cache = MemorySchemaCache::new(Duration::ZERO);
        cache.set("k".into(), snapshot("a")).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_drops_matching_keys() {
        let cache = MemorySchemaCache::default();
        cache.set("schema_1_aa".into(), snapshot("a")).await;
        cache.set("schema_2_bb".into(), snapshot("b")).await;

        cache.invalidate("schema_1_").await;
        assert!(cache.get("schema_1_aa").await.is_none());
        assert!(cache.get("schema_2_bb").await.is_some());
    }
}
