mod error;
mod memory;
mod schema;
mod turso;
mod upstash;

pub use error::StorageError;
pub use memory::MemoryCache;
pub use turso::{opt_text, text_or_null, TursoClient};
pub use upstash::RedisClient;

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::config::AppConfig;

/// Key/value store with optional expiry, used for short-lived tokens.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StorageError>;
    async fn del(&self, key: &str) -> Result<(), StorageError>;

    /// Reads and removes a key, so one-time tokens cannot be replayed.
    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.del(key).await?;
        }
        Ok(value)
    }
}

#[derive(Clone)]
pub struct StorageManager {
    turso: TursoClient,
    cache: Arc<dyn Cache>,
}

impl StorageManager {
    pub async fn init(config: &AppConfig) -> Result<Self, StorageError> {
        let turso = TursoClient::new(&config.database.url, &config.database.token).await?;
        schema::migrate(&turso).await?;

        let cache: Arc<dyn Cache> = if config.cache.redis_url.is_empty() {
            warn!("REDIS_URL not set, falling back to in-process cache");
            Arc::new(MemoryCache::new(1024))
        } else {
            Arc::new(RedisClient::new(&config.cache.redis_url).await?)
        };

        Ok(Self { turso, cache })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StorageError> {
        let turso = TursoClient::new(":memory:", "").await?;
        schema::migrate(&turso).await?;
        Ok(Self {
            turso,
            cache: Arc::new(MemoryCache::new(64)),
        })
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        self.turso.get_connection().query("SELECT 1", ()).await?;
        Ok(())
    }

    pub fn turso(&self) -> &TursoClient {
        &self.turso
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }
}
