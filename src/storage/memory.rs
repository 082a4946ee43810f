use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use super::{Cache, StorageError};

#[derive(Clone, Debug)]
pub struct MemoryCache {
    cache: Arc<DashMap<String, (String, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(DashMap::with_capacity(capacity)),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let expired = match self.cache.get(key) {
            Some(entry) => match entry.value() {
                (_, Some(deadline)) if *deadline <= Instant::now() => true,
                (value, _) => return Ok(Some(value.clone())),
            },
            None => return Ok(None),
        };

        if expired {
            self.cache.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StorageError> {
        let now = Instant::now();
        self.cache
            .retain(|_, (_, deadline)| !matches!(deadline, Some(deadline) if *deadline <= now));

        let deadline = ttl.map(|ttl| now + ttl);
        self.cache.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        self.cache.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .cache
            .remove(key)
            .and_then(|(_, (value, deadline))| match deadline {
                Some(deadline) if deadline <= Instant::now() => None,
                _ => Some(value),
            }))
    }
}
