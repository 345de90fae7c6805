use common::config::RegistryConfig;
use common::error::RegistryResult;
use common::registry::RegistryStore;
use std::sync::Arc;

/// Request counter shared by every frontend instance through the registry store.
#[derive(Debug, Clone)]
pub struct HitCounter {
    store: Arc<dyn RegistryStore>,
    key: String,
}

impl HitCounter {
    pub fn new(store: Arc<dyn RegistryStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            key: config.counter_key.clone(),
        }
    }

    /// Count one hit and return the new total.
    pub async fn increment(&self) -> RegistryResult<i64> {
        self.store.incr(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::registry::MemoryStore;

    #[tokio::test]
    async fn test_counter_starts_at_one_and_is_shared() {
        let store = MemoryStore::new();
        let config = RegistryConfig::default();
        let first = HitCounter::new(Arc::new(store.clone()), &config);
        let second = HitCounter::new(Arc::new(store.clone()), &config);

        assert_eq!(first.increment().await.unwrap(), 1);
        assert_eq!(second.increment().await.unwrap(), 2);
        assert_eq!(first.increment().await.unwrap(), 3);

        let stored = store.get(&config.counter_key).await.unwrap().unwrap();
        assert_eq!(stored, b"3");
    }
}
