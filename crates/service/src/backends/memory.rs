use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StorageError;
use crate::storage::{StorageBackend, UpdatePublisher};

/// Backend keeping the value in process memory.
pub struct MemoryBackend<S> {
    value: RwLock<S>,
    publisher: Option<UpdatePublisher<S>>,
}

impl<S> MemoryBackend<S> {
    pub fn new(initial: S) -> Self {
        Self { value: RwLock::new(initial), publisher: None }
    }

    pub fn with_publisher(initial: S, publisher: UpdatePublisher<S>) -> Self {
        Self { value: RwLock::new(initial), publisher: Some(publisher) }
    }
}

impl<S: Clone> MemoryBackend<S> {
    /// Replace the value out-of-band and announce it as an update.
    pub async fn replace_external(&self, value: S) {
        *self.value.write().await = value.clone();
        if let Some(publisher) = &self.publisher {
            publisher.publish(&value);
        }
    }
}

#[async_trait]
impl<S> StorageBackend<S> for MemoryBackend<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn handle_init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn handle_load(&self) -> Result<S, StorageError> {
        Ok(self.value.read().await.clone())
    }

    async fn handle_save(&self, data: S) -> Result<(), StorageError> {
        *self.value.write().await = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::{CacheStore, InitOptions};
    use crate::storage::Storage;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn memory_backend_round_trips_and_announces_external_changes() -> Result<(), anyhow::Error> {
        let mut handle = None;
        let storage = Storage::with_publisher(|publisher| {
            let backend = Arc::new(MemoryBackend::with_publisher(String::new(), publisher));
            handle = Some(Arc::clone(&backend));
            backend
        });
        let backend = handle.expect("backend built");
        let cache = CacheStore::new(storage);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        cache.subscribe(move |v: &String| s.lock().unwrap().push(v.clone()));

        cache.init(InitOptions::default()).await?;
        cache.save("saved".to_string()).await?;
        assert_eq!(cache.storage().load().await?, "saved");

        backend.replace_external("external".to_string()).await;
        assert_eq!(*seen.lock().unwrap(), vec!["external".to_string()]);
        assert_eq!(cache.load().await?, "external");
        assert_eq!(seen.lock().unwrap().len(), 2);
        Ok(())
    }
}
