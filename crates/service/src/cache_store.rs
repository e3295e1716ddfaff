use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::StorageError;
use crate::storage::{Storage, SubscriptionId, UpdateChannel};

/// Options for [`CacheStore::init`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Run a `load()` (and its update notification) right after initialization.
    pub load: bool,
}

impl InitOptions {
    pub fn with_load() -> Self { Self { load: true } }
}

/// Caller-facing wrapper around a shared [`Storage`].
///
/// Re-publishes every update the storage announces, and announces each value
/// it loads. It never keeps a copy of the value itself.
pub struct CacheStore<S> {
    storage: Arc<Storage<S>>,
    updates: Arc<UpdateChannel<S>>,
    bridge: SubscriptionId,
}

impl<S> CacheStore<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(storage: Arc<Storage<S>>) -> Self {
        let updates = Arc::new(UpdateChannel::new());
        let forward = Arc::clone(&updates);
        let bridge = storage.subscribe(move |data: &S| forward.publish(data));
        debug!("cache store attached to storage updates");
        Self { storage, updates, bridge }
    }

    /// Initialize the storage; with `load` set, follow up with [`CacheStore::load`].
    pub async fn init(&self, options: InitOptions) -> Result<(), StorageError> {
        if options.load {
            self.storage.init().await?;
            self.load().await?;
            return Ok(());
        }
        self.storage.init().await
    }

    /// Load from the storage and announce the value to subscribers before returning it.
    pub async fn load(&self) -> Result<S, StorageError> {
        let data = self.storage.load().await?;
        self.updates.publish(&data);
        Ok(data)
    }

    /// Persist through the storage. No update is announced.
    pub async fn save(&self, data: S) -> Result<(), StorageError> {
        self.storage.save(data).await
    }
}

impl<S> CacheStore<S> {
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.updates.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    pub fn storage(&self) -> &Arc<Storage<S>> {
        &self.storage
    }
}

impl<S> Drop for CacheStore<S> {
    fn drop(&mut self) {
        self.storage.unsubscribe(self.bridge);
    }
}

impl<S> fmt::Debug for CacheStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("bridge", &self.bridge)
            .field("updates", &self.updates)
            .finish_non_exhaustive()
    }
}
