//! Single-value storage contract.
//!
//! A backend implements [`StorageBackend`]; [`Storage`] wraps it with a
//! run-once initialization and an "update" channel the backend can publish
//! external changes on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::StorageError;

pub mod channel;

pub use channel::{Listener, SubscriptionId, UpdateChannel, UpdatePublisher};

/// Backend-specific half of a storage.
/// Implementations can be file-backed, database-backed, or remote.
#[async_trait]
pub trait StorageBackend<S>: Send + Sync {
    /// Prepare the backing medium. Called at most once per [`Storage`].
    async fn handle_init(&self) -> Result<(), StorageError>;
    async fn handle_load(&self) -> Result<S, StorageError>;
    async fn handle_save(&self, data: S) -> Result<(), StorageError>;
}

#[async_trait]
impl<S, B> StorageBackend<S> for Arc<B>
where
    S: Send + 'static,
    B: StorageBackend<S> + ?Sized,
{
    async fn handle_init(&self) -> Result<(), StorageError> { (**self).handle_init().await }
    async fn handle_load(&self) -> Result<S, StorageError> { (**self).handle_load().await }
    async fn handle_save(&self, data: S) -> Result<(), StorageError> { (**self).handle_save(data).await }
}

/// Observable initialization progress of a [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    Pending,
    Ready,
    Failed(StorageError),
}

pub struct Storage<S> {
    backend: Arc<dyn StorageBackend<S>>,
    init: OnceCell<Result<(), StorageError>>,
    init_started: AtomicBool,
    updates: Arc<UpdateChannel<S>>,
}

impl<S> Storage<S>
where
    S: Send + Sync + 'static,
{
    /// Wrap a backend that never publishes updates.
    pub fn new<B>(backend: B) -> Arc<Self>
    where
        B: StorageBackend<S> + 'static,
    {
        Self::with_channel(backend, Arc::new(UpdateChannel::new()))
    }

    /// Build the backend with a publisher wired to this storage's update channel.
    ///
    /// Initialization is scheduled on the current tokio runtime, if any; it is
    /// not awaited here. Await [`Storage::init`] to observe its outcome.
    pub fn with_publisher<B, F>(build: F) -> Arc<Self>
    where
        B: StorageBackend<S> + 'static,
        F: FnOnce(UpdatePublisher<S>) -> B,
    {
        let updates = Arc::new(UpdateChannel::new());
        let backend = build(UpdatePublisher::new(&updates));
        Self::with_channel(backend, updates)
    }

    // Initialization is scheduled on the current tokio runtime, if any; it is
    // not awaited here. Await `init()` to observe its outcome.
    fn with_channel<B>(backend: B, updates: Arc<UpdateChannel<S>>) -> Arc<Self>
    where
        B: StorageBackend<S> + 'static,
    {
        let storage = Arc::new(Self {
            backend: Arc::new(backend),
            init: OnceCell::new(),
            init_started: AtomicBool::new(false),
            updates,
        });
        Self::schedule_init(Arc::downgrade(&storage));
        storage
    }

    fn schedule_init(storage: Weak<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(storage) = storage.upgrade() {
                        // outcome is memoized; callers read it through init()
                        let _ = storage.init().await;
                    }
                });
                debug!("storage initialization scheduled");
            }
            Err(_) => debug!("no tokio runtime; storage initialization deferred to init()"),
        }
    }

    /// Run the backend initialization once and share its outcome.
    ///
    /// Concurrent callers wait on the same in-flight initialization. A
    /// failure is kept as well: later calls return it without retrying.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.init_started.store(true, Ordering::Release);
        self.init
            .get_or_init(|| async {
                debug!("running storage initialization");
                let outcome = self.backend.handle_init().await;
                match &outcome {
                    Ok(()) => debug!("storage initialized"),
                    Err(e) => debug!(error = %e, "storage initialization failed"),
                }
                outcome
            })
            .await
            .clone()
    }

    /// Query the backend; nothing is cached between calls.
    pub async fn load(&self) -> Result<S, StorageError> {
        self.backend.handle_load().await
    }

    pub async fn save(&self, data: S) -> Result<(), StorageError> {
        self.backend.handle_save(data).await
    }

    pub fn init_state(&self) -> InitState {
        match self.init.get() {
            Some(Ok(())) => InitState::Ready,
            Some(Err(e)) => InitState::Failed(e.clone()),
            None if self.init_started.load(Ordering::Acquire) => InitState::Pending,
            None => InitState::NotStarted,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init.initialized()
    }
}

impl<S> Storage<S> {
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.updates.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.updates.unsubscribe(id)
    }

    pub fn publish(&self, data: &S) {
        self.updates.publish(data);
    }

    pub fn publisher(&self) -> UpdatePublisher<S> {
        UpdatePublisher::new(&self.updates)
    }

    pub fn subscriber_count(&self) -> usize {
        self.updates.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct SlowInit {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl StorageBackend<u32> for SlowInit {
        async fn handle_init(&self) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail { Err(StorageError::init("disk unavailable")) } else { Ok(()) }
        }
        async fn handle_load(&self) -> Result<u32, StorageError> { Ok(42) }
        async fn handle_save(&self, _data: u32) -> Result<(), StorageError> { Ok(()) }
    }

    #[test]
    fn construction_outside_runtime_defers_init() {
        let calls = Arc::new(AtomicUsize::new(0));
        let storage = Storage::new(SlowInit { calls: calls.clone(), fail: false });
        assert_eq!(storage.init_state(), InitState::NotStarted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn init_state_moves_through_pending_to_ready() -> Result<(), anyhow::Error> {
        let calls = Arc::new(AtomicUsize::new(0));
        let storage = Storage::new(SlowInit { calls: calls.clone(), fail: false });
        // the scheduled task has not been polled yet on the current-thread runtime
        assert_eq!(storage.init_state(), InitState::NotStarted);

        let pending = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.init().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(storage.init_state(), InitState::Pending);

        pending.await??;
        assert_eq!(storage.init_state(), InitState::Ready);
        assert!(storage.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_init_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let storage = Storage::new(SlowInit { calls: calls.clone(), fail: true });

        let first = storage.init().await;
        let second = storage.init().await;
        assert_eq!(first, Err(StorageError::Init("disk unavailable".into())));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(storage.init_state(), InitState::Failed(StorageError::Init("disk unavailable".into())));
    }

    #[tokio::test]
    async fn scheduled_init_runs_without_explicit_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let storage = Storage::new(SlowInit { calls: calls.clone(), fail: false });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(storage.is_initialized());

        storage.init().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn arc_backend_delegates() {
        let backend = Arc::new(SlowInit { calls: Arc::new(AtomicUsize::new(0)), fail: false });
        let storage = Storage::new(Arc::clone(&backend));
        assert_eq!(storage.load().await.unwrap(), 42);
        storage.save(1).await.unwrap();
    }

    struct Announcing {
        publisher: UpdatePublisher<u32>,
    }

    #[async_trait]
    impl StorageBackend<u32> for Announcing {
        async fn handle_init(&self) -> Result<(), StorageError> { Ok(()) }
        async fn handle_load(&self) -> Result<u32, StorageError> { Ok(0) }
        async fn handle_save(&self, data: u32) -> Result<(), StorageError> {
            self.publisher.publish(&data);
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_publisher_feeds_storage_subscribers() {
        let storage = Storage::with_publisher(|publisher| Announcing { publisher });
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        storage.subscribe(move |v: &u32| s.lock().unwrap().push(*v));

        storage.save(5).await.unwrap();
        storage.publisher().publish(&6);
        assert_eq!(*seen.lock().unwrap(), vec![5, 6]);
    }
}
