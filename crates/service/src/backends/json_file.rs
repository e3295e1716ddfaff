use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{fs, sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::storage::{StorageBackend, UpdatePublisher};

/// On-disk layout: the value plus the unix-millis time it was written.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "_ts")]
    ts: i64,
    data: T,
}

/// JSON file-backed single-value backend.
///
/// Writes made by other processes are picked up by [`JsonFileBackend::refresh`]
/// (or a poller started with [`JsonFileBackend::spawn_poller`]) and announced
/// on the update channel.
pub struct JsonFileBackend<S> {
    file_path: PathBuf,
    // newest `_ts` this process has written or announced
    last_seen: Mutex<Option<i64>>,
    publisher: UpdatePublisher<S>,
}

impl<S> JsonFileBackend<S>
where
    S: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    pub fn new<P: Into<PathBuf>>(path: P, publisher: UpdatePublisher<S>) -> Self {
        Self { file_path: path.into(), last_seen: Mutex::new(None), publisher }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    async fn read_envelope(&self) -> std::io::Result<Envelope<S>> {
        let bytes = fs::read(&self.file_path).await?;
        serde_json::from_slice(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    async fn write_envelope(&self, envelope: &Envelope<&S>) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(envelope)?;
        let tmp = self.file_path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.file_path).await
    }

    /// Re-read the file and announce its value if it is newer than anything seen so far.
    pub async fn refresh(&self) -> Result<bool, StorageError> {
        let mut last_seen = self.last_seen.lock().await;
        let envelope = self.read_envelope().await.map_err(StorageError::load)?;
        if last_seen.is_some_and(|seen| envelope.ts <= seen) {
            return Ok(false);
        }
        *last_seen = Some(envelope.ts);
        drop(last_seen);
        debug!(path = %self.file_path.display(), ts = envelope.ts, "external change detected");
        self.publisher.publish(&envelope.data);
        Ok(true)
    }

    /// Call [`JsonFileBackend::refresh`] every `period` until the backend is dropped.
    pub fn spawn_poller(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(backend) = weak.upgrade() else { break };
                if let Err(e) = backend.refresh().await {
                    warn!(path = %backend.file_path.display(), error = %e, "refresh failed; will retry on next tick");
                }
            }
        })
    }
}

#[async_trait]
impl<S> StorageBackend<S> for JsonFileBackend<S>
where
    S: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// Creates the file with `S::default()` if missing.
    async fn handle_init(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(StorageError::init)?;
        }

        let mut last_seen = self.last_seen.lock().await;
        match self.read_envelope().await {
            Ok(envelope) => *last_seen = Some(envelope.ts),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = S::default();
                self.write_envelope(&Envelope { ts: 0, data: &empty }).await.map_err(StorageError::init)?;
                *last_seen = Some(0);
            }
            Err(e) => return Err(StorageError::init(e)),
        }
        debug!(path = %self.file_path.display(), "json file backend ready");
        Ok(())
    }

    async fn handle_load(&self) -> Result<S, StorageError> {
        let envelope = self.read_envelope().await.map_err(StorageError::load)?;
        Ok(envelope.data)
    }

    async fn handle_save(&self, data: S) -> Result<(), StorageError> {
        let mut last_seen = self.last_seen.lock().await;
        // keep `_ts` strictly increasing so our own write never looks external
        let now = chrono::Utc::now().timestamp_millis();
        let ts = match *last_seen {
            None => now,
            Some(seen) => {
                let next = seen
                    .checked_add(1)
                    .ok_or_else(|| StorageError::save("timestamp overflow: last seen _ts is i64::MAX"))?;
                now.max(next)
            }
        };
        self.write_envelope(&Envelope { ts, data: &data }).await.map_err(StorageError::save)?;
        *last_seen = Some(ts);
        Ok(())
    }
}
