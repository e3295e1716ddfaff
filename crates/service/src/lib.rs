//! Single-value cache over a pluggable asynchronous storage backend.
//! - `storage` defines the backend contract, run-once init and the update channel.
//! - `cache_store` is the caller-facing wrapper that forwards updates.
//! - `backends` holds ready-made in-memory and JSON file backends.

pub mod errors;
pub mod storage;
pub mod cache_store;
pub mod backends;

pub use cache_store::{CacheStore, InitOptions};
pub use errors::StorageError;
pub use storage::{InitState, Storage, StorageBackend, SubscriptionId, UpdateChannel, UpdatePublisher};
