use thiserror::Error;

/// Failure surfaced by a storage backend.
///
/// Cloneable so a memoized initialization failure can be handed to every
/// caller of `init()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("initialization failed: {0}")]
    Init(String),
    #[error("load failed: {0}")]
    Load(String),
    #[error("save failed: {0}")]
    Save(String),
}

impl StorageError {
    pub fn init(err: impl std::fmt::Display) -> Self { Self::Init(err.to_string()) }
    pub fn load(err: impl std::fmt::Display) -> Self { Self::Load(err.to_string()) }
    pub fn save(err: impl std::fmt::Display) -> Self { Self::Save(err.to_string()) }
}
