//! Environment/runtime helpers
//!
//! Sanity checks to run at startup, before the cache file is opened.

use std::path::Path;
use tracing::warn;

/// Ensure the directory holding the cache file exists; warn when the file itself is missing.
pub async fn ensure_env(cache_file: &str) -> anyhow::Result<()> {
    let path = Path::new(cache_file);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", dir.display()))?;
    }
    if tokio::fs::metadata(path).await.is_err() {
        warn!(%cache_file, "cache file not found; it will be created with a default value");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_env_creates_parent_directory() -> Result<(), anyhow::Error> {
        let dir = std::env::temp_dir().join(format!("common_env_{}", uuid::Uuid::new_v4()));
        let file = dir.join("nested").join("cache.json");

        ensure_env(&file.to_string_lossy()).await?;
        assert!(tokio::fs::metadata(file.parent().unwrap()).await?.is_dir());
        assert!(tokio::fs::metadata(&file).await.is_err());

        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn ensure_env_accepts_bare_file_name() -> Result<(), anyhow::Error> {
        ensure_env("cache-in-cwd-that-does-not-exist.json").await?;
        Ok(())
    }
}
