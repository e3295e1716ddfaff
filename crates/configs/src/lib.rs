use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_path")]
    pub path: String,
    /// 0 disables polling for external changes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_load_on_init")]
    pub load_on_init: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_path(), poll_interval_ms: default_poll_interval(), load_on_init: default_load_on_init() }
    }
}

fn default_path() -> String { "data/cache.json".into() }
fn default_poll_interval() -> u64 { 1000 }
fn default_load_on_init() -> bool { true }

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        // 归一化 storage（支持从环境变量覆盖路径）
        self.storage.normalize_from_env();
        self.storage.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    /// `CACHE_STORE_PATH` overrides the configured file path.
    pub fn normalize_from_env(&mut self) {
        // 环境变量优先于 TOML 中的 path
        if let Ok(path) = std::env::var("CACHE_STORE_PATH") {
            if !path.trim().is_empty() {
                self.path = path;
            }
        }
        self.path = self.path.trim().to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(anyhow!("storage.path is empty; set it in config.toml or CACHE_STORE_PATH"));
        }
        // path 必须指向文件而不是目录
        if self.path.ends_with('/') || self.path.ends_with('\\') {
            return Err(anyhow!("storage.path must name a file, got directory {}", self.path));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }
}
