use std::sync::Arc;

use configs::{AppConfig, LogFormat};
use dotenvy::dotenv;
use serde_json::Value;
use service::backends::JsonFileBackend;
use service::{CacheStore, InitOptions, Storage};
use tracing::{error, info, warn};
use uuid::Uuid;

fn init_logging(format: LogFormat) {
    match format {
        LogFormat::Compact => common::utils::logging::init_logging_default(),
        LogFormat::Json => common::utils::logging::init_logging_json(),
    }
    info!(service = "watch", event = "logger_init", "tracing subscriber initialized");
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    // 后端需同时交给 Storage 与轮询任务，因此在构造闭包中保留一份 Arc
    let mut handle = None;
    let storage = Storage::with_publisher(|publisher| {
        let backend = Arc::new(JsonFileBackend::<Value>::new(&cfg.storage.path, publisher));
        handle = Some(Arc::clone(&backend));
        backend
    });
    let backend = handle.ok_or_else(|| anyhow::anyhow!("storage backend was not built"))?;
    let cache = CacheStore::new(storage);

    cache.subscribe(|data: &Value| {
        info!(service = "watch", event = "update", %data, "cache value updated");
    });

    cache.init(InitOptions { load: cfg.storage.load_on_init }).await?;
    info!(service = "watch", event = "ready", path = %backend.path().display(), "storage initialized");

    let poller = cfg.storage.poll_interval().map(|period| backend.spawn_poller(period));
    if poller.is_none() {
        warn!(service = "watch", event = "polling_disabled", "poll_interval_ms = 0; external changes will not be detected");
    }

    tokio::signal::ctrl_c().await?;
    // 停止轮询任务后退出
    if let Some(poller) = poller {
        poller.abort();
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    // 提前加载 .env，使得 RUST_LOG / CONFIG_PATH 等环境变量生效
    dotenv().ok();

    // 先读取配置，日志格式取决于配置（失败时使用默认格式）
    let loaded = AppConfig::load_and_validate();
    let format = loaded.as_ref().map(|cfg| cfg.logging.format).unwrap_or_default();
    init_logging(format);

    // 配置无效时回退到默认配置
    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(service = "watch", event = "config_fallback", error = %e, "using default configuration");
            let mut cfg = AppConfig::default();
            if let Err(e) = cfg.normalize_and_validate() {
                error!(service = "watch", event = "config_invalid", error = %e, "invalid configuration");
                return std::process::ExitCode::FAILURE;
            }
            cfg
        }
    };

    // 基础服务上下文（不含敏感信息）
    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "watch", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    info!(service = "watch", event = "start", %service_id, pid, version, path = %cfg.storage.path, "watch starting");

    rt.block_on(async move {
        if let Err(e) = common::env::ensure_env(&cfg.storage.path).await {
            error!(service = "watch", event = "env_check_failed", error = %e, "cannot prepare cache directory");
            return std::process::ExitCode::FAILURE;
        }
        // 运行直到 Ctrl+C
        match run(cfg).await {
            Ok(()) => {
                info!(service = "watch", event = "stop", %service_id, pid, "received Ctrl+C, shutting down");
                std::process::ExitCode::SUCCESS
            }
            Err(e) => {
                error!(service = "watch", event = "run_failed", %service_id, error = %e, "watch stopped with error");
                std::process::ExitCode::FAILURE
            }
        }
    })
}
