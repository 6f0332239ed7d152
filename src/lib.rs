use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::config::AppConfig;
pub use crate::core::{Scheduler, SyncEngine, SyncResult, SyncState, TriggerOutcome};
pub use crate::db::{LogEntry, LogLevel, SyncSettings};
pub use crate::error::SyncError;

use crate::db::{LogStore, SettingsStore, SqlitePool};
use crate::storage::{Connector, SftpConnector};

/// 数据库文件名
pub const DB_FILE: &str = "sftp-mirror.db";

/// 应用状态，在各接口间共享
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub settings: SettingsStore,
    pub logs: LogStore,
    pub engine: Arc<SyncEngine>,
    pub config: AppConfig,
    pub config_dir: PathBuf,
    scheduler: Arc<Mutex<Option<Scheduler>>>,
}

impl AppState {
    /// 使用默认数据目录和 SFTP 连接
    pub async fn new() -> anyhow::Result<Self> {
        let default_config_dir = config::default_config_dir();
        std::fs::create_dir_all(&default_config_dir)?;

        let config_dir = config::resolve_data_dir(&default_config_dir);
        Self::open(config_dir, Arc::new(SftpConnector::new())).await
    }

    /// 在指定数据目录中打开数据库并组装同步引擎
    pub async fn open(config_dir: PathBuf, connector: Arc<dyn Connector>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config_dir)?;

        let db = Arc::new(db::open_pool(&config_dir.join(DB_FILE)).await?);
        let settings = SettingsStore::new(db.clone());
        let logs = LogStore::new(db.clone());
        let engine = Arc::new(SyncEngine::new(
            Arc::new(settings.clone()),
            Arc::new(logs.clone()),
            connector,
        ));

        Ok(Self {
            db,
            settings,
            logs,
            engine,
            config: AppConfig::load(&config_dir),
            config_dir,
            scheduler: Arc::new(Mutex::new(None)),
        })
    }

    /// 启动定时同步（重复调用无效）
    pub async fn start_scheduler(&self) {
        let mut slot = self.scheduler.lock().await;
        if slot.is_none() {
            *slot = Some(Scheduler::start(
                self.engine.clone(),
                Arc::new(self.settings.clone()),
                self.config.scheduler_config(),
            ));
        }
    }

    /// 关闭：停止定时器，等待正在执行的同步结束，再关闭连接池
    pub async fn shutdown(&self) {
        tracing::info!("正在关闭...");

        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.shutdown().await;
        }

        tracing::debug!("等待当前同步结束...");
        self.engine.wait_idle().await;

        tracing::debug!("关闭数据库连接池...");
        self.db.close().await;

        tracing::info!("已关闭");
    }
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var_os("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
        }
    }
}
