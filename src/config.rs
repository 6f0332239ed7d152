//! 应用配置模块

use crate::core::SchedulerConfig;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";
/// 覆盖数据目录的环境变量
pub const DATA_DIR_ENV: &str = "SFTP_MIRROR_DATA_DIR";

/// 调度配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSection {
    /// 启动后立即同步一次
    #[serde(default)]
    pub run_on_start: bool,
    /// 无设置或间隔为 0 时重新检查设置的周期（秒）
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
}

fn default_idle_poll_secs() -> u64 {
    60
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            run_on_start: false,
            idle_poll_secs: default_idle_poll_secs(),
        }
    }
}

fn default_recent_log_limit() -> u32 {
    200
}

/// config.json 的完整内容
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub log: LogConfig,
    /// 日志查询的默认条数
    #[serde(default = "default_recent_log_limit")]
    pub recent_log_limit: u32,
    /// 自定义数据目录（只在默认配置目录中生效）
    #[serde(default, rename = "data_path", skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            log: LogConfig::default(),
            recent_log_limit: default_recent_log_limit(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// 从配置文件加载，文件不存在或格式错误时使用默认值
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join(CONFIG_FILE);
        let Ok(content) = fs::read_to_string(&config_file) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("配置文件格式错误，使用默认配置: {:?}: {}", config_file, e);
                Self::default()
            }
        }
    }

    /// 调度器配置
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            run_on_start: self.scheduler.run_on_start,
            idle_poll: Duration::from_secs(self.scheduler.idle_poll_secs.max(1)),
        }
    }
}

/// 更新 config.json 中的单个键，保留其它内容
pub fn save_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);

    // 读取现有配置
    let mut config: serde_json::Value = match fs::read_to_string(&config_file) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(e) if e.kind() == io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e),
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    crate::dirs::config_dir()
        .map(|p| p.join("sftp-mirror"))
        .unwrap_or_else(|| PathBuf::from(".sftp-mirror"))
}

/// 解析数据目录：默认目录的 config.json 中的 data_path 存在时使用它
pub fn resolve_data_dir(default_dir: &Path) -> PathBuf {
    AppConfig::load(default_dir)
        .data_path
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or_else(|| default_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(dir.path());

        assert!(!config.scheduler.run_on_start);
        assert_eq!(config.scheduler.idle_poll_secs, 60);
        assert_eq!(config.recent_log_limit, 200);
        assert!(config.log.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"scheduler": {"runOnStart": true}, "log": {"level": "debug"}}"#,
        )
        .unwrap();

        let config = AppConfig::load(dir.path());
        assert!(config.scheduler.run_on_start);
        assert_eq!(config.scheduler.idle_poll_secs, 60);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.max_size_mb, 5);
        assert!(config.scheduler_config().run_on_start);
    }

    #[test]
    fn save_section_keeps_other_keys() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"data_path": "/somewhere", "recentLogLimit": 50}"#,
        )
        .unwrap();

        let section = SchedulerSection {
            run_on_start: true,
            idle_poll_secs: 15,
        };
        save_section(dir.path(), "scheduler", &section).unwrap();

        let config = AppConfig::load(dir.path());
        assert_eq!(config.scheduler, section);
        assert_eq!(config.recent_log_limit, 50);
        assert_eq!(config.data_path.as_deref(), Some("/somewhere"));
    }

    #[test]
    fn data_path_redirects_only_to_existing_directory() {
        let default_dir = tempdir().unwrap();
        let custom = tempdir().unwrap();

        assert_eq!(resolve_data_dir(default_dir.path()), default_dir.path());

        save_section(default_dir.path(), "data_path", &custom.path().to_string_lossy()).unwrap();
        assert_eq!(resolve_data_dir(default_dir.path()), custom.path());

        save_section(default_dir.path(), "data_path", &"/does/not/exist").unwrap();
        assert_eq!(resolve_data_dir(default_dir.path()), default_dir.path());
    }
}
