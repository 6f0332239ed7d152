use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 前端展示用的密码掩码
pub const PASSWORD_MASK: &str = "********";

/// 同步间隔上限（30 天）
pub const MAX_SYNC_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

fn default_port() -> u16 {
    22
}

fn default_interval() -> u64 {
    5
}

/// 同步设置
///
/// 每轮同步开始时读取一次，在该轮内视为不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,
    pub remote_root: String,
    pub local_root: String,
    /// 同步间隔（秒），0 表示只允许手动触发
    #[serde(default = "default_interval")]
    pub sync_interval_secs: u64,
}

/// 连接凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    PrivateKey(PathBuf),
    Password(String),
}

impl SyncSettings {
    /// 选择连接凭据：同时配置时私钥优先于密码
    pub fn credential(&self) -> Option<Credential> {
        if let Some(key) = self.private_key_path.as_deref().filter(|k| !k.trim().is_empty()) {
            return Some(Credential::PrivateKey(PathBuf::from(key)));
        }
        self.password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| Credential::Password(p.to_string()))
    }

    /// 认证方式描述（用于日志）
    pub fn auth_method(&self) -> &'static str {
        match self.credential() {
            Some(Credential::PrivateKey(_)) => "私钥",
            Some(Credential::Password(_)) => "密码",
            None => "未配置",
        }
    }

    /// 基本校验
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() || self.username.trim().is_empty() {
            return Err("host/username 为必填项".to_string());
        }
        if !self.remote_root.starts_with('/') {
            return Err("remoteRoot 必须是绝对路径（例如 /path/to/dir）".to_string());
        }
        if !Path::new(&self.local_root).is_absolute() {
            return Err("localRoot 必须是绝对路径".to_string());
        }
        if self.sync_interval_secs > MAX_SYNC_INTERVAL_SECS {
            return Err(format!(
                "syncIntervalSecs 不能超过 {} 秒",
                MAX_SYNC_INTERVAL_SECS
            ));
        }
        Ok(())
    }

    /// 返回隐藏密码后的副本
    pub fn masked(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| PASSWORD_MASK.to_string()),
            ..self.clone()
        }
    }

    /// 未填写的凭据字段（空密码、掩码、空私钥路径）沿用已保存的值
    pub fn merge_credentials(mut self, stored: Option<&SyncSettings>) -> Self {
        let blank_password = self
            .password
            .as_deref()
            .map_or(true, |p| p.is_empty() || p == PASSWORD_MASK);
        if blank_password {
            self.password = stored.and_then(|s| s.password.clone());
        }

        let blank_key = self
            .private_key_path
            .as_deref()
            .map_or(true, |k| k.trim().is_empty());
        if blank_key {
            self.private_key_path = stored.and_then(|s| s.private_key_path.clone());
        }
        self
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

/// 同步日志记录（只追加）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<String>,
}

// 数据库表模型
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LogRow {
    pub id: i64,
    pub created_at: i64,
    pub level: String,
    pub message: String,
    pub detail: Option<String>,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = anyhow::Error;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let created_at = chrono::DateTime::from_timestamp_millis(row.created_at)
            .ok_or_else(|| anyhow::anyhow!("Invalid log timestamp: {}", row.created_at))?;

        Ok(LogEntry {
            id: row.id,
            created_at,
            level: row.level.parse()?,
            message: row.message,
            detail: row.detail,
        })
    }
}
