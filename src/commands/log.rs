//! 日志相关命令

use crate::db::{LogEntry, LogLevel, LogSink};
use crate::logging::LogConfig;
use crate::AppState;

/// 获取最近的同步日志（最新在前）
pub async fn get_logs(state: &AppState, limit: Option<u32>) -> Result<Vec<LogEntry>, String> {
    let limit = limit.unwrap_or(state.config.recent_log_limit).clamp(1, 1000);
    state.logs.recent(limit).await.map_err(|e| e.to_string())
}

/// 清空同步日志，返回删除条数
pub async fn clear_logs(state: &AppState) -> Result<u64, String> {
    let removed = state.logs.clear().await.map_err(|e| e.to_string())?;
    state
        .logs
        .append(LogLevel::Info, &format!("日志已清空 ({} 条)", removed), None)
        .await;
    Ok(removed)
}

/// 获取日志配置
pub async fn get_log_config(state: &AppState) -> Result<LogConfig, String> {
    Ok(LogConfig::load(&state.config_dir))
}

/// 设置日志配置（重启后生效）
pub async fn set_log_config(
    state: &AppState,
    enabled: Option<bool>,
    max_size_mb: Option<u32>,
    level: Option<String>,
) -> Result<LogConfig, String> {
    let mut config = LogConfig::load(&state.config_dir);
    config.apply(enabled, max_size_mb, level.as_deref())?;
    config.save(&state.config_dir).map_err(|e| e.to_string())?;

    Ok(config)
}
