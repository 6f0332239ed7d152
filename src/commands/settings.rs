use crate::db::{LogLevel, LogSink, SyncSettings};
use crate::AppState;

/// 获取同步设置（密码以掩码返回）
pub async fn get_settings(state: &AppState) -> Result<Option<SyncSettings>, String> {
    let settings = state.settings.load().await.map_err(|e| e.to_string())?;
    Ok(settings.map(|s| s.masked()))
}

/// 保存同步设置，下一轮同步生效
pub async fn save_settings(state: &AppState, settings: SyncSettings) -> Result<SyncSettings, String> {
    settings.validate()?;

    let saved = state
        .settings
        .save(settings)
        .await
        .map_err(|e| format!("保存设置失败: {}", e))?;

    state
        .logs
        .append(
            LogLevel::Info,
            &format!(
                "同步设置已更新: {}@{}:{}{} → {} (间隔 {} 秒)",
                saved.username,
                saved.host,
                saved.port,
                saved.remote_root,
                saved.local_root,
                saved.sync_interval_secs
            ),
            None,
        )
        .await;

    Ok(saved.masked())
}
