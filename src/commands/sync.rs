use crate::core::{SyncState, TriggerOutcome};
use crate::AppState;
use serde::Serialize;

/// 手动触发的响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub outcome: TriggerOutcome,
    pub message: String,
}

/// 手动触发同步
///
/// `force` 不会让两轮同步重叠：已有同步时请求排队，等当前同步结束后执行。
pub async fn request_sync(state: &AppState, force: bool) -> Result<TriggerResponse, String> {
    let outcome = state.engine.request_sync(force);
    let message = match outcome {
        TriggerOutcome::Accepted => "同步已开始",
        TriggerOutcome::Conflict => "已有同步在进行",
    };
    Ok(TriggerResponse {
        outcome,
        message: message.to_string(),
    })
}

/// 获取同步状态
pub async fn get_status(state: &AppState) -> Result<SyncState, String> {
    Ok(state.engine.status().await)
}
