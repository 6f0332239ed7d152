//! 同步错误类型

use std::path::PathBuf;
use thiserror::Error;

/// 同步过程中的错误
///
/// 连接、认证、远程根目录、本地根目录错误会中止整个同步轮次；
/// `Transfer` 只影响单个条目。
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("连接失败: {0}")]
    Connection(String),

    #[error("认证失败: {0}")]
    Auth(String),

    #[error("远程路径不可访问: {path}: {detail}")]
    RemotePath { path: String, detail: String },

    #[error("本地根目录不可用: {path}: {source}")]
    LocalRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("传输失败: {path}: {detail}")]
    Transfer { path: String, detail: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),
}
