pub mod local;
pub mod sftp;

use crate::db::SyncSettings;
use crate::error::SyncError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use local::LocalStorage;
pub use sftp::{SftpConnector, SftpSession};

// ============ 公共常量 ============

/// 连接与握手超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
/// 下载缓冲区大小
pub const TRANSFER_CHUNK_SIZE: usize = 1024 * 1024;

/// 文件条目（远程和本地扫描结果使用相同结构，便于直接比较）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// 相对于根目录的路径，统一使用 `/` 分隔
    pub relative_path: String,
    pub is_dir: bool,
    pub size: u64,
    /// 修改时间（Unix 秒）
    pub modified_at: i64,
}

/// 远程目录中的单个条目（单层列表）
#[derive(Debug, Clone)]
pub struct RemoteDirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified_at: i64,
    /// 原始名称不是有效的 UTF-8，`name` 为有损转换结果
    pub invalid_name: bool,
}

/// 远程协议会话
///
/// 会话只属于当前同步轮次，不会被并发访问。
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// 列出单个目录（不递归）
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SyncError>;

    /// 将远程文件内容流式写入本地路径，返回写入字节数
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SyncError>;

    /// 关闭会话，重复调用无副作用
    async fn close(&self);

    /// 获取会话名称（用于日志）
    fn name(&self) -> &str;
}

/// 远程会话工厂
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, settings: &SyncSettings) -> Result<Box<dyn RemoteSession>, SyncError>;
}

/// 拼接远程路径
pub fn join_remote(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if name.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    format!("{}/{}", base, name)
}

/// 拼接相对路径（根目录为空串）
pub fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
