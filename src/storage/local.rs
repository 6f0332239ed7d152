use super::FileEntry;
use crate::error::SyncError;
use filetime::FileTime;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// 本地镜像目录
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// 打开本地根目录，不存在时自动创建
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)
            .await
            .map_err(|source| SyncError::LocalRoot {
                path: base_path.clone(),
                source,
            })?;
        Ok(Self { base_path })
    }

    pub fn resolve_path(&self, relative_path: &str) -> PathBuf {
        let path = relative_path.trim_start_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// 递归列出本地目录，返回以相对路径为键的索引
    pub async fn list_files(&self) -> Result<HashMap<String, FileEntry>, SyncError> {
        let base = self.base_path.clone();

        // 根目录不可读时中止整个同步
        std::fs::read_dir(&base).map_err(|source| SyncError::LocalRoot {
            path: base.clone(),
            source,
        })?;

        // 使用 spawn_blocking 避免阻塞 async runtime
        let entries = tokio::task::spawn_blocking(move || {
            WalkDir::new(&base)
                .follow_links(false)
                .min_depth(1)
                .into_iter()
                .filter_map(|e| match e {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        debug!("跳过不可读的本地条目: {}", err);
                        None
                    }
                })
                .filter_map(|entry| {
                    let metadata = entry.metadata().ok()?;
                    let relative_path = entry.path().strip_prefix(&base).ok()?.to_str()?;

                    Some(FileEntry {
                        relative_path: Self::normalize_path(relative_path),
                        is_dir: metadata.is_dir(),
                        size: if metadata.is_dir() { 0 } else { metadata.len() },
                        modified_at: FileTime::from_last_modification_time(&metadata)
                            .unix_seconds(),
                    })
                })
                .map(|entry| (entry.relative_path.clone(), entry))
                .collect::<HashMap<_, _>>()
        })
        .await?;

        Ok(entries)
    }

    /// 确保目录存在，返回是否新建
    pub async fn ensure_dir(&self, relative_path: &str) -> io::Result<bool> {
        let full_path = self.resolve_path(relative_path);
        if fs::metadata(&full_path).await.is_ok_and(|m| m.is_dir()) {
            return Ok(false);
        }
        fs::create_dir_all(&full_path).await?;
        Ok(true)
    }

    /// 将文件修改时间设置为指定的 Unix 秒
    pub async fn set_modified_time(&self, relative_path: &str, modified_at: i64) -> io::Result<()> {
        let full_path = self.resolve_path(relative_path);
        tokio::task::spawn_blocking(move || {
            filetime::set_file_mtime(&full_path, FileTime::from_unix_time(modified_at, 0))
        })
        .await
        .map_err(io::Error::other)?
    }
}
