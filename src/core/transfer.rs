//! 传输执行 - 逐条应用同步动作

use crate::core::comparator::SyncAction;
use crate::core::engine::SyncResult;
use crate::db::{LogLevel, LogSink};
use crate::error::SyncError;
use crate::storage::{join_remote, LocalStorage, RemoteSession};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 单个动作的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    DirCreated,
    DirExisted,
    Copied { bytes: u64 },
    Skipped,
}

pub struct TransferExecutor<'a> {
    session: &'a dyn RemoteSession,
    local: &'a LocalStorage,
    remote_root: &'a str,
    log: &'a dyn LogSink,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        session: &'a dyn RemoteSession,
        local: &'a LocalStorage,
        remote_root: &'a str,
        log: &'a dyn LogSink,
    ) -> Self {
        Self {
            session,
            local,
            remote_root,
            log,
        }
    }

    /// 执行动作并累计结果；单个条目失败只记录警告，不会中止同步
    pub async fn run(&self, action: &SyncAction, result: &mut SyncResult) {
        match self.apply(action).await {
            Ok(ActionOutcome::DirCreated) => result.dirs_created += 1,
            Ok(ActionOutcome::DirExisted) => {}
            Ok(ActionOutcome::Copied { .. }) => result.copied += 1,
            Ok(ActionOutcome::Skipped) => result.skipped += 1,
            Err(e) => {
                result.errors += 1;
                self.log
                    .append(
                        LogLevel::Warn,
                        &format!("文件处理失败: {}", action.path()),
                        Some(e.to_string().as_str()),
                    )
                    .await;
            }
        }
    }

    /// 执行单个动作
    pub async fn apply(&self, action: &SyncAction) -> Result<ActionOutcome, SyncError> {
        match action {
            SyncAction::EnsureDir { path } => {
                let created = self.local.ensure_dir(path).await.map_err(|e| SyncError::Transfer {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
                if created {
                    self.log
                        .append(LogLevel::Info, &format!("[新建目录] {}/", path), None)
                        .await;
                    Ok(ActionOutcome::DirCreated)
                } else {
                    Ok(ActionOutcome::DirExisted)
                }
            }
            SyncAction::Copy {
                path,
                size,
                modified_at,
                reason,
            } => {
                self.log
                    .append(
                        LogLevel::Info,
                        &format!("[复制] {} ({}, {})", path, reason, format_size(*size)),
                        None,
                    )
                    .await;

                let bytes = self.copy_file(path, *modified_at).await.map_err(|e| match e {
                    SyncError::Transfer { .. } => e,
                    other => SyncError::Transfer {
                        path: path.clone(),
                        detail: other.to_string(),
                    },
                })?;
                Ok(ActionOutcome::Copied { bytes })
            }
            SyncAction::Skip { path } => {
                debug!("[跳过] {} (大小相同且本地不早于远程)", path);
                Ok(ActionOutcome::Skipped)
            }
        }
    }

    /// 下载到临时文件后原子替换，再同步修改时间
    async fn copy_file(&self, path: &str, modified_at: i64) -> Result<u64, SyncError> {
        let remote_path = join_remote(self.remote_root, path);
        let target = self.local.resolve_path(path);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = reserve_temp_path(&target).await?;

        // 失败时删除临时文件，避免在本地留下残缺内容
        let temp_guard = scopeguard::guard(temp_path.clone(), |p| {
            let _ = std::fs::remove_file(p);
        });

        debug!("下载: {} -> {}", remote_path, temp_path.display());
        let bytes = self.session.download(&remote_path, &temp_path).await?;
        tokio::fs::rename(&temp_path, &target).await?;
        scopeguard::ScopeGuard::into_inner(temp_guard);

        self.local.set_modified_time(path, modified_at).await?;
        debug!("写入完成: {} ({} 字节)", target.display(), bytes);
        Ok(bytes)
    }
}

/// 在目标旁独占创建临时文件 `.<name>.<uuid>.part`，不会覆盖已有条目
async fn reserve_temp_path(target: &Path) -> Result<PathBuf, SyncError> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    loop {
        let candidate = target.with_file_name(format!(
            ".{}.{}.part",
            file_name,
            uuid::Uuid::new_v4().simple()
        ));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comparator::CopyReason;
    use crate::db::LogEntry;
    use crate::storage::RemoteDirEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MemoryLog {
        records: Mutex<Vec<(LogLevel, String, Option<String>)>>,
    }

    #[async_trait]
    impl LogSink for MemoryLog {
        async fn append(&self, level: LogLevel, message: &str, detail: Option<&str>) {
            self.records
                .lock()
                .unwrap()
                .push((level, message.to_string(), detail.map(str::to_string)));
        }

        async fn recent(&self, _limit: u32) -> anyhow::Result<Vec<LogEntry>> {
            Ok(Vec::new())
        }
    }

    /// 远程文件内容，`None` 表示读取时断开
    struct FakeFiles(HashMap<String, Option<Vec<u8>>>);

    #[async_trait]
    impl RemoteSession for FakeFiles {
        async fn list_dir(&self, _: &str) -> Result<Vec<RemoteDirEntry>, SyncError> {
            Ok(Vec::new())
        }

        async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SyncError> {
            match self.0.get(remote_path) {
                Some(Some(data)) => {
                    std::fs::write(local_path, data)?;
                    Ok(data.len() as u64)
                }
                Some(None) => {
                    std::fs::write(local_path, b"partial")?;
                    Err(SyncError::Transfer {
                        path: remote_path.into(),
                        detail: "connection reset".into(),
                    })
                }
                None => Err(SyncError::Transfer {
                    path: remote_path.into(),
                    detail: "no such file".into(),
                }),
            }
        }

        async fn close(&self) {}

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn copy(path: &str, size: u64, mtime: i64) -> SyncAction {
        SyncAction::Copy {
            path: path.into(),
            size,
            modified_at: mtime,
            reason: CopyReason::New,
        }
    }

    #[tokio::test]
    async fn copy_writes_bytes_and_stamps_mtime() {
        let dir = tempdir().unwrap();
        let local = LocalStorage::open(dir.path()).await.unwrap();
        let remote = FakeFiles(HashMap::from([(
            "/data/dir/b.txt".to_string(),
            Some(b"hello".to_vec()),
        )]));
        let log = MemoryLog::default();
        let executor = TransferExecutor::new(&remote, &local, "/data", &log);

        let outcome = executor.apply(&copy("dir/b.txt", 5, 1_700_000_123)).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Copied { bytes: 5 });

        let written = dir.path().join("dir/b.txt");
        assert_eq!(std::fs::read(&written).unwrap(), b"hello");
        let files = local.list_files().await.unwrap();
        assert_eq!(files["dir/b.txt"].modified_at, 1_700_000_123);
        assert_eq!(entries(&dir.path().join("dir")), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn failed_copy_counts_error_and_keeps_existing_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"original").unwrap();
        let local = LocalStorage::open(dir.path()).await.unwrap();
        let remote = FakeFiles(HashMap::from([("/data/a.txt".to_string(), None)]));
        let log = MemoryLog::default();
        let executor = TransferExecutor::new(&remote, &local, "/data", &log);

        let mut result = SyncResult::default();
        executor.run(&copy("a.txt", 9, 10), &mut result).await;

        assert_eq!(result.errors, 1);
        assert_eq!(result.copied, 0);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"original");
        assert_eq!(entries(dir.path()), vec!["a.txt"]);

        let records = log.records.lock().unwrap();
        let warn = records.iter().find(|r| r.0 == LogLevel::Warn).unwrap();
        assert!(warn.1.contains("a.txt"));
        assert!(warn.2.as_deref().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn ensure_dir_counts_only_new_directories() {
        let dir = tempdir().unwrap();
        let local = LocalStorage::open(dir.path()).await.unwrap();
        let remote = FakeFiles(HashMap::new());
        let log = MemoryLog::default();
        let executor = TransferExecutor::new(&remote, &local, "/data", &log);

        let mut result = SyncResult::default();
        let action = SyncAction::EnsureDir { path: "dir".into() };
        executor.run(&action, &mut result).await;
        executor.run(&action, &mut result).await;
        executor.run(&SyncAction::Skip { path: "x".into() }, &mut result).await;

        assert_eq!(result.dirs_created, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors, 0);
        assert!(dir.path().join("dir").is_dir());
    }

    #[tokio::test]
    async fn temp_file_never_reuses_existing_name() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("x");
        std::fs::write(dir.path().join(".x.part"), b"remote content").unwrap();

        let first = reserve_temp_path(&target).await.unwrap();
        let second = reserve_temp_path(&target).await.unwrap();
        assert_ne!(first, second);
        assert_ne!(first, dir.path().join(".x.part"));
        assert!(first.file_name().unwrap().to_str().unwrap().starts_with(".x."));
        assert_eq!(
            std::fs::read(dir.path().join(".x.part")).unwrap(),
            b"remote content"
        );
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
