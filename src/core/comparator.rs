use crate::storage::FileEntry;
use std::collections::HashMap;
use std::fmt;

/// 复制原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyReason {
    /// 本地不存在
    New,
    /// 远程修改时间更新
    RemoteNewer,
    /// 大小不同
    SizeChanged,
}

impl fmt::Display for CopyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyReason::New => write!(f, "本地不存在"),
            CopyReason::RemoteNewer => write!(f, "远程较新"),
            CopyReason::SizeChanged => write!(f, "大小不同"),
        }
    }
}

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// 确保本地目录存在
    EnsureDir { path: String },
    /// 从远程复制文件（覆盖本地）
    Copy {
        path: String,
        size: u64,
        modified_at: i64,
        reason: CopyReason,
    },
    /// 本地已是最新
    Skip { path: String },
}

impl SyncAction {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::EnsureDir { path }
            | SyncAction::Copy { path, .. }
            | SyncAction::Skip { path } => path,
        }
    }
}

/// 对单个远程条目做出决定
///
/// 仅当本地大小相同且修改时间不早于远程时跳过。
pub fn plan_entry(remote: &FileEntry, local: Option<&FileEntry>) -> SyncAction {
    let path = remote.relative_path.clone();

    if remote.is_dir {
        return SyncAction::EnsureDir { path };
    }

    let reason = match local {
        None => Some(CopyReason::New),
        Some(local) if local.size != remote.size => Some(CopyReason::SizeChanged),
        Some(local) if local.modified_at < remote.modified_at => Some(CopyReason::RemoteNewer),
        Some(_) => None,
    };

    match reason {
        Some(reason) => SyncAction::Copy {
            path,
            size: remote.size,
            modified_at: remote.modified_at,
            reason,
        },
        None => SyncAction::Skip { path },
    }
}

/// 比较远程与本地文件树，按远程条目顺序返回动作
///
/// 只存在于本地的条目不产生任何动作。
pub fn plan(remote: &[FileEntry], local_index: &HashMap<String, FileEntry>) -> Vec<SyncAction> {
    remote
        .iter()
        .map(|entry| plan_entry(entry, local_index.get(&entry.relative_path)))
        .collect()
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub ensure_dir_count: usize,
    pub copy_count: usize,
    pub copy_bytes: u64,
    pub skip_count: usize,
}

/// 统计同步动作
pub fn summarize_actions(actions: &[SyncAction]) -> ActionSummary {
    let mut summary = ActionSummary::default();

    for action in actions {
        match action {
            SyncAction::EnsureDir { .. } => summary.ensure_dir_count += 1,
            SyncAction::Copy { size, .. } => {
                summary.copy_count += 1;
                summary.copy_bytes += size;
            }
            SyncAction::Skip { .. } => summary.skip_count += 1,
        }
    }

    summary
}
