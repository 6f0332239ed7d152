use crate::error::SyncError;
use crate::storage::{join_relative, join_remote, FileEntry, RemoteSession};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use tracing::{debug, info};

/// 远程扫描产生的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteItem {
    Entry(FileEntry),
    /// 无法处理的条目：子目录无法列出（根目录除外）或名称不是有效的 UTF-8，
    /// 跳过该条目及其子树
    Unreadable { path: String, detail: String },
}

/// 完整的远程扫描结果
#[derive(Debug, Default)]
pub struct RemoteScan {
    pub entries: Vec<FileEntry>,
    pub unreadable: Vec<(String, String)>,
}

struct ScanState<'a> {
    session: &'a dyn RemoteSession,
    root: String,
    pending_dirs: VecDeque<String>,
    buffered: VecDeque<RemoteItem>,
}

/// 广度优先遍历远程目录，惰性产出条目
///
/// 目录条目总是先于其子条目产出。根目录不可读时第一个元素即为错误；
/// 子目录不可读或名称无法解码时产出 [`RemoteItem::Unreadable`] 并继续。
pub fn scan_remote<'a>(
    session: &'a dyn RemoteSession,
    root: &str,
) -> BoxStream<'a, Result<RemoteItem, SyncError>> {
    let state = ScanState {
        session,
        root: root.to_string(),
        pending_dirs: VecDeque::from([String::new()]),
        buffered: VecDeque::new(),
    };

    stream::try_unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.buffered.pop_front() {
                return Ok(Some((item, st)));
            }

            let Some(dir) = st.pending_dirs.pop_front() else {
                return Ok(None);
            };

            let remote_path = join_remote(&st.root, &dir);
            match st.session.list_dir(&remote_path).await {
                Ok(mut entries) => {
                    entries.sort_by(|a, b| a.name.cmp(&b.name));
                    for entry in entries {
                        let relative_path = join_relative(&dir, &entry.name);
                        if entry.invalid_name {
                            st.buffered.push_back(RemoteItem::Unreadable {
                                path: relative_path,
                                detail: "名称不是有效的 UTF-8".to_string(),
                            });
                            continue;
                        }
                        if entry.is_dir {
                            st.pending_dirs.push_back(relative_path.clone());
                        }
                        st.buffered.push_back(RemoteItem::Entry(FileEntry {
                            relative_path,
                            is_dir: entry.is_dir,
                            size: if entry.is_dir { 0 } else { entry.size },
                            modified_at: entry.modified_at,
                        }));
                    }
                }
                Err(e @ SyncError::RemotePath { .. }) if !dir.is_empty() => {
                    debug!("子目录不可读: {} ({})", remote_path, e);
                    st.buffered.push_back(RemoteItem::Unreadable {
                        path: dir,
                        detail: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    })
    .boxed()
}

/// 扫描整个远程目录树；任何中止性错误都会使结果整体作废
pub async fn collect_remote(
    session: &dyn RemoteSession,
    root: &str,
) -> Result<RemoteScan, SyncError> {
    info!("开始扫描远程目录: {} {}", session.name(), root);

    let mut scan = RemoteScan::default();
    let mut items = scan_remote(session, root);
    while let Some(item) = items.try_next().await? {
        match item {
            RemoteItem::Entry(entry) => scan.entries.push(entry),
            RemoteItem::Unreadable { path, detail } => scan.unreadable.push((path, detail)),
        }
    }

    let dir_count = scan.entries.iter().filter(|e| e.is_dir).count();
    info!(
        "远程扫描完成: {} 个文件, {} 个目录, {} 个不可读条目",
        scan.entries.len() - dir_count,
        dir_count,
        scan.unreadable.len()
    );
    Ok(scan)
}
