use crate::core::comparator::{plan, summarize_actions};
use crate::core::scanner::collect_remote;
use crate::core::transfer::TransferExecutor;
use crate::db::{LogLevel, LogSink, SettingsProvider, SyncSettings};
use crate::error::SyncError;
use crate::storage::{Connector, LocalStorage, RemoteSession};
use chrono::{DateTime, Utc};
use scopeguard::ScopeGuard;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, info_span, warn, Instrument};

/// 单轮同步结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub dirs_created: u32,
    pub copied: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// 进程内唯一的同步状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub running: bool,
}

/// 触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Timer,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Timer => write!(f, "定时"),
            TriggerSource::Manual => write!(f, "手动"),
        }
    }
}

/// 手动触发的受理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// 已受理（强制请求可能排在当前同步之后执行）
    Accepted,
    /// 已有同步在进行
    Conflict,
}

/// 单轮同步的最终状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(SyncResult),
    /// 轮次级错误，已记录 ERROR 日志
    Failed(String),
    /// 未配置设置，未连接远程
    NoSettings,
}

/// 同步引擎
///
/// 同一时刻最多只有一轮同步在执行：定时器和手动触发共用同一把互斥锁，
/// `running` 只在持有该锁期间为 true。
pub struct SyncEngine {
    settings: Arc<dyn SettingsProvider>,
    log: Arc<dyn LogSink>,
    connector: Arc<dyn Connector>,
    state: RwLock<SyncState>,
    pass_guard: Arc<Mutex<()>>,
}

impl SyncEngine {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        log: Arc<dyn LogSink>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            settings,
            log,
            connector,
            state: RwLock::new(SyncState::default()),
            pass_guard: Arc::new(Mutex::new(())),
        }
    }

    /// 当前状态快照
    pub async fn status(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn set_next_run(&self, next_run: Option<DateTime<Utc>>) {
        self.state.write().await.next_run = next_run;
    }

    pub fn log_sink(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    /// 原子地尝试占用同步槽位
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        self.pass_guard.clone().try_lock_owned().ok()
    }

    /// 等待当前同步结束
    pub async fn wait_idle(&self) {
        let _guard = self.pass_guard.lock().await;
    }

    /// 槽位空闲时立即执行一轮同步，否则返回 `None`
    pub async fn try_run(&self, trigger: TriggerSource) -> Option<PassOutcome> {
        let guard = self.try_acquire()?;
        Some(self.run_pass(guard, trigger).await)
    }

    /// 手动触发同步
    ///
    /// 非强制请求在已有同步时返回 `Conflict`；强制请求总是被受理，
    /// 但会排队等待当前同步结束，两轮同步不会重叠。
    pub fn request_sync(self: &Arc<Self>, force: bool) -> TriggerOutcome {
        if let Some(guard) = self.try_acquire() {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.run_pass(guard, TriggerSource::Manual).await;
            });
            return TriggerOutcome::Accepted;
        }

        if !force {
            debug!("手动同步被拒绝: 已有同步在进行");
            return TriggerOutcome::Conflict;
        }

        let engine = self.clone();
        let pass_guard = self.pass_guard.clone();
        tokio::spawn(async move {
            let guard = pass_guard.lock_owned().await;
            engine.run_pass(guard, TriggerSource::Manual).await;
        });
        TriggerOutcome::Accepted
    }

    /// 在持有槽位的前提下执行一轮同步
    pub async fn run_pass(&self, guard: OwnedMutexGuard<()>, trigger: TriggerSource) -> PassOutcome {
        let span = info_span!("sync_pass", pass_id = %uuid::Uuid::new_v4(), %trigger);

        async move {
            self.state.write().await.running = true;

            let outcome = self.execute_pass(trigger).await;

            {
                let mut state = self.state.write().await;
                state.running = false;
                if !matches!(outcome, PassOutcome::NoSettings) {
                    state.last_run = Some(Utc::now());
                }
            }
            drop(guard);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute_pass(&self, trigger: TriggerSource) -> PassOutcome {
        let settings = match self.settings.current().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                self.log
                    .append(LogLevel::Warn, "同步跳过: 未配置同步设置", None)
                    .await;
                return PassOutcome::NoSettings;
            }
            Err(e) => {
                let detail = e.to_string();
                self.log
                    .append(LogLevel::Error, "同步失败: 无法读取同步设置", Some(detail.as_str()))
                    .await;
                return PassOutcome::Failed(detail);
            }
        };

        self.log
            .append(
                LogLevel::Info,
                &format!(
                    "{}同步开始: {}:{}{} → {}",
                    trigger, settings.host, settings.port, settings.remote_root, settings.local_root
                ),
                None,
            )
            .await;

        match self.sync_with(&settings).await {
            Ok(result) => {
                self.log
                    .append(
                        LogLevel::Info,
                        &format!(
                            "同步完成: 新建目录={}, 复制={}, 跳过={}, 错误={}",
                            result.dirs_created, result.copied, result.skipped, result.errors
                        ),
                        None,
                    )
                    .await;
                PassOutcome::Completed(result)
            }
            Err(e) => {
                let detail = e.to_string();
                self.log
                    .append(LogLevel::Error, "同步失败: 连接或扫描过程中出错", Some(detail.as_str()))
                    .await;
                PassOutcome::Failed(detail)
            }
        }
    }

    /// 打开会话并执行同步；无论成功与否都会关闭会话
    async fn sync_with(&self, settings: &SyncSettings) -> Result<SyncResult, SyncError> {
        let local = LocalStorage::open(&settings.local_root).await?;

        info!(
            "连接: sftp://{}@{}:{}{} (认证方式: {})",
            settings.username,
            settings.host,
            settings.port,
            settings.remote_root,
            settings.auth_method()
        );
        let session = guard_session(self.connector.connect(settings).await?);
        info!("连接成功: {}", session.name());

        let result = self.sync_session(&**session, &local, settings).await;

        close_session(session).await;
        result
    }

    async fn sync_session(
        &self,
        session: &dyn RemoteSession,
        local: &LocalStorage,
        settings: &SyncSettings,
    ) -> Result<SyncResult, SyncError> {
        let remote = collect_remote(session, &settings.remote_root).await?;
        let local_index = local.list_files().await?;
        info!(
            "扫描完成: 远程 {} 个条目, 本地 {} 个条目",
            remote.entries.len(),
            local_index.len()
        );

        let mut result = SyncResult::default();
        for (path, detail) in &remote.unreadable {
            result.errors += 1;
            self.log
                .append(
                    LogLevel::Warn,
                    &format!("远程条目不可读，已跳过: {}", path),
                    Some(detail.as_str()),
                )
                .await;
        }

        let actions = plan(&remote.entries, &local_index);
        let summary = summarize_actions(&actions);
        debug!(
            "比较完成: {} 个目录, {} 个复制 ({} 字节), {} 个跳过",
            summary.ensure_dir_count, summary.copy_count, summary.copy_bytes, summary.skip_count
        );

        let executor = TransferExecutor::new(session, local, &settings.remote_root, self.log.as_ref());
        for action in &actions {
            executor.run(action, &mut result).await;
        }

        Ok(result)
    }

    /// 连接测试：打开会话并列出远程根目录一次，返回根目录条目数
    pub async fn check_connection(&self, settings: &SyncSettings) -> Result<usize, SyncError> {
        let session = guard_session(self.connector.connect(settings).await?);
        let listing = session.list_dir(&settings.remote_root).await;
        close_session(session).await;
        Ok(listing?.len())
    }
}

type SessionGuard = ScopeGuard<Box<dyn RemoteSession>, fn(Box<dyn RemoteSession>)>;

/// 未正常关闭就被丢弃时（所在任务被取消）在后台关闭会话
fn guard_session(session: Box<dyn RemoteSession>) -> SessionGuard {
    scopeguard::guard(session, close_in_background as fn(Box<dyn RemoteSession>))
}

fn close_in_background(session: Box<dyn RemoteSession>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                session.close().await;
                debug!("会话已在后台关闭");
            });
        }
        Err(_) => warn!("运行时已停止，会话交由析构释放: {}", session.name()),
    }
}

async fn close_session(guard: SessionGuard) {
    let session = ScopeGuard::into_inner(guard);
    session.close().await;
    debug!("会话已关闭");
}
