//! 定时调度 - 按同步间隔触发同步

use crate::core::engine::{SyncEngine, TriggerSource};
use crate::db::{SettingsProvider, MAX_SYNC_INTERVAL_SECS};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 调度器配置
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// 启动后立即执行一次
    pub run_on_start: bool,
    /// 未配置设置或间隔为 0 时重新读取设置的周期
    pub idle_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_on_start: false,
            idle_poll: Duration::from_secs(60),
        }
    }
}

/// 当前设置下的调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Every(Duration),
    /// 间隔为 0，只接受手动触发
    Disabled,
    /// 尚未配置设置
    Unconfigured,
}

impl Schedule {
    fn delay(self, idle_poll: Duration) -> Duration {
        match self {
            Schedule::Every(interval) => interval,
            Schedule::Disabled | Schedule::Unconfigured => idle_poll,
        }
    }
}

async fn read_schedule(settings: &dyn SettingsProvider) -> Schedule {
    match settings.current().await {
        Ok(Some(s)) if s.sync_interval_secs == 0 => Schedule::Disabled,
        Ok(Some(s)) if s.sync_interval_secs > MAX_SYNC_INTERVAL_SECS => {
            warn!(
                "同步间隔 {} 秒超过上限，按 {} 秒处理",
                s.sync_interval_secs, MAX_SYNC_INTERVAL_SECS
            );
            Schedule::Every(Duration::from_secs(MAX_SYNC_INTERVAL_SECS))
        }
        Ok(Some(s)) => Schedule::Every(Duration::from_secs(s.sync_interval_secs)),
        Ok(None) => Schedule::Unconfigured,
        Err(e) => {
            warn!("读取同步间隔失败: {}", e);
            Schedule::Unconfigured
        }
    }
}

/// 后台定时器，关闭时通过取消令牌停止
pub struct Scheduler {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// 启动调度循环
    ///
    /// 首次触发在 `now + interval`，`run_on_start` 为 true 时立即触发。
    /// 每次触发后按最新设置的间隔重新计算 `next_run`。
    pub fn start(
        engine: Arc<SyncEngine>,
        settings: Arc<dyn SettingsProvider>,
        config: SchedulerConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let schedule = read_schedule(settings.as_ref()).await;
            let first_delay = if config.run_on_start {
                Duration::ZERO
            } else {
                schedule.delay(config.idle_poll)
            };
            let (mut deadline, first_delay) = deadline_after(first_delay, config.idle_poll);
            publish_next_run(&engine, schedule, first_delay).await;
            info!("调度器已启动: {:?}, 首次触发延迟 {:?}", schedule, first_delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep_until(deadline) => {}
                }

                let schedule = read_schedule(settings.as_ref()).await;
                if schedule != Schedule::Disabled {
                    fire(&engine);
                }

                let (next, delay) =
                    deadline_after(schedule.delay(config.idle_poll), config.idle_poll);
                deadline = next;
                publish_next_run(&engine, schedule, delay).await;
            }

            engine.set_next_run(None).await;
            info!("调度器已停止");
        });

        Self { handle, cancel }
    }

    /// 停止定时器；正在执行的同步不受影响
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("调度器任务异常退出: {}", e);
        }
    }
}

/// 计算下一次触发时刻；超出时钟范围时退回到 `idle_poll`
fn deadline_after(delay: Duration, idle_poll: Duration) -> (Instant, Duration) {
    let now = Instant::now();
    match now.checked_add(delay) {
        Some(deadline) => (deadline, delay),
        None => {
            warn!("同步间隔 {:?} 超出时钟范围，改用 {:?}", delay, idle_poll);
            (now + idle_poll, idle_poll)
        }
    }
}

fn fire(engine: &Arc<SyncEngine>) {
    match engine.try_acquire() {
        Some(guard) => {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.run_pass(guard, TriggerSource::Timer).await;
            });
        }
        None => debug!("定时同步跳过: 已有同步在进行"),
    }
}

async fn publish_next_run(engine: &SyncEngine, schedule: Schedule, delay: Duration) {
    let next_run = match schedule {
        Schedule::Disabled => None,
        _ => chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d)),
    };
    engine.set_next_run(next_run).await;
}
