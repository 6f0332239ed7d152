use sftp_mirror_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use sftp_mirror_lib::AppState;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 初始化日志系统；返回的 guard 需保持到进程结束，否则文件日志会丢失
fn init_logging() -> Option<WorkerGuard> {
    let log_dir = get_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let config = LogConfig::load(log_dir.parent().unwrap_or(&log_dir));

    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let level = config.tracing_level();
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("sqlx=warn".parse().unwrap_or_else(|_| level.into()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    // 文件日志创建失败时回退到仅控制台输出
    let (file_layer, guard, file_error) = match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            let (writer, guard) = tracing_appender::non_blocking(file_writer);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    if let Some(e) = file_error {
        tracing::warn!("无法创建日志文件 {:?}: {}", log_dir, e);
    }
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();

    let state = AppState::new().await?;
    tracing::info!("数据目录: {:?}", state.config_dir);

    state.start_scheduler().await;

    tokio::signal::ctrl_c().await?;
    state.shutdown().await;

    Ok(())
}
