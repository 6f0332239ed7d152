pub mod models;
pub use models::*;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
pub use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 同步设置来源（每轮同步开始时拉取一次）
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn current(&self) -> Result<Option<SyncSettings>>;
}

/// 同步日志接收端
#[async_trait]
pub trait LogSink: Send + Sync {
    /// 追加一条日志；写入失败只记录到 tracing，不影响调用方
    async fn append(&self, level: LogLevel, message: &str, detail: Option<&str>);

    /// 最近的日志，按时间倒序
    async fn recent(&self, limit: u32) -> Result<Vec<LogEntry>>;
}

/// 打开数据库文件并执行迁移
pub async fn open_pool(db_path: &Path) -> Result<SqlitePool> {
    // SQLite 连接字符串格式: sqlite:path，Windows 路径需要转换反斜杠为正斜杠
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid database path"))?
        .replace('\\', "/");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&format!("sqlite:{}?mode=rwc", db_path_str))
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// 内存数据库（单连接，保证所有查询看到同一个库）
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// 设置存储（settings 表只有 id = 1 一行）
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<SqlitePool>,
}

impl SettingsStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn load(&self) -> Result<Option<SyncSettings>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM settings WHERE id = 1")
            .fetch_optional(&*self.db)
            .await?;

        match row {
            Some((data,)) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// 保存设置；密码为空时保留原密码
    pub async fn save(&self, settings: SyncSettings) -> Result<SyncSettings> {
        let stored = self.load().await?;
        let settings = settings.merge_credentials(stored.as_ref());
        let data = serde_json::to_string(&settings)?;

        sqlx::query(
            r#"
            INSERT INTO settings (id, data, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&data)
        .bind(chrono::Utc::now().timestamp())
        .execute(&*self.db)
        .await?;

        Ok(settings)
    }
}

#[async_trait]
impl SettingsProvider for SettingsStore {
    async fn current(&self) -> Result<Option<SyncSettings>> {
        self.load().await
    }
}

/// SQLite 日志存储
#[derive(Clone)]
pub struct LogStore {
    db: Arc<SqlitePool>,
}

impl LogStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn insert(&self, level: LogLevel, message: &str, detail: Option<&str>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO logs (created_at, level, message, detail) VALUES (?, ?, ?, ?)",
        )
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(level.as_str())
        .bind(message)
        .bind(detail)
        .execute(&*self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, created_at, level, message, detail FROM logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter().map(LogEntry::try_from).collect()
    }

    /// 清空日志，返回删除条数
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM logs").execute(&*self.db).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LogSink for LogStore {
    async fn append(&self, level: LogLevel, message: &str, detail: Option<&str>) {
        match level {
            LogLevel::Info => tracing::info!(detail = detail, "{}", message),
            LogLevel::Warn => tracing::warn!(detail = detail, "{}", message),
            LogLevel::Error => tracing::error!(detail = detail, "{}", message),
        }

        if let Err(e) = self.insert(level, message, detail).await {
            tracing::warn!("记录同步日志失败: {}", e);
        }
    }

    async fn recent(&self, limit: u32) -> Result<Vec<LogEntry>> {
        self.list(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SyncSettings {
        SyncSettings {
            host: "sftp.example.com".into(),
            port: 2222,
            username: "mirror".into(),
            password: Some("secret".into()),
            private_key_path: None,
            remote_root: "/export".into(),
            local_root: "/srv/mirror".into(),
            sync_interval_secs: 30,
        }
    }

    #[tokio::test]
    async fn settings_absent_until_saved() {
        let store = SettingsStore::new(Arc::new(memory_pool().await.unwrap()));
        assert!(store.current().await.unwrap().is_none());

        store.save(settings()).await.unwrap();
        assert_eq!(store.current().await.unwrap(), Some(settings()));
    }

    #[tokio::test]
    async fn saving_blank_password_keeps_stored_one() {
        let store = SettingsStore::new(Arc::new(memory_pool().await.unwrap()));
        store.save(settings()).await.unwrap();

        let mut update = settings();
        update.password = None;
        update.sync_interval_secs = 60;
        store.save(update).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.password.as_deref(), Some("secret"));
        assert_eq!(loaded.sync_interval_secs, 60);
    }

    #[tokio::test]
    async fn logs_are_returned_newest_first() {
        let store = LogStore::new(Arc::new(memory_pool().await.unwrap()));
        store.append(LogLevel::Info, "first", None).await;
        store.append(LogLevel::Warn, "second", Some("detail")).await;
        store.append(LogLevel::Error, "third", None).await;

        let logs = store.recent(2).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "third");
        assert_eq!(logs[0].level, LogLevel::Error);
        assert_eq!(logs[1].message, "second");
        assert_eq!(logs[1].detail.as_deref(), Some("detail"));
        assert!(logs[0].id > logs[1].id);
    }

    #[tokio::test]
    async fn clear_removes_all_logs() {
        let store = LogStore::new(Arc::new(memory_pool().await.unwrap()));
        store.append(LogLevel::Info, "a", None).await;
        store.append(LogLevel::Info, "b", None).await;

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.recent(10).await.unwrap().is_empty());
    }
}
