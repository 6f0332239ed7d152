//! SFTP 远程存储（基于 ssh2，阻塞调用统一放入 spawn_blocking）

use super::{Connector, RemoteDirEntry, RemoteSession, CONNECT_TIMEOUT_SECS, TRANSFER_CHUNK_SIZE};
use crate::db::{Credential, SyncSettings};
use crate::error::SyncError;
use async_trait::async_trait;
use ssh2::{Session, Sftp};
use std::io::{BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub struct SftpConnector {
    timeout: Duration,
}

impl SftpConnector {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }
}

impl Default for SftpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self, settings: &SyncSettings) -> Result<Box<dyn RemoteSession>, SyncError> {
        // 没有可用凭据时不发起任何网络请求
        let credential = settings
            .credential()
            .ok_or_else(|| SyncError::Auth("需要密码或私钥".to_string()))?;
        let settings = settings.clone();
        let timeout = self.timeout;

        let session =
            tokio::task::spawn_blocking(move || SftpSession::open(&settings, credential, timeout))
                .await??;

        Ok(Box::new(session))
    }
}

/// 已认证的 SFTP 会话
pub struct SftpSession {
    session: Arc<Session>,
    sftp: Arc<Mutex<Sftp>>,
    name: String,
    closed: AtomicBool,
}

impl SftpSession {
    fn open(
        settings: &SyncSettings,
        credential: Credential,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let endpoint = format!("{}:{}", settings.host, settings.port);
        let addr = (settings.host.as_str(), settings.port)
            .to_socket_addrs()
            .map_err(|e| SyncError::Connection(format!("无法解析主机 {}: {}", endpoint, e)))?
            .next()
            .ok_or_else(|| SyncError::Connection(format!("无法解析主机 {}", endpoint)))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| SyncError::Connection(format!("{}: {}", endpoint, e)))?;

        let mut session = Session::new()
            .map_err(|e| SyncError::Connection(format!("无法创建 SSH 会话: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .map_err(|e| SyncError::Connection(format!("SSH 握手失败: {}", e)))?;

        let auth = match &credential {
            Credential::PrivateKey(key_path) => {
                debug!("使用私钥认证: {}", key_path.display());
                session.userauth_pubkey_file(&settings.username, None, key_path, None)
            }
            Credential::Password(password) => {
                debug!("使用密码认证");
                session.userauth_password(&settings.username, password)
            }
        };
        auth.map_err(|e| SyncError::Auth(e.message().to_string()))?;

        if !session.authenticated() {
            return Err(SyncError::Auth("服务器拒绝认证".to_string()));
        }

        let sftp = session
            .sftp()
            .map_err(|e| SyncError::Connection(format!("无法打开 SFTP 通道: {}", e)))?;

        Ok(Self {
            session: Arc::new(session),
            sftp: Arc::new(Mutex::new(sftp)),
            name: format!("sftp://{}@{}", settings.username, endpoint),
            closed: AtomicBool::new(false),
        })
    }

    fn disconnect(session: &Session) {
        if let Err(e) = session.disconnect(None, "sync pass finished", None) {
            warn!("SSH 断开连接时出错: {}", e);
        }
    }
}

fn lock_sftp(sftp: &Mutex<Sftp>) -> Result<std::sync::MutexGuard<'_, Sftp>, SyncError> {
    sftp.lock()
        .map_err(|_| SyncError::Connection("SFTP 通道状态异常".to_string()))
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, SyncError> {
        let sftp = self.sftp.clone();
        let dir = path.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<RemoteDirEntry>, SyncError> {
            let sftp = lock_sftp(&sftp)?;
            let items = sftp
                .readdir(Path::new(&dir))
                .map_err(|e| SyncError::RemotePath {
                    path: dir.clone(),
                    detail: e.to_string(),
                })?;

            Ok(items
                .into_iter()
                .filter_map(|(path, stat)| {
                    let raw = path.file_name()?;
                    let invalid_name = raw.to_str().is_none();
                    let name = raw.to_string_lossy().into_owned();
                    if name == "." || name == ".." {
                        return None;
                    }
                    if invalid_name {
                        warn!("远程名称不是有效的 UTF-8: {}/{}", dir, name);
                    }
                    Some(RemoteDirEntry {
                        name,
                        is_dir: stat.is_dir(),
                        size: stat.size.unwrap_or(0),
                        modified_at: stat.mtime.unwrap_or(0) as i64,
                        invalid_name,
                    })
                })
                .collect())
        })
        .await?
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SyncError> {
        let sftp = self.sftp.clone();
        let remote = remote_path.to_string();
        let local: PathBuf = local_path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<u64, SyncError> {
            let transfer_err = |detail: String| SyncError::Transfer {
                path: remote.clone(),
                detail,
            };

            let sftp = lock_sftp(&sftp)?;
            let mut src = sftp
                .open(Path::new(&remote))
                .map_err(|e| transfer_err(e.to_string()))?;
            let file = std::fs::File::create(&local)
                .map_err(|e| transfer_err(format!("{}: {}", local.display(), e)))?;
            let mut dst = BufWriter::with_capacity(TRANSFER_CHUNK_SIZE, file);

            let bytes = std::io::copy(&mut src, &mut dst).map_err(|e| transfer_err(e.to_string()))?;
            dst.flush().map_err(|e| transfer_err(e.to_string()))?;
            Ok(bytes)
        })
        .await?
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = self.session.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || Self::disconnect(&session)).await {
            warn!("关闭 SFTP 会话失败: {}", e);
        }
        debug!("SFTP 会话已关闭: {}", self.name);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        // 异常路径上兜底断开
        if !self.closed.swap(true, Ordering::SeqCst) {
            Self::disconnect(&self.session);
        }
    }
}
