// ── SftpBackend – RemoteBackend over pooled SSH sessions ─────────────────────

use crate::sftp::manager::SftpManager;
use crate::sftp::session::SftpSession;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use xfer_core::{
    resolve_connection, ConnectionKey, ConnectionParams, ConnectionPool, CredentialResolver, DynReader, DynWriter,
    FileInfo, MissingCredentials, OperationResult, PoolOptions, PooledConnection, ProgressReporter, Protocol,
    RemoteBackend, TransferConfig, TransferControl, TransferTarget,
};

pub struct SftpBackend {
    pool: ConnectionPool<SftpManager>,
    resolver: Arc<dyn CredentialResolver>,
    config: TransferConfig,
}

impl SftpBackend {
    pub fn new(config: TransferConfig, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            pool: ConnectionPool::new(SftpManager::new(config.clone()), PoolOptions::from(&config)),
            resolver,
            config,
        }
    }

    pub fn pool(&self) -> &ConnectionPool<SftpManager> {
        &self.pool
    }

    async fn acquire(&self, target: &TransferTarget) -> OperationResult<PooledConnection<SftpManager>> {
        let (key, credentials) =
            resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Require).await?;
        self.pool.acquire(&key, &credentials).await
    }
}

/// Return the session, or close it now if the operation broke it.
async fn settle<T>(conn: PooledConnection<SftpManager>, result: OperationResult<T>) -> OperationResult<T> {
    if conn.is_poisoned() {
        conn.invalidate().await;
    }
    result
}

#[async_trait]
impl RemoteBackend for SftpBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    async fn connection_key(&self, target: &TransferTarget) -> OperationResult<ConnectionKey> {
        resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Require)
            .await
            .map(|(key, _)| key)
    }

    async fn test_connection(&self, params: &ConnectionParams) -> OperationResult<bool> {
        let credentials = match &params.credentials {
            Some(c) => c.clone(),
            None => {
                resolve_connection(self.resolver.as_ref(), &params.root_target(), MissingCredentials::Require)
                    .await?
                    .1
            }
        };
        let mut session: SftpSession = self
            .pool
            .manager()
            .open(&params.host, params.effective_port(), &credentials)
            .await?;
        let listed = session.list("/").await;
        session.disconnect().await;
        let entries = listed?;
        info!("SFTP test {}:{} ok ({} entries at /)", params.host, params.effective_port(), entries.len());
        Ok(true)
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        let mut conn = self.acquire(target).await?;
        let result = conn.list(&target.remote_path).await;
        settle(conn, result).await
    }

    async fn stat(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        let mut conn = self.acquire(target).await?;
        let result = conn.stat(&target.remote_path).await;
        settle(conn, result).await
    }

    async fn download(
        &self,
        target: &TransferTarget,
        sink: &mut DynWriter<'_>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let mut conn = self.acquire(target).await?;
        let opts = self.config.pump_options(target.size_bytes);
        let result = conn.download_to(&target.remote_path, sink, opts, reporter, control).await;
        settle(conn, result).await
    }

    async fn upload(
        &self,
        target: &TransferTarget,
        source: &mut DynReader<'_>,
        size: Option<u64>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let mut conn = self.acquire(target).await?;
        let opts = self.config.pump_options(size);
        let result = conn.upload_from(&target.remote_path, source, size, opts, reporter, control).await;
        settle(conn, result).await
    }

    async fn delete(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = conn.unlink(&target.remote_path).await;
        settle(conn, result).await
    }

    async fn remove_dir(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = conn.rmdir(&target.remote_path).await;
        settle(conn, result).await
    }

    async fn rename(&self, from: &TransferTarget, to: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(from).await?;
        let result = conn.rename(&from.remote_path, &to.remote_path).await;
        settle(conn, result).await
    }

    async fn mkdir(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = conn.mkdir(&target.remote_path).await;
        settle(conn, result).await
    }

    fn spawn_maintenance(&self, interval: Duration) -> Option<JoinHandle<()>> {
        Some(self.pool.spawn_maintenance(interval))
    }

    async fn shutdown(&self) {
        self.pool.close_all().await;
    }
}
