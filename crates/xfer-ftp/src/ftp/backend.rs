//! `RemoteBackend` for `ftp://` targets over a pool of [`FtpClient`]s.

use crate::ftp::client::FtpClient;
use crate::ftp::error::FtpResult;
use crate::ftp::manager::FtpManager;
use crate::ftp::transfer::DataConnector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use xfer_core::credentials::resolve_connection;
use xfer_core::{
    ConnectionKey, ConnectionParams, ConnectionPool, CredentialResolver, Credentials, DynReader, DynWriter, FileInfo,
    MissingCredentials, OperationResult, PoolOptions, PooledConnection, ProgressReporter, Protocol, RemoteBackend,
    TransferConfig, TransferControl, TransferError, TransferTarget,
};

pub struct FtpBackend {
    pool: ConnectionPool<FtpManager>,
    resolver: Arc<dyn CredentialResolver>,
    config: TransferConfig,
}

impl FtpBackend {
    pub fn new(config: TransferConfig, resolver: Arc<dyn CredentialResolver>) -> Self {
        let manager = FtpManager::new(config.clone());
        Self::with_manager(config, resolver, manager)
    }

    /// Backend whose passive data connections go through `connector`.
    pub fn with_connector(
        config: TransferConfig,
        resolver: Arc<dyn CredentialResolver>,
        connector: Arc<dyn DataConnector>,
    ) -> Self {
        let manager = FtpManager::with_connector(config.clone(), connector);
        Self::with_manager(config, resolver, manager)
    }

    fn with_manager(config: TransferConfig, resolver: Arc<dyn CredentialResolver>, manager: FtpManager) -> Self {
        Self {
            pool: ConnectionPool::new(manager, PoolOptions::from(&config)),
            resolver,
            config,
        }
    }

    pub fn pool(&self) -> &ConnectionPool<FtpManager> {
        &self.pool
    }

    async fn acquire(&self, target: &TransferTarget) -> OperationResult<PooledConnection<FtpManager>> {
        let (key, credentials) =
            resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Anonymous).await?;
        self.pool.acquire(&key, &credentials).await
    }
}

/// Hand a session back, closing it right away if the operation poisoned it.
async fn settle<T>(conn: PooledConnection<FtpManager>, result: OperationResult<T>) -> OperationResult<T> {
    if conn.is_poisoned() {
        conn.invalidate().await;
    }
    result
}

fn ftp<T>(r: FtpResult<T>) -> OperationResult<T> {
    r.map_err(TransferError::from)
}

#[async_trait]
impl RemoteBackend for FtpBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    async fn connection_key(&self, target: &TransferTarget) -> OperationResult<ConnectionKey> {
        resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Anonymous)
            .await
            .map(|(key, _)| key)
    }

    async fn test_connection(&self, params: &ConnectionParams) -> OperationResult<bool> {
        let credentials: Credentials = match &params.credentials {
            Some(c) => c.clone(),
            None => {
                resolve_connection(self.resolver.as_ref(), &params.root_target(), MissingCredentials::Anonymous)
                    .await?
                    .1
            }
        };
        let mut client: FtpClient = self
            .pool
            .manager()
            .open(&params.host, params.effective_port(), &credentials)
            .await?;
        let listed = client.list("/").await;
        client.quit().await;
        let entries = ftp(listed)?;
        log::info!("FTP test {}:{} ok ({} entries at /)", params.host, params.effective_port(), entries.len());
        Ok(true)
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        let mut conn = self.acquire(target).await?;
        let result = ftp(conn.list(&target.remote_path).await);
        let dir = target.remote_path.clone();
        settle(conn, result.map(|entries| entries.into_iter().map(|e| e.into_file_info(&dir)).collect())).await
    }

    async fn stat(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        let mut conn = self.acquire(target).await?;
        let result = ftp(conn.stat(&target.remote_path).await);
        let parent = xfer_core::types::parent_path(&target.remote_path);
        settle(
            conn,
            result.map(|e| {
                let mut info = e.into_file_info(&parent);
                info.path = target.remote_path.clone();
                info
            }),
        )
        .await
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
        let result = conn.download_into(&target.remote_path, sink, opts, reporter, control).await;
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
        let result = conn.upload_from(&target.remote_path, source, opts, reporter, control).await;
        settle(conn, result).await
    }

    async fn delete(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = ftp(conn.delete(&target.remote_path).await);
        settle(conn, result).await
    }

    async fn remove_dir(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = ftp(conn.rmdir(&target.remote_path).await);
        settle(conn, result).await
    }

    async fn rename(&self, from: &TransferTarget, to: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(from).await?;
        let result = ftp(conn.rename(&from.remote_path, &to.remote_path).await);
        settle(conn, result).await
    }

    async fn mkdir(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = ftp(conn.mkdir(&target.remote_path).await);
        settle(conn, result).await
    }

    fn spawn_maintenance(&self, interval: Duration) -> Option<JoinHandle<()>> {
        Some(self.pool.spawn_maintenance(interval))
    }

    async fn shutdown(&self) {
        self.pool.close_all().await;
    }
}
