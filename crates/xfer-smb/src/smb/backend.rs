//! `RemoteBackend` for `smb://host/share/path` targets.

use crate::smb::manager::SmbManager;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use xfer_core::{
    resolve_connection, ConnectionKey, ConnectionParams, ConnectionPool, CredentialResolver, DynReader, DynWriter,
    FileInfo, MissingCredentials, OperationResult, PoolOptions, PooledConnection, ProgressReporter, Protocol,
    RemoteBackend, TransferConfig, TransferControl, TransferError, TransferTarget,
};

pub struct SmbBackend {
    pool: ConnectionPool<SmbManager>,
    resolver: Arc<dyn CredentialResolver>,
    config: TransferConfig,
}

impl SmbBackend {
    pub fn new(config: TransferConfig, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            pool: ConnectionPool::new(SmbManager::new(config.clone()), PoolOptions::from(&config)),
            resolver,
            config,
        }
    }

    pub fn pool(&self) -> &ConnectionPool<SmbManager> {
        &self.pool
    }

    async fn acquire(&self, target: &TransferTarget) -> OperationResult<PooledConnection<SmbManager>> {
        let (key, credentials) = resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Guest).await?;
        self.pool.acquire(&key, &credentials).await
    }
}

fn share_of(target: &TransferTarget) -> OperationResult<&str> {
    target
        .root
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TransferError::protocol("EINVALIDPATH", format!("{} names no share", target)))
}

async fn settle<T>(conn: PooledConnection<SmbManager>, result: OperationResult<T>) -> OperationResult<T> {
    if conn.is_poisoned() {
        conn.invalidate().await;
    }
    result
}

#[async_trait]
impl RemoteBackend for SmbBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Smb
    }

    async fn connection_key(&self, target: &TransferTarget) -> OperationResult<ConnectionKey> {
        resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Guest)
            .await
            .map(|(key, _)| key)
    }

    /// With a share, list its root; without one, enumerate shares.
    async fn test_connection(&self, params: &ConnectionParams) -> OperationResult<bool> {
        let credentials = match &params.credentials {
            Some(c) => c.clone(),
            None => {
                resolve_connection(self.resolver.as_ref(), &params.root_target(), MissingCredentials::Guest)
                    .await?
                    .1
            }
        };
        let mut session = self
            .pool
            .manager()
            .open(&params.host, params.effective_port(), &credentials)
            .await?;
        let probe = match params.root.as_deref().filter(|s| !s.is_empty()) {
            Some(share) => session.list(share, "/").await.map(|e| format!("{} entries in {}", e.len(), share)),
            None => session.list_shares().await.map(|s| format!("{} shares", s.len())),
        };
        session.disconnect().await;
        info!("SMB test {}:{} ok ({})", params.host, params.effective_port(), probe?);
        Ok(true)
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let result = conn.list(share, &target.remote_path).await;
        settle(conn, result).await
    }

    async fn stat(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let result = conn.stat(share, &target.remote_path).await;
        settle(conn, result).await
    }

    async fn download(
        &self,
        target: &TransferTarget,
        sink: &mut DynWriter<'_>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let opts = self.config.pump_options(target.size_bytes);
        let result = conn
            .download_to(share, &target.remote_path, sink, opts, reporter, control)
            .await;
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
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let opts = self.config.pump_options(size);
        let result = conn
            .upload_from(share, &target.remote_path, source, opts, reporter, control)
            .await;
        settle(conn, result).await
    }

    async fn delete(&self, target: &TransferTarget) -> OperationResult<()> {
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let result = conn.delete(share, &target.remote_path).await;
        settle(conn, result).await
    }

    async fn remove_dir(&self, target: &TransferTarget) -> OperationResult<()> {
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let result = conn.rmdir(share, &target.remote_path).await;
        settle(conn, result).await
    }

    async fn rename(&self, from: &TransferTarget, to: &TransferTarget) -> OperationResult<()> {
        let share = share_of(from)?;
        if to.root.as_deref() != Some(share) {
            return Err(TransferError::protocol("EXDEV", "SMB rename cannot cross shares"));
        }
        let mut conn = self.acquire(from).await?;
        let result = conn.rename(share, &from.remote_path, &to.remote_path).await;
        settle(conn, result).await
    }

    async fn mkdir(&self, target: &TransferTarget) -> OperationResult<()> {
        let share = share_of(target)?;
        let mut conn = self.acquire(target).await?;
        let result = conn.mkdir(share, &target.remote_path).await;
        settle(conn, result).await
    }

    fn spawn_maintenance(&self, interval: Duration) -> Option<JoinHandle<()>> {
        Some(self.pool.spawn_maintenance(interval))
    }

    async fn shutdown(&self) {
        self.pool.close_all().await;
    }
}
