// ── WebDavBackend – RemoteBackend over pooled reqwest clients ────────────────

use crate::webdav::client::DavClient;
use crate::webdav::manager::DavManager;
use crate::webdav::types::PropfindDepth;
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use xfer_core::{
    resolve_connection, ConnectionKey, ConnectionParams, ConnectionPool, CredentialResolver, DynReader, DynWriter,
    FileInfo, MissingCredentials, OperationResult, PoolOptions, PooledConnection, ProgressReporter, Protocol,
    RemoteBackend, TransferConfig, TransferControl, TransferError, TransferTarget,
};

pub struct WebDavBackend {
    plain: ConnectionPool<DavManager>,
    tls: ConnectionPool<DavManager>,
    resolver: Arc<dyn CredentialResolver>,
    config: TransferConfig,
}

impl WebDavBackend {
    pub fn new(config: TransferConfig, resolver: Arc<dyn CredentialResolver>) -> Self {
        let options = PoolOptions::from(&config);
        Self {
            plain: ConnectionPool::new(DavManager::new(config.clone(), false), options),
            tls: ConnectionPool::new(DavManager::new(config.clone(), true), options),
            resolver,
            config,
        }
    }

    /// Pool serving `dav://` (`secure == false`) or `davs://` targets.
    pub fn pool(&self, secure: bool) -> &ConnectionPool<DavManager> {
        if secure {
            &self.tls
        } else {
            &self.plain
        }
    }

    async fn acquire(&self, target: &TransferTarget) -> OperationResult<PooledConnection<DavManager>> {
        let (key, credentials) =
            resolve_connection(self.resolver.as_ref(), target, MissingCredentials::Require).await?;
        self.pool(target.secure).acquire(&key, &credentials).await
    }

    async fn resource(client: &mut DavClient, path: &str) -> OperationResult<FileInfo> {
        let endpoint = client.endpoint().clone();
        let mut found = client.propfind(path, PropfindDepth::Zero).await?;
        if found.is_empty() {
            return Err(TransferError::not_found(format!("{} not in PROPFIND answer", path)));
        }
        let mut info = found.remove(0).into_file_info(&endpoint);
        info.path = path.to_string();
        info.name = xfer_core::types::base_name(path);
        Ok(info)
    }

    async fn children(client: &mut DavClient, path: &str) -> OperationResult<Vec<FileInfo>> {
        let endpoint = client.endpoint().clone();
        let own = endpoint.path_of(&endpoint.url(path, true));
        let found = client.propfind(path, PropfindDepth::One).await?;
        Ok(found
            .into_iter()
            .map(|r| r.into_file_info(&endpoint))
            .filter(|info| info.path != own)
            .collect())
    }
}

struct AbortOnDrop([AbortHandle; 2]);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.iter().for_each(AbortHandle::abort);
    }
}

async fn settle<T>(conn: PooledConnection<DavManager>, result: OperationResult<T>) -> OperationResult<T> {
    if conn.is_poisoned() {
        conn.invalidate().await;
    }
    result
}

#[async_trait]
impl RemoteBackend for WebDavBackend {
    fn protocol(&self) -> Protocol {
        Protocol::WebDav
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
        let mut client = self
            .pool(params.secure)
            .manager()
            .open(&params.host, params.effective_port(), &credentials)
            .await?;
        let entries = Self::children(&mut client, "/").await?;
        info!(
            "WebDAV test {} ok ({} entries at /)",
            client.endpoint().origin(),
            entries.len()
        );
        Ok(true)
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        let mut conn = self.acquire(target).await?;
        let result = Self::children(&mut conn, &target.remote_path).await;
        settle(conn, result).await
    }

    async fn stat(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        let mut conn = self.acquire(target).await?;
        let result = Self::resource(&mut conn, &target.remote_path).await;
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
        let result = conn
            .upload_from(&target.remote_path, source, size, opts, reporter, control)
            .await;
        settle(conn, result).await
    }

    async fn delete(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = conn.delete(&target.remote_path, false).await;
        settle(conn, result).await
    }

    /// WebDAV DELETE on a collection is recursive, so emptiness is checked first.
    async fn remove_dir(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = async {
            let children = Self::children(&mut conn, &target.remote_path).await?;
            if !children.is_empty() {
                return Err(TransferError::protocol(
                    "ENOTEMPTY",
                    format!("{} has {} entries", target.remote_path, children.len()),
                ));
            }
            conn.delete(&target.remote_path, true).await
        }
        .await;
        settle(conn, result).await
    }

    async fn rename(&self, from: &TransferTarget, to: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(from).await?;
        let result = conn.move_to(&from.remote_path, &to.remote_path).await;
        settle(conn, result).await
    }

    async fn mkdir(&self, target: &TransferTarget) -> OperationResult<()> {
        let mut conn = self.acquire(target).await?;
        let result = conn.mkcol(&target.remote_path).await;
        settle(conn, result).await
    }

    async fn server_copy(&self, from: &TransferTarget, to: &TransferTarget) -> Option<OperationResult<()>> {
        if !from.same_endpoint(to) {
            return None;
        }
        let result = async {
            let mut conn = self.acquire(from).await?;
            let result = conn.copy_to(&from.remote_path, &to.remote_path).await;
            settle(conn, result).await
        }
        .await;
        Some(result)
    }

    fn spawn_maintenance(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let plain = self.plain.spawn_maintenance(interval);
        let tls = self.tls.spawn_maintenance(interval);
        Some(tokio::spawn(async move {
            // Aborting the outer task stops both sweepers.
            let _stop = AbortOnDrop([plain.abort_handle(), tls.abort_handle()]);
            let _ = tokio::join!(plain, tls);
        }))
    }

    async fn shutdown(&self) {
        self.plain.close_all().await;
        self.tls.close_all().await;
    }
}
