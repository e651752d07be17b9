//! Contract every protocol client implements.

use crate::error::{ErrorKind, OperationResult};
use crate::progress::{ProgressReporter, TransferControl};
use crate::types::{ConnectionKey, ConnectionParams, FileInfo, Protocol, TransferTarget};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

pub type DynReader<'a> = dyn AsyncRead + Send + Unpin + 'a;
pub type DynWriter<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Protocol primitives on top of a pooled connection.
///
/// All methods take protocol-neutral targets, classify native failures into
/// the shared taxonomy, and borrow a pooled connection only for the call.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Pool identity serving `target` (resolves credentials).
    async fn connection_key(&self, target: &TransferTarget) -> OperationResult<ConnectionKey>;

    /// Open a transient connection and list the root.
    async fn test_connection(&self, params: &ConnectionParams) -> OperationResult<bool>;

    /// Directory entries, without `.` and `..`.
    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>>;

    async fn stat(&self, target: &TransferTarget) -> OperationResult<FileInfo>;

    async fn exists(&self, target: &TransferTarget) -> OperationResult<bool> {
        match self.stat(target).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stream the remote file into `sink`; returns bytes written.
    async fn download(
        &self,
        target: &TransferTarget,
        sink: &mut DynWriter<'_>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64>;

    /// Stream `source` (of `size` bytes when known) into the remote file.
    async fn upload(
        &self,
        target: &TransferTarget,
        source: &mut DynReader<'_>,
        size: Option<u64>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64>;

    async fn delete(&self, target: &TransferTarget) -> OperationResult<()>;

    /// Remove an empty directory.
    async fn remove_dir(&self, target: &TransferTarget) -> OperationResult<()>;

    /// Native rename/move within one endpoint.
    async fn rename(&self, from: &TransferTarget, to: &TransferTarget) -> OperationResult<()>;

    async fn mkdir(&self, target: &TransferTarget) -> OperationResult<()>;

    /// Server-side copy within one endpoint, when the protocol has one.
    /// `None` means "not supported, stage it".
    async fn server_copy(
        &self,
        _from: &TransferTarget,
        _to: &TransferTarget,
    ) -> Option<OperationResult<()>> {
        None
    }

    /// Start periodic idle eviction for this backend's pool.
    fn spawn_maintenance(&self, _interval: Duration) -> Option<JoinHandle<()>> {
        None
    }

    /// Close pooled connections.
    async fn shutdown(&self);
}
