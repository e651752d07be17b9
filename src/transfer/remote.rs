// ── RemoteStrategy – both ends on the same protocol ─────────────────────────

use crate::transfer::staged::stage_copy;
use crate::transfer::strategy::{remove_remote, rename_remote, OperationStrategy};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use xfer_core::{
    FileInfo, OperationResult, ProgressReporter, Protocol, RemoteBackend, TransferConfig, TransferControl,
    TransferTarget,
};

pub struct RemoteStrategy {
    backend: Arc<dyn RemoteBackend>,
    config: TransferConfig,
}

impl RemoteStrategy {
    pub fn new(backend: Arc<dyn RemoteBackend>, config: TransferConfig) -> Self {
        Self { backend, config }
    }

    /// True when both targets resolve to one pooled connection and one root,
    /// so the server can rename natively.
    async fn same_connection(&self, src: &TransferTarget, dst: &TransferTarget) -> OperationResult<bool> {
        if src.root != dst.root || src.secure != dst.secure {
            return Ok(false);
        }
        let a = self.backend.connection_key(src).await?;
        let b = self.backend.connection_key(dst).await?;
        Ok(a == b)
    }

    async fn copy_inner(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<()> {
        control.checkpoint()?;
        if let Some(result) = self.backend.server_copy(src, dst).await {
            debug!("{} server-side copy {} → {}", self.backend.protocol(), src, dst);
            result?;
            let size = self.backend.stat(dst).await.map(|i| i.size).unwrap_or(0);
            reporter.finish(size, Some(size));
            return Ok(());
        }
        let backend = self.backend.as_ref();
        stage_copy(&self.config, backend, src, backend, dst, reporter, control)
            .await
            .map(drop)
    }
}

#[async_trait]
impl OperationStrategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn supports(&self, src: Protocol, dst: Protocol) -> bool {
        let own = self.backend.protocol();
        src == own && dst == own
    }

    async fn copy(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        self.copy_inner(src, dst, reporter, control).await?;
        Ok(dst.to_uri())
    }

    async fn move_file(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        control.checkpoint()?;
        if self.same_connection(src, dst).await? {
            debug!("{} native rename {} → {}", self.backend.protocol(), src, dst);
            self.backend.rename(src, dst).await?;
            if let Some(size) = src.size_bytes {
                reporter.finish(size, Some(size));
            }
            return Ok(dst.to_uri());
        }
        self.copy_inner(src, dst, reporter, control).await?;
        remove_remote(self.backend.as_ref(), src).await?;
        Ok(dst.to_uri())
    }

    /// Remote servers have no trash; `permanent` does not apply.
    async fn delete(&self, target: &TransferTarget, _permanent: bool) -> OperationResult<()> {
        remove_remote(self.backend.as_ref(), target).await
    }

    async fn rename(&self, target: &TransferTarget, new_name: &str) -> OperationResult<String> {
        rename_remote(self.backend.as_ref(), target, new_name).await
    }

    async fn exists(&self, target: &TransferTarget) -> OperationResult<bool> {
        self.backend.exists(target).await
    }

    async fn create_directory(&self, target: &TransferTarget) -> OperationResult<()> {
        self.backend.mkdir(target).await
    }

    async fn get_file_info(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        self.backend.stat(target).await
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        self.backend.list(target).await
    }
}
