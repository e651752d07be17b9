// ── DirectStrategy – local ↔ remote, streamed without staging ───────────────

use crate::transfer::local;
use crate::transfer::strategy::{remove_remote, rename_remote, sized_source, OperationStrategy};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use xfer_core::{
    FileInfo, OperationResult, ProgressReporter, Protocol, RemoteBackend, TransferConfig, TransferControl,
    TransferError, TransferTarget,
};

pub struct DirectStrategy {
    backend: Arc<dyn RemoteBackend>,
    config: TransferConfig,
}

impl DirectStrategy {
    pub fn new(backend: Arc<dyn RemoteBackend>, config: TransferConfig) -> Self {
        Self { backend, config }
    }

    async fn upload(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let mut file = tokio::fs::File::open(local::path_of(src))
            .await
            .map_err(|e| TransferError::from_io("open source", e))?;
        let meta = file.metadata().await.map_err(|e| TransferError::from_io("stat", e))?;
        if meta.is_dir() {
            return Err(TransferError::protocol("EISDIR", format!("{} is a directory", src.remote_path)));
        }
        self.backend
            .upload(dst, &mut file, Some(meta.len()), reporter, control)
            .await
    }

    /// A failed or cancelled download leaves the partial file in place.
    async fn download(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let src = sized_source(self.backend.as_ref(), src).await?;
        let mut file = tokio::fs::File::create(local::path_of(dst))
            .await
            .map_err(|e| TransferError::from_io("create destination", e))?;
        let result = self.backend.download(&src, &mut file, reporter, control).await;
        // Flush even on failure so the partial file on disk matches what was received.
        let flushed = file.flush().await.map_err(|e| TransferError::from_io("flush", e));
        let written = result?;
        flushed?;
        file.sync_all().await.map_err(|e| TransferError::from_io("sync", e))?;
        Ok(written)
    }

    async fn transfer(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        if src.is_local() {
            self.upload(src, dst, reporter, control).await
        } else {
            self.download(src, dst, reporter, control).await
        }
    }
}

#[async_trait]
impl OperationStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn supports(&self, src: Protocol, dst: Protocol) -> bool {
        let remote = self.backend.protocol();
        (src == Protocol::Local && dst == remote) || (src == remote && dst == Protocol::Local)
    }

    async fn copy(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        let n = self.transfer(src, dst, reporter, control).await?;
        debug!("direct copy {} → {}: {} bytes", src, dst, n);
        Ok(dst.to_uri())
    }

    async fn move_file(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        self.transfer(src, dst, reporter, control).await?;
        self.delete(src, true).await?;
        Ok(dst.to_uri())
    }

    async fn delete(&self, target: &TransferTarget, permanent: bool) -> OperationResult<()> {
        if target.is_local() {
            if permanent {
                local::remove(local::path_of(target)).await
            } else {
                local::trash(&self.config.trash_dir(), local::path_of(target)).await.map(drop)
            }
        } else {
            remove_remote(self.backend.as_ref(), target).await
        }
    }

    async fn rename(&self, target: &TransferTarget, new_name: &str) -> OperationResult<String> {
        if target.is_local() {
            local::rename_in_place(target, new_name).await
        } else {
            rename_remote(self.backend.as_ref(), target, new_name).await
        }
    }

    async fn exists(&self, target: &TransferTarget) -> OperationResult<bool> {
        if target.is_local() {
            local::exists(local::path_of(target)).await
        } else {
            self.backend.exists(target).await
        }
    }

    async fn create_directory(&self, target: &TransferTarget) -> OperationResult<()> {
        if target.is_local() {
            tokio::fs::create_dir(local::path_of(target))
                .await
                .map_err(|e| TransferError::from_io("mkdir", e))
        } else {
            self.backend.mkdir(target).await
        }
    }

    async fn get_file_info(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        if target.is_local() {
            local::file_info(local::path_of(target)).await
        } else {
            self.backend.stat(target).await
        }
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        if target.is_local() {
            local::list_dir(local::path_of(target)).await
        } else {
            self.backend.list(target).await
        }
    }
}
