// ── StagedStrategy – remote A → remote B through a local temp file ──────────
//
// The download fills the first half of the logical progress range and the
// upload the second. The staging file is a `NamedTempFile`, so it is removed
// on every exit path, including the future being dropped mid-transfer.

use crate::transfer::strategy::{remove_remote, rename_remote, sized_source, OperationStrategy};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use xfer_core::{
    FileInfo, OperationResult, Phase, ProgressReporter, Protocol, RemoteBackend, TransferConfig, TransferControl,
    TransferError, TransferTarget,
};

/// Download `src` from `from` into a staging file, then upload it to `dst`
/// on `to`. Returns the number of bytes uploaded.
pub(crate) async fn stage_copy(
    config: &TransferConfig,
    from: &dyn RemoteBackend,
    src: &TransferTarget,
    to: &dyn RemoteBackend,
    dst: &TransferTarget,
    reporter: &mut ProgressReporter,
    control: &TransferControl,
) -> OperationResult<u64> {
    let src = sized_source(from, src).await?;
    let staging_dir = config.staging_dir();
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| TransferError::from_io("create staging dir", e))?;
    let staged = tempfile::Builder::new()
        .prefix("xfer-stage-")
        .tempfile_in(&staging_dir)
        .map_err(|e| TransferError::from_io("create staging file", e))?;
    debug!("staging {} via {}", src, staged.path().display());

    let result = async {
        reporter.set_phase(Phase::FirstHalf);
        let mut sink = tokio::fs::File::from_std(
            staged
                .reopen()
                .map_err(|e| TransferError::from_io("open staging file", e))?,
        );
        let fetched = from.download(&src, &mut sink, reporter, control).await?;
        sink.flush().await.map_err(|e| TransferError::from_io("flush staging file", e))?;
        drop(sink);

        control.checkpoint()?;
        reporter.set_phase(Phase::SecondHalf);
        let mut source = tokio::fs::File::from_std(
            staged
                .reopen()
                .map_err(|e| TransferError::from_io("reopen staging file", e))?,
        );
        to.upload(dst, &mut source, Some(fetched), reporter, control).await
    }
    .await;
    reporter.set_phase(Phase::Direct);

    if let Err(e) = staged.close() {
        warn!("could not remove staging file: {}", e);
    }
    result
}

pub struct StagedStrategy {
    from: Arc<dyn RemoteBackend>,
    to: Arc<dyn RemoteBackend>,
    config: TransferConfig,
}

impl StagedStrategy {
    pub fn new(from: Arc<dyn RemoteBackend>, to: Arc<dyn RemoteBackend>, config: TransferConfig) -> Self {
        Self { from, to, config }
    }

    /// Backend serving `target`, for the single-path operations.
    fn side(&self, target: &TransferTarget) -> OperationResult<&dyn RemoteBackend> {
        if target.protocol == self.from.protocol() {
            Ok(self.from.as_ref())
        } else if target.protocol == self.to.protocol() {
            Ok(self.to.as_ref())
        } else {
            Err(TransferError::protocol(
                "EUNSUPPORTED",
                format!("{} is not served by the {} strategy", target.protocol, self.name()),
            ))
        }
    }
}

#[async_trait]
impl OperationStrategy for StagedStrategy {
    fn name(&self) -> &'static str {
        "staged"
    }

    fn supports(&self, src: Protocol, dst: Protocol) -> bool {
        src == self.from.protocol() && dst == self.to.protocol()
    }

    async fn copy(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        stage_copy(&self.config, self.from.as_ref(), src, self.to.as_ref(), dst, reporter, control).await?;
        Ok(dst.to_uri())
    }

    async fn move_file(
        &self,
        src: &TransferTarget,
        dst: &TransferTarget,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<String> {
        stage_copy(&self.config, self.from.as_ref(), src, self.to.as_ref(), dst, reporter, control).await?;
        remove_remote(self.from.as_ref(), src).await?;
        Ok(dst.to_uri())
    }

    async fn delete(&self, target: &TransferTarget, _permanent: bool) -> OperationResult<()> {
        remove_remote(self.side(target)?, target).await
    }

    async fn rename(&self, target: &TransferTarget, new_name: &str) -> OperationResult<String> {
        rename_remote(self.side(target)?, target, new_name).await
    }

    async fn exists(&self, target: &TransferTarget) -> OperationResult<bool> {
        self.side(target)?.exists(target).await
    }

    async fn create_directory(&self, target: &TransferTarget) -> OperationResult<()> {
        self.side(target)?.mkdir(target).await
    }

    async fn get_file_info(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        self.side(target)?.stat(target).await
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        self.side(target)?.list(target).await
    }
}
