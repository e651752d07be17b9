//! Entry point for callers: parses path strings, picks the strategy for the
//! scheme pair, retries network failures and attaches path context.

use crate::transfer::registry::StrategyRegistry;
use crate::transfer::strategy::{validate_name, OperationStrategy};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use xfer_core::{
    monotonic, ConnectionParams, CredentialResolver, FileInfo, OperationResult, ProgressCallback, ProgressReporter,
    Protocol, RemoteBackend, TransferConfig, TransferControl, TransferError, TransferTarget,
};
use xfer_ftp::FtpBackend;
use xfer_sftp::SftpBackend;
use xfer_smb::SmbBackend;
use xfer_webdav::WebDavBackend;

// ─── Builder ────────────────────────────────────────────────────────────────

pub struct OrchestratorBuilder {
    config: TransferConfig,
    resolver: Option<Arc<dyn CredentialResolver>>,
    backends: Vec<Arc<dyn RemoteBackend>>,
    strategies: Vec<(Protocol, Protocol, Arc<dyn OperationStrategy>)>,
    maintenance: bool,
}

impl OrchestratorBuilder {
    /// Install the FTP, SFTP, SMB and WebDAV backends, all resolving
    /// credentials through `resolver`. Backends added with
    /// [`backend`](Self::backend) take precedence.
    pub fn resolver(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn RemoteBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Serve `src → dst` with `strategy` ahead of the defaults.
    pub fn strategy(mut self, src: Protocol, dst: Protocol, strategy: Arc<dyn OperationStrategy>) -> Self {
        self.strategies.push((src, dst, strategy));
        self
    }

    /// Skip the background idle-eviction tasks.
    pub fn without_maintenance(mut self) -> Self {
        self.maintenance = false;
        self
    }

    pub fn build(self) -> OperationResult<TransferOrchestrator> {
        self.config.validate()?;
        let mut registry = StrategyRegistry::new();

        if let Some(resolver) = &self.resolver {
            let defaults: [Arc<dyn RemoteBackend>; 4] = [
                Arc::new(FtpBackend::new(self.config.clone(), resolver.clone())),
                Arc::new(SftpBackend::new(self.config.clone(), resolver.clone())),
                Arc::new(SmbBackend::new(self.config.clone(), resolver.clone())),
                Arc::new(WebDavBackend::new(self.config.clone(), resolver.clone())),
            ];
            for backend in defaults {
                registry.add_backend(backend);
            }
        }
        for backend in self.backends {
            registry.add_backend(backend);
        }
        for (src, dst, strategy) in self.strategies {
            registry.register(src, dst, strategy);
        }
        registry.register_defaults(&self.config);

        let mut maintenance = Vec::new();
        if let (true, Some(interval), Ok(_)) = (
            self.maintenance,
            self.config.eviction_interval(),
            tokio::runtime::Handle::try_current(),
        ) {
            maintenance.extend(registry.backends().filter_map(|b| b.spawn_maintenance(interval)));
        }
        info!(
            "transfer orchestrator ready: {} strategies, backends [{}]",
            registry.pairs().len(),
            registry
                .backends()
                .map(|b| b.protocol().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(TransferOrchestrator {
            registry,
            config: self.config,
            maintenance,
        })
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct TransferOrchestrator {
    registry: StrategyRegistry,
    config: TransferConfig,
    maintenance: Vec<JoinHandle<()>>,
}

impl Drop for TransferOrchestrator {
    fn drop(&mut self) {
        for task in &self.maintenance {
            task.abort();
        }
    }
}

impl TransferOrchestrator {
    pub fn builder(config: TransferConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            resolver: None,
            backends: Vec::new(),
            strategies: Vec::new(),
            maintenance: true,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    // ── Transfers ───────────────────────────────────────────────────────

    /// Copy one file; returns the destination path.
    pub async fn copy(&self, src: &str, dst: &str, progress: Option<ProgressCallback>) -> OperationResult<String> {
        self.copy_with_control(src, dst, progress, &TransferControl::new()).await
    }

    pub async fn copy_with_control(
        &self,
        src: &str,
        dst: &str,
        progress: Option<ProgressCallback>,
        control: &TransferControl,
    ) -> OperationResult<String> {
        self.transfer(Transfer::Copy, src, dst, progress, control).await
    }

    /// Move one file; returns the destination path.
    pub async fn move_file(&self, src: &str, dst: &str, progress: Option<ProgressCallback>) -> OperationResult<String> {
        self.move_with_control(src, dst, progress, &TransferControl::new()).await
    }

    pub async fn move_with_control(
        &self,
        src: &str,
        dst: &str,
        progress: Option<ProgressCallback>,
        control: &TransferControl,
    ) -> OperationResult<String> {
        self.transfer(Transfer::Move, src, dst, progress, control).await
    }

    async fn transfer(
        &self,
        kind: Transfer,
        src: &str,
        dst: &str,
        progress: Option<ProgressCallback>,
        control: &TransferControl,
    ) -> OperationResult<String> {
        let context = |e: TransferError| e.with_source(src).with_dest(dst);
        let source = TransferTarget::parse(src).map_err(|e| context(e.into()))?;
        let dest = TransferTarget::parse(dst).map_err(|e| context(e.into()))?;
        let strategy = self
            .registry
            .resolve(source.protocol, dest.protocol)
            .map_err(context)?;
        debug!("{} {} → {} via {}", kind.verb(), src, dst, strategy.name());
        info!("{} {} → {} started", kind.verb(), src, dst);

        // One clamp per call so a retried attempt never reports less than
        // the failed one already did.
        let progress = progress.map(monotonic);
        let (strategy, source, dest, progress) = (&strategy, &source, &dest, progress.as_ref());
        let interval = self.config.progress_interval();
        let result = self
            .retrying(kind.verb(), control, move || async move {
                let mut reporter = ProgressReporter::new(progress.cloned(), interval);
                match kind {
                    Transfer::Copy => strategy.copy(source, dest, &mut reporter, control).await,
                    Transfer::Move => strategy.move_file(source, dest, &mut reporter, control).await,
                }
            })
            .await
            .map_err(context);

        match &result {
            Ok(path) => info!("{} {} → {} finished", kind.verb(), src, path),
            Err(e) if e.is_cancelled() => info!("{} {} → {} cancelled", kind.verb(), src, dst),
            Err(e) => warn!("{} failed: {}", kind.verb(), e),
        }
        result
    }

    // ── Single-path operations ──────────────────────────────────────────

    /// Delete a file or empty directory. Non-permanent local deletes go to
    /// the trash directory; remote deletes are always permanent.
    pub async fn delete(&self, path: &str, permanent: bool) -> OperationResult<()> {
        let (target, strategy) = self.route("delete", path)?;
        let (target, strategy) = (&target, strategy.as_ref());
        let result = self
            .retrying("delete", &TransferControl::new(), move || async move {
                strategy.delete(target, permanent).await
            })
            .await;
        if result.is_ok() {
            info!("deleted {} (permanent: {})", path, permanent);
        }
        Self::settled("delete", path, result)
    }

    /// Rename in place; returns the new path.
    pub async fn rename(&self, path: &str, new_name: &str) -> OperationResult<String> {
        validate_name(new_name).map_err(|e| e.with_source(path).with_dest(new_name))?;
        let (target, strategy) = self.route("rename", path)?;
        let (target, strategy) = (&target, strategy.as_ref());
        let result = self
            .retrying("rename", &TransferControl::new(), move || async move {
                strategy.rename(target, new_name).await
            })
            .await
            .map_err(|e| e.with_dest(new_name));
        if let Ok(renamed) = &result {
            info!("renamed {} → {}", path, renamed);
        }
        Self::settled("rename", path, result)
    }

    pub async fn list(&self, path: &str) -> OperationResult<Vec<FileInfo>> {
        let (target, strategy) = self.route("list", path)?;
        let (target, strategy) = (&target, strategy.as_ref());
        let result = self
            .retrying("list", &TransferControl::new(), move || async move { strategy.list(target).await })
            .await;
        Self::settled("list", path, result)
    }

    pub async fn exists(&self, path: &str) -> OperationResult<bool> {
        let (target, strategy) = self.route("exists", path)?;
        let (target, strategy) = (&target, strategy.as_ref());
        let result = self
            .retrying("exists", &TransferControl::new(), move || async move { strategy.exists(target).await })
            .await;
        Self::settled("exists", path, result)
    }

    pub async fn create_directory(&self, path: &str) -> OperationResult<()> {
        let (target, strategy) = self.route("mkdir", path)?;
        let (target, strategy) = (&target, strategy.as_ref());
        let result = self
            .retrying("mkdir", &TransferControl::new(), move || async move {
                strategy.create_directory(target).await
            })
            .await;
        Self::settled("mkdir", path, result)
    }

    pub async fn get_file_info(&self, path: &str) -> OperationResult<FileInfo> {
        let (target, strategy) = self.route("stat", path)?;
        let (target, strategy) = (&target, strategy.as_ref());
        let result = self
            .retrying("stat", &TransferControl::new(), move || async move {
                strategy.get_file_info(target).await
            })
            .await;
        Self::settled("stat", path, result)
    }

    /// Open a transient connection to the endpoint and list its root.
    pub async fn test_connection(&self, protocol: Protocol, mut params: ConnectionParams) -> OperationResult<bool> {
        params.protocol = protocol;
        if protocol == Protocol::Local {
            return Ok(true);
        }
        let endpoint = format!("{}://{}", protocol, params.host);
        let backend = self.registry.backend(protocol).ok_or_else(|| {
            TransferError::protocol("EUNSUPPORTED", format!("no {} backend configured", protocol))
                .with_source(endpoint.clone())
        })?;
        let params = &params;
        let result = self
            .retrying("test connection", &TransferControl::new(), move || async move {
                backend.test_connection(params).await
            })
            .await
            .map_err(|e| e.with_source(endpoint.clone()));
        match &result {
            Ok(ok) => info!("connection test {}: {}", endpoint, ok),
            Err(e) => warn!("connection test failed: {}", e),
        }
        result
    }

    /// Close every pooled connection and stop the eviction tasks.
    pub async fn shutdown(&self) {
        for task in &self.maintenance {
            task.abort();
        }
        for backend in self.registry.backends() {
            backend.shutdown().await;
        }
        info!("transfer orchestrator shut down");
    }

    // ── Plumbing ────────────────────────────────────────────────────────

    /// Parse `path` and pick the strategy serving its scheme.
    fn route(&self, what: &str, path: &str) -> OperationResult<(TransferTarget, Arc<dyn OperationStrategy>)> {
        let target = TransferTarget::parse(path).map_err(|e| TransferError::from(e).with_source(path))?;
        let strategy = self
            .registry
            .resolve(target.protocol, target.protocol)
            .map_err(|e| e.with_source(path))?;
        debug!("{} {} via {}", what, path, strategy.name());
        Ok((target, strategy))
    }

    fn settled<T>(what: &str, path: &str, result: OperationResult<T>) -> OperationResult<T> {
        result.map_err(|e| {
            let e = e.with_source(path);
            debug!("{} failed: {}", what, e);
            e
        })
    }

    /// Run `attempt`, repeating it after `retryDelayMs` while it fails with
    /// a NETWORK error and retries remain. Every other kind surfaces at once.
    async fn retrying<T, F, Fut>(&self, what: &str, control: &TransferControl, mut attempt: F) -> OperationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OperationResult<T>>,
    {
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.config.max_network_retries && !control.is_cancelled() => {
                    let delay = self.config.retry_delay() * 2u32.saturating_pow(retries);
                    retries += 1;
                    warn!("{} failed ({}), retry {} in {:?}", what, e, retries, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = control.cancelled() => return Err(TransferError::cancelled()),
                    }
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copy,
    Move,
}

impl Transfer {
    fn verb(self) -> &'static str {
        match self {
            Transfer::Copy => "copy",
            Transfer::Move => "move",
        }
    }
}
