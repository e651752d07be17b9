//! Explicit `(source scheme, destination scheme) → strategy` table, built
//! once when the orchestrator is assembled.

use crate::transfer::direct::DirectStrategy;
use crate::transfer::local::LocalStrategy;
use crate::transfer::remote::RemoteStrategy;
use crate::transfer::staged::StagedStrategy;
use crate::transfer::strategy::OperationStrategy;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use xfer_core::{OperationResult, Protocol, RemoteBackend, TransferConfig, TransferError};

struct Registration {
    src: Protocol,
    dst: Protocol,
    strategy: Arc<dyn OperationStrategy>,
}

#[derive(Default)]
pub struct StrategyRegistry {
    entries: Vec<Registration>,
    backends: BTreeMap<Protocol, Arc<dyn RemoteBackend>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every pair the given backends can serve: local↔local,
    /// each protocol with itself, local↔each remote, and every ordered pair
    /// of distinct remotes.
    pub fn with_backends(config: &TransferConfig, backends: Vec<Arc<dyn RemoteBackend>>) -> Self {
        let mut registry = Self::new();
        for backend in backends {
            registry.add_backend(backend);
        }
        registry.register_defaults(config);
        registry
    }

    pub fn add_backend(&mut self, backend: Arc<dyn RemoteBackend>) {
        self.backends.insert(backend.protocol(), backend);
    }

    /// Append one entry. Earlier entries win, so custom registrations go
    /// before [`register_defaults`](Self::register_defaults).
    pub fn register(&mut self, src: Protocol, dst: Protocol, strategy: Arc<dyn OperationStrategy>) {
        debug!("registry: {} → {} served by {}", src, dst, strategy.name());
        self.entries.push(Registration { src, dst, strategy });
    }

    pub fn register_defaults(&mut self, config: &TransferConfig) {
        self.register(
            Protocol::Local,
            Protocol::Local,
            Arc::new(LocalStrategy::new(config.clone())),
        );
        let backends: Vec<_> = self.backends.values().cloned().collect();
        for backend in &backends {
            let p = backend.protocol();
            self.register(p, p, Arc::new(RemoteStrategy::new(backend.clone(), config.clone())));
            let direct: Arc<dyn OperationStrategy> = Arc::new(DirectStrategy::new(backend.clone(), config.clone()));
            self.register(Protocol::Local, p, direct.clone());
            self.register(p, Protocol::Local, direct);
        }
        for from in &backends {
            for to in &backends {
                if from.protocol() != to.protocol() {
                    self.register(
                        from.protocol(),
                        to.protocol(),
                        Arc::new(StagedStrategy::new(from.clone(), to.clone(), config.clone())),
                    );
                }
            }
        }
    }

    /// First registered strategy for the pair.
    pub fn resolve(&self, src: Protocol, dst: Protocol) -> OperationResult<Arc<dyn OperationStrategy>> {
        self.entries
            .iter()
            .find(|r| r.src == src && r.dst == dst && r.strategy.supports(src, dst))
            .map(|r| r.strategy.clone())
            .ok_or_else(|| {
                TransferError::protocol("EUNSUPPORTED", format!("no strategy for {} → {}", src, dst))
            })
    }

    pub fn backend(&self, protocol: Protocol) -> Option<&Arc<dyn RemoteBackend>> {
        self.backends.get(&protocol)
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn RemoteBackend>> {
        self.backends.values()
    }

    /// `(src, dst, strategy name)` in lookup order.
    pub fn pairs(&self) -> Vec<(Protocol, Protocol, &'static str)> {
        self.entries
            .iter()
            .map(|r| (r.src, r.dst, r.strategy.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use xfer_core::{
        ConnectionKey, ConnectionParams, DynReader, DynWriter, FileInfo, ProgressReporter, TransferControl,
        TransferTarget,
    };

    /// Backend that only answers `protocol()`.
    struct Stub(Protocol);

    #[async_trait]
    impl RemoteBackend for Stub {
        fn protocol(&self) -> Protocol {
            self.0
        }
        async fn connection_key(&self, _: &TransferTarget) -> OperationResult<ConnectionKey> {
            unimplemented!()
        }
        async fn test_connection(&self, _: &ConnectionParams) -> OperationResult<bool> {
            unimplemented!()
        }
        async fn list(&self, _: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
            unimplemented!()
        }
        async fn stat(&self, _: &TransferTarget) -> OperationResult<FileInfo> {
            unimplemented!()
        }
        async fn download(
            &self,
            _: &TransferTarget,
            _: &mut DynWriter<'_>,
            _: &mut ProgressReporter,
            _: &TransferControl,
        ) -> OperationResult<u64> {
            unimplemented!()
        }
        async fn upload(
            &self,
            _: &TransferTarget,
            _: &mut DynReader<'_>,
            _: Option<u64>,
            _: &mut ProgressReporter,
            _: &TransferControl,
        ) -> OperationResult<u64> {
            unimplemented!()
        }
        async fn delete(&self, _: &TransferTarget) -> OperationResult<()> {
            unimplemented!()
        }
        async fn remove_dir(&self, _: &TransferTarget) -> OperationResult<()> {
            unimplemented!()
        }
        async fn rename(&self, _: &TransferTarget, _: &TransferTarget) -> OperationResult<()> {
            unimplemented!()
        }
        async fn mkdir(&self, _: &TransferTarget) -> OperationResult<()> {
            unimplemented!()
        }
        fn spawn_maintenance(&self, _: Duration) -> Option<JoinHandle<()>> {
            None
        }
        async fn shutdown(&self) {}
    }

    fn registry() -> StrategyRegistry {
        StrategyRegistry::with_backends(
            &TransferConfig::default(),
            vec![Arc::new(Stub(Protocol::Smb)), Arc::new(Stub(Protocol::Ftp))],
        )
    }

    #[test]
    fn every_pair_is_registered_once() {
        let r = registry();
        let pairs = r.pairs();
        // local/local, 2 same-scheme, 4 direct, 2 staged
        assert_eq!(pairs.len(), 9);
        let mut keys: Vec<_> = pairs.iter().map(|(s, d, _)| (*s, *d)).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 9, "pairs must be unique");
    }

    #[test]
    fn resolves_by_scheme_pair() {
        let r = registry();
        assert_eq!(r.resolve(Protocol::Local, Protocol::Local).unwrap().name(), "local");
        assert_eq!(r.resolve(Protocol::Smb, Protocol::Smb).unwrap().name(), "remote");
        assert_eq!(r.resolve(Protocol::Local, Protocol::Ftp).unwrap().name(), "direct");
        assert_eq!(r.resolve(Protocol::Ftp, Protocol::Local).unwrap().name(), "direct");
        assert_eq!(r.resolve(Protocol::Smb, Protocol::Ftp).unwrap().name(), "staged");
        assert_eq!(r.resolve(Protocol::Ftp, Protocol::Smb).unwrap().name(), "staged");
    }

    #[test]
    fn unregistered_protocol_is_unsupported() {
        let err = registry().resolve(Protocol::Sftp, Protocol::Local).err().unwrap();
        assert_eq!(err.code.as_deref(), Some("EUNSUPPORTED"));
    }

    #[test]
    fn earlier_registration_wins() {
        let mut r = StrategyRegistry::new();
        let config = TransferConfig::default();
        r.register(Protocol::Local, Protocol::Local, Arc::new(LocalStrategy::new(config.clone())));
        r.add_backend(Arc::new(Stub(Protocol::Ftp)));
        r.register_defaults(&config);
        let hits = r
            .pairs()
            .into_iter()
            .filter(|(s, d, _)| *s == Protocol::Local && *d == Protocol::Local)
            .count();
        assert_eq!(hits, 2);
        assert!(r.resolve(Protocol::Local, Protocol::Local).is_ok());
    }
}
