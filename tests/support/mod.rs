//! In-memory `RemoteBackend` over a real `ConnectionPool`, with call
//! recording and failure injection.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use xfer::*;

#[derive(Clone)]
pub enum Blob {
    Bytes(Vec<u8>),
    /// `n` zero bytes, generated on read.
    Zeroes(u64),
}

impl Blob {
    fn len(&self) -> u64 {
        match self {
            Blob::Bytes(b) => b.len() as u64,
            Blob::Zeroes(n) => *n,
        }
    }
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, Blob>,
    dirs: BTreeSet<String>,
    calls: Vec<String>,
    failures: Vec<(&'static str, TransferError)>,
}

pub struct MemoryManager {
    in_use: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

pub struct MemoryConn {
    in_use: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MemoryConn {
    /// Mark the connection busy for the duration of an operation.
    fn busy(&self) -> Busy {
        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Busy(self.in_use.clone())
    }
}

struct Busy(Arc<AtomicUsize>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionManager for MemoryManager {
    type Connection = MemoryConn;

    async fn connect(&self, _key: &ConnectionKey, _credentials: &Credentials) -> OperationResult<MemoryConn> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(MemoryConn {
            in_use: self.in_use.clone(),
            peak: self.peak.clone(),
        })
    }

    fn is_valid(&self, _conn: &MemoryConn) -> bool {
        true
    }

    async fn close(&self, _conn: MemoryConn) {}
}

pub struct MemoryBackend {
    protocol: Protocol,
    pool: ConnectionPool<MemoryManager>,
    resolver: StaticCredentialResolver,
    state: Mutex<State>,
    peak: Arc<AtomicUsize>,
    /// Delay per download chunk, to make concurrent transfers overlap.
    pub chunk_delay: Option<Duration>,
}

impl MemoryBackend {
    pub fn new(protocol: Protocol) -> Self {
        let peak = Arc::new(AtomicUsize::new(0));
        let manager = MemoryManager {
            in_use: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        };
        Self {
            protocol,
            pool: ConnectionPool::new(manager, PoolOptions::default()),
            resolver: StaticCredentialResolver::new(),
            state: Mutex::new(State::default()),
            peak,
            chunk_delay: None,
        }
    }

    fn key(target: &TransferTarget) -> String {
        format!("{}{}", target.host_str(), target.remote_path)
    }

    /// Seed a file at `uri` (e.g. `sftp://host/a/b.bin`).
    pub fn put(&self, uri: &str, blob: Blob) {
        let target = TransferTarget::parse(uri).unwrap();
        self.state.lock().unwrap().files.insert(Self::key(&target), blob);
    }

    pub fn file(&self, uri: &str) -> Option<Vec<u8>> {
        let target = TransferTarget::parse(uri).unwrap();
        match self.state.lock().unwrap().files.get(&Self::key(&target)) {
            Some(Blob::Bytes(b)) => Some(b.clone()),
            Some(Blob::Zeroes(n)) => Some(vec![0; *n as usize]),
            None => None,
        }
    }

    /// Fail the next `op` call with `err`.
    pub fn fail_next(&self, op: &'static str, err: TransferError) {
        self.state.lock().unwrap().failures.push((op, err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded call names only (`"rename"`, `"delete"`, ...).
    pub fn ops(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops().iter().filter(|o| *o == op).count()
    }

    pub fn pool(&self) -> &ConnectionPool<MemoryManager> {
        &self.pool
    }

    /// Most connections ever busy at the same moment.
    pub fn peak_in_use(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: &'static str, target: &TransferTarget) -> OperationResult<PooledConnection<MemoryManager>> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("{} {}", op, Self::key(target)));
            if let Some(i) = state.failures.iter().position(|(o, _)| *o == op) {
                return Err(state.failures.remove(i).1);
            }
        }
        let (key, creds) = resolve_connection(&self.resolver, target, MissingCredentials::Anonymous).await?;
        self.pool.acquire(&key, &creds).await
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn connection_key(&self, target: &TransferTarget) -> OperationResult<ConnectionKey> {
        resolve_connection(&self.resolver, target, MissingCredentials::Anonymous)
            .await
            .map(|(k, _)| k)
    }

    async fn test_connection(&self, params: &ConnectionParams) -> OperationResult<bool> {
        let conn = self.enter("test", &params.root_target()).await?;
        drop(conn);
        Ok(true)
    }

    async fn list(&self, target: &TransferTarget) -> OperationResult<Vec<FileInfo>> {
        let _conn = self.enter("list", target).await?;
        let prefix = format!("{}/", Self::key(target).trim_end_matches('/'));
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .map(|(k, blob)| FileInfo::file(&k[target.host_str().len()..], blob.len()))
            .collect())
    }

    async fn stat(&self, target: &TransferTarget) -> OperationResult<FileInfo> {
        let _conn = self.enter("stat", target).await?;
        let key = Self::key(target);
        let state = self.state.lock().unwrap();
        if let Some(blob) = state.files.get(&key) {
            return Ok(FileInfo::file(&target.remote_path, blob.len()));
        }
        if state.dirs.contains(&key) {
            return Ok(FileInfo::directory(&target.remote_path));
        }
        Err(TransferError::not_found(format!("{} missing", key)))
    }

    async fn download(
        &self,
        target: &TransferTarget,
        sink: &mut DynWriter<'_>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let conn = self.enter("download", target).await?;
        let _busy = conn.busy();
        let blob = self
            .state
            .lock()
            .unwrap()
            .files
            .get(&Self::key(target))
            .cloned()
            .ok_or_else(|| TransferError::not_found(target.remote_path.clone()))?;
        let opts = PumpOptions {
            total: target.size_bytes.or(Some(blob.len())),
            ..PumpOptions::default()
        };
        if let Some(delay) = self.chunk_delay {
            tokio::time::sleep(delay).await;
        }
        match blob {
            Blob::Bytes(bytes) => pump(&mut bytes.as_slice(), sink, &opts, reporter, control).await,
            Blob::Zeroes(n) => pump(&mut tokio::io::repeat(0).take(n), sink, &opts, reporter, control).await,
        }
    }

    async fn upload(
        &self,
        target: &TransferTarget,
        source: &mut DynReader<'_>,
        size: Option<u64>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let conn = self.enter("upload", target).await?;
        let _busy = conn.busy();
        let mut data = Vec::new();
        let opts = PumpOptions::default().with_total(size);
        let n = pump(source, &mut data, &opts, reporter, control).await?;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(Self::key(target), Blob::Bytes(data));
        Ok(n)
    }

    async fn delete(&self, target: &TransferTarget) -> OperationResult<()> {
        let _conn = self.enter("delete", target).await?;
        self.state
            .lock()
            .unwrap()
            .files
            .remove(&Self::key(target))
            .map(drop)
            .ok_or_else(|| TransferError::not_found(target.remote_path.clone()))
    }

    async fn remove_dir(&self, target: &TransferTarget) -> OperationResult<()> {
        let _conn = self.enter("rmdir", target).await?;
        self.state.lock().unwrap().dirs.remove(&Self::key(target));
        Ok(())
    }

    async fn rename(&self, from: &TransferTarget, to: &TransferTarget) -> OperationResult<()> {
        let _conn = self.enter("rename", from).await?;
        let mut state = self.state.lock().unwrap();
        let blob = state
            .files
            .remove(&Self::key(from))
            .ok_or_else(|| TransferError::not_found(from.remote_path.clone()))?;
        state.files.insert(Self::key(to), blob);
        Ok(())
    }

    async fn mkdir(&self, target: &TransferTarget) -> OperationResult<()> {
        let _conn = self.enter("mkdir", target).await?;
        self.state.lock().unwrap().dirs.insert(Self::key(target));
        Ok(())
    }

    fn spawn_maintenance(&self, interval: Duration) -> Option<JoinHandle<()>> {
        Some(self.pool.spawn_maintenance(interval))
    }

    async fn shutdown(&self) {
        self.pool.close_all().await;
    }
}

/// Config with fast retries, unthrottled progress and a private staging dir.
pub fn config(scratch: &std::path::Path) -> TransferConfig {
    TransferConfig {
        retry_delay_ms: 1,
        progress_interval_ms: 0,
        staging_dir: Some(scratch.join("stage")),
        trash_dir: Some(scratch.join("trash")),
        ..TransferConfig::default()
    }
}

pub fn collector() -> (ProgressCallback, Arc<Mutex<Vec<TransferProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
    (cb, seen)
}

pub fn staging_is_empty(scratch: &std::path::Path) -> bool {
    match std::fs::read_dir(scratch.join("stage")) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
