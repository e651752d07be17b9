//! File transfers through a local spool file.
//!
//! smbclient only moves whole files between a share and a local path, so
//! downloads `get` into a spool that is tailed while the child writes it,
//! and uploads spool the source first and then `put` it.

use crate::smb::command::{self, check, Invocation};
use crate::smb::error::SmbError;
use crate::smb::session::SmbSession;
use crate::smb::types::{quote_local, quote_remote};
use log::{debug, info};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use xfer_core::{
    pump, DynReader, DynWriter, OperationResult, ProgressReporter, PumpOptions, TransferControl, TransferError,
    DEFAULT_BUFFER_SIZE,
};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Slowest `put` throughput tolerated before the upload counts as stalled.
const MIN_PUT_RATE: u64 = 1024 * 1024;

/// Collect a child pipe in the background so it can never fill and block.
fn drain<R: AsyncRead + Unpin + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

struct Running {
    child: Child,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl Running {
    fn start(session: &SmbSession, share: &str, command: &str) -> OperationResult<Self> {
        let mut child = command::spawn(&session.config, session.auth_path(), Invocation::Share { share, command })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        Ok(Self { child, stdout, stderr })
    }

    /// `Some(())` once the child has exited cleanly.
    async fn poll_exit(&mut self) -> OperationResult<Option<()>> {
        let status = match self.child.try_wait().map_err(SmbError::Io)? {
            Some(status) => status,
            None => return Ok(None),
        };
        let out = (&mut self.stdout).await.unwrap_or_default();
        let err = (&mut self.stderr).await.unwrap_or_default();
        check(status, &out, &err)?;
        Ok(Some(()))
    }

    async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("smbclient kill: {}", e);
        }
        self.stdout.abort();
        self.stderr.abort();
    }
}

fn spool_file(session: &SmbSession) -> OperationResult<NamedTempFile> {
    let dir = &session.config.spool_dir;
    std::fs::create_dir_all(dir).map_err(|e| TransferError::from_io("SMB spool directory", e))?;
    tempfile::Builder::new()
        .prefix("smb-spool-")
        .tempfile_in(dir)
        .map_err(|e| TransferError::from_io("SMB spool file", e))
}

impl SmbSession {
    // ── Download ─────────────────────────────────────────────────────

    pub async fn download_to(
        &mut self,
        share: &str,
        path: &str,
        sink: &mut DynWriter<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        if self.is_poisoned() {
            return Err(TransferError::network("SMB session is no longer usable"));
        }
        let total = match opts.total {
            Some(t) => Some(t),
            None => Some(self.stat(share, path).await?.size),
        };
        let result = self.tail_get(share, path, sink, total, reporter, control).await;
        self.guard(result)
    }

    async fn tail_get(
        &self,
        share: &str,
        path: &str,
        sink: &mut DynWriter<'_>,
        total: Option<u64>,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let spool = spool_file(self)?;
        let cmd = format!("get {} {}", quote_remote(path)?, quote_local(spool.path())?);
        let mut tail = tokio::fs::File::open(spool.path())
            .await
            .map_err(|e| TransferError::from_io("SMB spool file", e))?;
        let mut running = Running::start(self, share, &cmd)?;

        let stall = self.config.stall_timeout;
        let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
        let mut copied = 0u64;
        let mut last_growth = Instant::now();
        let mut exited = false;
        reporter.update(0, total);

        loop {
            if control.is_cancelled() {
                running.kill().await;
                return Err(TransferError::cancelled());
            }
            let n = tail
                .read(&mut buf)
                .await
                .map_err(|e| TransferError::from_io("SMB spool read", e))?;
            if n > 0 {
                sink.write_all(&buf[..n])
                    .await
                    .map_err(|e| TransferError::from_io("write", e))?;
                copied += n as u64;
                last_growth = Instant::now();
                reporter.update(copied, total);
                continue;
            }
            // At EOF of what has been written so far.
            if exited {
                break;
            }
            match running.poll_exit().await {
                Ok(Some(())) => {
                    // One more pass picks up whatever landed before exit.
                    exited = true;
                    continue;
                }
                Ok(None) => {}
                Err(e) => return Err(e),
            }
            if last_growth.elapsed() >= stall {
                running.kill().await;
                return Err(TransferError::network(format!("SMB download of {} stalled for {:?}", path, stall))
                    .with_code("ETIMEDOUT"));
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = control.cancelled() => {}
            }
        }

        if let Some(expected) = total {
            if copied < expected {
                return Err(TransferError::network(format!(
                    "SMB download of {} ended after {} of {} bytes",
                    path, copied, expected
                )));
            }
        }
        sink.flush().await.map_err(|e| TransferError::from_io("flush", e))?;
        reporter.finish(copied, total.or(Some(copied)));
        info!("SMB downloaded //{}/{}{} ({} bytes)", self.config.host, share, path, copied);
        Ok(copied)
    }

    // ── Upload ───────────────────────────────────────────────────────

    pub async fn upload_from(
        &mut self,
        share: &str,
        path: &str,
        source: &mut DynReader<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        if self.is_poisoned() {
            return Err(TransferError::network("SMB session is no longer usable"));
        }
        let spool = spool_file(self)?;
        let mut file = tokio::fs::File::create(spool.path())
            .await
            .map_err(|e| TransferError::from_io("SMB spool file", e))?;
        // Spooling is local; nothing has reached the share until `put` exits.
        let total = opts.total;
        reporter.update(0, total);
        let written = pump(source, &mut file, &opts, &mut ProgressReporter::silent(), control).await?;
        drop(file);

        let cmd = format!("put {} {}", quote_local(spool.path())?, quote_remote(path)?);
        let budget = self.config.command_timeout + Duration::from_secs(written / MIN_PUT_RATE);
        let result = self.put_spool(share, &cmd, budget, control).await;
        let result = self.guard(result).map(|_| written);
        if result.is_ok() {
            reporter.finish(written, total.or(Some(written)));
            info!("SMB uploaded //{}/{}{} ({} bytes)", self.config.host, share, path, written);
        }
        result
    }

    async fn put_spool(
        &self,
        share: &str,
        cmd: &str,
        budget: Duration,
        control: &TransferControl,
    ) -> OperationResult<()> {
        let mut running = Running::start(self, share, cmd)?;
        let started = Instant::now();
        loop {
            if control.is_cancelled() {
                running.kill().await;
                return Err(TransferError::cancelled());
            }
            if running.poll_exit().await?.is_some() {
                return Ok(());
            }
            if started.elapsed() >= budget {
                running.kill().await;
                return Err(TransferError::network(format!("SMB put did not finish within {:?}", budget))
                    .with_code("ETIMEDOUT"));
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = control.cancelled() => {}
            }
        }
    }
}
