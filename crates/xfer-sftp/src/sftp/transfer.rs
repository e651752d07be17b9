// ── Transfer engine – chunked streaming between libssh2 and async I/O ────────
//
// The blocking side owns the remote file handle and moves whole chunks
// through a bounded channel. Progress, cancellation and read timeouts are
// handled on the async side, so a cancel lands within one chunk.

use crate::sftp::error::{classify, classify_io, poisons_session};
use crate::sftp::session::{SftpSession, SharedHandle};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::timeout;
use xfer_core::{pump, DynReader, DynWriter, OperationResult, ProgressReporter, PumpOptions, TransferControl, TransferError};

/// Chunks in flight between the two sides.
const CHANNEL_DEPTH: usize = 4;

impl SftpSession {
    // ── Download ─────────────────────────────────────────────────────────────

    pub async fn download_to(
        &mut self,
        path: &str,
        sink: &mut DynWriter<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        control.checkpoint()?;
        let total = match opts.total {
            Some(t) => t,
            None => self.stat(path).await?.size,
        };
        if self.is_poisoned() {
            return Err(TransferError::network("SFTP session is no longer usable"));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let handle = self.handle.clone();
        let remote = PathBuf::from(path);
        let chunk = opts.buffer_size.max(1);
        let worker = tokio::task::spawn_blocking(move || read_worker(handle, remote, chunk, tx));

        let mut reader = ChannelReader::new(rx);
        let result = pump(&mut reader, sink, &opts.with_total(Some(total)), reporter, control).await;
        // Dropping the receiver stops the worker at its next chunk.
        drop(reader);
        match &result {
            Err(e) if poisons_session(e) => {}
            _ => {
                let _ = worker.await;
            }
        }
        if result.is_ok() {
            log::debug!("SFTP download {} complete", path);
        }
        self.guard(result)
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    pub async fn upload_from(
        &mut self,
        path: &str,
        source: &mut DynReader<'_>,
        size: Option<u64>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        control.checkpoint()?;
        if self.is_poisoned() {
            return Err(TransferError::network("SFTP session is no longer usable"));
        }

        let (tx, rx) = mpsc::channel::<Vec<u8>>(CHANNEL_DEPTH);
        let handle = self.handle.clone();
        let remote = PathBuf::from(path);
        let worker = tokio::task::spawn_blocking(move || write_worker(handle, remote, rx));

        let total = size.or(opts.total);
        let mut buf = vec![0u8; opts.buffer_size.max(1)];
        let mut sent = 0u64;
        reporter.update(0, total);

        let fed: OperationResult<()> = async {
            loop {
                control.checkpoint()?;
                let read = source.read(&mut buf);
                let n = match opts.read_timeout {
                    Some(limit) => timeout(limit, read)
                        .await
                        .map_err(|_| TransferError::network(format!("no data for {:?}", limit)))?,
                    None => read.await,
                }
                .map_err(|e| TransferError::from_io("read", e))?;
                if n == 0 {
                    return Ok(());
                }
                control.checkpoint()?;
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    // The worker stopped early; its result says why.
                    return Ok(());
                }
                sent += n as u64;
                reporter.update(sent, total);
            }
        }
        .await;
        drop(tx);

        let written = worker
            .await
            .map_err(|e| TransferError::unknown(format!("SFTP upload task failed: {}", e)))
            .and_then(|r| r);
        let result = match (fed, written) {
            (Err(e), _) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(n)) => {
                reporter.finish(n, total.or(Some(n)));
                log::debug!("SFTP upload {} complete ({} bytes)", path, n);
                Ok(n)
            }
        };
        self.guard(result)
    }
}

fn tunnel(e: TransferError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

fn read_worker(handle: SharedHandle, path: PathBuf, chunk: usize, tx: mpsc::Sender<io::Result<Vec<u8>>>) {
    let h = match handle.lock() {
        Ok(h) => h,
        Err(_) => {
            let _ = tx.blocking_send(Err(tunnel(TransferError::unknown("SFTP session lock poisoned"))));
            return;
        }
    };
    let mut file = match h.sftp.open(&path) {
        Ok(f) => f,
        Err(e) => {
            let _ = tx.blocking_send(Err(tunnel(classify(&e))));
            return;
        }
    };
    let mut buf = vec![0u8; chunk];
    loop {
        match file.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(tunnel(classify_io(e))));
                return;
            }
        }
    }
}

fn write_worker(handle: SharedHandle, path: PathBuf, mut rx: mpsc::Receiver<Vec<u8>>) -> OperationResult<u64> {
    let h = handle
        .lock()
        .map_err(|_| TransferError::unknown("SFTP session lock poisoned"))?;
    let mut file = h.sftp.create(&path).map_err(|e| classify(&e))?;
    let mut written = 0u64;
    while let Some(chunk) = rx.blocking_recv() {
        file.write_all(&chunk).map_err(classify_io)?;
        written += chunk.len() as u64;
    }
    file.close().map_err(|e| classify(&e))?;
    Ok(written)
}

// ── Channel → AsyncRead adapter ──────────────────────────────────────────────

/// Presents the worker's chunks as a byte stream for the shared pump.
struct ChannelReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl AsyncRead for ChannelReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.pos >= this.chunk.len() {
            match ready!(this.rx.poll_recv(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => return Poll::Ready(Ok(())),
            }
        }
        let n = (this.chunk.len() - this.pos).min(buf.remaining());
        buf.put_slice(&this.chunk[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}
