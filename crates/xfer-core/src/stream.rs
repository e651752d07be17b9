//! The one streaming loop every backend uses.

use crate::error::{OperationResult, TransferError};
use crate::progress::{ProgressReporter, TransferControl};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Default chunk size for streaming transfers (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 65_536;

#[derive(Debug, Clone)]
pub struct PumpOptions {
    pub buffer_size: usize,
    /// Per-read timeout; `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Expected length, when known up front.
    pub total: Option<u64>,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout: None,
            total: None,
        }
    }
}

impl PumpOptions {
    pub fn with_total(mut self, total: Option<u64>) -> Self {
        self.total = total;
        self
    }
}

/// Copy `reader` into `writer` one buffer at a time.
///
/// Cancellation is checked before every read and every write, so a cancel
/// lands within one buffer of I/O. The writer is flushed on success only;
/// on any error the partial output is left as is for the caller to judge.
pub async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    opts: &PumpOptions,
    reporter: &mut ProgressReporter,
    control: &TransferControl,
) -> OperationResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; opts.buffer_size.max(1)];
    let mut transferred = 0u64;
    reporter.update(0, opts.total);

    loop {
        control.checkpoint()?;
        let read = reader.read(&mut buf);
        let n = match opts.read_timeout {
            Some(limit) => timeout(limit, read)
                .await
                .map_err(|_| TransferError::network(format!("no data for {:?}", limit)))?,
            None => read.await,
        }
        .map_err(|e| TransferError::from_io("read", e))?;
        if n == 0 {
            break;
        }

        control.checkpoint()?;
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| TransferError::from_io("write", e))?;
        transferred += n as u64;
        reporter.update(transferred, opts.total);
    }

    writer
        .flush()
        .await
        .map_err(|e| TransferError::from_io("flush", e))?;
    reporter.finish(transferred, opts.total.or(Some(transferred)));
    Ok(transferred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::progress::ProgressCallback;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Endless stream of zeroes.
    struct Zeroes;

    impl AsyncRead for Zeroes {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let n = buf.remaining();
            buf.put_slice(&vec![0u8; n]);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn copies_everything_and_reports_total() {
        let data = vec![7u8; 200_000];
        let mut out = Vec::new();
        let last = Arc::new(AtomicU64::new(0));
        let seen = last.clone();
        let cb: ProgressCallback = Arc::new(move |p| seen.store(p.bytes_transferred, Ordering::SeqCst));
        let mut reporter = ProgressReporter::new(Some(cb), Duration::from_secs(5));

        let n = pump(
            &mut data.as_slice(),
            &mut out,
            &PumpOptions::default().with_total(Some(200_000)),
            &mut reporter,
            &TransferControl::new(),
        )
        .await
        .unwrap();

        assert_eq!(n, 200_000);
        assert_eq!(out, data);
        assert_eq!(last.load(Ordering::SeqCst), 200_000);
    }

    #[tokio::test]
    async fn cancel_stops_within_one_buffer() {
        const TEN_MB: u64 = 10 * 1024 * 1024;
        let control = TransferControl::new();
        let trigger = control.clone();
        let cb: ProgressCallback = Arc::new(move |p| {
            if p.bytes_transferred >= TEN_MB {
                trigger.cancel();
            }
        });
        let mut reporter = ProgressReporter::new(Some(cb), Duration::ZERO);
        let mut sink = tokio::io::sink();
        let mut counting = CountingWriter { inner: &mut sink, written: 0 };

        let err = pump(
            &mut Zeroes,
            &mut counting,
            &PumpOptions::default().with_total(Some(100 * 1024 * 1024)),
            &mut reporter,
            &control,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(counting.written >= TEN_MB);
        assert!(counting.written <= TEN_MB + DEFAULT_BUFFER_SIZE as u64);
    }

    #[tokio::test]
    async fn stalled_reader_times_out_as_network() {
        let (client, _server) = tokio::io::duplex(64);
        let mut reader = client;
        let mut out = Vec::new();
        let opts = PumpOptions {
            read_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let err = pump(
            &mut reader,
            &mut out,
            &opts,
            &mut ProgressReporter::silent(),
            &TransferControl::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    struct CountingWriter<'a, W> {
        inner: &'a mut W,
        written: u64,
    }

    impl<W: AsyncWrite + Unpin> AsyncWrite for CountingWriter<'_, W> {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let this = &mut *self;
            match Pin::new(&mut *this.inner).poll_write(cx, buf) {
                Poll::Ready(Ok(n)) => {
                    this.written += n as u64;
                    Poll::Ready(Ok(n))
                }
                other => other,
            }
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut *self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut *self.inner).poll_shutdown(cx)
        }
    }
}
