// ── Streamed GET / PUT ───────────────────────────────────────────────────────

use crate::webdav::client::DavClient;
use crate::webdav::error::classify_reqwest;
use bytes::Bytes;
use futures::StreamExt;
use log::info;
use reqwest::{header, Body, Method};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use xfer_core::{DynReader, DynWriter, OperationResult, ProgressReporter, PumpOptions, TransferControl, TransferError};

/// Chunks buffered between the source reader and the request body.
const BODY_QUEUE: usize = 4;

fn stalled(what: &str, opts: &PumpOptions) -> TransferError {
    TransferError::network(format!("{}: no data for {:?}", what, opts.read_timeout.unwrap_or_default()))
        .with_code("ETIMEDOUT")
}

impl DavClient {
    /// GET `path` and stream the body into `sink`.
    pub async fn download_to(
        &mut self,
        path: &str,
        sink: &mut DynWriter<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let result = self.get_into(path, sink, opts, reporter, control).await;
        self.guard(result)
    }

    async fn get_into(
        &self,
        path: &str,
        sink: &mut DynWriter<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let url = self.endpoint.url(path, false);
        let resp = self.send_with_retry(self.request(Method::GET, &url), "GET").await?;
        let resp = Self::expect_success(resp, "GET").await?;
        let total = opts.total.or(resp.content_length());

        let mut body = resp.bytes_stream();
        let mut copied = 0u64;
        reporter.update(0, total);
        loop {
            control.checkpoint()?;
            let next = match opts.read_timeout {
                Some(limit) => timeout(limit, body.next()).await.map_err(|_| stalled("GET", &opts))?,
                None => body.next().await,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| classify_reqwest("GET body", e))?;
            control.checkpoint()?;
            sink.write_all(&chunk)
                .await
                .map_err(|e| TransferError::from_io("write", e))?;
            copied += chunk.len() as u64;
            reporter.update(copied, total);
        }

        if let Some(expected) = total {
            if copied < expected {
                return Err(TransferError::network(format!(
                    "GET {} ended after {} of {} bytes",
                    url, copied, expected
                )));
            }
        }
        sink.flush().await.map_err(|e| TransferError::from_io("flush", e))?;
        reporter.finish(copied, total.or(Some(copied)));
        info!("WebDAV downloaded {} ({} bytes)", url, copied);
        Ok(copied)
    }

    /// PUT `path` with a body streamed from `source`.
    pub async fn upload_from(
        &mut self,
        path: &str,
        source: &mut DynReader<'_>,
        size: Option<u64>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let result = self.put_from(path, source, size, opts, reporter, control).await;
        self.guard(result)
    }

    async fn put_from(
        &self,
        path: &str,
        source: &mut DynReader<'_>,
        size: Option<u64>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        let url = self.endpoint.url(path, false);
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(BODY_QUEUE);
        let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });

        let mut req = self
            .request(Method::PUT, &url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(stream));
        if let Some(len) = size {
            req = req.header(header::CONTENT_LENGTH, len);
        }
        // The body borrows nothing, so the request runs on its own task while
        // this one reads the source.
        let request = tokio::spawn(req.send());

        let fed = feed(source, tx, &opts, reporter, control).await;
        let sent = match fed {
            Ok(n) => n,
            Err(e) => {
                request.abort();
                return Err(e);
            }
        };

        let resp = request
            .await
            .map_err(|e| TransferError::unknown(format!("PUT task failed: {}", e)))?
            .map_err(|e| classify_reqwest("PUT", e))?;
        Self::expect_success(resp, "PUT").await?;
        reporter.finish(sent, size.or(Some(sent)));
        info!("WebDAV uploaded {} ({} bytes)", url, sent);
        Ok(sent)
    }
}

/// Read `source` into the body channel. A closed channel means the server
/// answered early; the response explains why.
async fn feed(
    source: &mut DynReader<'_>,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    opts: &PumpOptions,
    reporter: &mut ProgressReporter,
    control: &TransferControl,
) -> OperationResult<u64> {
    let mut buf = vec![0u8; opts.buffer_size.max(1)];
    let mut sent = 0u64;
    reporter.update(0, opts.total);
    loop {
        control.checkpoint()?;
        let read = source.read(&mut buf);
        let n = match opts.read_timeout {
            Some(limit) => timeout(limit, read).await.map_err(|_| stalled("PUT source", opts))?,
            None => read.await,
        }
        .map_err(|e| TransferError::from_io("read", e))?;
        if n == 0 {
            break;
        }
        control.checkpoint()?;
        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
            break;
        }
        sent += n as u64;
        reporter.update(sent, opts.total);
    }
    Ok(sent)
}
