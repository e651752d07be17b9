//! File transfers: RETR / STOR streaming.
//!
//! The client only opens the data connection; the caller drives the bytes
//! through the shared pump and then either calls
//! [`FtpClient::finish_transfer`] or, on any error, [`FtpClient::abandon`].

use crate::ftp::client::FtpClient;
use crate::ftp::error::FtpResult;
use crate::ftp::transfer::DataStream;
use tokio::io::AsyncWriteExt;
use xfer_core::{pump, DynReader, DynWriter, OperationResult, ProgressReporter, PumpOptions, TransferControl};

impl FtpClient {
    /// Issue RETR; returns the data stream and the size reported by SIZE.
    pub async fn begin_download(&mut self, path: &str) -> FtpResult<(DataStream, Option<u64>)> {
        let size = self.size(path).await?;
        let ds = self.open_transfer(&format!("RETR {}", path)).await?;
        Ok((ds, size))
    }

    /// Issue STOR; the caller writes the body into the returned stream.
    pub async fn begin_upload(&mut self, path: &str) -> FtpResult<DataStream> {
        self.open_transfer(&format!("STOR {}", path)).await
    }

    /// RETR `path` into `sink`.
    pub async fn download_into(
        &mut self,
        path: &str,
        sink: &mut DynWriter<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        control.checkpoint()?;
        let (mut ds, size) = self.begin_download(path).await?;
        let total = size.or(opts.total);
        let opts = opts.with_total(total);

        match pump(&mut ds, sink, &opts, reporter, control).await {
            Ok(n) => {
                drop(ds);
                self.finish_transfer().await?;
                log::debug!("RETR {} complete ({} bytes)", path, n);
                Ok(n)
            }
            Err(e) => {
                drop(ds);
                self.abandon().await;
                Err(e)
            }
        }
    }

    /// STOR `source` to `path`.
    pub async fn upload_from(
        &mut self,
        path: &str,
        source: &mut DynReader<'_>,
        opts: PumpOptions,
        reporter: &mut ProgressReporter,
        control: &TransferControl,
    ) -> OperationResult<u64> {
        control.checkpoint()?;
        let mut ds = self.begin_upload(path).await?;

        let sent = match pump(source, &mut ds, &opts, reporter, control).await {
            Ok(n) => n,
            Err(e) => {
                drop(ds);
                self.abandon().await;
                return Err(e);
            }
        };
        // End of file is signalled by closing the data connection.
        if let Err(e) = ds.shutdown().await {
            drop(ds);
            self.abandon().await;
            return Err(xfer_core::TransferError::from_io("closing data connection", e));
        }
        drop(ds);
        self.finish_transfer().await?;
        log::debug!("STOR {} complete ({} bytes)", path, sent);
        Ok(sent)
    }
}
