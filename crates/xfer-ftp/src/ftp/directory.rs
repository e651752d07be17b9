//! Directory operations: list, stat, mkdir, rmdir, rename, delete.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::parser;
use crate::ftp::types::*;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use xfer_core::types::{base_name, parent_path};

impl FtpClient {
    // ─── LIST / MLSD ─────────────────────────────────────────────

    /// Directory listing (MLSD when advertised, LIST otherwise).
    pub async fn list(&mut self, path: &str) -> FtpResult<Vec<FtpEntry>> {
        let cmd = if self.features.mlsd {
            format!("MLSD {}", path)
        } else {
            format!("LIST {}", path)
        };
        let body = self.retrieve_text(&cmd).await?;
        Ok(parser::parse_listing(&body))
    }

    /// Run a data command and collect its whole body as text.
    async fn retrieve_text(&mut self, cmd: &str) -> FtpResult<String> {
        let mut ds = self.open_transfer(cmd).await?;
        let mut buf = Vec::new();
        let read = timeout(self.config.read_timeout, ds.read_to_end(&mut buf)).await;
        drop(ds);
        match read {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                self.abandon().await;
                return Err(FtpError::from(e));
            }
            Err(_) => {
                self.abandon().await;
                return Err(FtpError::timeout(format!("listing data stalled for {:?}", self.config.read_timeout)));
            }
        }
        self.finish_transfer().await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    // ─── Stat ────────────────────────────────────────────────────

    /// Facts about one path: MLST when available, otherwise a lookup in
    /// the parent's listing.
    pub async fn stat(&mut self, path: &str) -> FtpResult<FtpEntry> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(FtpEntry {
                name: String::new(),
                kind: FtpEntryKind::Directory,
                size: 0,
                modified: None,
                permissions: None,
                link_target: None,
            });
        }

        if self.features.mlst {
            let resp = self.command_ok(&format!("MLST {}", trimmed)).await?;
            // 250-Listing /foo
            //  type=file;size=1234;modify=20260101120000; /foo
            // 250 End
            let line = resp
                .lines
                .iter()
                .skip(1)
                .find(|l| l.contains('=') && l.contains(';'))
                .ok_or_else(|| FtpError::protocol_error("MLST: no fact line in reply"))?;
            let mut entry = parser::parse_line(line.trim_start())
                .ok_or_else(|| FtpError::protocol_error(format!("MLST: cannot parse '{}'", line)))?;
            entry.name = base_name(trimmed);
            return Ok(entry);
        }

        let name = base_name(trimmed);
        self.list(&parent_path(trimmed))
            .await?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FtpError::not_found(format!("{}: no such file or directory", path)))
    }

    /// SIZE (RFC 3659), when the server has it.
    pub async fn size(&mut self, path: &str) -> FtpResult<Option<u64>> {
        if !self.features.size {
            return Ok(None);
        }
        let resp = self.command(&format!("SIZE {}", path)).await?;
        if !resp.is_success() {
            return Ok(None);
        }
        // "213 12345"
        Ok(resp
            .text()
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.trim().parse::<u64>().ok()))
    }

    // ─── MKD / RMD ───────────────────────────────────────────────

    pub async fn mkdir(&mut self, path: &str) -> FtpResult<()> {
        self.command_ok(&format!("MKD {}", path)).await?;
        Ok(())
    }

    /// Remove an empty directory.
    pub async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        self.command_ok(&format!("RMD {}", path)).await?;
        Ok(())
    }

    // ─── RNFR / RNTO ─────────────────────────────────────────────

    /// Rename (or move) a file or directory.
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        let rnfr = self.command(&format!("RNFR {}", from)).await?;
        if !rnfr.is_intermediate() && !rnfr.is_success() {
            return Err(FtpError::from_reply(rnfr.code, &rnfr.text()));
        }
        self.command_ok(&format!("RNTO {}", to)).await?;
        Ok(())
    }

    // ─── DELE ────────────────────────────────────────────────────

    pub async fn delete(&mut self, path: &str) -> FtpResult<()> {
        self.command_ok(&format!("DELE {}", path)).await?;
        Ok(())
    }
}
