//! One authenticated smbclient "session".
//!
//! There is no long-lived socket: a session is a validated login plus the
//! authentication file every command reads. It is pooled so the login is
//! checked once per key and the file outlives individual commands.

use crate::smb::command::{self, Invocation};
use crate::smb::error::poisons_session;
use crate::smb::parser::{parse_ls, parse_shares};
use crate::smb::types::*;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use xfer_core::types::{base_name, parent_path};
use xfer_core::{ErrorKind, FileInfo, OperationResult, TransferError};

pub struct SmbSession {
    pub(crate) config: SmbSessionConfig,
    auth_file: NamedTempFile,
    pub connected_at: DateTime<Utc>,
    poisoned: bool,
}

impl SmbSession {
    /// Write the auth file and prove the login with a share enumeration.
    pub async fn connect(config: SmbSessionConfig) -> OperationResult<Self> {
        let mut auth_file = tempfile::Builder::new()
            .prefix("xfer-smb-")
            .tempfile()
            .map_err(|e| TransferError::from_io("smbclient auth file", e))?;
        restrict(auth_file.path())?;
        auth_file
            .write_all(config.auth_file_contents().as_bytes())
            .and_then(|_| auth_file.flush())
            .map_err(|e| TransferError::from_io("smbclient auth file", e))?;

        let session = Self {
            config,
            auth_file,
            connected_at: Utc::now(),
            poisoned: false,
        };

        match session.enumerate().await {
            Ok(shares) => info!(
                "SMB session {}@{} ready ({} shares)",
                session.config.username,
                session.config.host,
                shares.len()
            ),
            // Servers may refuse enumeration to a user who can still open shares.
            Err(e) if is_fatal_at_login(&e) => return Err(e),
            Err(e) => warn!("SMB share enumeration on {} refused: {}", session.config.host, e),
        }
        Ok(session)
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn auth_path(&self) -> &Path {
        self.auth_file.path()
    }

    pub(crate) fn guard<T>(&mut self, result: OperationResult<T>) -> OperationResult<T> {
        if let Err(e) = &result {
            if poisons_session(e) && !self.poisoned {
                warn!("SMB session {}@{} dropped: {}", self.config.username, self.config.host, e);
                self.poisoned = true;
            }
        }
        result
    }

    /// Run one `-c` command against `share` and return its stdout.
    pub(crate) async fn exec(&mut self, share: &str, command: &str) -> OperationResult<String> {
        if self.poisoned {
            return Err(TransferError::network("SMB session is no longer usable"));
        }
        let result = command::run(&self.config, self.auth_file.path(), Invocation::Share { share, command })
            .await
            .map_err(TransferError::from);
        self.guard(result)
    }

    // ── Shares ───────────────────────────────────────────────────────

    async fn enumerate(&self) -> OperationResult<Vec<ShareInfo>> {
        let out = command::run(&self.config, self.auth_file.path(), Invocation::ListShares).await?;
        Ok(parse_shares(&out))
    }

    pub async fn list_shares(&mut self) -> OperationResult<Vec<ShareInfo>> {
        let result = self.enumerate().await;
        self.guard(result)
    }

    // ── Directory operations ─────────────────────────────────────────

    pub async fn list(&mut self, share: &str, path: &str) -> OperationResult<Vec<FileInfo>> {
        let pattern = quote_remote(&format!("{}/*", path.trim_end_matches('/')))?;
        let out = self.exec(share, &format!("ls {}", pattern)).await?;
        Ok(parse_ls(&out).into_iter().map(|e| e.into_file_info(path)).collect())
    }

    pub async fn stat(&mut self, share: &str, path: &str) -> OperationResult<FileInfo> {
        if path.trim_matches('/').is_empty() {
            return Ok(FileInfo::directory("/"));
        }
        let name = base_name(path);
        let out = self.exec(share, &format!("ls {}", quote_remote(path)?)).await?;
        parse_ls(&out)
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(&name))
            .map(|e| {
                let mut info = e.into_file_info(&parent_path(path));
                info.path = path.to_string();
                info
            })
            .ok_or_else(|| TransferError::not_found(format!("{} not found on //{}/{}", path, self.config.host, share)))
    }

    pub async fn delete(&mut self, share: &str, path: &str) -> OperationResult<()> {
        self.exec(share, &format!("del {}", quote_remote(path)?)).await.map(drop)
    }

    pub async fn rmdir(&mut self, share: &str, path: &str) -> OperationResult<()> {
        self.exec(share, &format!("rmdir {}", quote_remote(path)?)).await.map(drop)
    }

    pub async fn mkdir(&mut self, share: &str, path: &str) -> OperationResult<()> {
        self.exec(share, &format!("mkdir {}", quote_remote(path)?)).await.map(drop)
    }

    pub async fn rename(&mut self, share: &str, from: &str, to: &str) -> OperationResult<()> {
        let cmd = format!("rename {} {}", quote_remote(from)?, quote_remote(to)?);
        self.exec(share, &cmd).await.map(drop)
    }

    pub async fn disconnect(self) {
        let target = format!("{}@{}", self.config.username, self.config.host);
        if let Err(e) = self.auth_file.close() {
            warn!("SMB auth file for {} not removed: {}", target, e);
        }
        info!("SMB session {} closed", target);
    }
}

fn is_fatal_at_login(e: &TransferError) -> bool {
    matches!(e.kind, ErrorKind::Authentication | ErrorKind::Network)
        || e.code.as_deref() == Some("SMBCLIENT_MISSING")
}

#[cfg(unix)]
fn restrict(path: &Path) -> OperationResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| TransferError::from_io("smbclient auth file", e))
}

#[cfg(not(unix))]
fn restrict(_path: &Path) -> OperationResult<()> {
    Ok(())
}
