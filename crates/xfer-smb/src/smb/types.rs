//! Session options and path helpers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use xfer_core::{Credentials, TransferConfig, TransferError};

/// Everything needed to drive `smbclient` against one host.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbSessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub workgroup: Option<String>,
    #[serde(default)]
    pub protocol_max: Option<String>,
    pub smbclient_path: String,
    /// Bound on short commands (`ls`, `del`, `mkdir`, ...).
    #[serde(skip, default = "default_timeout")]
    pub command_timeout: Duration,
    /// Bound on a transfer making no visible progress.
    #[serde(skip, default = "default_timeout")]
    pub stall_timeout: Duration,
    #[serde(skip)]
    pub spool_dir: PathBuf,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl SmbSessionConfig {
    pub fn new(host: &str, port: u16, credentials: &Credentials, config: &TransferConfig) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: credentials.username.clone(),
            password: credentials.secret.clone(),
            domain: credentials.domain.clone().filter(|d| !d.is_empty()),
            workgroup: config.smb.workgroup.clone(),
            protocol_max: config.smb.protocol_max.clone(),
            smbclient_path: config.smb.smbclient_path.clone(),
            command_timeout: config.connect_timeout() + config.read_timeout(),
            stall_timeout: config.download_read_timeout(),
            spool_dir: config.staging_dir(),
        }
    }

    /// `//host/share` service name.
    pub fn service(&self, share: &str) -> String {
        format!("//{}/{}", self.host, share)
    }

    /// Contents of the `-A` authentication file.
    pub(crate) fn auth_file_contents(&self) -> String {
        let mut out = format!("username = {}\npassword = {}\n", self.username, self.password);
        if let Some(domain) = &self.domain {
            out.push_str(&format!("domain = {}\n", domain));
        }
        out
    }
}

impl std::fmt::Debug for SmbSessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbSessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("domain", &self.domain)
            .field("smbclient_path", &self.smbclient_path)
            .finish()
    }
}

/// One share from `smbclient -L`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfo {
    pub name: String,
    pub share_type: String,
    pub comment: String,
}

// ── Path quoting ─────────────────────────────────────────────────────

/// `/dir/file` → `\dir\file`, quoted for an `smbclient -c` command line.
///
/// smbclient splits `-c` on `;` and has no escape for `"`, so names
/// containing either cannot be addressed.
pub fn quote_remote(path: &str) -> Result<String, TransferError> {
    if path.contains('"') || path.contains(';') {
        return Err(TransferError::protocol(
            "EINVALIDPATH",
            format!("'{}' cannot be addressed through smbclient", path),
        ));
    }
    let trimmed = path.trim_matches('/');
    Ok(format!("\"\\{}\"", trimmed.replace('/', "\\")))
}

/// Quote a local spool path for `get` / `put`.
pub fn quote_local(path: &std::path::Path) -> Result<String, TransferError> {
    let s = path.to_string_lossy();
    if s.contains('"') || s.contains(';') {
        return Err(TransferError::protocol(
            "EINVALIDPATH",
            format!("spool path '{}' is not usable", s),
        ));
    }
    Ok(format!("\"{}\"", s))
}
