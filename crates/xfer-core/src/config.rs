//! Transfer configuration, loadable from JSON.
//!
//! Every field carries a serde default so partial documents work; callers
//! usually start from `TransferConfig::default()` and override a few limits.

use crate::error::{OperationResult, TransferError};
use crate::stream::{PumpOptions, DEFAULT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Limits and timeouts shared by the pool, the clients and the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// Maximum simultaneously in-use connections across all backends of one pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Pooled connections idle longer than this are evicted.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Period of the background eviction pass (0 disables the timer).
    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Read timeout used while streaming file bodies.
    #[serde(default = "default_download_read_timeout_ms")]
    pub download_read_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Retries of NETWORK failures at the orchestrator layer.
    #[serde(default = "default_max_network_retries")]
    pub max_network_retries: u32,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Where cross-protocol copies stage their temp files (OS temp dir if unset).
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Destination of non-permanent local deletes.
    #[serde(default)]
    pub trash_dir: Option<PathBuf>,
    #[serde(default)]
    pub ftp: FtpSettings,
    #[serde(default)]
    pub sftp: SftpSettings,
    #[serde(default)]
    pub smb: SmbSettings,
    #[serde(default)]
    pub webdav: WebDavSettings,
}

fn default_max_connections() -> usize {
    8
}
fn default_idle_timeout_ms() -> u64 {
    45_000
}
fn default_eviction_interval_ms() -> u64 {
    15_000
}
fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_download_read_timeout_ms() -> u64 {
    120_000
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_max_network_retries() -> u32 {
    1
}
fn default_progress_interval_ms() -> u64 {
    100
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_timeout_ms: default_idle_timeout_ms(),
            eviction_interval_ms: default_eviction_interval_ms(),
            buffer_size: default_buffer_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            download_read_timeout_ms: default_download_read_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_network_retries: default_max_network_retries(),
            progress_interval_ms: default_progress_interval_ms(),
            staging_dir: None,
            trash_dir: None,
            ftp: FtpSettings::default(),
            sftp: SftpSettings::default(),
            smb: SmbSettings::default(),
            webdav: WebDavSettings::default(),
        }
    }
}

impl TransferConfig {
    pub fn from_json_str(json: &str) -> OperationResult<Self> {
        let cfg: TransferConfig = serde_json::from_str(json)
            .map_err(|e| TransferError::unknown(format!("invalid transfer config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> OperationResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TransferError::from_io(&format!("read {}", path.display()), e))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> OperationResult<()> {
        if self.max_connections == 0 {
            return Err(TransferError::unknown("maxConnections must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(TransferError::unknown("bufferSize must be at least 1"));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(TransferError::unknown("timeouts must be non-zero"));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn eviction_interval(&self) -> Option<Duration> {
        (self.eviction_interval_ms > 0).then(|| Duration::from_millis(self.eviction_interval_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn download_read_timeout(&self) -> Duration {
        Duration::from_millis(self.download_read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.trash_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("xfer")
                .join("trash")
        })
    }

    /// Streaming options for file bodies.
    pub fn pump_options(&self, total: Option<u64>) -> PumpOptions {
        PumpOptions {
            buffer_size: self.buffer_size,
            read_timeout: Some(self.download_read_timeout()),
            total,
        }
    }
}

// ─── Per-protocol settings ──────────────────────────────────────────────────

/// FTP/FTPS security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtpSecurity {
    /// Plain FTP.
    #[default]
    None,
    /// AUTH TLS on port 21 (RFC 4217).
    Explicit,
    /// TLS from the first byte (port 990).
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSettings {
    #[serde(default)]
    pub security: FtpSecurity,
    /// Open data channels in passive mode first.
    #[serde(default = "default_true")]
    pub passive_first: bool,
    /// Retry once in active mode when a passive data connect times out.
    #[serde(default = "default_true")]
    pub active_fallback: bool,
    /// Address advertised by PORT/EPRT; defaults to the control socket's local IP.
    #[serde(default)]
    pub active_bind_address: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_true")]
    pub utf8: bool,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            security: FtpSecurity::None,
            passive_first: true,
            active_fallback: true,
            active_bind_address: None,
            accept_invalid_certs: false,
            utf8: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SftpSettings {
    #[serde(default)]
    pub compress: bool,
    /// SSH keepalive period; 0 disables.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u32,
    #[serde(default = "default_true")]
    pub use_agent: bool,
    /// Fall back to `~/.ssh/id_*` when no key or password is given.
    #[serde(default = "default_true")]
    pub try_default_keys: bool,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            compress: false,
            keepalive_interval_secs: default_keepalive_secs(),
            use_agent: true,
            try_default_keys: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmbSettings {
    #[serde(default = "default_smbclient_path")]
    pub smbclient_path: String,
    #[serde(default)]
    pub workgroup: Option<String>,
    /// Highest dialect offered (`SMB2`, `SMB3`, ...).
    #[serde(default)]
    pub protocol_max: Option<String>,
}

impl Default for SmbSettings {
    fn default() -> Self {
        Self {
            smbclient_path: default_smbclient_path(),
            workgroup: None,
            protocol_max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDavSettings {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Prefix between the host and the user-visible tree (e.g. `/remote.php/dav/files/alice`).
    #[serde(default)]
    pub base_path: Option<String>,
}

impl Default for WebDavSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept_invalid_certs: false,
            base_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_keepalive_secs() -> u32 {
    30
}
fn default_smbclient_path() -> String {
    "smbclient".into()
}
fn default_user_agent() -> String {
    format!("xfer/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = TransferConfig::default();
        assert_eq!(c.idle_timeout(), Duration::from_secs(45));
        assert_eq!(c.connect_timeout(), Duration::from_secs(10));
        assert_eq!(c.read_timeout(), Duration::from_secs(30));
        assert_eq!(c.buffer_size, 65_536);
        assert_eq!(c.max_network_retries, 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = TransferConfig::from_json_str(r#"{"maxConnections": 3, "retryDelayMs": 5}"#).unwrap();
        assert_eq!(c.max_connections, 3);
        assert_eq!(c.retry_delay_ms, 5);
        assert_eq!(c.idle_timeout_ms, 45_000);
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(TransferConfig::from_json_str(r#"{"maxConnections": 0}"#).is_err());
        assert!(TransferConfig::from_json_str(r#"{"bufferSize": 0}"#).is_err());
    }

    #[test]
    fn protocol_sections_are_optional() {
        let c = TransferConfig::from_json_str(
            r#"{"ftp": {"security": "explicit", "activeFallback": false}, "smb": {"workgroup": "CORP"}}"#,
        )
        .unwrap();
        assert_eq!(c.ftp.security, FtpSecurity::Explicit);
        assert!(!c.ftp.active_fallback);
        assert!(c.ftp.passive_first);
        assert_eq!(c.smb.smbclient_path, "smbclient");
        assert_eq!(c.smb.workgroup.as_deref(), Some("CORP"));
        assert!(c.sftp.use_agent);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xfer.json");
        std::fs::write(&path, r#"{"stagingDir": "/var/tmp/xfer"}"#).unwrap();
        let c = TransferConfig::load(&path).unwrap();
        assert_eq!(c.staging_dir(), PathBuf::from("/var/tmp/xfer"));
    }
}
