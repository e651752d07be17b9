//! Shared types for the FTP crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use xfer_core::{FileInfo, FtpSettings, TransferConfig};

// ─── Replies ─────────────────────────────────────────────────────────

/// One complete (possibly multi-line) control-channel reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// All lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// 1xx — the command started, another reply follows.
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx — more input is needed (PASS after USER, RNTO after RNFR).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

// ─── FEAT ────────────────────────────────────────────────────────────

/// Extensions the server advertised in its FEAT reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub mlst: bool,
    pub size: bool,
    pub mdtm: bool,
    pub utf8: bool,
    pub epsv: bool,
    pub eprt: bool,
    pub raw_features: Vec<String>,
}

impl ServerFeatures {
    /// Parse the body of a `211-Features:` reply.
    pub fn from_feat_lines(lines: &[String]) -> Self {
        let raw: Vec<String> = lines
            .iter()
            .skip(1)
            .filter(|l| !l.starts_with("211"))
            .map(|l| l.trim().to_uppercase())
            .collect();

        let has = |feat: &str| raw.iter().any(|l| l.starts_with(feat));

        Self {
            mlsd: has("MLSD") || has("MLST"),
            mlst: has("MLST"),
            size: has("SIZE"),
            mdtm: has("MDTM"),
            utf8: has("UTF8"),
            epsv: has("EPSV"),
            eprt: has("EPRT"),
            raw_features: raw,
        }
    }
}

// ─── Listing entries ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FtpEntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One parsed LIST / MLSD line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpEntry {
    pub name: String,
    pub kind: FtpEntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<String>,
    pub link_target: Option<String>,
}

impl FtpEntry {
    pub fn into_file_info(self, dir: &str) -> FileInfo {
        let path = xfer_core::types::join_path(dir, &self.name);
        FileInfo {
            name: self.name,
            path,
            is_directory: self.kind == FtpEntryKind::Directory,
            size: self.size,
            modified: self.modified,
            permissions: self.permissions,
        }
    }
}

// ─── Data channel ────────────────────────────────────────────────────

/// Which side opens the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataChannelMode {
    /// PASV / EPSV — the client connects.
    Passive,
    /// PORT / EPRT — the server connects back.
    Active,
}

// ─── Client options ──────────────────────────────────────────────────

/// Everything needed to open one FTP session.
#[derive(Debug, Clone)]
pub struct FtpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub settings: FtpSettings,
    pub connect_timeout: Duration,
    /// Bound on every control-channel reply.
    pub read_timeout: Duration,
    /// Bound on opening a data connection (connect or accept).
    pub data_timeout: Duration,
}

impl FtpConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, config: &TransferConfig) -> Self {
        Self {
            host: host.into(),
            port,
            username: "anonymous".into(),
            password: "anonymous@".into(),
            settings: config.ftp.clone(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            data_timeout: config.connect_timeout(),
        }
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feat_parsing() {
        let lines: Vec<String> = ["211-Features:", " MLST type*;size*;modify*;", " SIZE", " EPSV", " UTF8", "211 End"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let f = ServerFeatures::from_feat_lines(&lines);
        assert!(f.mlst && f.mlsd && f.size && f.epsv && f.utf8);
        assert!(!f.mdtm && !f.eprt);
    }

    #[test]
    fn reply_classes() {
        let r = FtpResponse { code: 150, lines: vec!["150 Opening".into()] };
        assert!(r.is_preliminary() && !r.is_success());
        let r = FtpResponse { code: 350, lines: vec!["350 Ready for RNTO".into()] };
        assert!(r.is_intermediate());
    }
}
