//! Shared data model for the transfer core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Protocol ───────────────────────────────────────────────────────────────

/// Backend family a path belongs to. Doubles as the URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Local,
    Smb,
    Sftp,
    Ftp,
    /// Cloud-REST storage spoken over WebDAV (`dav://`, `davs://`).
    WebDav,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Local,
        Protocol::Smb,
        Protocol::Sftp,
        Protocol::Ftp,
        Protocol::WebDav,
    ];

    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Local => "file",
            Protocol::Smb => "smb",
            Protocol::Sftp => "sftp",
            Protocol::Ftp => "ftp",
            Protocol::WebDav => "dav",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Local => 0,
            Protocol::Smb => 445,
            Protocol::Sftp => 22,
            Protocol::Ftp => 21,
            Protocol::WebDav => 80,
        }
    }

    pub fn is_remote(self) -> bool {
        self != Protocol::Local
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

// ─── Connection identity ────────────────────────────────────────────────────

/// Identity of a pooled connection: two requests with equal keys may share
/// one live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionKey {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub principal: String,
}

impl ConnectionKey {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16, principal: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into().to_ascii_lowercase(),
            port,
            principal: principal.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}",
            self.protocol, self.principal, self.host, self.port
        )
    }
}

// ─── Targets ────────────────────────────────────────────────────────────────

/// Protocol-independent identity of one file or directory.
///
/// Built by [`TransferTarget::parse`]; `remote_path` is always absolute and
/// `/`-separated, relative to `root` (the SMB share) when one is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTarget {
    pub protocol: Protocol,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// SMB share or bucket-like top level.
    pub root: Option<String>,
    pub remote_path: String,
    pub display_name: String,
    pub size_bytes: Option<u64>,
    pub is_directory: bool,
    /// TLS transport requested by the scheme (`davs://`).
    #[serde(default)]
    pub secure: bool,
    /// `user@` hint from the URI authority.
    #[serde(default)]
    pub user_hint: Option<String>,
}

impl TransferTarget {
    pub fn local(path: impl Into<String>) -> Self {
        let remote_path: String = path.into();
        Self {
            protocol: Protocol::Local,
            host: None,
            port: None,
            root: None,
            display_name: base_name(&remote_path),
            remote_path,
            size_bytes: None,
            is_directory: false,
            secure: false,
            user_hint: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.protocol == Protocol::Local
    }

    pub fn host_str(&self) -> &str {
        self.host.as_deref().unwrap_or("")
    }

    /// Port from the URI, or the protocol default.
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.protocol) {
            (Some(p), _) => p,
            (None, Protocol::WebDav) if self.secure => 443,
            (None, proto) => proto.default_port(),
        }
    }

    /// Parent directory target (same endpoint).
    pub fn parent(&self) -> TransferTarget {
        let parent = parent_path(&self.remote_path);
        let mut t = self.clone();
        t.display_name = base_name(&parent);
        t.remote_path = parent;
        t.is_directory = true;
        t.size_bytes = None;
        t
    }

    /// Child of this target.
    pub fn join(&self, name: &str) -> TransferTarget {
        let mut t = self.clone();
        t.remote_path = join_path(&self.remote_path, name);
        t.display_name = name.to_string();
        t.is_directory = false;
        t.size_bytes = None;
        t
    }

    /// Sibling with a new final component.
    pub fn with_name(&self, name: &str) -> TransferTarget {
        let parent = parent_path(&self.remote_path);
        let mut t = self.clone();
        t.remote_path = join_path(&parent, name);
        t.display_name = name.to_string();
        t
    }

    /// True when `other` lives on the same endpoint (host, port, root).
    pub fn same_endpoint(&self, other: &TransferTarget) -> bool {
        self.protocol == other.protocol
            && self.host.as_deref().map(str::to_ascii_lowercase)
                == other.host.as_deref().map(str::to_ascii_lowercase)
            && self.effective_port() == other.effective_port()
            && self.root == other.root
            && self.secure == other.secure
    }

    /// Render back into the URI form accepted by [`TransferTarget::parse`].
    pub fn to_uri(&self) -> String {
        if self.is_local() {
            return self.remote_path.clone();
        }
        let scheme = match (self.protocol, self.secure) {
            (Protocol::WebDav, true) => "davs",
            (p, _) => p.scheme(),
        };
        let mut out = format!("{}://", scheme);
        if let Some(user) = &self.user_hint {
            out.push_str(&crate::uri::encode_userinfo(user));
            out.push('@');
        }
        out.push_str(self.host_str());
        if let Some(port) = self.port {
            out.push_str(&format!(":{}", port));
        }
        if let Some(root) = &self.root {
            out.push('/');
            out.push_str(&crate::uri::encode_path(root));
        }
        out.push_str(&crate::uri::encode_path(&self.remote_path));
        out
    }
}

impl fmt::Display for TransferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

// ─── Listing entries ────────────────────────────────────────────────────────

/// One directory entry as returned by `list`/`stat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<String>,
}

impl FileInfo {
    pub fn file(path: &str, size: u64) -> Self {
        Self {
            name: base_name(path),
            path: path.to_string(),
            is_directory: false,
            size,
            modified: None,
            permissions: None,
        }
    }

    pub fn directory(path: &str) -> Self {
        Self {
            name: base_name(path),
            path: path.to_string(),
            is_directory: true,
            size: 0,
            modified: None,
            permissions: None,
        }
    }
}

// ─── Credentials ────────────────────────────────────────────────────────────

/// Secrets for one endpoint. Never persisted or logged by the core.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// PEM private key material.
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl Credentials {
    pub fn password(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::password("anonymous", "anonymous@")
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_private_key(mut self, pem: impl Into<String>, passphrase: Option<String>) -> Self {
        self.private_key = Some(pem.into());
        self.passphrase = passphrase;
        self
    }

    /// Principal used in the connection key (`DOMAIN\user` when a domain is set).
    pub fn principal(&self) -> String {
        match &self.domain {
            Some(d) if !d.is_empty() => format!("{}\\{}", d, self.username),
            _ => self.username.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"***")
            .field("domain", &self.domain)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection parameters for `testConnection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    pub protocol: Protocol,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// SMB share (optional: without one the share list is probed).
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub secure: bool,
    /// Explicit credentials; when absent the resolver is consulted.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl ConnectionParams {
    pub fn new(protocol: Protocol, host: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: None,
            root: None,
            secure: false,
            credentials: None,
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.protocol {
            Protocol::WebDav if self.secure => 443,
            p => p.default_port(),
        })
    }

    /// Root-of-endpoint target used for the cheap probe.
    pub fn root_target(&self) -> TransferTarget {
        TransferTarget {
            protocol: self.protocol,
            host: Some(self.host.clone()),
            port: self.port,
            root: self.root.clone(),
            remote_path: "/".into(),
            display_name: String::new(),
            size_bytes: None,
            is_directory: true,
            secure: self.secure,
            user_hint: self.credentials.as_ref().map(|c| c.username.clone()),
        }
    }
}

// ─── Path helpers ───────────────────────────────────────────────────────────

/// Last `/`-separated component (empty for the root).
pub fn base_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}

/// Parent of an absolute `/`-separated path; the root is its own parent.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => trimmed[..pos].to_string(),
    }
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name.trim_start_matches('/'))
    } else {
        format!("{}/{}", dir, name.trim_start_matches('/'))
    }
}
