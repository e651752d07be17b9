// ── Types: connection options and entry conversion ───────────────────────────

use serde::{Deserialize, Serialize};
use std::time::Duration;
use xfer_core::{Credentials, FileInfo, TransferConfig};

/// Everything needed to open one SSH session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SftpConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// PEM key material held in memory.
    #[serde(default)]
    pub private_key_data: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub use_agent: bool,
    #[serde(default)]
    pub try_default_keys: bool,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub keepalive_interval_secs: u32,
    #[serde(skip, default = "default_timeout")]
    pub connect_timeout: Duration,
    /// Applied to every blocking libssh2 call via `Session::set_timeout`.
    #[serde(skip, default = "default_timeout")]
    pub read_timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl SftpConnectionConfig {
    pub fn new(host: &str, port: u16, credentials: &Credentials, config: &TransferConfig) -> Self {
        let settings = &config.sftp;
        Self {
            host: host.to_string(),
            port,
            username: credentials.username.clone(),
            password: (!credentials.secret.is_empty()).then(|| credentials.secret.clone()),
            private_key_data: credentials.private_key.clone(),
            private_key_passphrase: credentials.passphrase.clone(),
            use_agent: settings.use_agent,
            try_default_keys: settings.try_default_keys,
            compress: settings.compress,
            keepalive_interval_secs: settings.keepalive_interval_secs,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Debug for SftpConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key_data", &self.private_key_data.as_ref().map(|_| "***"))
            .field("use_agent", &self.use_agent)
            .finish()
    }
}

/// Which step of the authentication cascade succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    Agent,
    PublickeyMemory,
    PublickeyDefault,
    Password,
    KeyboardInteractive,
}

// ── Stat conversion ──────────────────────────────────────────────────────────

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Directory bit from the mode, falling back to ssh2's own check.
pub(crate) fn is_dir(stat: &ssh2::FileStat) -> bool {
    match stat.perm {
        Some(mode) if mode & S_IFMT != 0 => mode & S_IFMT == S_IFDIR,
        _ => stat.is_dir(),
    }
}

/// "drwxr-xr-x" style rendering of a POSIX mode.
pub(crate) fn format_permissions(mode: u32) -> String {
    let kind = match mode & S_IFMT {
        0o040000 => 'd',
        0o120000 => 'l',
        0o010000 => 'p',
        0o140000 => 's',
        0o060000 => 'b',
        0o020000 => 'c',
        _ => '-',
    };
    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    let exec = |x: u32, special: u32, set: char| match (mode & x != 0, mode & special != 0) {
        (true, true) => set,
        (false, true) => set.to_ascii_uppercase(),
        (true, false) => 'x',
        (false, false) => '-',
    };
    [
        kind,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        exec(0o100, 0o4000, 's'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        exec(0o010, 0o2000, 's'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        exec(0o001, 0o1000, 't'),
    ]
    .iter()
    .collect()
}

pub(crate) fn file_info(path: &str, stat: &ssh2::FileStat) -> FileInfo {
    let dir = is_dir(stat);
    FileInfo {
        name: xfer_core::types::base_name(path),
        path: path.to_string(),
        is_directory: dir,
        size: if dir { 0 } else { stat.size.unwrap_or(0) },
        modified: stat
            .mtime
            .and_then(|t| chrono::DateTime::from_timestamp(t as i64, 0)),
        permissions: stat.perm.map(format_permissions),
    }
}
