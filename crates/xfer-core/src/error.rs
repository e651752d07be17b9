//! Closed failure taxonomy shared by every backend.
//!
//! Protocol clients classify their native errors into [`TransferError`] at
//! the crate boundary; strategies pass them through untouched and the
//! orchestrator only attaches path context and decides on retries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Timeout, reset, unreachable host.
    Network,
    /// Bad or missing credentials.
    Authentication,
    /// Remote or local path missing.
    NotFound,
    /// Access denied.
    Permission,
    /// Destination out of space or quota.
    StorageFull,
    /// Server-side error payload (reply code, status code) attached in `code`.
    #[serde(rename = "PROTOCOL_ERROR")]
    Protocol,
    /// Caller-initiated cancellation.
    Cancelled,
    /// Catch-all.
    Unknown,
}

impl ErrorKind {
    /// Only network-class failures are worth an automatic retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Permission => "PERMISSION",
            ErrorKind::StorageFull => "STORAGE_FULL",
            ErrorKind::Protocol => "PROTOCOL_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure with enough structure for a UI to render a message
/// without re-parsing protocol internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferError {
    pub kind: ErrorKind,
    pub message: String,
    /// Raw protocol code (FTP reply, NT_STATUS name, HTTP status, libssh2 code).
    pub code: Option<String>,
    pub source_path: Option<String>,
    pub dest_path: Option<String>,
}

pub type OperationResult<T> = Result<T, TransferError>;

// ── Construction helpers ─────────────────────────────────────────────

impl TransferError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
            source_path: None,
            dest_path: None,
        }
    }

    pub fn with_code(mut self, code: impl ToString) -> Self {
        self.code = Some(code.to_string());
        self
    }

    /// Attach the source path unless a more specific one is already set.
    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        if self.source_path.is_none() {
            self.source_path = Some(path.into());
        }
        self
    }

    pub fn with_dest(mut self, path: impl Into<String>) -> Self {
        if self.dest_path.is_none() {
            self.dest_path = Some(path.into());
        }
        self
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, msg)
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, msg)
    }

    pub fn storage_full(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageFull, msg)
    }

    pub fn protocol(code: impl ToString, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, msg).with_code(code)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Operation cancelled")
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, msg)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Classify an I/O error, keeping the caller's context in the message.
    pub fn from_io(context: &str, e: std::io::Error) -> Self {
        let mut err = Self::from(e);
        err.message = format!("{}: {}", context, err.message);
        err
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{} {}] {}", self.kind, code, self.message)?,
            None => write!(f, "[{}] {}", self.kind, self.message)?,
        }
        match (&self.source_path, &self.dest_path) {
            (Some(src), Some(dst)) => write!(f, " ({} → {})", src, dst),
            (Some(src), None) => write!(f, " ({})", src),
            (None, Some(dst)) => write!(f, " (→ {})", dst),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        // Adapters tunnel an already classified failure through io::Error.
        if let Some(inner) = e.get_ref().and_then(|r| r.downcast_ref::<TransferError>()) {
            return inner.clone();
        }
        if is_storage_full(&e) {
            return Self::storage_full(e.to_string());
        }
        let kind = match e.kind() {
            Io::TimedOut
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::ConnectionRefused
            | Io::NotConnected
            | Io::BrokenPipe
            | Io::AddrNotAvailable
            | Io::UnexpectedEof => ErrorKind::Network,
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied => ErrorKind::Permission,
            _ => ErrorKind::Unknown,
        };
        let mut err = Self::new(kind, e.to_string());
        if let Some(errno) = e.raw_os_error() {
            err.code = Some(format!("os error {}", errno));
        }
        err
    }
}

#[cfg(unix)]
fn is_storage_full(e: &std::io::Error) -> bool {
    // ENOSPC, EDQUOT (Linux) / EDQUOT (BSD, macOS)
    matches!(e.raw_os_error(), Some(28) | Some(122) | Some(69))
}

#[cfg(not(unix))]
fn is_storage_full(e: &std::io::Error) -> bool {
    // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
    matches!(e.raw_os_error(), Some(39) | Some(112))
}

impl From<TransferError> for String {
    fn from(e: TransferError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn only_network_is_retryable() {
        assert!(ErrorKind::Network.is_retryable());
        for kind in [
            ErrorKind::Authentication,
            ErrorKind::NotFound,
            ErrorKind::Permission,
            ErrorKind::StorageFull,
            ErrorKind::Protocol,
            ErrorKind::Cancelled,
            ErrorKind::Unknown,
        ] {
            assert!(!kind.is_retryable(), "{kind} must not be retryable");
        }
    }

    #[test]
    fn io_errors_classify() {
        let e: TransferError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(e.kind, ErrorKind::Network);
        let e: TransferError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(e.kind, ErrorKind::NotFound);
        let e: TransferError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
        assert_eq!(e.kind, ErrorKind::Permission);
        let e: TransferError = io::Error::new(io::ErrorKind::Other, "??").into();
        assert_eq!(e.kind, ErrorKind::Unknown);
    }

    #[test]
    fn tunnelled_errors_keep_their_kind() {
        let inner = TransferError::authentication("bad key").with_code("LIBSSH2_-18");
        let e = TransferError::from_io("read", io::Error::new(io::ErrorKind::Other, inner));
        assert_eq!(e.kind, ErrorKind::Authentication);
        assert_eq!(e.code.as_deref(), Some("LIBSSH2_-18"));
        assert_eq!(e.message, "read: bad key");
    }

    #[cfg(unix)]
    #[test]
    fn enospc_is_storage_full() {
        let e: TransferError = io::Error::from_raw_os_error(28).into();
        assert_eq!(e.kind, ErrorKind::StorageFull);
    }

    #[test]
    fn path_context_is_not_overwritten() {
        let e = TransferError::not_found("missing")
            .with_source("/a")
            .with_source("/b")
            .with_dest("/c");
        assert_eq!(e.source_path.as_deref(), Some("/a"));
        assert_eq!(e.to_string(), "[NOT_FOUND] missing (/a → /c)");
    }

    #[test]
    fn protocol_keeps_raw_code() {
        let e = TransferError::protocol(550, "Requested action not taken");
        assert_eq!(e.kind, ErrorKind::Protocol);
        assert_eq!(e.code.as_deref(), Some("550"));
        assert_eq!(e.to_string(), "[PROTOCOL_ERROR 550] Requested action not taken");
    }

    #[test]
    fn kind_serializes_to_taxonomy_names() {
        let json = serde_json::to_string(&ErrorKind::Protocol).unwrap();
        assert_eq!(json, "\"PROTOCOL_ERROR\"");
        let json = serde_json::to_string(&ErrorKind::StorageFull).unwrap();
        assert_eq!(json, "\"STORAGE_FULL\"");
    }
}
