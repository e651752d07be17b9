//! FTP-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use xfer_core::{ErrorKind, TransferError};

/// Categorised FTP error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// TCP / DNS resolution failure.
    ConnectionFailed,
    /// AUTH TLS / TLS handshake failure.
    TlsFailed,
    /// Wrong username/password.
    AuthFailed,
    /// Server returned a 4xx/5xx for a command.
    CommandRejected,
    /// Data channel could not be established.
    DataChannelFailed,
    /// Data connection attempt ran out of time (candidate for active fallback).
    DataChannelTimeout,
    /// Transfer aborted or incomplete on the server side.
    TransferFailed,
    /// Server sent an unparseable reply.
    ProtocolError,
    /// Control-channel operation timed out.
    Timeout,
    /// Control connection closed or unusable.
    Disconnected,
    PermissionDenied,
    NotFound,
    /// Disk quota / storage exhausted.
    QuotaExceeded,
    Cancelled,
    InvalidConfig,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFailed, msg)
    }

    pub fn tls_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TlsFailed, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::AuthFailed, msg)
    }

    pub fn data_channel(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::DataChannelFailed, msg)
    }

    pub fn data_timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::DataChannelTimeout, msg)
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ProtocolError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::NotFound, msg)
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InvalidConfig, msg)
    }

    /// True when the control connection can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::ConnectionFailed
                | FtpErrorKind::TlsFailed
                | FtpErrorKind::DataChannelFailed
                | FtpErrorKind::DataChannelTimeout
                | FtpErrorKind::ProtocolError
                | FtpErrorKind::Timeout
                | FtpErrorKind::Disconnected
                | FtpErrorKind::Cancelled
        ) || self.code == Some(421)
    }

    /// Classify an FTP reply code into the most appropriate error kind.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpErrorKind::Disconnected,
            425 => FtpErrorKind::DataChannelFailed,
            426 => FtpErrorKind::TransferFailed,
            430 | 530 | 332 => FtpErrorKind::AuthFailed,
            450 | 550 => {
                let lower = text.to_lowercase();
                if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
                    FtpErrorKind::PermissionDenied
                } else if lower.contains("quota") {
                    FtpErrorKind::QuotaExceeded
                } else {
                    // 550 without a more specific hint is "file unavailable".
                    FtpErrorKind::NotFound
                }
            }
            452 | 552 => FtpErrorKind::QuotaExceeded,
            553 => FtpErrorKind::PermissionDenied,
            _ => FtpErrorKind::CommandRejected,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
        }
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(format!("I/O timeout: {}", e)),
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                Self::disconnected(e.to_string())
            }
            _ => Self::connection_failed(e.to_string()),
        }
    }
}

impl From<rustls::Error> for FtpError {
    fn from(e: rustls::Error) -> Self {
        Self::tls_failed(e.to_string())
    }
}

// ── Taxonomy boundary ────────────────────────────────────────────────

impl From<FtpError> for TransferError {
    fn from(e: FtpError) -> Self {
        let kind = match e.kind {
            FtpErrorKind::ConnectionFailed
            | FtpErrorKind::DataChannelFailed
            | FtpErrorKind::DataChannelTimeout
            | FtpErrorKind::TransferFailed
            | FtpErrorKind::Timeout
            | FtpErrorKind::Disconnected => ErrorKind::Network,
            FtpErrorKind::AuthFailed => ErrorKind::Authentication,
            FtpErrorKind::PermissionDenied => ErrorKind::Permission,
            FtpErrorKind::NotFound => ErrorKind::NotFound,
            FtpErrorKind::QuotaExceeded => ErrorKind::StorageFull,
            FtpErrorKind::Cancelled => ErrorKind::Cancelled,
            FtpErrorKind::TlsFailed
            | FtpErrorKind::CommandRejected
            | FtpErrorKind::ProtocolError
            | FtpErrorKind::InvalidConfig => ErrorKind::Protocol,
        };
        let mut out = TransferError::new(kind, e.message);
        match (e.code, e.kind) {
            (Some(code), _) => out = out.with_code(code),
            (None, FtpErrorKind::TlsFailed) => out = out.with_code("TLS"),
            _ => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(code: u16, text: &str) -> ErrorKind {
        TransferError::from(FtpError::from_reply(code, text)).kind
    }

    #[test]
    fn reply_codes_map_to_taxonomy() {
        assert_eq!(kind_of(530, "530 Login incorrect."), ErrorKind::Authentication);
        assert_eq!(kind_of(430, "430 Invalid username or password"), ErrorKind::Authentication);
        assert_eq!(kind_of(421, "421 Timeout."), ErrorKind::Network);
        assert_eq!(kind_of(425, "425 Can't open data connection."), ErrorKind::Network);
        assert_eq!(kind_of(426, "426 Connection closed; transfer aborted."), ErrorKind::Network);
        assert_eq!(kind_of(550, "550 Failed to open file."), ErrorKind::NotFound);
        assert_eq!(kind_of(550, "550 Permission denied."), ErrorKind::Permission);
        assert_eq!(kind_of(452, "452 Insufficient storage space"), ErrorKind::StorageFull);
        assert_eq!(kind_of(552, "552 Exceeded storage allocation"), ErrorKind::StorageFull);
        assert_eq!(kind_of(553, "553 Could not create file."), ErrorKind::Permission);
    }

    #[test]
    fn protocol_errors_keep_the_reply_code() {
        let e = TransferError::from(FtpError::from_reply(502, "502 Command not implemented."));
        assert_eq!(e.kind, ErrorKind::Protocol);
        assert_eq!(e.code.as_deref(), Some("502"));
    }

    #[test]
    fn fatal_kinds() {
        assert!(FtpError::data_timeout("x").is_fatal());
        assert!(FtpError::from_reply(421, "bye").is_fatal());
        assert!(!FtpError::from_reply(550, "nope").is_fatal());
    }
}
