// ── libssh2 → taxonomy classification ────────────────────────────────────────

use ssh2::ErrorCode;
use xfer_core::{ErrorKind, TransferError};

// libssh2 session error codes (libssh2.h).
const LIBSSH2_ERROR_BANNER_RECV: i32 = -2;
const LIBSSH2_ERROR_BANNER_SEND: i32 = -3;
const LIBSSH2_ERROR_KEX_FAILURE: i32 = -5;
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_ERROR_CHANNEL_CLOSED: i32 = -26;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_EAGAIN: i32 = -37;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

// SFTP status codes (draft-ietf-secsh-filexfer).
const SSH_FX_NO_SUCH_FILE: i32 = 2;
const SSH_FX_PERMISSION_DENIED: i32 = 3;
const SSH_FX_NO_CONNECTION: i32 = 6;
const SSH_FX_CONNECTION_LOST: i32 = 7;
const SSH_FX_NO_SUCH_PATH: i32 = 10;
const SSH_FX_WRITE_PROTECT: i32 = 12;
const SSH_FX_NO_SPACE_ON_FILESYSTEM: i32 = 14;
const SSH_FX_QUOTA_EXCEEDED: i32 = 15;

/// Classify a libssh2 failure.
pub fn classify(e: &ssh2::Error) -> TransferError {
    classify_code(e.code(), e.message())
}

pub fn classify_code(code: ErrorCode, message: &str) -> TransferError {
    let (kind, tag) = match code {
        ErrorCode::Session(c) => (
            match c {
                LIBSSH2_ERROR_AUTHENTICATION_FAILED | LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED => ErrorKind::Authentication,
                LIBSSH2_ERROR_BANNER_RECV
                | LIBSSH2_ERROR_BANNER_SEND
                | LIBSSH2_ERROR_KEX_FAILURE
                | LIBSSH2_ERROR_SOCKET_SEND
                | LIBSSH2_ERROR_TIMEOUT
                | LIBSSH2_ERROR_SOCKET_DISCONNECT
                | LIBSSH2_ERROR_CHANNEL_CLOSED
                | LIBSSH2_ERROR_SOCKET_TIMEOUT
                | LIBSSH2_ERROR_EAGAIN
                | LIBSSH2_ERROR_SOCKET_RECV => ErrorKind::Network,
                _ => ErrorKind::Protocol,
            },
            format!("LIBSSH2_{}", c),
        ),
        ErrorCode::SFTP(c) => (
            match c {
                SSH_FX_NO_SUCH_FILE | SSH_FX_NO_SUCH_PATH => ErrorKind::NotFound,
                SSH_FX_PERMISSION_DENIED | SSH_FX_WRITE_PROTECT => ErrorKind::Permission,
                SSH_FX_NO_SPACE_ON_FILESYSTEM | SSH_FX_QUOTA_EXCEEDED => ErrorKind::StorageFull,
                SSH_FX_NO_CONNECTION | SSH_FX_CONNECTION_LOST => ErrorKind::Network,
                _ => ErrorKind::Protocol,
            },
            format!("SSH_FX_{}", c),
        ),
    };
    TransferError::new(kind, message.to_string()).with_code(tag)
}

/// Classify an I/O error raised by an ssh2 `File`, which wraps the libssh2
/// error inside `io::Error`.
pub fn classify_io(e: std::io::Error) -> TransferError {
    match e.get_ref().and_then(|inner| inner.downcast_ref::<ssh2::Error>()) {
        Some(inner) => classify(inner),
        None => TransferError::from(e),
    }
}

/// True when the session behind the error can no longer be trusted.
pub(crate) fn poisons_session(e: &TransferError) -> bool {
    matches!(e.kind, ErrorKind::Network | ErrorKind::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_codes() {
        let e = classify_code(ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED), "Authentication failed");
        assert_eq!(e.kind, ErrorKind::Authentication);
        assert_eq!(e.code.as_deref(), Some("LIBSSH2_-18"));
        assert_eq!(
            classify_code(ErrorCode::Session(LIBSSH2_ERROR_SOCKET_TIMEOUT), "timed out").kind,
            ErrorKind::Network
        );
        assert_eq!(classify_code(ErrorCode::Session(-42), "odd").kind, ErrorKind::Protocol);
    }

    #[test]
    fn sftp_status_codes() {
        let kind = |c| classify_code(ErrorCode::SFTP(c), "x").kind;
        assert_eq!(kind(2), ErrorKind::NotFound);
        assert_eq!(kind(10), ErrorKind::NotFound);
        assert_eq!(kind(3), ErrorKind::Permission);
        assert_eq!(kind(12), ErrorKind::Permission);
        assert_eq!(kind(14), ErrorKind::StorageFull);
        assert_eq!(kind(15), ErrorKind::StorageFull);
        assert_eq!(kind(7), ErrorKind::Network);
        let other = classify_code(ErrorCode::SFTP(4), "Failure");
        assert_eq!(other.kind, ErrorKind::Protocol);
        assert_eq!(other.code.as_deref(), Some("SSH_FX_4"));
    }

    #[test]
    fn only_transport_failures_poison() {
        assert!(poisons_session(&TransferError::network("reset")));
        assert!(poisons_session(&TransferError::cancelled()));
        assert!(!poisons_session(&TransferError::not_found("gone")));
    }
}
