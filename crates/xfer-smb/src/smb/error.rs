//! smbclient failures and their mapping onto the shared taxonomy.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use xfer_core::{ErrorKind, TransferError};

lazy_static! {
    static ref NT_STATUS: Regex = Regex::new(r"NT_STATUS_[A-Z0-9_]+").expect("valid NT_STATUS regex");
}

/// Raw outcome of one smbclient invocation that did not succeed.
#[derive(Debug, Error)]
pub enum SmbError {
    #[error("smbclient not found at '{0}'")]
    Missing(String),
    #[error("smbclient did not finish within {0:?}")]
    Timeout(std::time::Duration),
    #[error("{status}: {detail}")]
    Status { status: String, detail: String },
    #[error("smbclient exited with {code}: {detail}")]
    Exit { code: i32, detail: String },
    #[error("smbclient I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// First `NT_STATUS_*` token in `text`.
pub fn find_status(text: &str) -> Option<&str> {
    NT_STATUS.find(text).map(|m| m.as_str())
}

/// Category for one NT status name.
pub fn status_kind(status: &str) -> ErrorKind {
    let name = status.trim_start_matches("NT_STATUS_");
    match name {
        "LOGON_FAILURE"
        | "ACCOUNT_DISABLED"
        | "ACCOUNT_LOCKED_OUT"
        | "ACCOUNT_RESTRICTION"
        | "ACCOUNT_EXPIRED"
        | "PASSWORD_EXPIRED"
        | "PASSWORD_MUST_CHANGE"
        | "WRONG_PASSWORD"
        | "NO_SUCH_USER"
        | "INVALID_LOGON_HOURS"
        | "INVALID_WORKSTATION"
        | "LOGON_TYPE_NOT_GRANTED" => ErrorKind::Authentication,

        "OBJECT_NAME_NOT_FOUND"
        | "OBJECT_PATH_NOT_FOUND"
        | "NO_SUCH_FILE"
        | "NOT_FOUND"
        | "BAD_NETWORK_NAME"
        | "OBJECT_NAME_INVALID" => ErrorKind::NotFound,

        "ACCESS_DENIED" | "MEDIA_WRITE_PROTECTED" | "CANNOT_DELETE" | "SHARING_VIOLATION" | "NETWORK_ACCESS_DENIED" => {
            ErrorKind::Permission
        }

        "DISK_FULL" | "QUOTA_EXCEEDED" => ErrorKind::StorageFull,

        "IO_TIMEOUT"
        | "CONNECTION_REFUSED"
        | "CONNECTION_RESET"
        | "CONNECTION_DISCONNECTED"
        | "CONNECTION_ABORTED"
        | "HOST_UNREACHABLE"
        | "NETWORK_UNREACHABLE"
        | "BAD_NETWORK_PATH"
        | "INVALID_NETWORK_RESPONSE"
        | "PIPE_BROKEN" => ErrorKind::Network,

        _ => ErrorKind::Protocol,
    }
}

impl From<SmbError> for TransferError {
    fn from(e: SmbError) -> Self {
        match &e {
            SmbError::Missing(_) => TransferError::protocol("SMBCLIENT_MISSING", e.to_string()),
            SmbError::Timeout(_) => TransferError::network(e.to_string()).with_code("ETIMEDOUT"),
            SmbError::Status { status, .. } => {
                TransferError::new(status_kind(status), e.to_string()).with_code(status.clone())
            }
            SmbError::Exit { code, .. } => TransferError::new(ErrorKind::Unknown, e.to_string()).with_code(code),
            SmbError::Io(_) => TransferError::network(e.to_string()),
        }
    }
}

/// Session-level failures: the credentials or the route are bad.
///
/// Each command is its own process, so a cancelled one leaves nothing behind.
pub(crate) fn poisons_session(e: &TransferError) -> bool {
    matches!(e.kind, ErrorKind::Network | ErrorKind::Authentication)
}
