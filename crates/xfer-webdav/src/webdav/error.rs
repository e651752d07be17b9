// ── HTTP failures → shared taxonomy ──────────────────────────────────────────

use reqwest::StatusCode;
use xfer_core::{ErrorKind, TransferError};

pub fn status_kind(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Permission,
        404 | 409 => ErrorKind::NotFound,
        507 => ErrorKind::StorageFull,
        408 | 502 | 503 | 504 => ErrorKind::Network,
        _ => ErrorKind::Protocol,
    }
}

/// Failure for a non-success response; the status is always the code.
pub fn status_error(method: &str, url: &str, status: StatusCode, body: &str) -> TransferError {
    let snippet: String = body.trim().chars().take(200).collect();
    let message = if snippet.is_empty() {
        format!("{} {} → {}", method, url, status)
    } else {
        format!("{} {} → {}: {}", method, url, status, snippet)
    };
    TransferError::new(status_kind(status), message).with_code(status.as_u16())
}

/// Transport-level failure from reqwest.
pub fn classify_reqwest(context: &str, e: reqwest::Error) -> TransferError {
    if let Some(status) = e.status() {
        return status_error(context, e.url().map(|u| u.as_str()).unwrap_or(""), status, "");
    }
    if e.is_builder() {
        return TransferError::protocol("EINVALIDURL", format!("{}: {}", context, e));
    }
    if e.is_decode() {
        return TransferError::protocol("EDECODE", format!("{}: {}", context, e));
    }
    let code = if e.is_timeout() {
        "ETIMEDOUT"
    } else if e.is_connect() {
        "ECONNREFUSED"
    } else {
        "ENETWORK"
    };
    TransferError::network(format!("{}: {}", context, e)).with_code(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_categories() {
        assert_eq!(status_kind(StatusCode::UNAUTHORIZED), ErrorKind::Authentication);
        assert_eq!(status_kind(StatusCode::FORBIDDEN), ErrorKind::Permission);
        assert_eq!(status_kind(StatusCode::NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(status_kind(StatusCode::CONFLICT), ErrorKind::NotFound);
        assert_eq!(status_kind(StatusCode::INSUFFICIENT_STORAGE), ErrorKind::StorageFull);
        assert_eq!(status_kind(StatusCode::GATEWAY_TIMEOUT), ErrorKind::Network);
        assert_eq!(status_kind(StatusCode::INTERNAL_SERVER_ERROR), ErrorKind::Protocol);
        assert_eq!(status_kind(StatusCode::METHOD_NOT_ALLOWED), ErrorKind::Protocol);
    }

    #[test]
    fn status_is_attached_as_code() {
        let err = status_error("DELETE", "http://nas/a", StatusCode::LOCKED, "<d:error/>");
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert_eq!(err.code.as_deref(), Some("423"));
        assert!(err.message.contains("<d:error/>"));
    }
}
