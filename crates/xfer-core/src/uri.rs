//! Path-string parsing: `smb://host[:port]/share/path`, `sftp://…`,
//! `ftp://…`, `dav(s)://…`, `file:///…` and bare absolute local paths.

use crate::error::TransferError;
use crate::types::{base_name, Protocol, TransferTarget};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("empty path")]
    Empty,
    #[error("unsupported scheme '{0}'")]
    UnknownScheme(String),
    #[error("missing host in '{0}'")]
    MissingHost(String),
    #[error("SMB path '{0}' does not name a share")]
    MissingShare(String),
    #[error("local path '{0}' is not absolute")]
    RelativePath(String),
    #[error("malformed URI '{0}': {1}")]
    Malformed(String, String),
}

impl From<UriError> for TransferError {
    fn from(e: UriError) -> Self {
        TransferError::protocol("EINVALIDPATH", e.to_string())
    }
}

/// Map a URI scheme to its protocol and TLS flag.
pub fn scheme_protocol(scheme: &str) -> Option<(Protocol, bool)> {
    match scheme.to_ascii_lowercase().as_str() {
        "file" => Some((Protocol::Local, false)),
        "smb" | "cifs" => Some((Protocol::Smb, false)),
        "sftp" => Some((Protocol::Sftp, false)),
        "ftp" => Some((Protocol::Ftp, false)),
        "dav" | "webdav" => Some((Protocol::WebDav, false)),
        "davs" | "webdavs" => Some((Protocol::WebDav, true)),
        _ => None,
    }
}

impl TransferTarget {
    /// Parse a path string into a target.
    pub fn parse(input: &str) -> Result<TransferTarget, UriError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(UriError::Empty);
        }

        let Some((scheme, rest)) = split_scheme(input) else {
            return parse_local(input);
        };
        let (protocol, secure) = scheme_protocol(scheme)
            .ok_or_else(|| UriError::UnknownScheme(scheme.to_string()))?;

        // The path is split by hand: `#` and `?` are legal in file names and
        // belong to the path, never to a fragment or query.
        let (authority, raw_path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, ""),
        };

        if protocol == Protocol::Local {
            if !authority.is_empty() && !authority.eq_ignore_ascii_case("localhost") {
                return Err(UriError::Malformed(input.to_string(), "file URI with a remote host".into()));
            }
            return parse_local(&decode(raw_path));
        }

        let url = Url::parse(&format!("{}://{}/", scheme, authority))
            .map_err(|e| UriError::Malformed(input.to_string(), e.to_string()))?;
        if url.query().is_some() || url.fragment().is_some() {
            return Err(UriError::Malformed(input.to_string(), "'?' or '#' in the authority".into()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UriError::MissingHost(input.to_string()))?
            .to_string();

        let mut segments: Vec<String> = raw_path.split('/').filter(|s| !s.is_empty()).map(decode).collect();
        let trailing_slash = raw_path.ends_with('/') && raw_path.len() > 1;

        let root = if protocol == Protocol::Smb {
            if segments.is_empty() {
                return Err(UriError::MissingShare(input.to_string()));
            }
            Some(segments.remove(0))
        } else {
            None
        };

        let remote_path = format!("/{}", segments.join("/"));
        let display_name = match segments.last() {
            Some(last) => last.clone(),
            None => root.clone().unwrap_or_else(|| host.clone()),
        };
        let user_hint = Some(url.username()).filter(|u| !u.is_empty()).map(decode);

        Ok(TransferTarget {
            protocol,
            host: Some(host),
            port: url.port(),
            root,
            is_directory: trailing_slash || remote_path == "/",
            remote_path,
            display_name,
            size_bytes: None,
            secure,
            user_hint,
        })
    }
}

/// `scheme://rest`, when the prefix is a syntactically valid scheme. A bare
/// path that merely contains `://` stays local.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Characters escaped when a path segment is written back into a URI.
const PATH_ESCAPES: &AsciiSet = &CONTROLS.add(b'%').add(b'#').add(b'?');

/// Characters escaped in the `user@` part.
const USERINFO_ESCAPES: &AsciiSet = &PATH_ESCAPES.add(b'@').add(b':').add(b'/');

/// Escape `path` so that [`TransferTarget::parse`] reads it back unchanged.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPES).to_string()
}

pub(crate) fn encode_userinfo(user: &str) -> String {
    utf8_percent_encode(user, USERINFO_ESCAPES).to_string()
}

fn parse_local(input: &str) -> Result<TransferTarget, UriError> {
    if !Path::new(input).is_absolute() {
        return Err(UriError::RelativePath(input.to_string()));
    }
    let mut t = TransferTarget::local(input);
    t.is_directory = input.len() > 1 && input.ends_with('/');
    if t.is_directory {
        t.display_name = base_name(input);
    }
    Ok(t)
}
