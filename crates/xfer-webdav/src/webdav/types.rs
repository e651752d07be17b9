// ── Types: endpoint description, DAV resources, path encoding ────────────────

use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;
use xfer_core::FileInfo;

/// Characters escaped inside one path segment (RFC 3986 unreserved stay).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropfindDepth {
    Zero,
    One,
}

impl PropfindDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
        }
    }
}

/// Where a client points: `scheme://host:port` plus an optional prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEndpoint {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Prefix between the authority and the user-visible tree, no trailing `/`.
    pub base_path: String,
}

impl DavEndpoint {
    pub fn new(secure: bool, host: &str, port: u16, base_path: Option<&str>) -> Self {
        let base = base_path.unwrap_or("").trim_matches('/');
        Self {
            secure,
            host: host.to_string(),
            port,
            base_path: if base.is_empty() { String::new() } else { format!("/{}", base) },
        }
    }

    pub fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        if self.host.contains(':') {
            format!("{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }

    /// Absolute URL of `path`; collections get a trailing slash.
    pub fn url(&self, path: &str, collection: bool) -> String {
        let mut out = format!("{}{}/{}", self.origin(), self.base_path, encode_path(path));
        if collection && !out.ends_with('/') {
            out.push('/');
        }
        out
    }

    /// Map an `href` from a multistatus body back to a `/`-rooted path.
    pub fn path_of(&self, href: &str) -> String {
        // Absolute hrefs carry an authority and maybe a query; relative ones
        // are already a path.
        let decoded = match Url::parse(href) {
            Ok(url) => percent_decode_str(url.path()).decode_utf8_lossy().into_owned(),
            Err(_) => percent_decode_str(href).decode_utf8_lossy().into_owned(),
        };
        let relative = decoded.strip_prefix(&self.base_path).unwrap_or(&decoded);
        let trimmed = relative.trim_matches('/');
        format!("/{}", trimmed)
    }
}

/// Percent-encode each `/`-separated segment.
pub fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|seg| utf8_percent_encode(seg, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// One `<d:response>` from a multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResource {
    pub href: String,
    pub display_name: Option<String>,
    pub is_collection: bool,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl DavResource {
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn into_file_info(self, endpoint: &DavEndpoint) -> FileInfo {
        let path = endpoint.path_of(&self.href);
        let name = xfer_core::types::base_name(&path);
        FileInfo {
            modified: self.modified(),
            size: if self.is_collection { 0 } else { self.content_length.unwrap_or(0) },
            is_directory: self.is_collection,
            permissions: None,
            name,
            path,
        }
    }
}
