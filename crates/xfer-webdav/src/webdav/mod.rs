// ── xfer-webdav / webdav module ──────────────────────────────────────────────
//
// Cloud storage over WebDAV:
//   • PROPFIND listings parsed from multistatus XML
//   • GET / PUT bodies streamed chunk by chunk with progress and cancellation
//   • MOVE for native renames, COPY for same-server copies
//   • HTTP statuses classified into the shared taxonomy

pub mod backend;
pub mod client;
pub mod error;
pub mod manager;
pub mod transfer;
pub mod types;
pub mod xml;

pub use backend::WebDavBackend;
pub use client::{DavClient, RetryPolicy};
pub use error::{classify_reqwest, status_error, status_kind};
pub use manager::DavManager;
pub use types::*;
pub use xml::parse_multistatus;
