//! # FTP/FTPS client
//!
//! RFC 959 with the extensions a file-transfer backend needs:
//! - **RFC 2228 / 4217** — AUTH TLS / FTPS (Explicit & Implicit) via rustls
//! - **RFC 3659** — MLSD/MLST, SIZE, MDTM
//! - **RFC 2389** — FEAT negotiation
//! - **RFC 2428** — EPSV / EPRT (IPv6-ready)
//!
//! Architecture:
//! - `types` — replies, server features, listing entries, client options
//! - `error` — FTP-specific error type and its mapping into the shared taxonomy
//! - `protocol` — control-channel command/reply codec
//! - `tls` — rustls client configuration and stream upgrade
//! - `connection` — TCP (+ implicit TLS) control connection
//! - `transfer` — data channels: passive, active, and the passive→active fallback
//! - `client` — stateful session: login, FEAT, TYPE, poisoning
//! - `parser` — Unix/Windows/MLSD listing parser
//! - `directory` — list, stat, mkdir, rmdir, rename, delete
//! - `file_ops` — RETR/STOR streaming
//! - `manager` — pool factory / liveness / close
//! - `backend` — `RemoteBackend` implementation over the pool

pub mod backend;
pub mod client;
pub mod connection;
pub mod directory;
pub mod error;
pub mod file_ops;
pub mod manager;
pub mod parser;
pub mod protocol;
pub mod tls;
pub mod transfer;
pub mod types;

pub use backend::FtpBackend;
pub use client::FtpClient;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use manager::FtpManager;
pub use transfer::{DataConnector, DataStream, TcpDataConnector};
pub use types::*;
