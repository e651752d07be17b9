//! # xfer-core — shared transfer model
//!
//! Architecture:
//! - `types` — protocols, connection keys, targets, file info, credentials
//! - `uri` — path-string parsing into [`TransferTarget`]
//! - `error` — the closed failure taxonomy
//! - `progress` — throttled progress reporting + cancellation token
//! - `stream` — the buffered, cancellable streaming pump
//! - `config` — JSON-loadable limits and timeouts
//! - `credentials` — resolver boundary + in-memory resolver
//! - `pool` — generic keyed connection pool
//! - `backend` — the protocol-client contract

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pool;
pub mod progress;
pub mod stream;
pub mod types;
pub mod uri;

pub use backend::{DynReader, DynWriter, RemoteBackend};
pub use config::{FtpSecurity, FtpSettings, SftpSettings, SmbSettings, TransferConfig, WebDavSettings};
pub use credentials::{resolve_connection, CredentialResolver, MissingCredentials, StaticCredentialResolver};
pub use error::{ErrorKind, OperationResult, TransferError};
pub use pool::{ConnectionManager, ConnectionPool, PoolOptions, PoolStats, PooledConnection};
pub use progress::{monotonic, Phase, ProgressCallback, ProgressReporter, TransferControl, TransferProgress};
pub use stream::{pump, PumpOptions, DEFAULT_BUFFER_SIZE};
pub use types::{ConnectionKey, ConnectionParams, Credentials, FileInfo, Protocol, TransferTarget};
pub use uri::UriError;
