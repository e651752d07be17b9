// ── xfer-sftp / sftp module ──────────────────────────────────────────────────
//
// SFTP over libssh2:
//   • session setup with an agent / key / password / keyboard-interactive cascade
//   • every libssh2 call runs on the blocking pool, one session per pooled slot
//   • chunked streaming through a bounded channel so progress and cancellation
//     stay on the async side
//   • libssh2 / SFTP status codes classified into the shared taxonomy

pub mod backend;
pub mod dir_ops;
pub mod error;
pub mod manager;
pub mod session;
pub mod transfer;
pub mod types;

pub use backend::SftpBackend;
pub use error::{classify, classify_code, classify_io};
pub use manager::SftpManager;
pub use session::SftpSession;
pub use types::*;
