//! # xfer — multi-protocol file transfer
//!
//! Copy, move, delete, rename and list across local disk, SMB, SFTP,
//! FTP/FTPS and WebDAV through one [`TransferOrchestrator`].
//!
//! ```no_run
//! # async fn demo() -> xfer::OperationResult<()> {
//! use std::sync::Arc;
//! use xfer::{Credentials, Protocol, StaticCredentialResolver, TransferConfig, TransferOrchestrator};
//!
//! let resolver = StaticCredentialResolver::new()
//!     .with(Protocol::Sftp, "backup.lan", None, Credentials::password("alice", "s3cret"));
//! let xfer = TransferOrchestrator::builder(TransferConfig::default())
//!     .resolver(Arc::new(resolver))
//!     .build()?;
//! xfer.copy("smb://nas/media/a.jpg", "sftp://backup.lan/srv/a.jpg", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod transfer;

pub use transfer::*;
pub use xfer_core::*;

pub use xfer_ftp as ftp;
pub use xfer_sftp as sftp;
pub use xfer_smb as smb;
pub use xfer_webdav as webdav;
