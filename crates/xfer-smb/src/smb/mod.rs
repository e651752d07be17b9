// ── xfer-smb / smb module ────────────────────────────────────────────────────
//
// SMB through the Samba `smbclient` binary:
//   • one process per command, credentials in a 0600 `-A` file
//   • `ls` / `-L` output parsed into entries and shares
//   • downloads tail a spool file the child writes; uploads spool then `put`
//   • NT_STATUS codes classified into the shared taxonomy

pub mod backend;
pub mod command;
pub mod error;
pub mod manager;
pub mod parser;
pub mod session;
pub mod transfer;
pub mod types;

pub use backend::SmbBackend;
pub use error::{find_status, status_kind, SmbError};
pub use manager::SmbManager;
pub use parser::{parse_ls, parse_shares, LsEntry};
pub use session::SmbSession;
pub use types::*;
