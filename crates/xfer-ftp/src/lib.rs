//! # xfer-ftp
//!
//! FTP and FTPS backend for the transfer core.

pub mod ftp;

pub use ftp::*;
