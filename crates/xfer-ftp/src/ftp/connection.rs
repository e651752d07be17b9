//! TCP + TLS transport: establishes the FTP control connection.
//!
//! Handles plain-TCP connect, implicit-FTPS wrapping, and the connect
//! timeout. Explicit FTPS upgrades later, after `AUTH TLS` (see `client.rs`).

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::tls;
use crate::ftp::types::{FtpConnectionConfig, FtpResponse};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use xfer_core::FtpSecurity;

/// Open the control connection and return a codec plus the server banner.
pub async fn connect(
    config: &FtpConnectionConfig,
    tls_config: Option<&Arc<rustls::ClientConfig>>,
) -> FtpResult<(FtpCodec, FtpResponse)> {
    let addr = format!("{}:{}", config.host, config.port);

    let tcp = timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();

    let mut codec = match (config.settings.security, tls_config) {
        (FtpSecurity::Implicit, Some(tls_config)) => {
            let stream = tls::connect_tls(tls_config, &config.host, tcp).await?;
            FtpCodec::from_tls(stream, config.read_timeout)?
        }
        (FtpSecurity::Implicit, None) => {
            return Err(FtpError::invalid_config("implicit FTPS without a TLS configuration"))
        }
        _ => FtpCodec::from_tcp(tcp, config.read_timeout)?,
    };

    let banner = codec.read_response().await?;
    if banner.code != 220 {
        return Err(FtpError::from_reply(banner.code, &banner.text()));
    }
    log::debug!("connected to {} ({})", addr, banner.lines.first().map(String::as_str).unwrap_or(""));
    Ok((codec, banner))
}
