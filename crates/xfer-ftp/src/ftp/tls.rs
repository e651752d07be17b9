//! TLS helpers for Explicit and Implicit FTPS (RFC 4217).
//!
//! - One `rustls::ClientConfig` per client, shared by the control channel
//!   and every data channel so servers that require TLS session reuse on
//!   the data connection accept us.
//! - `upgrade_to_tls` wraps an existing plain codec after `AUTH TLS`.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::{FtpCodec, ReadHalf, WriteHalf};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Build the client configuration: native roots, or no verification at all
/// when the caller explicitly accepts invalid certificates.
pub fn build_client_config(accept_invalid_certs: bool) -> FtpResult<Arc<rustls::ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?;

    let config = if accept_invalid_certs {
        log::warn!("FTPS certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            log::debug!("native root store: {}", err);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        log::debug!("loaded {} native roots ({} ignored)", added, ignored);
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(Arc::new(config))
}

fn server_name(host: &str) -> FtpResult<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| FtpError::tls_failed(format!("Invalid server name '{}': {}", host, e)))
}

/// Handshake over an already connected socket.
pub async fn connect_tls(
    config: &Arc<rustls::ClientConfig>,
    host: &str,
    tcp: TcpStream,
) -> FtpResult<TlsStream<TcpStream>> {
    TlsConnector::from(config.clone())
        .connect(server_name(host)?, tcp)
        .await
        .map_err(|e| FtpError::tls_failed(format!("TLS handshake: {}", e)))
}

/// Upgrade a **plain** control connection to TLS after a 234 reply.
pub async fn upgrade_to_tls(
    codec: FtpCodec,
    host: &str,
    config: &Arc<rustls::ClientConfig>,
) -> FtpResult<FtpCodec> {
    let read_timeout = codec.read_timeout;
    let tcp = reunite_plain(codec)?;
    let tls = connect_tls(config, host, tcp).await?;
    FtpCodec::from_tls(tls, read_timeout)
}

/// Reunite the read + write halves back into a `TcpStream`.
fn reunite_plain(codec: FtpCodec) -> FtpResult<TcpStream> {
    match (codec.reader, codec.writer) {
        (ReadHalf::Plain(rd), WriteHalf::Plain(wr)) => rd
            .into_inner()
            .reunite(wr)
            .map_err(|e| FtpError::protocol_error(format!("Reunite failed: {}", e))),
        _ => Err(FtpError::protocol_error(
            "Cannot upgrade: connection is already TLS",
        )),
    }
}

// ─── NoCertVerifier (for self-signed certs) ─────────────────────────

#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
