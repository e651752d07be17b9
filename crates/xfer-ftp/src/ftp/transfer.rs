//! Data-channel management for FTP transfers.
//!
//! Supports both sides of RFC 959 + RFC 2428:
//! - **PASV / EPSV** — server opens a port, client connects
//! - **PORT / EPRT** — client listens, server connects back
//!
//! The passive connect goes through a [`DataConnector`] so the client's
//! passive→active fallback can be driven deterministically. The data socket
//! is TLS-wrapped by the client when the control channel is protected.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_rustls::client::TlsStream;

lazy_static! {
    static ref PASV_RE: Regex = Regex::new(r"(\d+),(\d+),(\d+),(\d+),(\d+),(\d+)").expect("static PASV pattern");
    static ref EPSV_RE: Regex = Regex::new(r"\|\|\|(\d+)\|").expect("static EPSV pattern");
}

// ─── DataStream ──────────────────────────────────────────────────────

/// A plain or TLS-wrapped data connection.
pub enum DataStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for DataStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DataStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_flush(cx),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

// ─── Passive connect seam ────────────────────────────────────────────

/// Opens the client side of a passive data connection.
#[async_trait]
pub trait DataConnector: Send + Sync {
    /// Connect to `addr`; a connect that exceeds `limit` must fail with
    /// [`FtpErrorKind::DataChannelTimeout`](crate::ftp::error::FtpErrorKind).
    async fn connect(&self, addr: SocketAddr, limit: Duration) -> FtpResult<TcpStream>;
}

/// The real thing: a TCP connect under a timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDataConnector;

#[async_trait]
impl DataConnector for TcpDataConnector {
    async fn connect(&self, addr: SocketAddr, limit: Duration) -> FtpResult<TcpStream> {
        let tcp = timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| FtpError::data_timeout(format!("passive data connect to {} timed out", addr)))?
            .map_err(|e| FtpError::data_channel(format!("passive data connect to {}: {}", addr, e)))?;
        tcp.set_nodelay(true).ok();
        Ok(tcp)
    }
}

// ─── PASV / EPSV ─────────────────────────────────────────────────────

/// Ask the server for a passive endpoint.
///
/// EPSV is used when advertised (or required by an IPv6 control
/// connection); a rejected EPSV falls back to PASV on IPv4.
pub async fn request_passive(codec: &mut FtpCodec, prefer_epsv: bool) -> FtpResult<SocketAddr> {
    let peer = codec.peer_addr;
    if prefer_epsv || peer.is_ipv6() {
        let resp = codec.execute("EPSV").await?;
        if resp.is_success() {
            let port = parse_epsv_response(&resp.text())?;
            return Ok(SocketAddr::new(peer.ip(), port));
        }
        if peer.is_ipv6() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        log::debug!("EPSV rejected ({}), trying PASV", resp.code);
    }

    let resp = codec.expect_ok("PASV").await?;
    let addr = parse_pasv_response(&resp.text())?;
    Ok(reachable_passive_addr(addr, peer))
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 reply.
pub fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol_error("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok(SocketAddr::new(ip, port))
}

/// Parse the port from `229 Entering Extended Passive Mode (|||port|)`.
pub fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol_error("EPSV port out of range"))
}

/// Servers behind NAT often announce an internal or unspecified address;
/// use the control peer instead in that case.
fn reachable_passive_addr(announced: SocketAddr, peer: SocketAddr) -> SocketAddr {
    let unroutable = match (announced.ip(), peer.ip()) {
        (IpAddr::V4(a), _) if a.is_unspecified() => true,
        (IpAddr::V4(a), IpAddr::V4(p)) => a.is_private() && !p.is_private() && !p.is_loopback(),
        _ => false,
    };
    if unroutable {
        log::debug!("ignoring passive address {}, using control peer {}", announced.ip(), peer.ip());
        SocketAddr::new(peer.ip(), announced.port())
    } else {
        announced
    }
}

// ─── PORT / EPRT ─────────────────────────────────────────────────────

/// Bind a listener and announce it with PORT (IPv4) or EPRT.
///
/// Must run before the transfer command: the server connects back only
/// after it has accepted RETR/STOR/LIST.
pub async fn arm_active(codec: &mut FtpCodec, bind_addr: Option<&str>) -> FtpResult<TcpListener> {
    let ip: IpAddr = match bind_addr {
        Some(addr) => addr
            .parse()
            .map_err(|_| FtpError::invalid_config(format!("invalid active bind address '{}'", addr)))?,
        None => codec.local_addr.ip(),
    };
    let listener = TcpListener::bind(SocketAddr::new(ip, 0))
        .await
        .map_err(|e| FtpError::data_channel(format!("active bind {}: {}", ip, e)))?;
    let local = listener
        .local_addr()
        .map_err(|e| FtpError::data_channel(format!("active local_addr: {}", e)))?;

    codec.expect_ok(&active_command(local)).await?;
    Ok(listener)
}

/// `PORT h1,h2,h3,h4,p1,p2` for IPv4, `EPRT |2|addr|port|` for IPv6.
pub fn active_command(local: SocketAddr) -> String {
    match local.ip() {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!(
                "PORT {},{},{},{},{},{}",
                o[0],
                o[1],
                o[2],
                o[3],
                local.port() / 256,
                local.port() % 256
            )
        }
        IpAddr::V6(v6) => format!("EPRT |2|{}|{}|", v6, local.port()),
    }
}

/// Wait for the server's data connection.
pub async fn accept_active(listener: &TcpListener, limit: Duration) -> FtpResult<TcpStream> {
    let (tcp, from) = timeout(limit, listener.accept())
        .await
        .map_err(|_| FtpError::data_timeout("active data connection not received"))?
        .map_err(|e| FtpError::data_channel(format!("active accept: {}", e)))?;
    log::trace!("active data connection from {}", from);
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pasv() {
        let addr = parse_pasv_response("227 Entering Passive Mode (192,168,1,10,195,80).").unwrap();
        assert_eq!(addr, "192.168.1.10:50000".parse().unwrap());
        assert!(parse_pasv_response("227 garbage").is_err());
    }

    #[test]
    fn parses_epsv() {
        assert_eq!(parse_epsv_response("229 Entering Extended Passive Mode (|||6446|)").unwrap(), 6446);
    }

    #[test]
    fn port_advertises_the_given_address() {
        let cmd = active_command("10.0.0.5:50001".parse().unwrap());
        assert_eq!(cmd, "PORT 10,0,0,5,195,81");
        let cmd = active_command("[::1]:2121".parse().unwrap());
        assert_eq!(cmd, "EPRT |2|::1|2121|");
    }

    #[test]
    fn nat_addresses_are_replaced_by_peer() {
        let peer: SocketAddr = "203.0.113.7:21".parse().unwrap();
        let got = reachable_passive_addr("10.1.1.1:40000".parse().unwrap(), peer);
        assert_eq!(got, "203.0.113.7:40000".parse().unwrap());
        let local_peer: SocketAddr = "127.0.0.1:21".parse().unwrap();
        let got = reachable_passive_addr("127.0.0.1:40000".parse().unwrap(), local_peer);
        assert_eq!(got, "127.0.0.1:40000".parse().unwrap());
        let got = reachable_passive_addr("0.0.0.0:40000".parse().unwrap(), local_peer);
        assert_eq!(got.ip(), local_peer.ip());
    }
}
