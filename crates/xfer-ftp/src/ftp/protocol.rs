//! Control-channel command/reply codec (RFC 959 §4).
//!
//! Handles:
//! - Sending commands terminated with `\r\n`
//! - Reading single-line and multi-line replies under a read timeout
//! - Parsing the 3-digit reply code

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::FtpResponse;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

/// Plain TCP or TLS-wrapped read half.
pub enum ReadHalf {
    Plain(BufReader<OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

/// Plain TCP or TLS-wrapped write half.
pub enum WriteHalf {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

/// The control-channel codec operating on split halves.
pub struct FtpCodec {
    pub reader: ReadHalf,
    pub writer: WriteHalf,
    /// Our end of the control socket; PORT/EPRT advertise this address.
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub read_timeout: Duration,
}

impl FtpCodec {
    pub fn from_tcp(stream: TcpStream, read_timeout: Duration) -> FtpResult<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (rd, wr) = stream.into_split();
        Ok(Self {
            reader: ReadHalf::Plain(BufReader::new(rd)),
            writer: WriteHalf::Plain(wr),
            local_addr,
            peer_addr,
            read_timeout,
        })
    }

    pub fn from_tls(stream: TlsStream<TcpStream>, read_timeout: Duration) -> FtpResult<Self> {
        let local_addr = stream.get_ref().0.local_addr()?;
        let peer_addr = stream.get_ref().0.peer_addr()?;
        let (rd, wr) = tokio::io::split(stream);
        Ok(Self {
            reader: ReadHalf::Tls(BufReader::new(rd)),
            writer: WriteHalf::Tls(wr),
            local_addr,
            peer_addr,
            read_timeout,
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.writer, WriteHalf::Tls(_))
    }

    /// Send a raw command (we add the CRLF).
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let line = format!("{}\r\n", cmd);
        match &mut self.writer {
            WriteHalf::Plain(w) => w.write_all(line.as_bytes()).await?,
            WriteHalf::Tls(w) => {
                w.write_all(line.as_bytes()).await?;
                w.flush().await?;
            }
        }
        log::trace!(">>> {}", redact(cmd));
        Ok(())
    }

    /// Read a single line from the control channel (including CRLF).
    async fn read_line_raw(&mut self) -> FtpResult<String> {
        let limit = self.read_timeout;
        let mut buf = String::new();
        let read = match &mut self.reader {
            ReadHalf::Plain(r) => timeout(limit, r.read_line(&mut buf)).await,
            ReadHalf::Tls(r) => timeout(limit, r.read_line(&mut buf)).await,
        };
        let n = read.map_err(|_| FtpError::timeout(format!("no reply within {:?}", limit)))??;
        if n == 0 {
            return Err(FtpError::disconnected("Server closed connection"));
        }
        Ok(buf)
    }

    /// Read a complete reply (possibly multi-line).
    ///
    /// Multi-line replies look like:
    /// ```text
    /// 220-Welcome to my FTP server
    /// 220-This is line 2
    /// 220 End of greeting
    /// ```
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line_raw().await?;
        let first_trimmed = first.trim_end_matches(['\r', '\n']);

        let code = parse_code(first_trimmed)?;
        let mut lines = vec![first_trimmed.to_string()];

        // "NNN-" means more lines follow until "NNN " is seen.
        let is_multi = first_trimmed.as_bytes().get(3) == Some(&b'-');
        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next_trimmed = next.trim_end_matches(['\r', '\n']);
                lines.push(next_trimmed.to_string());
                if next_trimmed.starts_with(&terminator) || next_trimmed == format!("{}", code) {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!("<<< {}", resp.lines.last().map(String::as_str).unwrap_or(""));
        Ok(resp)
    }

    /// Send a command and return the reply.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Send a command and require a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        let resp = self.execute(cmd).await?;
        if !resp.is_success() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    /// Close our side of the control socket without waiting for the server.
    pub async fn shutdown(&mut self) {
        let res = match &mut self.writer {
            WriteHalf::Plain(w) => w.shutdown().await,
            WriteHalf::Tls(w) => w.shutdown().await,
        };
        if let Err(e) = res {
            log::debug!("control shutdown: {}", e);
        }
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    line.get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (100..600).contains(c))
        .ok_or_else(|| FtpError::protocol_error(format!("Invalid reply: '{}'", line)))
}

/// Hide the argument of PASS in logs.
fn redact(cmd: &str) -> &str {
    if cmd.len() >= 4 && cmd[..4].eq_ignore_ascii_case("PASS") {
        "PASS ****"
    } else {
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn pair(script: &'static [u8]) -> FtpCodec {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(script).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        let tcp = TcpStream::connect(addr).await.unwrap();
        FtpCodec::from_tcp(tcp, Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn reads_multiline_reply() {
        let mut codec = pair(b"220-Welcome\r\n220-line two\r\n220 ready\r\n").await;
        let r = codec.read_response().await.unwrap();
        assert_eq!(r.code, 220);
        assert_eq!(r.lines.len(), 3);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let mut codec = pair(b"").await;
        let err = codec.read_response().await.unwrap_err();
        assert_eq!(err.kind, crate::ftp::error::FtpErrorKind::Timeout);
    }

    #[test]
    fn redacts_password() {
        assert_eq!(redact("PASS hunter2"), "PASS ****");
        assert_eq!(redact("USER bob"), "USER bob");
        assert!(parse_code("abc").is_err());
        assert_eq!(parse_code("226 Done").unwrap(), 226);
    }
}
