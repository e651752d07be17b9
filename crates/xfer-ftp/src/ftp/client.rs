//! Stateful FTP client: owns the control connection and issues commands.
//!
//! Lifecycle: `connect()` → optional TLS upgrade → authenticate → FEAT →
//! `TYPE I`. Higher-level operations live in `directory.rs` and
//! `file_ops.rs`.
//!
//! A client is **poisoned** by any failure that leaves the control channel
//! in an unknown state (I/O error, timeout, cancelled transfer). A poisoned
//! client never reads another reply; the pool closes it instead.

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::tls;
use crate::ftp::transfer::{self, DataConnector, DataStream, TcpDataConnector};
use crate::ftp::types::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use xfer_core::FtpSecurity;

/// A connected FTP session.
pub struct FtpClient {
    pub config: FtpConnectionConfig,
    pub features: ServerFeatures,
    pub connected_at: DateTime<Utc>,
    codec: FtpCodec,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    connector: Arc<dyn DataConnector>,
    poisoned: bool,
    /// A transfer command got its 1xx reply; the completion reply is pending.
    awaiting_completion: bool,
    /// Passive failed before and active worked: go straight to active.
    prefer_active: bool,
}

impl FtpClient {
    /// Establish a new session with the default TCP data connector.
    pub async fn connect(config: FtpConnectionConfig) -> FtpResult<Self> {
        Self::connect_with(config, Arc::new(TcpDataConnector)).await
    }

    pub async fn connect_with(config: FtpConnectionConfig, connector: Arc<dyn DataConnector>) -> FtpResult<Self> {
        if config.host.is_empty() {
            return Err(FtpError::invalid_config("Host must not be empty"));
        }

        let tls_config = match config.settings.security {
            FtpSecurity::None => None,
            _ => Some(tls::build_client_config(config.settings.accept_invalid_certs)?),
        };

        let (mut codec, _banner) = connection::connect(&config, tls_config.as_ref()).await?;

        // ── Explicit FTPS: AUTH TLS ──────────────────────────────
        if let (FtpSecurity::Explicit, Some(tls_cfg)) = (config.settings.security, tls_config.as_ref()) {
            let resp = codec.execute("AUTH TLS").await?;
            if resp.code != 234 {
                return Err(FtpError::tls_failed(format!("AUTH TLS rejected: {}", resp.text())).with_code(resp.code));
            }
            codec = tls::upgrade_to_tls(codec, &config.host, tls_cfg).await?;
        }
        if tls_config.is_some() {
            codec.expect_ok("PBSZ 0").await?;
            codec.expect_ok("PROT P").await?;
        }

        // ── Authenticate ─────────────────────────────────────────
        let user_resp = codec.execute(&format!("USER {}", config.username)).await?;
        if user_resp.code == 331 {
            let pass_resp = codec.execute(&format!("PASS {}", config.password)).await?;
            if !pass_resp.is_success() {
                return Err(login_error(&pass_resp));
            }
        } else if !user_resp.is_success() {
            return Err(login_error(&user_resp));
        }

        // ── FEAT ─────────────────────────────────────────────────
        let features = match codec.execute("FEAT").await? {
            r if r.is_success() => ServerFeatures::from_feat_lines(&r.lines),
            _ => ServerFeatures::default(),
        };

        if config.settings.utf8 && features.utf8 {
            // Servers that already default to UTF-8 may reject this.
            let _ = codec.execute("OPTS UTF8 ON").await?;
        }

        codec.expect_ok("TYPE I").await?;
        log::info!("FTP session {}@{}:{} ready", config.username, config.host, config.port);

        Ok(Self {
            config,
            features,
            connected_at: Utc::now(),
            codec,
            tls_config,
            connector,
            poisoned: false,
            awaiting_completion: false,
            prefer_active: false,
        })
    }

    // ─── Health ──────────────────────────────────────────────────

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Record a failure; fatal ones poison the session.
    pub(crate) fn guard<T>(&mut self, result: FtpResult<T>) -> FtpResult<T> {
        if let Err(e) = &result {
            if e.is_fatal() && !self.poisoned {
                log::warn!("FTP session {}:{} poisoned: {}", self.config.host, self.config.port, e);
                self.poisoned = true;
            }
        }
        result
    }

    /// Give up on the current transfer: no reply is awaited, the control
    /// socket is shut down and the session is marked unusable.
    pub async fn abandon(&mut self) {
        self.poisoned = true;
        self.awaiting_completion = false;
        self.codec.shutdown().await;
    }

    // ─── Commands ────────────────────────────────────────────────

    pub(crate) async fn command(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        if self.poisoned {
            return Err(FtpError::disconnected("session is no longer usable"));
        }
        let r = self.codec.execute(cmd).await;
        self.guard(r)
    }

    pub(crate) async fn command_ok(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        let resp = self.command(cmd).await?;
        if !resp.is_success() {
            return self.guard(Err(FtpError::from_reply(resp.code, &resp.text())));
        }
        Ok(resp)
    }

    // ─── Data channel ────────────────────────────────────────────

    /// Open a data connection for `cmd` (RETR/STOR/LIST/MLSD) and issue it.
    ///
    /// Passive first; if the passive connect times out, the same command is
    /// retried exactly once in active mode. A failure of the active attempt
    /// is final.
    pub async fn open_transfer(&mut self, cmd: &str) -> FtpResult<DataStream> {
        if self.poisoned {
            return Err(FtpError::disconnected("session is no longer usable"));
        }
        let settings = &self.config.settings;
        let passive = settings.passive_first && !self.prefer_active;
        let fallback = settings.active_fallback;

        let result = if passive {
            match self.transfer_passive(cmd).await {
                Err(e) if e.kind == crate::ftp::error::FtpErrorKind::DataChannelTimeout && fallback => {
                    log::warn!("passive data connection timed out ({}), retrying '{}' in active mode", e.message, verb(cmd));
                    let active = self.transfer_active(cmd).await;
                    if active.is_ok() {
                        self.prefer_active = true;
                    }
                    active
                }
                other => other,
            }
        } else {
            self.transfer_active(cmd).await
        };
        self.guard(result)
    }

    async fn transfer_passive(&mut self, cmd: &str) -> FtpResult<DataStream> {
        let addr = transfer::request_passive(&mut self.codec, self.features.epsv).await?;
        let tcp = self.connector.connect(addr, self.config.data_timeout).await?;
        self.issue(cmd).await?;
        self.wrap_data(tcp).await
    }

    async fn transfer_active(&mut self, cmd: &str) -> FtpResult<DataStream> {
        let bind = self.config.settings.active_bind_address.clone();
        let listener = transfer::arm_active(&mut self.codec, bind.as_deref()).await?;
        self.issue(cmd).await?;
        let tcp = transfer::accept_active(&listener, self.config.data_timeout).await?;
        self.wrap_data(tcp).await
    }

    /// Send the transfer command; accept a 1xx (completion follows) or an
    /// immediate 2xx.
    async fn issue(&mut self, cmd: &str) -> FtpResult<()> {
        let resp = self.codec.execute(cmd).await?;
        if resp.is_preliminary() {
            self.awaiting_completion = true;
            Ok(())
        } else if resp.is_success() {
            self.awaiting_completion = false;
            Ok(())
        } else {
            Err(FtpError::from_reply(resp.code, &resp.text()))
        }
    }

    async fn wrap_data(&mut self, tcp: TcpStream) -> FtpResult<DataStream> {
        match &self.tls_config {
            Some(cfg) => {
                let tls = tls::connect_tls(cfg, &self.config.host, tcp).await?;
                Ok(DataStream::Tls(Box::new(tls)))
            }
            None => Ok(DataStream::Plain(tcp)),
        }
    }

    /// Read the completion reply (226) after the data stream was closed.
    pub async fn finish_transfer(&mut self) -> FtpResult<()> {
        if !self.awaiting_completion {
            return Ok(());
        }
        self.awaiting_completion = false;
        let r = self.codec.read_response().await;
        let done = self.guard(r)?;
        if !done.is_success() {
            return self.guard(Err(FtpError::from_reply(done.code, &done.text())));
        }
        Ok(())
    }

    // ─── QUIT ────────────────────────────────────────────────────

    /// Close the session. Poisoned sessions skip the QUIT exchange.
    pub async fn quit(&mut self) {
        if !self.poisoned {
            let limit = Duration::from_secs(2).min(self.config.read_timeout);
            let _ = tokio::time::timeout(limit, self.codec.execute("QUIT")).await;
        }
        self.poisoned = true;
        self.codec.shutdown().await;
    }
}

fn login_error(resp: &FtpResponse) -> FtpError {
    match resp.code {
        421 => FtpError::from_reply(resp.code, &resp.text()),
        code => FtpError::auth_failed(format!("Login failed: {}", resp.text())).with_code(code),
    }
}

/// Command verb without its argument, for logs.
fn verb(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}
