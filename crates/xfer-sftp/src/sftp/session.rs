// ── SftpSession – one authenticated SSH session with its SFTP channel ────────

use crate::sftp::error::{classify, poisons_session};
use crate::sftp::types::*;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use ssh2::{Session, Sftp};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex};
use xfer_core::{ErrorKind, OperationResult, TransferError};

/// libssh2 state. Only ever touched from the blocking pool, one call at a time.
pub(crate) struct Handle {
    pub session: Session,
    pub sftp: Sftp,
    // Keeps the socket open for the lifetime of the session.
    _tcp: TcpStream,
}

pub(crate) type SharedHandle = Arc<Mutex<Handle>>;

pub struct SftpSession {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    pub server_banner: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub(crate) handle: SharedHandle,
    poisoned: bool,
}

impl SftpSession {
    // ── Connect ──────────────────────────────────────────────────────────────

    pub async fn connect(config: SftpConnectionConfig) -> OperationResult<Self> {
        if config.username.is_empty() {
            return Err(TransferError::authentication("SFTP requires a username"));
        }
        tokio::task::spawn_blocking(move || connect_blocking(config))
            .await
            .map_err(|e| TransferError::unknown(format!("SFTP connect task failed: {}", e)))?
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn poison(&mut self, why: &TransferError) {
        if !self.poisoned {
            warn!("SFTP session {}@{}:{} dropped: {}", self.username, self.host, self.port, why);
            self.poisoned = true;
        }
    }

    /// Record the outcome of an operation; transport failures poison.
    pub(crate) fn guard<T>(&mut self, result: OperationResult<T>) -> OperationResult<T> {
        if let Err(e) = &result {
            if poisons_session(e) {
                self.poison(e);
            }
        }
        result
    }

    /// Run one libssh2 call on the blocking pool.
    pub(crate) async fn run<T, F>(&mut self, what: &str, f: F) -> OperationResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Handle) -> Result<T, ssh2::Error> + Send + 'static,
    {
        if self.poisoned {
            return Err(TransferError::network("SFTP session is no longer usable"));
        }
        let handle = self.handle.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut h = handle
                .lock()
                .map_err(|_| TransferError::unknown("SFTP session lock poisoned"))?;
            f(&mut h).map_err(|e| classify(&e))
        })
        .await
        .map_err(|e| TransferError::unknown(format!("SFTP task failed: {}", e)))
        .and_then(|r| r)
        .map_err(|mut e| {
            e.message = format!("{}: {}", what, e.message);
            e
        });
        self.guard(joined)
    }

    // ── Disconnect ───────────────────────────────────────────────────────────

    pub async fn disconnect(mut self) {
        self.poisoned = true;
        let handle = self.handle.clone();
        let target = format!("{}@{}:{}", self.username, self.host, self.port);
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(h) = handle.lock() {
                let _ = h.session.disconnect(None, "Client disconnecting", None);
            }
        })
        .await;
        info!("SFTP session {} closed", target);
    }
}

fn connect_blocking(config: SftpConnectionConfig) -> OperationResult<SftpSession> {
    let address = config.address();
    info!("SFTP connecting to {}", address);

    let tcp = open_tcp(&address, &config)?;
    let mut session = Session::new().map_err(|e| classify(&e))?;
    if config.compress {
        session.set_compress(true);
    }
    session.set_tcp_stream(
        tcp.try_clone()
            .map_err(|e| TransferError::from_io("SFTP socket", e))?,
    );
    // Bounds every blocking libssh2 call from here on, handshake included.
    session.set_timeout(config.read_timeout.as_millis().min(u32::MAX as u128) as u32);
    session.handshake().map_err(|e| {
        let mut err = classify(&e);
        if err.kind == ErrorKind::Protocol {
            err.kind = ErrorKind::Network;
        }
        err.message = format!("SSH handshake with {} failed: {}", address, err.message);
        err
    })?;
    let banner = session.banner().map(|b| b.to_string());

    let auth_method = authenticate(&session, &config)?;
    info!("SFTP authenticated to {} as {} via {:?}", address, config.username, auth_method);

    if config.keepalive_interval_secs > 0 {
        session.set_keepalive(false, config.keepalive_interval_secs);
    }
    let sftp = session.sftp().map_err(|e| classify(&e))?;

    Ok(SftpSession {
        host: config.host.clone(),
        port: config.port,
        username: config.username.clone(),
        auth_method,
        server_banner: banner,
        connected_at: Utc::now(),
        handle: Arc::new(Mutex::new(Handle {
            session,
            sftp,
            _tcp: tcp,
        })),
        poisoned: false,
    })
}

fn open_tcp(address: &str, config: &SftpConnectionConfig) -> OperationResult<TcpStream> {
    let addrs: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|e| TransferError::network(format!("cannot resolve {}: {}", address, e)))?
        .collect();
    let mut last = TransferError::network(format!("{} resolved to no addresses", address));
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(tcp) => {
                tcp.set_nodelay(true).ok();
                return Ok(tcp);
            }
            Err(e) => {
                debug!("SFTP connect {} failed: {}", addr, e);
                last = TransferError::from_io(&format!("TCP connect to {}", addr), e);
            }
        }
    }
    Err(last)
}

// ── Authentication cascade ───────────────────────────────────────────────────

/// Agent, in-memory key, default keys, password, keyboard-interactive.
///
/// A transport failure at any step ends the cascade; rejections move on to
/// the next method and surface as AUTHENTICATION when nothing worked.
fn authenticate(session: &Session, config: &SftpConnectionConfig) -> OperationResult<AuthMethod> {
    let user = config.username.as_str();
    let mut rejected: Vec<String> = Vec::new();

    let mut attempt = |label: &str, result: Result<(), ssh2::Error>| -> OperationResult<bool> {
        match result {
            Ok(()) if session.authenticated() => Ok(true),
            Ok(()) => {
                rejected.push(label.to_string());
                Ok(false)
            }
            Err(e) => {
                let err = classify(&e);
                if err.kind == ErrorKind::Network {
                    return Err(err);
                }
                debug!("SFTP {} auth for {} rejected: {}", label, user, e.message());
                rejected.push(format!("{} ({})", label, e.message()));
                Ok(false)
            }
        }
    };

    // 1. Agent
    if config.use_agent {
        if let Ok(mut agent) = session.agent() {
            if agent.connect().is_ok() && agent.list_identities().is_ok() {
                for identity in agent.identities().unwrap_or_default() {
                    if attempt("agent", agent.userauth(user, &identity))? {
                        return Ok(AuthMethod::Agent);
                    }
                }
            }
        }
    }

    // 2. In-memory key: libssh2 wants a file, so it goes through a 0600 temp file.
    if let Some(key) = &config.private_key_data {
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| TransferError::from_io("temporary key file", e))?;
        file.write_all(key.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| TransferError::from_io("temporary key file", e))?;
        let passphrase = config.private_key_passphrase.as_deref();
        let result = session.userauth_pubkey_file(user, None, file.path(), passphrase);
        if attempt("publickey", result)? {
            return Ok(AuthMethod::PublickeyMemory);
        }
    }

    // 3. Default key paths
    if config.try_default_keys && config.password.is_none() {
        if let Some(ssh_dir) = dirs::home_dir().map(|h| h.join(".ssh")) {
            for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let path = ssh_dir.join(name);
                if !path.exists() {
                    continue;
                }
                let result = session.userauth_pubkey_file(user, None, Path::new(&path), None);
                if attempt(name, result)? {
                    return Ok(AuthMethod::PublickeyDefault);
                }
            }
        }
    }

    // 4. Password, then keyboard-interactive with the same secret
    if let Some(password) = &config.password {
        if attempt("password", session.userauth_password(user, password))? {
            return Ok(AuthMethod::Password);
        }
        let mut prompt = PasswordPrompt {
            password: password.clone(),
        };
        if attempt(
            "keyboard-interactive",
            session.userauth_keyboard_interactive(user, &mut prompt),
        )? {
            return Ok(AuthMethod::KeyboardInteractive);
        }
    }

    let tried = if rejected.is_empty() {
        "no usable method".to_string()
    } else {
        rejected.join(", ")
    };
    Err(TransferError::authentication(format!(
        "SFTP authentication failed for {}@{}: {}",
        user, config.host, tried
    )))
}

/// Answers every keyboard-interactive prompt with the password.
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}
