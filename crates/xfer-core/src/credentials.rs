//! Credential lookup boundary.
//!
//! The core never stores secrets; it asks a [`CredentialResolver`] right
//! before connecting and hands the result straight to the pool factory.

use crate::error::{OperationResult, TransferError};
use crate::types::{ConnectionKey, Credentials, Protocol, TransferTarget};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Supplies per-endpoint secrets. Implemented by the host application.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        protocol: Protocol,
        host: &str,
        port: u16,
    ) -> OperationResult<Option<Credentials>>;
}

/// What to do when the resolver has nothing for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCredentials {
    /// Fall back to `anonymous` (FTP).
    Anonymous,
    /// Fall back to a passwordless guest login (SMB).
    Guest,
    /// Refuse with AUTHENTICATION (SFTP, WebDAV).
    Require,
}

/// Resolve credentials for `target` and derive its pool key.
pub async fn resolve_connection(
    resolver: &dyn CredentialResolver,
    target: &TransferTarget,
    missing: MissingCredentials,
) -> OperationResult<(ConnectionKey, Credentials)> {
    let host = target
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransferError::protocol("EINVALIDPATH", "remote target has no host"))?;
    let port = target.effective_port();

    let credentials = match resolver.resolve(target.protocol, host, port).await? {
        Some(c) => c,
        None => match missing {
            MissingCredentials::Anonymous => Credentials::anonymous(),
            MissingCredentials::Guest => Credentials::password(
                target.user_hint.clone().unwrap_or_else(|| "guest".into()),
                "",
            ),
            MissingCredentials::Require => {
                return Err(TransferError::authentication(format!(
                    "no credentials for {}://{}:{}",
                    target.protocol, host, port
                )))
            }
        },
    };

    let key = ConnectionKey::new(target.protocol, host, port, credentials.principal());
    Ok((key, credentials))
}

// ─── In-memory resolver ─────────────────────────────────────────────────────

/// Map-backed resolver keyed by (protocol, host, port) with a per-host
/// fallback registered without a port.
#[derive(Default)]
pub struct StaticCredentialResolver {
    entries: RwLock<HashMap<(Protocol, String, Option<u16>), Credentials>>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, protocol: Protocol, host: &str, port: Option<u16>, credentials: Credentials) {
        if let Ok(mut map) = self.entries.write() {
            map.insert((protocol, host.to_ascii_lowercase(), port), credentials);
        }
    }

    pub fn with(self, protocol: Protocol, host: &str, port: Option<u16>, credentials: Credentials) -> Self {
        self.insert(protocol, host, port, credentials);
        self
    }

    pub fn remove(&self, protocol: Protocol, host: &str, port: Option<u16>) -> Option<Credentials> {
        self.entries
            .write()
            .ok()
            .and_then(|mut map| map.remove(&(protocol, host.to_ascii_lowercase(), port)))
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        protocol: Protocol,
        host: &str,
        port: u16,
    ) -> OperationResult<Option<Credentials>> {
        let map = self
            .entries
            .read()
            .map_err(|_| TransferError::unknown("credential store poisoned"))?;
        let host = host.to_ascii_lowercase();
        Ok(map
            .get(&(protocol, host.clone(), Some(port)))
            .or_else(|| map.get(&(protocol, host, None)))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn port_specific_entry_wins() {
        let r = StaticCredentialResolver::new()
            .with(Protocol::Sftp, "box", None, Credentials::password("any", "x"))
            .with(Protocol::Sftp, "box", Some(2222), Credentials::password("special", "y"));
        let c = r.resolve(Protocol::Sftp, "BOX", 2222).await.unwrap().unwrap();
        assert_eq!(c.username, "special");
        let c = r.resolve(Protocol::Sftp, "box", 22).await.unwrap().unwrap();
        assert_eq!(c.username, "any");
    }

    #[tokio::test]
    async fn missing_credentials_policy() {
        let r = StaticCredentialResolver::new();
        let ftp = TransferTarget::parse("ftp://mirror/pub/a").unwrap();
        let (key, creds) = resolve_connection(&r, &ftp, MissingCredentials::Anonymous).await.unwrap();
        assert_eq!(creds.username, "anonymous");
        assert_eq!(key.port, 21);

        let sftp = TransferTarget::parse("sftp://server/a").unwrap();
        let err = resolve_connection(&r, &sftp, MissingCredentials::Require).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }
}
