// ── Pool plumbing for WebDAV clients ─────────────────────────────────────────

use crate::webdav::client::DavClient;
use crate::webdav::types::DavEndpoint;
use async_trait::async_trait;
use xfer_core::{ConnectionKey, ConnectionManager, Credentials, OperationResult, TransferConfig};

/// Builds clients for one scheme; `davs://` and `dav://` get separate managers.
pub struct DavManager {
    config: TransferConfig,
    secure: bool,
}

impl DavManager {
    pub fn new(config: TransferConfig, secure: bool) -> Self {
        Self { config, secure }
    }

    pub fn endpoint(&self, host: &str, port: u16) -> DavEndpoint {
        DavEndpoint::new(self.secure, host, port, self.config.webdav.base_path.as_deref())
    }

    /// Build a client and prove the credentials against the endpoint root.
    pub async fn open(&self, host: &str, port: u16, credentials: &Credentials) -> OperationResult<DavClient> {
        let mut client = DavClient::new(self.endpoint(host, port), credentials, &self.config)?;
        client.probe().await?;
        Ok(client)
    }
}

#[async_trait]
impl ConnectionManager for DavManager {
    type Connection = DavClient;

    async fn connect(&self, key: &ConnectionKey, credentials: &Credentials) -> OperationResult<DavClient> {
        self.open(&key.host, key.port, credentials).await
    }

    fn is_valid(&self, conn: &DavClient) -> bool {
        !conn.is_poisoned()
    }

    /// reqwest closes its sockets when the client is dropped.
    async fn close(&self, conn: DavClient) {
        drop(conn);
    }
}
