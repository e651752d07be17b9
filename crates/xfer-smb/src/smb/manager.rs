//! Pool plumbing for smbclient sessions.

use crate::smb::session::SmbSession;
use crate::smb::types::SmbSessionConfig;
use async_trait::async_trait;
use xfer_core::{ConnectionKey, ConnectionManager, Credentials, OperationResult, TransferConfig};

pub struct SmbManager {
    config: TransferConfig,
}

impl SmbManager {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Open a session outside the pool (connection tests).
    pub async fn open(&self, host: &str, port: u16, credentials: &Credentials) -> OperationResult<SmbSession> {
        SmbSession::connect(SmbSessionConfig::new(host, port, credentials, &self.config)).await
    }
}

#[async_trait]
impl ConnectionManager for SmbManager {
    type Connection = SmbSession;

    async fn connect(&self, key: &ConnectionKey, credentials: &Credentials) -> OperationResult<SmbSession> {
        self.open(&key.host, key.port, credentials).await
    }

    fn is_valid(&self, conn: &SmbSession) -> bool {
        !conn.is_poisoned()
    }

    async fn close(&self, conn: SmbSession) {
        conn.disconnect().await;
    }
}
