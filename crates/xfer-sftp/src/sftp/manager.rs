// ── Pool plumbing for SSH sessions ───────────────────────────────────────────

use crate::sftp::session::SftpSession;
use crate::sftp::types::SftpConnectionConfig;
use async_trait::async_trait;
use xfer_core::{ConnectionKey, ConnectionManager, Credentials, OperationResult, TransferConfig};

pub struct SftpManager {
    config: TransferConfig,
}

impl SftpManager {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Open a session outside the pool (connection tests).
    pub async fn open(&self, host: &str, port: u16, credentials: &Credentials) -> OperationResult<SftpSession> {
        SftpSession::connect(SftpConnectionConfig::new(host, port, credentials, &self.config)).await
    }
}

#[async_trait]
impl ConnectionManager for SftpManager {
    type Connection = SftpSession;

    async fn connect(&self, key: &ConnectionKey, credentials: &Credentials) -> OperationResult<SftpSession> {
        self.open(&key.host, key.port, credentials).await
    }

    /// Idle age is the pool's concern; here only poisoning counts.
    fn is_valid(&self, conn: &SftpSession) -> bool {
        !conn.is_poisoned()
    }

    async fn close(&self, conn: SftpSession) {
        conn.disconnect().await;
    }
}
