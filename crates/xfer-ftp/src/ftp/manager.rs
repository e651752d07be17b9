//! Pool plumbing: how FTP sessions are opened, probed and closed.

use crate::ftp::client::FtpClient;
use crate::ftp::transfer::{DataConnector, TcpDataConnector};
use crate::ftp::types::FtpConnectionConfig;
use async_trait::async_trait;
use std::sync::Arc;
use xfer_core::{ConnectionKey, ConnectionManager, Credentials, OperationResult, TransferConfig};

pub struct FtpManager {
    config: TransferConfig,
    connector: Arc<dyn DataConnector>,
}

impl FtpManager {
    pub fn new(config: TransferConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpDataConnector))
    }

    pub fn with_connector(config: TransferConfig, connector: Arc<dyn DataConnector>) -> Self {
        Self { config, connector }
    }

    pub fn client_config(&self, host: &str, port: u16, credentials: &Credentials) -> FtpConnectionConfig {
        FtpConnectionConfig::new(host, port, &self.config).with_login(&credentials.username, &credentials.secret)
    }

    /// Open a session outside the pool (connection tests).
    pub async fn open(&self, host: &str, port: u16, credentials: &Credentials) -> OperationResult<FtpClient> {
        let cfg = self.client_config(host, port, credentials);
        Ok(FtpClient::connect_with(cfg, self.connector.clone()).await?)
    }
}

#[async_trait]
impl ConnectionManager for FtpManager {
    type Connection = FtpClient;

    async fn connect(&self, key: &ConnectionKey, credentials: &Credentials) -> OperationResult<FtpClient> {
        self.open(&key.host, key.port, credentials).await
    }

    /// No round trip: a session is usable until something poisoned it.
    fn is_valid(&self, conn: &FtpClient) -> bool {
        !conn.is_poisoned()
    }

    async fn close(&self, mut conn: FtpClient) {
        conn.quit().await;
    }
}
