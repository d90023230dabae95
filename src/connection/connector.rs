//! Connection factory seam
//!
//! The resolver never opens sockets itself: it hands a resolved
//! [`ConnectionConfig`] to a [`Connector`] and caches what comes back.

use super::conn::Connection;
use super::tls::TlsSettings;
use crate::config::ConnectionConfig;
use crate::Result;
use rustls::ClientConfig;
use std::future::Future;
use std::sync::Arc;

/// A live connection the resolver can cache and later close
pub trait ManagedConnection: Send + Sync + 'static {
    /// Close the connection. Must be idempotent.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Factory that establishes connections from resolved configuration
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced
    type Connection: ManagedConnection;

    /// Establish a new connection.
    ///
    /// Network, authentication and TLS failures are returned as errors;
    /// the resolver passes them through unchanged.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

impl ManagedConnection for Connection {
    async fn close(&self) -> Result<()> {
        Connection::close(self).await
    }
}

/// Default connector: TCP plus rustls.
///
/// TLS settings are derived from each config's `ssl_options` and
/// `ssl_protocol` unless a fixed rustls configuration is supplied.
#[derive(Debug, Clone, Default)]
pub struct TlsConnector {
    client_config: Option<Arc<ClientConfig>>,
}

impl TlsConnector {
    /// Connector deriving TLS settings from configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector using `client_config` for every connection.
    ///
    /// `ssl_options` other than `peer_name` are then ignored.
    pub fn with_client_config(client_config: Arc<ClientConfig>) -> Self {
        Self {
            client_config: Some(client_config),
        }
    }

    fn tls_settings(&self, config: &ConnectionConfig) -> Result<TlsSettings> {
        match &self.client_config {
            Some(client_config) => {
                TlsSettings::with_client_config(config.server_name(), client_config.clone())
            }
            None => TlsSettings::from_config(config),
        }
    }
}

impl Connector for TlsConnector {
    type Connection = Connection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Connection> {
        let tls = self.tls_settings(config)?;
        Connection::establish(config, &tls).await
    }
}
