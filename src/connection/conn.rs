//! Broker connection handle

use super::state::ConnectionState;
use super::tls::TlsSettings;
use super::transport::{with_deadline, Transport};
use crate::config::{ConnectionConfig, TlsVersion};
use crate::{Error, Result};
use bytes::BytesMut;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Established, TLS-secured connection to a broker.
///
/// The handle is shared (`Arc`) between every caller that resolved the same
/// connection name, so all operations take `&self`. The broker protocol
/// itself is spoken by whatever layer takes over the transport.
pub struct Connection {
    endpoint: String,
    transport: tokio::sync::Mutex<Option<Transport>>,
    state: parking_lot::Mutex<ConnectionState>,
    closing: watch::Sender<bool>,
    io_timeout: Option<Duration>,
    tls_version: Option<TlsVersion>,
    peer_fingerprint: Option<[u8; 32]>,
}

impl Connection {
    /// Connect to the broker described by `config`.
    ///
    /// TCP connect and TLS handshake together are bounded by
    /// `options.connection_timeout`.
    pub async fn establish(config: &ConnectionConfig, tls: &TlsSettings) -> Result<Self> {
        let endpoint = config.endpoint();
        let mut state = ConnectionState::Connecting;

        let transport = with_deadline(
            config.options().connect_deadline(),
            Transport::connect(
                config.host(),
                config.port(),
                config.options().keepalive,
                tls,
            ),
        )
        .instrument(tracing::info_span!("establish", endpoint = %endpoint))
        .await?;

        state.transition(ConnectionState::Open)?;
        let tls_version = transport
            .protocol_version()
            .and_then(TlsVersion::from_negotiated);
        let peer_fingerprint = transport.peer_certificate_fingerprint();

        tracing::info!(
            endpoint = %endpoint,
            tls_version = ?tls_version,
            "secured transport established"
        );

        Ok(Self {
            endpoint,
            transport: tokio::sync::Mutex::new(Some(transport)),
            state: parking_lot::Mutex::new(state),
            closing: watch::Sender::new(false),
            io_timeout: config.options().io_deadline(),
            tls_version,
            peer_fingerprint,
        })
    }

    /// `host:port/vhost` this connection points at
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the connection is usable
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// TLS version negotiated with the broker
    pub fn negotiated_tls_version(&self) -> Option<TlsVersion> {
        self.tls_version
    }

    /// SHA-256 fingerprint of the broker certificate, as colon separated hex
    pub fn peer_certificate_fingerprint(&self) -> Option<String> {
        self.peer_fingerprint.map(|bytes| {
            bytes
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(":")
        })
    }

    /// Write and flush `buf`, bounded by `options.read_write_timeout`
    pub async fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        self.until_closing(with_deadline(self.io_timeout, async {
            transport.write_all(buf).await?;
            transport.flush().await
        }))
        .await
    }

    /// Read available bytes into `buf`, bounded by `options.read_write_timeout`.
    ///
    /// Returns `Error::ConnectionClosed` when the broker closed the stream or
    /// [`close`](Self::close) was called while waiting.
    pub async fn read_buf(&self, buf: &mut BytesMut) -> Result<usize> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(Error::ConnectionClosed)?;
        let n = self
            .until_closing(with_deadline(self.io_timeout, transport.read_buf(buf)))
            .await?;
        if n == 0 {
            drop(guard);
            self.mark_closed();
            return Err(Error::ConnectionClosed);
        }
        Ok(n)
    }

    /// Close the connection. Closing twice is a no-op.
    ///
    /// Pending reads and writes are abandoned with `Error::ConnectionClosed`
    /// rather than waited for.
    pub async fn close(&self) -> Result<()> {
        self.closing.send_replace(true);
        let Some(mut transport) = self.transport.lock().await.take() else {
            return Ok(());
        };
        if self.is_open() {
            self.state.lock().transition(ConnectionState::Closing)?;
        }
        let result = transport.shutdown().await;
        self.mark_closed();
        tracing::debug!(endpoint = %self.endpoint, "connection closed");
        result
    }

    async fn until_closing<T>(&self, io: impl Future<Output = Result<T>>) -> Result<T> {
        let mut closing = self.closing.subscribe();
        tokio::select! {
            result = io => result,
            _ = closing.wait_for(|closing| *closing) => Err(Error::ConnectionClosed),
        }
    }

    fn mark_closed(&self) {
        // (_, Closed) is always a valid transition
        let _ = self.state.lock().transition(ConnectionState::Closed);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("tls_version", &self.tls_version)
            .finish()
    }
}
