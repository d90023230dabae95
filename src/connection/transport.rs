//! Secured TCP transport

use super::tls::TlsSettings;
use crate::{Error, Result};
use bytes::BytesMut;
use sha2::Digest;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream;

/// TLS-encrypted TCP stream to the broker
pub struct Transport {
    stream: TlsStream<TcpStream>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Transport(TlsStream)")
    }
}

impl Transport {
    /// Connect via TCP and perform the TLS handshake
    pub async fn connect(host: &str, port: u16, keepalive: bool, tls: &TlsSettings) -> Result<Self> {
        let tcp_stream = connect_tcp(host, port, keepalive).await?;

        let tls_connector = tokio_rustls::TlsConnector::from(tls.client_config());
        let stream = tls_connector
            .connect(tls.server_name().clone(), tcp_stream)
            .await
            .map_err(|e| Error::Tls(format!("TLS handshake failed: {}", e)))?;

        Ok(Self { stream })
    }

    /// Write all bytes to the stream
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).await?;
        Ok(())
    }

    /// Flush the stream
    pub async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }

    /// Read into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        Ok(self.stream.read_buf(buf).await?)
    }

    /// Send close_notify and shut down the socket
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// TLS version agreed during the handshake
    pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        let (_tcp, conn) = self.stream.get_ref();
        conn.protocol_version()
    }

    /// SHA-256 of the server's DER-encoded leaf certificate
    pub fn peer_certificate_fingerprint(&self) -> Option<[u8; 32]> {
        let (_tcp, conn) = self.stream.get_ref();
        let certs = conn.peer_certificates()?;
        let server_cert = certs.first()?;
        let hash = sha2::Sha256::digest(server_cert.as_ref());
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(&hash);
        Some(fingerprint)
    }
}

/// Try each resolved address in turn; the last failure is returned
async fn connect_tcp(host: &str, port: u16, keepalive: bool) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in tokio::net::lookup_host((host, port)).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(keepalive)?;

        match socket.connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                tracing::debug!(%addr, "tcp connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "tcp connect failed");
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => e.into(),
        None => Error::Transport(format!("no addresses found for '{}'", host)),
    })
}

/// Run `fut` under `deadline`, if any
pub(crate) async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}
