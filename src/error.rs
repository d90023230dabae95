//! Error types

use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving configuration or establishing connections.
///
/// The type is `Clone` so that a single failed construction can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Configuration could not be read or is unusable
    #[error("configuration error: {0}")]
    Config(String),

    /// A configuration key is present but holds a value of the wrong shape
    #[error("invalid value for '{key}': expected {expected}")]
    InvalidValue {
        /// Full dotted path of the offending key
        key: String,
        /// Human readable description of the accepted shape
        expected: &'static str,
    },

    /// Socket-level failure while connecting or exchanging bytes
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// TLS negotiation or certificate handling failed
    #[error("tls error: {0}")]
    Tls(String),

    /// The connect deadline elapsed
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure reported by a connector
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection handle has already been closed
    #[error("connection closed")]
    ConnectionClosed,

    /// The resolver has been shut down
    #[error("connection resolver has been shut down")]
    ResolverClosed,
}

impl Error {
    /// Whether this error came from configuration (not worth retrying as-is)
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidValue { .. })
    }

    /// Whether this error came from establishing or using the transport
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Timeout(_) | Self::Transport(_)
        )
    }

    /// Short category name, used as a metrics label
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::InvalidValue { .. } => "config",
            Self::Io(_) => "io",
            Self::Tls(_) => "tls",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::ConnectionClosed => "connection_closed",
            Self::ResolverClosed => "resolver_closed",
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
