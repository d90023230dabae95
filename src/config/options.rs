//! Low-level transport tuning (`options` entry of a connection)

use super::extract::Fields;
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Transport tuning options.
///
/// A zero duration disables the corresponding timeout. `heartbeat`,
/// `locale` and `channel_rpc_timeout` belong to the broker protocol and are
/// carried for the protocol layer that takes over the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    /// Deadline for TCP connect plus TLS handshake (default: 3 seconds)
    pub connection_timeout: Duration,
    /// Deadline for a single read or write (default: 3 seconds)
    pub read_write_timeout: Duration,
    /// Enable TCP keepalive on the socket (default: off)
    pub keepalive: bool,
    /// Heartbeat interval to negotiate, in seconds (default: 0, disabled)
    pub heartbeat: u16,
    /// Locale to negotiate (default: `en_US`)
    pub locale: String,
    /// Deadline for channel RPCs (default: 0, none)
    pub channel_rpc_timeout: Duration,
    /// Options this crate does not interpret
    pub extra: BTreeMap<String, Value>,
}

/// Default connect deadline
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);
/// Default read/write deadline
pub const DEFAULT_READ_WRITE_TIMEOUT: Duration = Duration::from_secs(3);
/// Default locale
pub const DEFAULT_LOCALE: &str = "en_US";

pub(super) const KNOWN_KEYS: &[&str] = &[
    "connection_timeout",
    "read_write_timeout",
    "keepalive",
    "heartbeat",
    "locale",
    "channel_rpc_timeout",
];

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            read_write_timeout: DEFAULT_READ_WRITE_TIMEOUT,
            keepalive: false,
            heartbeat: 0,
            locale: DEFAULT_LOCALE.to_string(),
            channel_rpc_timeout: Duration::ZERO,
            extra: BTreeMap::new(),
        }
    }
}

impl TransportOptions {
    pub(crate) fn extract(fields: &Fields<'_>) -> Result<Self> {
        Ok(Self {
            connection_timeout: fields.seconds("connection_timeout", DEFAULT_CONNECTION_TIMEOUT)?,
            read_write_timeout: fields.seconds("read_write_timeout", DEFAULT_READ_WRITE_TIMEOUT)?,
            keepalive: fields.bool("keepalive", false)?,
            heartbeat: fields.u16("heartbeat", 0)?,
            locale: fields.string("locale", DEFAULT_LOCALE)?,
            channel_rpc_timeout: fields.seconds("channel_rpc_timeout", Duration::ZERO)?,
            extra: fields.rest(KNOWN_KEYS),
        })
    }

    /// Connect deadline, `None` when disabled
    pub fn connect_deadline(&self) -> Option<Duration> {
        Some(self.connection_timeout).filter(|d| !d.is_zero())
    }

    /// Read/write deadline, `None` when disabled
    pub fn io_deadline(&self) -> Option<Duration> {
        Some(self.read_write_timeout).filter(|d| !d.is_zero())
    }
}
