//! Connection configuration
//!
//! This module handles:
//! * Configuration lookup (`ConfigSource`, `JsonConfig`, `EnvOverlay`)
//! * Typed, fully defaulted connection parameters (`ConnectionConfig`)
//! * Transport security (`SslOptions`, `TlsVersion`) and tuning (`TransportOptions`)

mod extract;
mod options;
mod source;
mod tls;

pub use options::{
    TransportOptions, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_LOCALE, DEFAULT_READ_WRITE_TIMEOUT,
};
pub use source::{ConfigSource, EnvOverlay, JsonConfig};
pub use tls::{SslOptions, TlsVersion};

use crate::Result;
use extract::Fields;
use serde_json::Value;

/// Default broker host
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default broker port (AMQP over TLS)
pub const DEFAULT_PORT: u16 = 5671;
/// Default user
pub const DEFAULT_USER: &str = "guest";
/// Default password
pub const DEFAULT_PASSWORD: &str = "guest";
/// Default virtual host
pub const DEFAULT_VHOST: &str = "/";

/// Connection parameters for one named broker connection.
///
/// Every field is resolved: missing configuration falls back to the
/// documented defaults at construction time, and the value is immutable
/// afterwards. Build one from raw configuration with
/// [`from_value`](Self::from_value) or programmatically with
/// [`builder`](Self::builder).
#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    vhost: String,
    ssl_options: SslOptions,
    ssl_protocol: TlsVersion,
    options: TransportOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConnectionConfig {
    /// Create a builder starting from the defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_resolver::config::{ConnectionConfig, TlsVersion};
    ///
    /// let config = ConnectionConfig::builder()
    ///     .host("broker.internal")
    ///     .user("orders")
    ///     .password("secret")
    ///     .ssl_protocol(TlsVersion::Tls13)
    ///     .build();
    /// assert_eq!(config.port(), 5671);
    /// ```
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Build from a raw configuration mapping.
    ///
    /// `null` counts as an empty mapping. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`](crate::Error::InvalidValue) if the
    /// value is not a mapping or a present key has the wrong shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_value_at("", value)
    }

    /// Like [`from_value`](Self::from_value), reporting keys below `path`
    pub(crate) fn from_value_at(path: &str, value: &Value) -> Result<Self> {
        let fields = Fields::new(path, value)?;
        let ssl_protocol = match fields.opt_string("ssl_protocol")? {
            Some(s) => s.parse().map_err(|_| crate::Error::InvalidValue {
                key: fields.key("ssl_protocol"),
                expected: "TLSv1.2 or TLSv1.3",
            })?,
            None => TlsVersion::default(),
        };

        Ok(Self {
            host: fields.string("host", DEFAULT_HOST)?,
            port: fields.port("port", DEFAULT_PORT)?,
            user: fields.string("user", DEFAULT_USER)?,
            password: fields.string("password", DEFAULT_PASSWORD)?,
            vhost: fields.string("vhost", DEFAULT_VHOST)?,
            ssl_options: SslOptions::extract(&fields.nested("ssl_options")?)?,
            ssl_protocol,
            options: TransportOptions::extract(&fields.nested("options")?)?,
        })
    }

    /// Broker host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Broker port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// User name
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Password
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Virtual host
    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    /// Transport security options
    pub fn ssl_options(&self) -> &SslOptions {
        &self.ssl_options
    }

    /// Minimum TLS version
    pub fn ssl_protocol(&self) -> TlsVersion {
        self.ssl_protocol
    }

    /// Transport tuning options
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// `host:port/vhost`, for logs and diagnostics
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, vhost_suffix(&self.vhost))
    }

    /// Name to present for SNI and certificate verification
    pub fn server_name(&self) -> &str {
        self.ssl_options.peer_name.as_deref().unwrap_or(&self.host)
    }
}

const TOP_LEVEL_KEYS: &[&str] = &["host", "port", "user", "password", "vhost", "ssl_protocol"];

/// Dotted paths of every scalar a connection subtree understands
pub(crate) fn connection_leaf_keys() -> impl Iterator<Item = String> {
    let top = TOP_LEVEL_KEYS.iter().map(|k| k.to_string());
    let ssl = tls::KNOWN_KEYS.iter().map(|k| format!("ssl_options.{}", k));
    let options = options::KNOWN_KEYS.iter().map(|k| format!("options.{}", k));
    top.chain(ssl).chain(options)
}

fn vhost_suffix(vhost: &str) -> String {
    if vhost.starts_with('/') {
        vhost.to_string()
    } else {
        format!("/{}", vhost)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("ssl_options", &self.ssl_options)
            .field("ssl_protocol", &self.ssl_protocol)
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for [`ConnectionConfig`]
///
/// Unset fields keep their defaults.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self {
            config: ConnectionConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                user: DEFAULT_USER.to_string(),
                password: DEFAULT_PASSWORD.to_string(),
                vhost: DEFAULT_VHOST.to_string(),
                ssl_options: SslOptions::default(),
                ssl_protocol: TlsVersion::default(),
                options: TransportOptions::default(),
            },
        }
    }
}

impl ConnectionConfigBuilder {
    /// Set the broker host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the broker port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the user name
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Set the virtual host
    pub fn vhost(mut self, vhost: impl Into<String>) -> Self {
        self.config.vhost = vhost.into();
        self
    }

    /// Set transport security options
    pub fn ssl_options(mut self, ssl_options: SslOptions) -> Self {
        self.config.ssl_options = ssl_options;
        self
    }

    /// Set the minimum TLS version
    pub fn ssl_protocol(mut self, version: TlsVersion) -> Self {
        self.config.ssl_protocol = version;
        self
    }

    /// Set transport tuning options
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 5671);
        assert_eq!(config.user(), "guest");
        assert_eq!(config.password(), "guest");
        assert_eq!(config.vhost(), "/");
        assert_eq!(config.ssl_options(), &SslOptions::default());
        assert_eq!(config.ssl_protocol(), TlsVersion::Tls12);
        assert_eq!(config.options(), &TransportOptions::default());
    }

    #[test]
    fn test_empty_and_null_give_defaults() {
        assert_eq!(
            ConnectionConfig::from_value(&json!({})).unwrap(),
            ConnectionConfig::default()
        );
        assert_eq!(
            ConnectionConfig::from_value(&Value::Null).unwrap(),
            ConnectionConfig::default()
        );
    }

    #[test]
    fn test_partial_config_defaults() {
        let config = ConnectionConfig::from_value(&json!({ "host": "broker.internal" })).unwrap();
        assert_eq!(config.host(), "broker.internal");

        let expected = ConnectionConfig::builder().host("broker.internal").build();
        assert_eq!(config, expected);
    }

    #[test]
    fn test_full_config() {
        let config = ConnectionConfig::from_value(&json!({
            "host": "mq.example.com",
            "port": "5673",
            "user": "orders",
            "password": "s3cret",
            "vhost": "orders",
            "ssl_options": {
                "cafile": "/etc/ssl/ca.pem",
                "verify_peer": true,
                "verify_peer_name": false
            },
            "ssl_protocol": "tlsv1.3",
            "options": { "connection_timeout": 5, "heartbeat": 30 }
        }))
        .unwrap();

        assert_eq!(config.host(), "mq.example.com");
        assert_eq!(config.port(), 5673);
        assert_eq!(config.user(), "orders");
        assert_eq!(config.password(), "s3cret");
        assert_eq!(config.vhost(), "orders");
        assert!(!config.ssl_options().verify_peer_name);
        assert_eq!(config.ssl_protocol(), TlsVersion::Tls13);
        assert_eq!(config.options().connection_timeout, Duration::from_secs(5));
        assert_eq!(config.options().heartbeat, 30);
        assert_eq!(config.endpoint(), "mq.example.com:5673/orders");
    }

    #[test]
    fn test_invalid_port() {
        let err = ConnectionConfig::from_value(&json!({ "port": "amqps" })).unwrap_err();
        match err {
            Error::InvalidValue { key, .. } => assert_eq!(key, "port"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_value_reports_full_path() {
        let err = ConnectionConfig::from_value_at(
            "rabbitmq.connections.orders",
            &json!({ "ssl_protocol": "sslv3" }),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for 'rabbitmq.connections.orders.ssl_protocol': expected TLSv1.2 or TLSv1.3"
        );
    }

    #[test]
    fn test_non_mapping_rejected() {
        assert!(ConnectionConfig::from_value(&json!("amqps://broker")).is_err());
        assert!(ConnectionConfig::from_value(&json!({ "options": 3 })).is_err());
    }

    #[test]
    fn test_server_name() {
        let config = ConnectionConfig::builder().host("10.0.0.7").build();
        assert_eq!(config.server_name(), "10.0.0.7");

        let config = ConnectionConfig::builder()
            .host("10.0.0.7")
            .ssl_options(SslOptions {
                peer_name: Some("broker.internal".into()),
                ..SslOptions::default()
            })
            .build();
        assert_eq!(config.server_name(), "broker.internal");
    }

    #[test]
    fn test_endpoint_default_vhost() {
        assert_eq!(ConnectionConfig::default().endpoint(), "127.0.0.1:5671/");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::builder().password("hunter2").build();
        let debug = format!("{:?}", config);
        assert!(debug.contains("ConnectionConfig"));
        assert!(!debug.contains("hunter2"));
    }
}
