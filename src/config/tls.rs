//! Transport security settings for broker connections.
//!
//! `SslOptions` carries the certificate and verification settings a
//! connection entry may name under `ssl_options`; `TlsVersion` is the
//! minimum protocol version named by `ssl_protocol`.

use super::extract::Fields;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Minimum TLS protocol version to negotiate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.2 or newer
    #[default]
    #[serde(rename = "TLSv1.2")]
    Tls12,
    /// TLS 1.3 only
    #[serde(rename = "TLSv1.3")]
    Tls13,
}

impl TlsVersion {
    /// The rustls protocol versions allowed under this minimum
    pub fn rustls_versions(&self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        match self {
            Self::Tls12 => rustls::ALL_VERSIONS,
            Self::Tls13 => TLS13_ONLY,
        }
    }

    /// Map a negotiated rustls version back onto this enum
    pub fn from_negotiated(version: rustls::ProtocolVersion) -> Option<Self> {
        match version {
            rustls::ProtocolVersion::TLSv1_2 => Some(Self::Tls12),
            rustls::ProtocolVersion::TLSv1_3 => Some(Self::Tls13),
            _ => None,
        }
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tls12 => write!(f, "TLSv1.2"),
            Self::Tls13 => write!(f, "TLSv1.3"),
        }
    }
}

impl std::str::FromStr for TlsVersion {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', ".");
        let version = normalized.strip_prefix("tls").unwrap_or(&normalized);
        let version = version.strip_prefix('v').unwrap_or(version);
        match version {
            "1.2" => Ok(Self::Tls12),
            "1.3" => Ok(Self::Tls13),
            _ => Err(Error::Config(format!(
                "invalid ssl_protocol '{}': expected TLSv1.2 or TLSv1.3",
                s
            ))),
        }
    }
}

/// Certificate and verification options for the TLS handshake.
///
/// Defaults verify the server certificate against the system roots and
/// check that it matches the host being connected to.
#[derive(Clone, PartialEq)]
pub struct SslOptions {
    /// CA bundle (PEM) to trust instead of the system roots
    pub cafile: Option<PathBuf>,
    /// Directory of CA certificates (PEM) to trust
    pub capath: Option<PathBuf>,
    /// Client certificate chain (PEM) for mutual TLS
    pub local_cert: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS
    pub local_pk: Option<PathBuf>,
    /// Passphrase of the client private key
    pub passphrase: Option<String>,
    /// Verify the server certificate chain
    pub verify_peer: bool,
    /// Verify that the certificate matches the peer name
    pub verify_peer_name: bool,
    /// Name to use for SNI and verification instead of the host
    pub peer_name: Option<String>,
    /// Accept self-signed server certificates
    pub allow_self_signed: bool,
    /// Cipher list; not applied by the rustls connector
    pub ciphers: Option<String>,
    /// Options this crate does not interpret
    pub extra: BTreeMap<String, Value>,
}

pub(super) const KNOWN_KEYS: &[&str] = &[
    "cafile",
    "capath",
    "local_cert",
    "local_pk",
    "passphrase",
    "verify_peer",
    "verify_peer_name",
    "peer_name",
    "allow_self_signed",
    "ciphers",
];

impl Default for SslOptions {
    fn default() -> Self {
        Self {
            cafile: None,
            capath: None,
            local_cert: None,
            local_pk: None,
            passphrase: None,
            verify_peer: true,
            verify_peer_name: true,
            peer_name: None,
            allow_self_signed: false,
            ciphers: None,
            extra: BTreeMap::new(),
        }
    }
}

impl SslOptions {
    pub(crate) fn extract(fields: &Fields<'_>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            cafile: fields.opt_string("cafile")?.map(PathBuf::from),
            capath: fields.opt_string("capath")?.map(PathBuf::from),
            local_cert: fields.opt_string("local_cert")?.map(PathBuf::from),
            local_pk: fields.opt_string("local_pk")?.map(PathBuf::from),
            passphrase: fields.opt_string("passphrase")?,
            verify_peer: fields.bool("verify_peer", defaults.verify_peer)?,
            verify_peer_name: fields.bool("verify_peer_name", defaults.verify_peer_name)?,
            peer_name: fields.opt_string("peer_name")?,
            allow_self_signed: fields.bool("allow_self_signed", defaults.allow_self_signed)?,
            ciphers: fields.opt_string("ciphers")?,
            extra: fields.rest(KNOWN_KEYS),
        })
    }

    /// Whether server certificate checks are switched off entirely
    pub fn skips_verification(&self) -> bool {
        !self.verify_peer || self.allow_self_signed
    }
}

impl std::fmt::Debug for SslOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslOptions")
            .field("cafile", &self.cafile)
            .field("capath", &self.capath)
            .field("local_cert", &self.local_cert)
            .field("local_pk", &self.local_pk)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("verify_peer", &self.verify_peer)
            .field("verify_peer_name", &self.verify_peer_name)
            .field("peer_name", &self.peer_name)
            .field("allow_self_signed", &self.allow_self_signed)
            .field("ciphers", &self.ciphers)
            .field("extra", &self.extra)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tls_version_from_str() {
        for s in ["TLSv1.2", "tlsv1.2", "tls1.2", "1.2", "TLSv1_2", " tlsv1.2 "] {
            assert_eq!(s.parse::<TlsVersion>().unwrap(), TlsVersion::Tls12, "{}", s);
        }
        for s in ["TLSv1.3", "tls1.3", "1.3"] {
            assert_eq!(s.parse::<TlsVersion>().unwrap(), TlsVersion::Tls13, "{}", s);
        }
    }

    #[test]
    fn test_tls_version_from_str_invalid() {
        assert!("sslv3".parse::<TlsVersion>().is_err());
        assert!("tlsv1.0".parse::<TlsVersion>().is_err());
        assert!("tlsv1.1".parse::<TlsVersion>().is_err());
        assert!("".parse::<TlsVersion>().is_err());
    }

    #[test]
    fn test_tls_version_display_and_default() {
        assert_eq!(TlsVersion::default(), TlsVersion::Tls12);
        assert_eq!(TlsVersion::Tls12.to_string(), "TLSv1.2");
        assert_eq!(TlsVersion::Tls13.to_string(), "TLSv1.3");
        assert_eq!(
            serde_json::to_value(TlsVersion::Tls13).unwrap(),
            json!("TLSv1.3")
        );
    }

    #[test]
    fn test_rustls_versions() {
        assert_eq!(TlsVersion::Tls13.rustls_versions().len(), 1);
        assert!(TlsVersion::Tls12.rustls_versions().len() >= 2);
    }

    #[test]
    fn test_ssl_options_defaults() {
        let opts = SslOptions::default();
        assert!(opts.verify_peer);
        assert!(opts.verify_peer_name);
        assert!(!opts.allow_self_signed);
        assert!(!opts.skips_verification());
        assert!(opts.cafile.is_none());
    }

    #[test]
    fn test_ssl_options_extract() {
        let value = json!({
            "cafile": "/etc/rabbitmq/ca.pem",
            "local_cert": "/etc/rabbitmq/client.pem",
            "local_pk": "/etc/rabbitmq/client.key",
            "verify_peer": "false",
            "peer_name": "broker.internal",
            "crypto_method": 33
        });
        let fields = Fields::new("ssl_options", &value).unwrap();
        let opts = SslOptions::extract(&fields).unwrap();

        assert_eq!(opts.cafile, Some(PathBuf::from("/etc/rabbitmq/ca.pem")));
        assert_eq!(opts.local_pk, Some(PathBuf::from("/etc/rabbitmq/client.key")));
        assert!(!opts.verify_peer);
        assert!(opts.skips_verification());
        assert_eq!(opts.peer_name.as_deref(), Some("broker.internal"));
        assert_eq!(opts.extra.get("crypto_method"), Some(&json!(33)));
    }

    #[test]
    fn test_ssl_options_wrong_shape() {
        let value = json!({ "verify_peer": [true] });
        let fields = Fields::new("ssl_options", &value).unwrap();
        let err = SslOptions::extract(&fields).unwrap_err();
        assert!(err.to_string().contains("ssl_options.verify_peer"));
    }

    #[test]
    fn test_ssl_options_debug_redacts_passphrase() {
        let opts = SslOptions {
            passphrase: Some("hunter2".into()),
            ..SslOptions::default()
        };
        let debug = format!("{:?}", opts);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }
}
