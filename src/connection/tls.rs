//! TLS configuration for broker connections.
//!
//! Turns the `ssl_options` / `ssl_protocol` of a [`ConnectionConfig`] into a
//! rustls `ClientConfig` plus the server name used for SNI and verification.

use crate::config::{ConnectionConfig, SslOptions, TlsVersion};
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// How much of the server certificate is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVerification {
    /// Chain must lead to a trusted root and match the server name
    Full,
    /// Chain must lead to a trusted root; the name is not checked
    ChainOnly,
    /// Nothing is checked (development only)
    Disabled,
}

impl TlsVerification {
    /// Verification level requested by `opts`
    pub fn for_options(opts: &SslOptions) -> Self {
        if opts.skips_verification() {
            Self::Disabled
        } else if !opts.verify_peer_name {
            Self::ChainOnly
        } else {
            Self::Full
        }
    }
}

/// Compiled TLS settings for one connection.
#[derive(Clone)]
pub struct TlsSettings {
    server_name: ServerName<'static>,
    verification: TlsVerification,
    client_config: Arc<ClientConfig>,
}

impl TlsSettings {
    /// Build the TLS settings for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if:
    /// - the server name is not a valid DNS name or IP address
    /// - a CA bundle, client certificate or key cannot be read or parsed
    /// - no trusted root certificates could be found
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let opts = config.ssl_options();
        let verification = TlsVerification::for_options(opts);
        if verification == TlsVerification::Disabled {
            tracing::warn!(
                endpoint = %config.endpoint(),
                "server certificate verification is disabled"
            );
        }
        let client_config = build_client_config(opts, config.ssl_protocol(), verification)?;
        Ok(Self {
            server_name: parse_server_name(config.server_name())?,
            verification,
            client_config: Arc::new(client_config),
        })
    }

    /// Use a prepared rustls configuration as-is
    pub fn with_client_config(server_name: &str, client_config: Arc<ClientConfig>) -> Result<Self> {
        Ok(Self {
            server_name: parse_server_name(server_name)?,
            verification: TlsVerification::Full,
            client_config,
        })
    }

    /// Get the rustls ClientConfig
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Server name presented for SNI
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Verification level
    pub fn verification(&self) -> TlsVerification {
        self.verification
    }
}

impl std::fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSettings")
            .field("server_name", &self.server_name)
            .field("verification", &self.verification)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Parse a host name or IP address for SNI and verification
pub fn parse_server_name(name: &str) -> Result<ServerName<'static>> {
    let name = name.trim_end_matches('.');
    ServerName::try_from(name.to_string())
        .map_err(|_| Error::Tls(format!("invalid server name for TLS: '{}'", name)))
}

fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn build_client_config(
    opts: &SslOptions,
    version: TlsVersion,
    verification: TlsVerification,
) -> Result<ClientConfig> {
    let provider = crypto_provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(version.rustls_versions())
        .map_err(|e| Error::Tls(format!("unsupported protocol version {}: {}", version, e)))?;

    let builder = match verification {
        TlsVerification::Full => builder.with_root_certificates(load_root_store(opts)?),
        TlsVerification::ChainOnly => {
            let inner = WebPkiServerVerifier::builder_with_provider(
                Arc::new(load_root_store(opts)?),
                provider,
            )
            .build()
            .map_err(|e| Error::Tls(format!("failed to build certificate verifier: {}", e)))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(ChainOnly { inner }))
        }
        TlsVerification::Disabled => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification { provider })),
    };

    match load_client_identity(opts)? {
        Some((certs, key)) => builder
            .with_client_auth_cert(certs, key)
            .map_err(|e| Error::Tls(format!("invalid client certificate or key: {}", e))),
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Trusted roots: `cafile` and `capath` if given, else the system store
fn load_root_store(opts: &SslOptions) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();

    if let Some(cafile) = &opts.cafile {
        for cert in load_pem_certs(cafile)? {
            let _ = store.add_parsable_certificates(std::iter::once(cert));
        }
    }
    if let Some(capath) = &opts.capath {
        let entries = fs::read_dir(capath).map_err(|e| {
            Error::Tls(format!(
                "Failed to read CA directory '{}': {}",
                capath.display(),
                e
            ))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_pem = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("pem" | "crt" | "cer")
            );
            if is_pem && path.is_file() {
                let _ = store.add_parsable_certificates(load_pem_certs(&path)?);
            }
        }
    }
    if opts.cafile.is_some() || opts.capath.is_some() {
        if store.is_empty() {
            return Err(Error::Tls("no usable CA certificates in cafile/capath".into()));
        }
        return Ok(store);
    }

    let result = rustls_native_certs::load_native_certs();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }
    if store.is_empty() {
        tracing::debug!(
            errors = result.errors.len(),
            "no system root certificates, using bundled webpki roots"
        );
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    Ok(store)
}

/// Load every certificate from a PEM file
fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path).map_err(|e| {
        Error::Tls(format!(
            "Failed to read certificate file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&data);
    let mut certs = Vec::new();

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => certs.push(cert),
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Tls(format!(
                    "Failed to parse certificate from '{}'",
                    path.display()
                )));
            }
        }
    }

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "No valid certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

/// Client certificate chain and key for mutual TLS.
///
/// The key is read from `local_pk`, or from `local_cert` when the
/// certificate file bundles both.
fn load_client_identity(
    opts: &SslOptions,
) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>> {
    let Some(cert_path) = &opts.local_cert else {
        if opts.local_pk.is_some() {
            return Err(Error::Tls("local_pk is set but local_cert is not".into()));
        }
        return Ok(None);
    };

    let certs = load_pem_certs(cert_path)?;
    let key_path = opts.local_pk.as_deref().unwrap_or(cert_path.as_path());
    let data = fs::read(key_path).map_err(|e| {
        Error::Tls(format!(
            "Failed to read private key file '{}': {}",
            key_path.display(),
            e
        ))
    })?;

    match rustls_pemfile::private_key(&mut std::io::Cursor::new(&data)) {
        Ok(Some(key)) => Ok(Some((certs, key))),
        Ok(None) if opts.passphrase.is_some() => Err(Error::Tls(format!(
            "no unencrypted private key in '{}'; encrypted keys are not supported",
            key_path.display()
        ))),
        Ok(None) => Err(Error::Tls(format!(
            "No private key found in '{}'",
            key_path.display()
        ))),
        Err(e) => Err(Error::Tls(format!(
            "Failed to parse private key from '{}': {}",
            key_path.display(),
            e
        ))),
    }
}

/// Accepts any server certificate. Signatures are still checked so the
/// handshake itself stays sound.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// WebPKI verification minus the name check
#[derive(Debug)]
struct ChainOnly {
    inner: Arc<WebPkiServerVerifier>,
}

fn is_name_mismatch(err: &CertificateError) -> bool {
    matches!(
        err,
        CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
    )
}

impl ServerCertVerifier for ChainOnly {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(err)) if is_name_mismatch(&err) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
