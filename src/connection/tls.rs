//! TLS configuration for encrypted backend connections.
//!
//! A [`TlsConfig`] is the encryption policy for one backend. When a caller
//! passes one to the connector, the transport is upgraded with `SSLRequest`
//! negotiation before the startup message is relayed; when it passes none, the
//! transport stays plaintext. The connector only ever clones the inner
//! `Arc<ClientConfig>`, so caller-owned configuration is never mutated.

use super::address::BackendAddress;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::fs;
use std::net::IpAddr;
use std::sync::Arc;

/// SSL/TLS mode for backend connections, named after the `sslmode` parameter.
///
/// There is no `prefer` or `allow`: a refused upgrade is always an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// No TLS (plaintext connection)
    #[default]
    Disable,
    /// TLS required, but server certificate is not verified
    Require,
    /// TLS required, server certificate must be signed by a trusted CA and hostname must match
    VerifyFull,
}

impl SslMode {
    /// Whether this mode requires certificate verification
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::VerifyFull)
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disable => write!(f, "disable"),
            Self::Require => write!(f, "require"),
            Self::VerifyFull => write!(f, "verify-full"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "require" => Ok(Self::Require),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(Error::Config(format!(
                "invalid sslmode '{}': expected disable, require, or verify-full",
                s
            ))),
        }
    }
}

/// TLS policy for one backend.
///
/// # Examples
///
/// ```ignore
/// use sqlproxy_backend::TlsConfig;
///
/// // With system root certificates (production)
/// let tls = TlsConfig::builder().build()?;
///
/// // With custom CA certificate and an explicit SNI name
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/sqlproxy/backend-ca.pem")
///     .server_name("node.tenant-7.internal")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// Path to CA certificate file (None = system roots)
    ca_cert_path: Option<String>,
    /// Whether certificate verification is disabled (development only)
    danger_accept_invalid_certs: bool,
    /// Name presented for SNI and verified against the certificate
    server_name: Option<String>,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Wrap an existing rustls configuration.
    ///
    /// The server name defaults to the backend host; see
    /// [`TlsConfig::with_server_name`].
    pub fn from_client_config(client_config: Arc<ClientConfig>) -> Self {
        Self {
            ca_cert_path: None,
            danger_accept_invalid_certs: false,
            server_name: None,
            client_config,
        }
    }

    /// Build the policy for an `sslmode`; `Disable` yields no policy.
    pub fn for_mode(mode: SslMode, ca_cert_path: Option<&str>) -> Result<Option<Self>> {
        let builder = match mode {
            SslMode::Disable => return Ok(None),
            SslMode::Require => Self::builder().danger_accept_invalid_certs(true),
            SslMode::VerifyFull => Self::builder(),
        };
        let builder = match ca_cert_path {
            Some(path) => builder.ca_cert_path(path),
            None => builder,
        };
        builder.build().map(Some)
    }

    /// Override the TLS server name used for SNI and verification.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Check if invalid certificates are accepted (development only).
    pub fn danger_accept_invalid_certs(&self) -> bool {
        self.danger_accept_invalid_certs
    }

    /// TLS server name for a backend: the override if set, else the host.
    pub fn server_name_for(&self, address: &BackendAddress) -> Result<ServerName<'static>> {
        let name = self.server_name.as_deref().unwrap_or(address.host());
        parse_server_name(name)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field(
                "danger_accept_invalid_certs",
                &self.danger_accept_invalid_certs,
            )
            .field("server_name", &self.server_name)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
    extra_roots: Vec<CertificateDer<'static>>,
    client_cert: Option<(String, String)>,
    danger_accept_invalid_certs: bool,
    server_name: Option<String>,
}

impl TlsConfigBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Trust an additional root certificate (DER).
    ///
    /// When roots are added this way and no CA file is set, only these roots
    /// are trusted.
    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.extra_roots.push(cert);
        self
    }

    /// Present a client certificate (PEM files) for mutual TLS.
    pub fn client_cert(mut self, cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.client_cert = Some((cert_path.into(), key_path.into()));
        self
    }

    /// Name presented for SNI instead of the backend host.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// ⚠️ **DANGER**: Accept invalid certificates (development only).
    ///
    /// **NEVER use in production.** This disables certificate validation entirely,
    /// making the connection vulnerable to man-in-the-middle attacks.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - CA or client certificate files cannot be read or parsed
    /// - The client private key is missing or invalid
    /// - The server name override is not a valid DNS name or IP address
    pub fn build(self) -> Result<TlsConfig> {
        if let Some(name) = &self.server_name {
            parse_server_name(name)?;
        }

        let builder = if self.danger_accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled for backend connections");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        } else {
            ClientConfig::builder().with_root_certificates(self.root_store()?)
        };

        let client_config = match &self.client_cert {
            Some((cert_path, key_path)) => {
                let certs = load_certificates(cert_path)?;
                let key = load_private_key(key_path)?;
                builder.with_client_auth_cert(certs, key).map_err(|e| {
                    Error::Config(format!("invalid client certificate '{}': {}", cert_path, e))
                })?
            }
            None => builder.with_no_client_auth(),
        };

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            server_name: self.server_name,
            client_config: Arc::new(client_config),
        })
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();

        if let Some(ca_path) = &self.ca_cert_path {
            for cert in load_certificates(ca_path)? {
                store
                    .add(cert)
                    .map_err(|e| Error::Config(format!("invalid CA certificate in '{}': {}", ca_path, e)))?;
            }
        }
        for cert in &self.extra_roots {
            store
                .add(cert.clone())
                .map_err(|e| Error::Config(format!("invalid root certificate: {}", e)))?;
        }
        if !store.is_empty() {
            return Ok(store);
        }

        let result = rustls_native_certs::load_native_certs();
        let (added, _ignored) = store.add_parsable_certificates(result.certs);
        if added == 0 {
            tracing::warn!(
                errors = result.errors.len(),
                "no system root certificates found, using bundled webpki roots"
            );
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        Ok(store)
    }
}

/// Load all certificates from a PEM file.
fn load_certificates(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path)
        .map_err(|e| Error::Config(format!("Failed to read certificate file '{}': {}", path, e)))?;

    let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(&data))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::Config(format!("Failed to parse certificates from '{}'", path)))?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            path
        )));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path)
        .map_err(|e| Error::Config(format!("Failed to read private key file '{}': {}", path, e)))?;

    rustls_pemfile::private_key(&mut std::io::Cursor::new(&data))
        .map_err(|_| Error::Config(format!("Failed to parse private key from '{}'", path)))?
        .ok_or_else(|| Error::Config(format!("No private key found in '{}'", path)))
}

/// Parse a TLS server name (SNI) from a hostname or IP literal.
///
/// # Errors
///
/// Returns an error if the name is neither an IP address nor a valid DNS name.
pub fn parse_server_name(hostname: &str) -> Result<ServerName<'static>> {
    // Remove trailing dot if present
    let hostname = hostname.trim_end_matches('.');

    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }

    if hostname.is_empty()
        || hostname.len() > 253
        || !hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("Invalid hostname for TLS: '{}'", hostname)))
}

/// Certificate verifier that accepts any certificate.
#[derive(Debug)]
struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
