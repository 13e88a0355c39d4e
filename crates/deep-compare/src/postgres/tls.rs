//! TLS connector selection from a side's `ssl_mode`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::error::{CompareError, Result};

/// PostgreSQL `sslmode` values accepted in `ssl_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    /// Encrypt but trust whatever certificate the server presents.
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "disable" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(CompareError::Config(format!(
                "invalid ssl_mode '{}' (expected disable, require, verify-ca or verify-full)",
                other
            ))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        })
    }
}

/// Connector for the pool of `config`'s side, `None` for plain TCP.
pub fn connector(config: &DatabaseConfig) -> Result<Option<MakeRustlsConnect>> {
    let mode: SslMode = config.ssl_mode.parse()?;
    debug!("{}: ssl_mode={}", config.label(), mode);
    if mode == SslMode::Disable {
        return Ok(None);
    }

    let provider = Arc::new(ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| CompareError::Config(format!("TLS setup for {}: {}", config.label(), e)))?;

    let client = match mode {
        SslMode::Require => {
            warn!(
                "{}: ssl_mode=require does not check the server certificate",
                config.label()
            );
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(TrustServerCertificate { provider }))
                .with_no_client_auth()
        }
        SslMode::Disable | SslMode::VerifyCa | SslMode::VerifyFull => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };
    Ok(Some(MakeRustlsConnect::new(client)))
}

/// Skips chain and hostname checks. Handshake signatures are still checked
/// with the provider's algorithms.
#[derive(Debug)]
struct TrustServerCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for TrustServerCertificate {
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
