//! Builds the rustls client configuration for the TCP/TLS sink from PEM
//! cert/key/CA material, parsed once at startup into in-memory rustls
//! types rather than shelled out to a keystore file on every connect.

use crate::error::{BridgeError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ClientConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Once};

static INSTALL_PROVIDER: Once = Once::new();

fn ensure_crypto_provider() {
    INSTALL_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| BridgeError::TlsBundleError(format!("reading {}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| BridgeError::TlsBundleError(format!("reading {}: {e}", path.display())))?
        .ok_or_else(|| BridgeError::TlsBundleError(format!("no private key found in {}", path.display())))
}

/// Builds a [`ClientConfig`] from a cert chain + private key, an optional
/// custom CA chain, and an optional "skip verification" escape hatch used
/// only against sensors known to present self-signed certificates.
pub fn load_client_tls_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: Option<&Path>,
    skip_verify: bool,
) -> Result<Arc<ClientConfig>> {
    ensure_crypto_provider();

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let builder = ClientConfig::builder();

    let mut config = if skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerification::new()))
            .with_client_auth_cert(certs, key)
            .map_err(|e| BridgeError::TlsBundleError(format!("invalid client cert/key: {e}")))?
    } else {
        let ca_path = ca_path.ok_or_else(|| {
            BridgeError::TlsBundleError(
                "tls_ca_chain is required unless tls_skip_verify is set; sensor deployments are \
                 closed networks with no public CA to fall back to"
                    .into(),
            )
        })?;
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|e| BridgeError::TlsBundleError(format!("invalid CA cert: {e}")))?;
        }
        builder
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| BridgeError::TlsBundleError(format!("invalid client cert/key: {e}")))?
    };

    config.alpn_protocols.clear();
    Ok(Arc::new(config))
}

/// Disables server certificate verification entirely. Only reachable via
/// the explicit `tls_skip_verify` config flag — never the default.
#[derive(Debug)]
struct NoServerVerification {
    supported: Vec<SignatureScheme>,
}

impl NoServerVerification {
    fn new() -> Self {
        Self {
            supported: rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for NoServerVerification {
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
        self.supported.clone()
    }
}
