//! rustls server certificate verifier driven by a [`TrustPolicy`]

use crate::error::{ClientError, Result};
use crate::policy::{CertDecision, TrustPolicy};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{VerifierBuilderError, WebPkiServerVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, Error, SignatureScheme};
use std::sync::Arc;
use tracing::debug;

/// Verifies server certificates according to a relaxed trust policy.
///
/// Identity checks are relaxed; handshake signatures are always verified so
/// the peer must still prove possession of the certificate's key.
#[derive(Debug)]
pub struct RelaxedServerVerifier {
    policy: Arc<TrustPolicy>,
    /// None when the trust store holds no usable anchors
    chain_verifier: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
}

impl RelaxedServerVerifier {
    pub fn new(policy: Arc<TrustPolicy>, provider: Arc<CryptoProvider>) -> Result<Self> {
        let roots = Arc::new(policy.trust_store().root_store());
        let chain_verifier = match WebPkiServerVerifier::builder_with_provider(roots, provider.clone())
            .build()
        {
            Ok(verifier) => Some(verifier),
            Err(VerifierBuilderError::NoRootAnchors) => {
                debug!(
                    "Trust store {} has no anchors, only pinned and self-signed certificates are accepted",
                    policy.trust_store().source()
                );
                None
            }
            Err(e) => {
                return Err(ClientError::TlsHandshakeSetup(format!(
                    "Failed to build certificate verifier: {}",
                    e
                )))
            }
        };

        Ok(Self {
            policy,
            chain_verifier,
            provider,
        })
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Decide whether the presented chain is trusted for `server_name`
    pub fn evaluate(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        now: UnixTime,
    ) -> std::result::Result<CertDecision, Error> {
        if self.policy.trust_store().contains(end_entity) {
            return Ok(CertDecision::PinnedCertificate);
        }

        let chain_error = match &self.chain_verifier {
            Some(verifier) => {
                match verifier.verify_server_cert(end_entity, intermediates, server_name, &[], now) {
                    Ok(_) => return Ok(CertDecision::TrustedChain),
                    Err(e)
                        if is_name_mismatch(&e)
                            && self.policy.accepts_server_name(&server_name.to_str()) =>
                    {
                        return Ok(CertDecision::NameMismatchOverridden)
                    }
                    Err(e) => e,
                }
            }
            None => Error::InvalidCertificate(CertificateError::UnknownIssuer),
        };

        // A lone certificate is taken as self-signed, like a trust-self-signed strategy
        if self.policy.allow_self_signed() && intermediates.is_empty() {
            return Ok(CertDecision::SelfSigned);
        }

        Err(chain_error)
    }
}

fn is_name_mismatch(error: &Error) -> bool {
    matches!(
        error,
        Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. }
        )
    )
}

impl ServerCertVerifier for RelaxedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, Error> {
        match self.evaluate(end_entity, intermediates, server_name, now) {
            Ok(decision) => {
                debug!("Accepted certificate for {}: {:?}", server_name.to_str(), decision);
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => {
                debug!("Rejected certificate for {}: {}", server_name.to_str(), e);
                Err(e)
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls12_signature(
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
    ) -> std::result::Result<HandshakeSignatureValid, Error> {
        verify_tls13_signature(
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
