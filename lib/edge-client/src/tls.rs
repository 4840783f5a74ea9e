//! Outbound TLS configuration for relaxed-trust clients

use crate::config::TlsVersion;
use crate::error::{ClientError, Result};
use crate::policy::TrustPolicy;
use crate::verifier::RelaxedServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::ClientConfig;
use std::sync::Arc;
use tracing::debug;

/// Crypto provider used when none is supplied
pub fn default_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a rustls client configuration that verifies servers with `policy`
pub fn relaxed_client_config(
    policy: Arc<TrustPolicy>,
    provider: Arc<CryptoProvider>,
    min_version: TlsVersion,
) -> Result<ClientConfig> {
    let versions = min_version.protocol_versions()?;
    let verifier = RelaxedServerVerifier::new(policy, provider.clone())?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
        .map_err(|e| ClientError::TlsHandshakeSetup(format!("TLS engine rejected policy: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    debug!("TLS client configuration built (minimum TLS {})", min_version);
    Ok(config)
}
