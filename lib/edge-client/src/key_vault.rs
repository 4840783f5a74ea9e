//! Key vault backed trust source
//!
//! Certificates are stored as vault secrets whose value is either a PEM bundle
//! or a single base64-encoded DER certificate.

use crate::error::{ClientError, TrustSourceError};
use crate::trust_source::{TrustSource, TrustStore};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const PKCS12_CONTENT_TYPE: &str = "application/x-pkcs12";

/// Connection settings for the key vault
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyVaultConfig {
    /// Vault base URL, e.g. `https://petclinic.vault.azure.net`
    pub vault_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Bearer token presented to the vault
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "7.4".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl KeyVaultConfig {
    pub fn new(vault_url: impl Into<String>) -> Self {
        Self {
            vault_url: vault_url.into(),
            api_version: default_api_version(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Secret as returned by the vault
#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
}

/// Resolves trust material from key vault secrets
pub struct KeyVaultTrustSource {
    config: KeyVaultConfig,
    http: Client,
}

impl KeyVaultTrustSource {
    pub fn new(config: KeyVaultConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build key vault client: {}", e))
            })?;

        info!("Key vault trust source configured for {}", config.vault_url);
        Ok(Self { config, http })
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/secrets/{}?api-version={}",
            self.config.vault_url.trim_end_matches('/'),
            name,
            self.config.api_version
        )
    }

    fn valid_secret_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 127
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }

    fn decode_secret(name: &str, bundle: SecretBundle) -> Result<TrustStore, TrustSourceError> {
        if bundle.content_type.as_deref() == Some(PKCS12_CONTENT_TYPE) {
            return Err(TrustSourceError::malformed(
                name,
                "PKCS#12 secrets are not supported, store the certificate as PEM",
            ));
        }

        let value = bundle.value.trim();
        if value.contains("-----BEGIN") {
            return TrustStore::from_pem(name, value.as_bytes());
        }

        let der = base64::engine::general_purpose::STANDARD
            .decode(value)
            .map_err(|e| TrustSourceError::malformed(name, format!("invalid base64: {}", e)))?;
        if der.is_empty() {
            return Err(TrustSourceError::malformed(name, "empty certificate"));
        }
        TrustStore::from_der(name, vec![CertificateDer::from(der)])
    }
}

#[async_trait]
impl TrustSource for KeyVaultTrustSource {
    fn kind(&self) -> &'static str {
        "key-vault"
    }

    #[instrument(skip(self), fields(vault = %self.config.vault_url))]
    async fn resolve(&self, name: &str) -> Result<TrustStore, TrustSourceError> {
        if !Self::valid_secret_name(name) {
            return Err(TrustSourceError::InvalidName(name.to_string()));
        }

        let mut request = self.http.get(self.secret_url(name));
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TrustSourceError::unreachable(name, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TrustSourceError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            warn!("Key vault returned {} for secret {}", status, name);
            return Err(TrustSourceError::unreachable(name, format!("status {}", status)));
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| TrustSourceError::malformed(name, e))?;
        debug!("Fetched secret {} ({:?})", name, bundle.content_type);

        Self::decode_secret(name, bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn certificate() -> rcgen::Certificate {
        let key = rcgen::KeyPair::generate().unwrap();
        rcgen::CertificateParams::new(vec!["api-gateway".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap()
    }

    fn source(server: &MockServer) -> KeyVaultTrustSource {
        let mut config = KeyVaultConfig::new(server.uri());
        config.access_token = Some("vault-token".to_string());
        KeyVaultTrustSource::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_pem_secret() {
        let server = MockServer::start().await;
        let cert = certificate();
        Mock::given(method("GET"))
            .and(path("/secrets/gateway-certs"))
            .and(query_param("api-version", "7.4"))
            .and(header("authorization", "Bearer vault-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": cert.pem(),
                "contentType": "application/x-pem-file",
            })))
            .mount(&server)
            .await;

        let store = source(&server).resolve("gateway-certs").await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(cert.der()));
    }

    #[tokio::test]
    async fn test_resolves_base64_der_secret() {
        let server = MockServer::start().await;
        let cert = certificate();
        let encoded = base64::engine::general_purpose::STANDARD.encode(cert.der().as_ref());
        Mock::given(method("GET"))
            .and(path("/secrets/admin-certs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": encoded })),
            )
            .mount(&server)
            .await;

        let store = source(&server).resolve("admin-certs").await.unwrap();
        assert!(store.contains(cert.der()));
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(
            source(&server).resolve("gateway-certs").await.unwrap_err(),
            TrustSourceError::NotFound("gateway-certs".to_string())
        );
    }

    #[tokio::test]
    async fn test_vault_failure_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(
            source(&server).resolve("gateway-certs").await,
            Err(TrustSourceError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/not-json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets/pkcs12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "MIIK",
                "contentType": "application/x-pkcs12",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets/bad-base64"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": "%%%" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/secrets/not-a-certificate"))
            .respond_with(
                // base64 of "hello"
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": "aGVsbG8=" })),
            )
            .mount(&server)
            .await;

        let source = source(&server);
        for name in ["not-json", "pkcs12", "bad-base64", "not-a-certificate"] {
            assert!(
                matches!(source.resolve(name).await, Err(TrustSourceError::Malformed { .. })),
                "{} should be malformed",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_vault() {
        let source = KeyVaultTrustSource::new(KeyVaultConfig::new("http://127.0.0.1:1")).unwrap();
        assert!(matches!(
            source.resolve("gateway-certs").await,
            Err(TrustSourceError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_secret_name() {
        let source = KeyVaultTrustSource::new(KeyVaultConfig::new("http://127.0.0.1:1")).unwrap();
        assert!(matches!(
            source.resolve("../keys").await,
            Err(TrustSourceError::InvalidName(_))
        ));
    }
}
