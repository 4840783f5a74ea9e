//! Factory for trust-relaxed pooled HTTP clients

use crate::config::ClientConfig;
use crate::connector::{HostLimits, PoolLimitedConnector};
use crate::error::Result;
use crate::handle::{ClientHandle, HandleSettings};
use crate::metrics::ClientMetrics;
use crate::policy::TrustPolicy;
use crate::tls::{default_provider, relaxed_client_config};
use crate::trust_source::TrustSource;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::crypto::CryptoProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Builds [`ClientHandle`]s whose TLS trust comes from a [`TrustSource`].
///
/// Every handle accepts self-signed certificates and any server name. Call
/// [`create_client`](Self::create_client) once at startup and share the
/// handle; construction may block on the trust source.
pub struct TrustRelaxedClientFactory {
    source: Arc<dyn TrustSource>,
    provider: Arc<CryptoProvider>,
}

impl TrustRelaxedClientFactory {
    pub fn new(source: Arc<dyn TrustSource>) -> Self {
        Self::with_provider(source, default_provider())
    }

    /// Use a specific crypto provider for handshakes and signature checks
    pub fn with_provider(source: Arc<dyn TrustSource>, provider: Arc<CryptoProvider>) -> Self {
        Self { source, provider }
    }

    pub fn trust_source(&self) -> &Arc<dyn TrustSource> {
        &self.source
    }

    /// Resolve trust material and assemble a pooled client.
    ///
    /// Fails with `TrustSource` when the material cannot be resolved and with
    /// `TlsHandshakeSetup` when the TLS engine rejects the policy. No pool is
    /// built unless both steps succeed.
    pub async fn create_client(&self, config: &ClientConfig) -> Result<ClientHandle> {
        config.validate()?;
        let min_version = config.tls_version()?;
        min_version.protocol_versions()?;

        let name = config.trust_source_name.as_str();
        info!("Resolving trust source {} ({})", name, self.source.kind());
        let trust_store = self.source.resolve(name).await.map_err(|e| {
            error!("Unable to resolve trust material for {}: {}", name, e);
            e
        })?;

        let policy = Arc::new(TrustPolicy::relaxed(trust_store));
        warn!(
            trust_source = name,
            certificates = policy.trust_store().len(),
            "TLS trust relaxation active: self-signed certificates accepted, server names not verified"
        );

        let tls = relaxed_client_config(policy.clone(), self.provider.clone(), min_version)?;

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(config.connect_timeout()));
        http.set_keepalive(Some(Duration::from_secs(30)));

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let metrics = ClientMetrics::new()?;
        let limits = Arc::new(HostLimits::new(config.pool_max_connections));
        let connector = PoolLimitedConnector::new(https, limits.clone(), metrics.clone());

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_connections)
            .pool_timer(TokioTimer::new())
            .retry_canceled_requests(!config.disable_retry)
            .build::<_, Full<Bytes>>(connector);

        let settings = HandleSettings {
            follow_redirects: config.follow_redirects,
            retry_enabled: !config.disable_retry,
            max_redirects: config.max_redirects,
        };

        info!(
            "Client ready for {} (max {} connection(s) per host, retry: {}, follow redirects: {})",
            name, config.pool_max_connections, settings.retry_enabled, settings.follow_redirects
        );

        Ok(ClientHandle::new(client, policy, settings, limits, metrics))
    }
}
