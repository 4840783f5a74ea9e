//! Pooled client handle bound to a fixed trust, retry and redirect policy

use crate::connector::{host_key, HostLimits, PoolLimitedConnector};
use crate::error::{ClientError, Result};
use crate::metrics::ClientMetrics;
use crate::policy::TrustPolicy;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;
use tower_http::follow_redirect::policy::{FilterCredentials, Limited, PolicyExt};
use tower_http::follow_redirect::FollowRedirect;
use tracing::{debug, warn};

pub(crate) type PooledHttpsClient =
    Client<PoolLimitedConnector<HttpsConnector<HttpConnector>>, Full<Bytes>>;

/// Request policy fixed when the handle is created
#[derive(Clone, Copy, Debug)]
pub(crate) struct HandleSettings {
    pub follow_redirects: bool,
    pub retry_enabled: bool,
    pub max_redirects: usize,
}

/// Shareable pooled HTTP client.
///
/// Clones share the same pool and policy. The trust policy cannot be changed;
/// build a new handle from the factory for different trust behaviour.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    client: PooledHttpsClient,
    policy: Arc<TrustPolicy>,
    settings: HandleSettings,
    limits: Arc<HostLimits>,
    metrics: ClientMetrics,
}

impl ClientHandle {
    pub(crate) fn new(
        client: PooledHttpsClient,
        policy: Arc<TrustPolicy>,
        settings: HandleSettings,
        limits: Arc<HostLimits>,
        metrics: ClientMetrics,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                client,
                policy,
                settings,
                limits,
                metrics,
            }),
        }
    }

    pub fn policy(&self) -> &TrustPolicy {
        &self.inner.policy
    }

    pub fn follow_redirects(&self) -> bool {
        self.inner.settings.follow_redirects
    }

    pub fn retry_enabled(&self) -> bool {
        self.inner.settings.retry_enabled
    }

    pub fn max_connections_per_host(&self) -> usize {
        self.inner.limits.max_per_host()
    }

    /// Connections currently open to the host addressed by `uri`
    pub fn live_connections(&self, uri: &Uri) -> usize {
        self.inner.limits.live_connections(&host_key(uri))
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.inner.metrics
    }

    /// Send a request and collect the response body.
    ///
    /// Transport errors are returned unchanged; nothing is retried here.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Bytes>> {
        let uri = request.uri();
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ClientError::InvalidUri(format!(
                "absolute URI required, got {}",
                uri
            )));
        }

        let method = request.method().to_string();
        let target = uri.to_string();
        debug!("{} {}", method, target);

        let started = Instant::now();
        let result = if self.inner.settings.follow_redirects {
            // Credentials never follow a redirect to another origin
            let policy = Limited::new(self.inner.settings.max_redirects)
                .and::<_, (), ()>(FilterCredentials::new());
            FollowRedirect::with_policy(self.inner.client.clone(), policy)
                .oneshot(request)
                .await
        } else {
            self.inner.client.request(request).await
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.inner
                    .metrics
                    .observe_error(&method, started.elapsed().as_secs_f64());
                warn!("Request {} {} failed: {}", method, target, e);
                return Err(ClientError::Transport(e));
            }
        };

        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        self.inner.metrics.observe_response(
            &method,
            parts.status.as_u16(),
            started.elapsed().as_secs_f64(),
        );
        debug!(
            "{} {} -> {} ({} bytes)",
            method,
            target,
            parts.status,
            body.len()
        );

        Ok(Response::from_parts(parts, body))
    }

    /// GET `uri` with an empty body
    pub async fn get(&self, uri: &str) -> Result<Response<Bytes>> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| ClientError::InvalidUri(format!("{}: {}", uri, e)))?;
        let request = Request::get(parsed)
            .body(Full::new(Bytes::new()))
            .map_err(|e| ClientError::InvalidUri(e.to_string()))?;
        self.send(request).await
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("trust_source", &self.inner.policy.trust_store().source())
            .field("allow_self_signed", &self.inner.policy.allow_self_signed())
            .field("sni_override", &self.inner.policy.sni_override())
            .field("follow_redirects", &self.inner.settings.follow_redirects)
            .field("retry_enabled", &self.inner.settings.retry_enabled)
            .field("max_connections_per_host", &self.inner.limits.max_per_host())
            .finish()
    }
}
