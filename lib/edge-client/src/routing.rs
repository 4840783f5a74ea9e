//! Service-name routing on top of a [`ClientHandle`]
//!
//! Requests are addressed as `scheme://<service-name>/path`; the service
//! name is resolved to a backend endpoint just before sending. The client
//! factory knows nothing about this layer.

use crate::error::{ClientError, Result};
use crate::handle::ClientHandle;
use crate::load_balancer::LoadBalancer;
use async_trait::async_trait;
use edge_core::{CoreError, Endpoint, ServiceRegistry};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::http::uri::{Authority, PathAndQuery};
use hyper::{Request, Response, Uri};
use std::sync::Arc;
use tracing::debug;

/// Resolves a service name to the endpoint that should receive a request
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    async fn resolve(&self, service_name: &str) -> edge_core::Result<Endpoint>;
}

/// Resolver backed by the service registry and a load balancer
pub struct RegistryResolver {
    registry: Arc<ServiceRegistry>,
    balancer: LoadBalancer,
}

impl RegistryResolver {
    pub fn new(registry: Arc<ServiceRegistry>, balancer: LoadBalancer) -> Self {
        Self { registry, balancer }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ServiceResolver for RegistryResolver {
    async fn resolve(&self, service_name: &str) -> edge_core::Result<Endpoint> {
        let ready = self.registry.get_service(service_name).await?.ready_endpoints();
        let endpoint = self
            .balancer
            .select(&ready)
            .cloned()
            .ok_or_else(|| CoreError::NoReadyEndpoints(service_name.to_string()))?;

        debug!(
            "Selected endpoint for {}: {}:{}",
            service_name, endpoint.ip, endpoint.port
        );
        Ok(endpoint)
    }
}

/// Client that addresses backends by service name
#[derive(Clone)]
pub struct LoadBalancedClient {
    client: ClientHandle,
    resolver: Arc<dyn ServiceResolver>,
}

impl LoadBalancedClient {
    pub fn new(client: ClientHandle, resolver: Arc<dyn ServiceResolver>) -> Self {
        Self { client, resolver }
    }

    /// The underlying handle, for requests that bypass routing
    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    /// Replace the authority of `uri` with the endpoint address
    pub fn rewrite_uri(uri: &Uri, endpoint: &Endpoint) -> Result<Uri> {
        let authority: Authority = endpoint
            .authority()
            .parse()
            .map_err(|e| ClientError::InvalidUri(format!("{}: {}", endpoint.authority(), e)))?;

        let mut parts = uri.clone().into_parts();
        parts.authority = Some(authority);
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }
        Uri::from_parts(parts).map_err(|e| ClientError::InvalidUri(e.to_string()))
    }

    /// Resolve the service named by the request host and send to it
    pub async fn send(&self, mut request: Request<Full<Bytes>>) -> Result<Response<Bytes>> {
        let service = request
            .uri()
            .host()
            .ok_or_else(|| {
                ClientError::InvalidUri(format!("no service name in {}", request.uri()))
            })?
            .to_string();

        let endpoint = self.resolver.resolve(&service).await?;
        let target = Self::rewrite_uri(request.uri(), &endpoint)?;
        debug!("Routing {} to {}", service, target);

        *request.uri_mut() = target;
        self.client.send(request).await
    }

    /// GET a service-addressed URI
    pub async fn get(&self, uri: &str) -> Result<Response<Bytes>> {
        let request = Request::get(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| ClientError::InvalidUri(format!("{}: {}", uri, e)))?;
        self.send(request).await
    }
}
