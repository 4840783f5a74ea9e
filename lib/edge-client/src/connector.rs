//! Connector wrapper bounding live connections per destination host
//!
//! The pooled client only caps idle connections. Every connection produced
//! here holds a semaphore permit for its host until it is dropped, so a host
//! never has more than `max_per_host` connections open, busy or idle.

use crate::metrics::ClientMetrics;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::Service;
use tracing::debug;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pool key for a request URI: `scheme://host:port`
pub fn host_key(uri: &Uri) -> String {
    let scheme = uri.scheme_str().unwrap_or("http");
    let host = uri.host().unwrap_or("");
    let port = uri
        .port_u16()
        .unwrap_or(if scheme == "https" { 443 } else { 80 });
    format!("{}://{}:{}", scheme, host, port)
}

/// Per-host connection permits
#[derive(Debug)]
pub struct HostLimits {
    max_per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimits {
    pub fn new(max_per_host: usize) -> Self {
        Self {
            max_per_host,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(semaphore) = hosts.get(host) {
            return semaphore.clone();
        }

        // Permits and pending connects hold a clone, so a lone reference means
        // the host has no connections and can be forgotten
        hosts.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);

        let semaphore = Arc::new(Semaphore::new(self.max_per_host));
        hosts.insert(host.to_string(), semaphore.clone());
        semaphore
    }

    /// Connections currently open to `host` (a [`host_key`])
    pub fn live_connections(&self, host: &str) -> usize {
        let hosts = self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .get(host)
            .map(|s| self.max_per_host - s.available_permits())
            .unwrap_or(0)
    }
}

/// Wraps a connector so each connection holds a permit for its host
#[derive(Clone)]
pub struct PoolLimitedConnector<C> {
    inner: C,
    limits: Arc<HostLimits>,
    metrics: ClientMetrics,
}

impl<C> PoolLimitedConnector<C> {
    pub fn new(inner: C, limits: Arc<HostLimits>, metrics: ClientMetrics) -> Self {
        Self {
            inner,
            limits,
            metrics,
        }
    }
}

impl<C> Service<Uri> for PoolLimitedConnector<C>
where
    C: Service<Uri> + Clone + Send + 'static,
    C::Response: Send + 'static,
    C::Future: Send + 'static,
    C::Error: Into<BoxError>,
{
    type Response = LimitedConnection<C::Response>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let host = host_key(&uri);
        let semaphore = self.limits.semaphore(&host);
        let metrics = self.metrics.clone();

        // Use the instance that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if semaphore.available_permits() == 0 {
                debug!("Connection limit reached for {}, waiting for a slot", host);
            }
            let permit = semaphore.acquire_owned().await?;

            let io = inner.call(uri).await.map_err(Into::<BoxError>::into)?;
            metrics.connection_opened(&host);
            debug!("Opened connection to {}", host);

            Ok::<_, BoxError>(LimitedConnection {
                inner: io,
                host,
                metrics,
                _permit: permit,
            })
        })
    }
}

/// Connection that releases its host slot when dropped
pub struct LimitedConnection<T> {
    inner: T,
    host: String,
    metrics: ClientMetrics,
    _permit: OwnedSemaphorePermit,
}

impl<T> Drop for LimitedConnection<T> {
    fn drop(&mut self) {
        self.metrics.connection_closed(&self.host);
        debug!("Closed connection to {}", self.host);
    }
}

impl<T: Connection> Connection for LimitedConnection<T> {
    fn connected(&self) -> Connected {
        self.inner.connected()
    }
}

impl<T: Read + Unpin> Read for LimitedConnection<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: Write + Unpin> Write for LimitedConnection<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_defaults() {
        let uri: Uri = "https://customers-service/owners".parse().unwrap();
        assert_eq!(host_key(&uri), "https://customers-service:443");

        let uri: Uri = "http://10.0.0.1/vets".parse().unwrap();
        assert_eq!(host_key(&uri), "http://10.0.0.1:80");

        let uri: Uri = "https://10.0.0.1:8443/".parse().unwrap();
        assert_eq!(host_key(&uri), "https://10.0.0.1:8443");
    }

    #[test]
    fn test_host_limits_track_permits() {
        let limits = HostLimits::new(3);
        assert_eq!(limits.live_connections("https://vets-service:443"), 0);

        let semaphore = limits.semaphore("https://vets-service:443");
        let _first = semaphore.clone().try_acquire_owned().unwrap();
        let _second = semaphore.clone().try_acquire_owned().unwrap();
        assert_eq!(limits.live_connections("https://vets-service:443"), 2);
        assert_eq!(limits.live_connections("https://visits-service:443"), 0);

        let _third = semaphore.clone().try_acquire_owned().unwrap();
        assert!(semaphore.clone().try_acquire_owned().is_err());
    }

    #[test]
    fn test_idle_hosts_are_pruned() {
        let limits = HostLimits::new(1);
        let tracked = |limits: &HostLimits| limits.hosts.lock().unwrap().len();

        let permit = limits
            .semaphore("http://customers-service:80")
            .try_acquire_owned()
            .unwrap();
        drop(limits.semaphore("http://vets-service:80"));
        assert_eq!(tracked(&limits), 2);

        // vets-service has no connections, customers-service still holds one
        drop(limits.semaphore("http://visits-service:80"));
        assert_eq!(tracked(&limits), 2);
        assert_eq!(limits.live_connections("http://customers-service:80"), 1);
        assert_eq!(limits.live_connections("http://vets-service:80"), 0);

        drop(permit);
        drop(limits.semaphore("http://api-gateway:80"));
        assert_eq!(tracked(&limits), 1);
    }

    #[test]
    fn test_same_host_shares_semaphore() {
        let limits = HostLimits::new(1);
        let first = limits.semaphore("http://a:80");
        let second = limits.semaphore("http://a:80");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
