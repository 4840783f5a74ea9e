#![allow(dead_code)]

use edge_client::{StaticTrustSource, TrustRelaxedClientFactory, TrustStore};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rcgen::{BasicConstraints, CertificateParams, IsCa, Issuer, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Counters observed by a test backend
#[derive(Default)]
pub struct BackendStats {
    pub accepted: AtomicUsize,
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub requests: AtomicUsize,
    /// `authorization` header of every request, in arrival order
    pub authorization: Mutex<Vec<Option<String>>>,
}

impl BackendStats {
    fn connection_opened(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);
    }

    fn connection_closed(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn authorization(&self) -> Vec<Option<String>> {
        self.authorization.lock().unwrap().clone()
    }
}

/// How a test backend answers
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// 200 "ok" after a delay
    Ok(Duration),
    /// Fixed status code
    Status(u16),
    /// `/old` redirects to `/new`, everything else answers 200
    Redirect,
    /// Every path redirects to `/landing` on another backend
    RedirectTo(SocketAddr),
    /// Close every connection without reading or answering
    DropConnection,
}

async fn respond(
    request: Request<Incoming>,
    behavior: Behavior,
    stats: Arc<BackendStats>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    stats.requests.fetch_add(1, Ordering::SeqCst);
    let authorization = request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    stats.authorization.lock().unwrap().push(authorization);

    let response = match behavior {
        Behavior::Ok(delay) => {
            tokio::time::sleep(delay).await;
            Response::new(Full::new(Bytes::from_static(b"ok")))
        }
        Behavior::Status(code) => {
            let mut response = Response::new(Full::new(Bytes::from_static(b"unavailable")));
            *response.status_mut() = StatusCode::from_u16(code).unwrap();
            response
        }
        Behavior::Redirect if request.uri().path() == "/old" => Response::builder()
            .status(StatusCode::FOUND)
            .header("location", "/new")
            .body(Full::new(Bytes::new()))
            .unwrap(),
        Behavior::RedirectTo(target) => Response::builder()
            .status(StatusCode::FOUND)
            .header("location", format!("http://{}/landing", target))
            .body(Full::new(Bytes::new()))
            .unwrap(),
        Behavior::Redirect | Behavior::DropConnection => {
            Response::new(Full::new(Bytes::from_static(b"moved here")))
        }
    };
    Ok(response)
}

async fn serve<I>(io: I, behavior: Behavior, stats: Arc<BackendStats>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service_stats = stats.clone();
    let service = service_fn(move |request| respond(request, behavior, service_stats.clone()));
    let _ = http1::Builder::new().serve_connection(io, service).await;
}

/// Plain HTTP backend on an ephemeral port
pub async fn spawn_http_backend(behavior: Behavior) -> (SocketAddr, Arc<BackendStats>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(BackendStats::default());

    let accept_stats = stats.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accept_stats.connection_opened();
            if matches!(behavior, Behavior::DropConnection) {
                drop(stream);
                accept_stats.connection_closed();
                continue;
            }

            let stats = accept_stats.clone();
            tokio::spawn(async move {
                serve(TokioIo::new(stream), behavior, stats.clone()).await;
                stats.connection_closed();
            });
        }
    });

    (addr, stats)
}

/// HTTPS backend presenting `chain`
pub async fn spawn_https_backend(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> (SocketAddr, Arc<BackendStats>) {
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(chain, key)
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stats = Arc::new(BackendStats::default());

    let accept_stats = stats.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accept_stats.connection_opened();

            let acceptor = acceptor.clone();
            let stats = accept_stats.clone();
            tokio::spawn(async move {
                if let Ok(tls) = acceptor.accept(stream).await {
                    serve(TokioIo::new(tls), Behavior::Ok(Duration::ZERO), stats.clone()).await;
                }
                stats.connection_closed();
            });
        }
    });

    (addr, stats)
}

/// Self-signed certificate and key for `name`
pub fn self_signed(name: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let key = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(vec![name.to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();
    (cert.der().clone(), private_key(&key))
}

pub struct Authority {
    pub cert: CertificateDer<'static>,
    issuer: Issuer<'static, KeyPair>,
}

impl Authority {
    pub fn new() -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.clone().self_signed(&key).unwrap();
        Self {
            cert: cert.der().clone(),
            issuer: Issuer::new(params, key),
        }
    }

    /// Leaf certificate for `name` signed by this authority
    pub fn issue(&self, name: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec![name.to_string()])
            .unwrap()
            .signed_by(&key, &self.issuer)
            .unwrap();
        (cert.der().clone(), private_key(&key))
    }
}

fn private_key(key: &KeyPair) -> PrivateKeyDer<'static> {
    PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()))
}

/// Factory resolving `name` to `certificates` from memory
pub fn factory(name: &str, certificates: Vec<CertificateDer<'static>>) -> TrustRelaxedClientFactory {
    let source = StaticTrustSource::new().with_store(TrustStore::new(name, certificates));
    TrustRelaxedClientFactory::new(Arc::new(source))
}
