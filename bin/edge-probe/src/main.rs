use anyhow::{bail, Context, Result};
use edge_client::{
    ClientHandle, LoadBalancedClient, LoadBalancer, RegistryResolver, TrustRelaxedClientFactory,
};
use edge_core::ServiceRegistry;
use hyper::{body::Bytes, Response, Uri};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod probe_config;

use probe_config::ProbeConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("EDGE_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let config_path = match args.next().or_else(|| std::env::var("EDGE_PROBE_CONFIG").ok()) {
        Some(path) => PathBuf::from(path),
        None => bail!("usage: edge-probe <config.yaml> [url...] (or set EDGE_PROBE_CONFIG)"),
    };
    let urls: Vec<String> = args.collect();

    info!("Starting edge-probe with {}", config_path.display());
    let mut config = ProbeConfig::load(&config_path)?;
    config.client = config.client.with_env_overrides()?;

    let source = config.trust_source.build()?;
    let factory = TrustRelaxedClientFactory::new(source);

    // Without a client there is nothing to probe
    let handle = match factory.create_client(&config.client).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Unable to create client: {}", e);
            return Err(e).context("Client factory failed");
        }
    };

    let registry = Arc::new(ServiceRegistry::new());
    for (name, endpoints) in config.endpoints()? {
        info!("Registering service {} with {} endpoint(s)", name, endpoints.len());
        registry.register_service(name, endpoints).await?;
    }

    let resolver = RegistryResolver::new(registry.clone(), LoadBalancer::new(config.strategy));
    let routed = LoadBalancedClient::new(handle.clone(), Arc::new(resolver));

    let mut failures = 0;
    for url in &urls {
        match probe(&handle, &routed, &registry, url).await {
            Ok(response) => {
                info!("{} -> {} ({} bytes)", url, response.status(), response.body().len());
                println!("{} {}", response.status().as_u16(), url);
            }
            Err(e) => {
                failures += 1;
                warn!("{} failed: {}", url, e);
                println!("ERR {}", url);
            }
        }
    }

    debug!("Client metrics:\n{}", handle.metrics().gather()?);

    if failures > 0 {
        bail!("{} of {} probe(s) failed", failures, urls.len());
    }
    Ok(())
}

/// GET `url`, routed through the registry when its host names a service
async fn probe(
    handle: &ClientHandle,
    routed: &LoadBalancedClient,
    registry: &ServiceRegistry,
    url: &str,
) -> Result<Response<Bytes>> {
    let uri: Uri = url.parse().with_context(|| format!("Invalid URL {}", url))?;
    let is_service = match uri.host() {
        Some(host) => registry.get_service(host).await.is_ok(),
        None => false,
    };

    let response = if is_service {
        routed.get(url).await?
    } else {
        handle.get(url).await?
    };
    Ok(response)
}
