use anyhow::{Context, Result};
use edge_client::{ClientConfig, LoadBalancingStrategy, TrustSourceConfig};
use edge_core::Endpoint;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Probe configuration file
#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub client: ClientConfig,
    pub trust_source: TrustSourceConfig,
    /// Service name to `host:port` backends
    #[serde(default)]
    pub services: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,
}

impl ProbeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid probe configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    /// Parsed endpoints for every configured service
    pub fn endpoints(&self) -> Result<Vec<(String, Vec<Endpoint>)>> {
        self.services
            .iter()
            .map(|(name, addresses)| {
                let endpoints = addresses
                    .iter()
                    .map(|address| Endpoint::parse(address))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .with_context(|| format!("Invalid endpoint for service {}", name))?;
                Ok((name.clone(), endpoints))
            })
            .collect()
    }
}
