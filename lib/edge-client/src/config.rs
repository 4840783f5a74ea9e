//! Client factory configuration

use crate::error::{ClientError, Result};
use crate::key_vault::{KeyVaultConfig, KeyVaultTrustSource};
use crate::trust_source::{PemDirectoryTrustSource, StaticTrustSource, TrustSource, TrustStore};
use rustls::SupportedProtocolVersion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Minimum TLS protocol version offered by the client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Parse a TLS version string ("1.0" through "1.3")
    pub fn parse(version: &str) -> Result<Self> {
        match version {
            "1.0" => Ok(Self::Tls10),
            "1.1" => Ok(Self::Tls11),
            "1.2" => Ok(Self::Tls12),
            "1.3" => Ok(Self::Tls13),
            _ => Err(ClientError::InvalidConfiguration(format!(
                "Invalid TLS version: {}. Must be 1.0, 1.1, 1.2, or 1.3",
                version
            ))),
        }
    }

    /// Protocol versions the TLS engine should enable for this minimum.
    ///
    /// The engine only implements TLS 1.2 and 1.3, so older minimums are a
    /// setup error rather than a silent upgrade.
    pub fn protocol_versions(self) -> Result<&'static [&'static SupportedProtocolVersion]> {
        static TLS12_AND_UP: &[&SupportedProtocolVersion] =
            &[&rustls::version::TLS13, &rustls::version::TLS12];
        static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

        match self {
            Self::Tls12 => Ok(TLS12_AND_UP),
            Self::Tls13 => Ok(TLS13_ONLY),
            Self::Tls10 | Self::Tls11 => Err(ClientError::TlsHandshakeSetup(format!(
                "unsupported protocol version: TLS {}",
                self
            ))),
        }
    }
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tls10 => "1.0",
            Self::Tls11 => "1.1",
            Self::Tls12 => "1.2",
            Self::Tls13 => "1.3",
        };
        f.write_str(s)
    }
}

/// Policy and pool settings for one client handle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name of the trust material within the configured trust source
    pub trust_source_name: String,
    /// Disable transport-level re-sending of requests
    pub disable_retry: bool,
    /// Follow 3xx redirects
    pub follow_redirects: bool,
    /// Upper bound on live connections per destination host
    pub pool_max_connections: usize,
    /// Idle time after which pooled connections are evicted
    pub pool_idle_timeout_secs: u64,
    /// TCP connect timeout
    pub connect_timeout_secs: u64,
    /// Maximum redirect hops when following redirects
    pub max_redirects: usize,
    /// Minimum TLS protocol version
    pub min_tls_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            trust_source_name: String::new(),
            disable_retry: true,
            follow_redirects: true,
            pool_max_connections: 50,
            pool_idle_timeout_secs: 90,
            connect_timeout_secs: 10,
            max_redirects: 10,
            min_tls_version: "1.2".to_string(),
        }
    }
}

impl ClientConfig {
    /// Default configuration bound to the named trust material
    pub fn new(trust_source_name: impl Into<String>) -> Self {
        Self {
            trust_source_name: trust_source_name.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ClientError::InvalidConfiguration(format!("Failed to parse YAML: {}", e)))
    }

    /// Apply `EDGE_CLIENT_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("EDGE_CLIENT_TRUST_SOURCE") {
            self.trust_source_name = name;
        }
        if let Some(value) = lookup("EDGE_CLIENT_DISABLE_RETRY") {
            self.disable_retry = parse_bool("EDGE_CLIENT_DISABLE_RETRY", &value)?;
        }
        if let Some(value) = lookup("EDGE_CLIENT_FOLLOW_REDIRECTS") {
            self.follow_redirects = parse_bool("EDGE_CLIENT_FOLLOW_REDIRECTS", &value)?;
        }
        if let Some(value) = lookup("EDGE_CLIENT_POOL_MAX_CONNECTIONS") {
            self.pool_max_connections = value.trim().parse().map_err(|_| {
                ClientError::InvalidConfiguration(format!(
                    "EDGE_CLIENT_POOL_MAX_CONNECTIONS must be a positive integer, got {:?}",
                    value
                ))
            })?;
        }
        if let Some(version) = lookup("EDGE_CLIENT_MIN_TLS_VERSION") {
            self.min_tls_version = version;
        }
        Ok(self)
    }

    /// Check the configuration before anything is allocated from it
    pub fn validate(&self) -> Result<()> {
        if self.trust_source_name.trim().is_empty() {
            return Err(ClientError::InvalidConfiguration(
                "trust_source_name must not be empty".to_string(),
            ));
        }
        if self.pool_max_connections == 0 {
            return Err(ClientError::InvalidConfiguration(
                "pool_max_connections must be greater than zero".to_string(),
            ));
        }
        if self.follow_redirects && self.max_redirects == 0 {
            return Err(ClientError::InvalidConfiguration(
                "max_redirects must be greater than zero when following redirects".to_string(),
            ));
        }
        TlsVersion::parse(&self.min_tls_version)?;
        Ok(())
    }

    pub fn tls_version(&self) -> Result<TlsVersion> {
        TlsVersion::parse(&self.min_tls_version)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ClientError::InvalidConfiguration(format!(
            "{} must be a boolean, got {:?}",
            key, value
        ))),
    }
}

/// Where trust material is resolved from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrustSourceConfig {
    /// PEM bundles embedded in the configuration, keyed by name
    StaticPem {
        stores: std::collections::BTreeMap<String, String>,
    },
    /// Directory of PEM bundles, one file per name
    PemDirectory { path: PathBuf },
    /// Cloud key vault secrets
    KeyVault(KeyVaultConfig),
}

impl TrustSourceConfig {
    /// Build the configured trust source
    pub fn build(&self) -> Result<Arc<dyn TrustSource>> {
        match self {
            Self::StaticPem { stores } => {
                let mut source = StaticTrustSource::new();
                for (name, pem) in stores {
                    source.insert(TrustStore::from_pem(name, pem.as_bytes())?);
                }
                Ok(Arc::new(source))
            }
            Self::PemDirectory { path } => Ok(Arc::new(PemDirectoryTrustSource::new(path.clone()))),
            Self::KeyVault(config) => Ok(Arc::new(KeyVaultTrustSource::new(config.clone())?)),
        }
    }
}
