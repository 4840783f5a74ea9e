//! Trust-relaxed pooled HTTP clients for edge services
//!
//! [`TrustRelaxedClientFactory`] resolves trust material from a
//! [`TrustSource`] and returns a [`ClientHandle`] that:
//! - accepts certificates from that material or self-signed ones,
//! - accepts any server name (SNI override),
//! - bounds and reuses connections per destination host.
//!
//! [`LoadBalancedClient`] layers service-name routing over a handle.

pub mod config;
pub mod connector;
pub mod error;
pub mod factory;
pub mod handle;
pub mod key_vault;
pub mod load_balancer;
pub mod metrics;
pub mod policy;
pub mod routing;
pub mod tls;
pub mod trust_source;
pub mod verifier;

pub use config::{ClientConfig, TlsVersion, TrustSourceConfig};
pub use error::{ClientError, Result, TrustSourceError};
pub use factory::TrustRelaxedClientFactory;
pub use handle::ClientHandle;
pub use key_vault::{KeyVaultConfig, KeyVaultTrustSource};
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy};
pub use metrics::ClientMetrics;
pub use policy::{CertDecision, TrustPolicy};
pub use routing::{LoadBalancedClient, RegistryResolver, ServiceResolver};
pub use trust_source::{PemDirectoryTrustSource, StaticTrustSource, TrustSource, TrustStore};
pub use verifier::RelaxedServerVerifier;
