//! Trust policy applied to remote TLS peers
//!
//! The only policy the factory builds is [`TrustPolicy::relaxed`]: the peer
//! certificate may be self-signed and the server name is never checked
//! against it. This is an intentional, audited relaxation for backends whose
//! certificates are issued from a private key vault. Certificate trust and
//! server name identity are separate switches on the policy so each decision
//! can be inspected and tested on its own.

use crate::trust_source::TrustStore;
use serde::Serialize;

/// Outcome of evaluating a presented certificate chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertDecision {
    /// Leaf is byte-identical to a trust store entry
    PinnedCertificate,
    /// Chain validates against the trust store and matches the server name
    TrustedChain,
    /// Chain validates against the trust store, server name does not match
    NameMismatchOverridden,
    /// Single self-signed certificate accepted without chain validation
    SelfSigned,
}

/// How remote TLS certificates are validated. Immutable once built.
#[derive(Clone, Debug, Serialize)]
pub struct TrustPolicy {
    trust_store: TrustStore,
    allow_self_signed: bool,
    sni_override: bool,
}

impl TrustPolicy {
    /// Accept certificates from `trust_store` or self-signed ones, for any server name
    pub fn relaxed(trust_store: TrustStore) -> Self {
        Self {
            trust_store,
            allow_self_signed: true,
            sni_override: true,
        }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    pub fn allow_self_signed(&self) -> bool {
        self.allow_self_signed
    }

    pub fn sni_override(&self) -> bool {
        self.sni_override
    }

    /// Server name matcher: whether `server_name` is accepted without
    /// consulting the certificate's subject names
    pub fn accepts_server_name(&self, _server_name: &str) -> bool {
        self.sni_override
    }

    /// Whether both relaxations are in effect
    pub fn is_fully_relaxed(&self) -> bool {
        self.allow_self_signed && self.sni_override
    }
}
