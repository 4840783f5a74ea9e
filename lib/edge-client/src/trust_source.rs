//! Trust material resolution
//!
//! A [`TrustSource`] turns a trust source name into a [`TrustStore`]. The
//! factory resolves exactly once per client; sources are free to do network
//! or disk I/O.

use crate::error::TrustSourceError;
use async_trait::async_trait;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Certificates resolved from one named trust source
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrustStore {
    source: String,
    certificates: Vec<CertificateDer<'static>>,
}

impl TrustStore {
    pub fn new(source: impl Into<String>, certificates: Vec<CertificateDer<'static>>) -> Self {
        Self {
            source: source.into(),
            certificates,
        }
    }

    /// Parse a PEM bundle; a bundle without any certificate is malformed
    pub fn from_pem(source: &str, pem_data: &[u8]) -> Result<Self, TrustSourceError> {
        let certificates = load_certificates(pem_data)
            .map_err(|e| TrustSourceError::malformed(source, e))?;

        if certificates.is_empty() {
            return Err(TrustSourceError::malformed(source, "no certificates found in PEM data"));
        }

        let store = Self::from_der(source, certificates)?;
        debug!("Loaded {} certificate(s) from {}", store.len(), source);
        Ok(store)
    }

    /// Build a store from DER certificates; every entry must parse as X.509
    pub fn from_der(
        source: &str,
        certificates: Vec<CertificateDer<'static>>,
    ) -> Result<Self, TrustSourceError> {
        let mut roots = RootCertStore::empty();
        for (index, certificate) in certificates.iter().enumerate() {
            roots.add(certificate.clone()).map_err(|e| {
                TrustSourceError::malformed(
                    source,
                    format!("entry {} is not an X.509 certificate: {}", index, e),
                )
            })?;
        }
        Ok(Self::new(source, certificates))
    }

    /// Name of the source this store was resolved from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Whether `certificate` is byte-identical to a stored certificate
    pub fn contains(&self, certificate: &CertificateDer<'_>) -> bool {
        self.certificates
            .iter()
            .any(|c| c.as_ref() == certificate.as_ref())
    }

    /// SHA-256 fingerprints (lowercase hex) of the stored certificates
    pub fn fingerprints(&self) -> Vec<String> {
        self.certificates
            .iter()
            .map(|c| hex::encode(Sha256::digest(c.as_ref())))
            .collect()
    }

    /// Root store built from every certificate usable as a trust anchor
    pub fn root_store(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(self.certificates.iter().cloned());
        debug!(
            "Trust store {}: {} anchor(s) added, {} ignored",
            self.source, added, ignored
        );
        roots
    }
}

impl Serialize for TrustStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TrustStore", 2)?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("fingerprints", &self.fingerprints())?;
        state.end()
    }
}

/// Load certificates from PEM-encoded data
pub fn load_certificates(pem_data: &[u8]) -> std::io::Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem_data);
    rustls_pemfile::certs(&mut reader).collect()
}

/// Resolves named trust material
#[async_trait]
pub trait TrustSource: Send + Sync {
    /// Short label for logs
    fn kind(&self) -> &'static str;

    /// Resolve `name` into a trust store
    async fn resolve(&self, name: &str) -> Result<TrustStore, TrustSourceError>;
}

/// In-memory trust stores keyed by name
#[derive(Clone, Debug, Default)]
pub struct StaticTrustSource {
    stores: HashMap<String, TrustStore>,
}

impl StaticTrustSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a store under its source name
    pub fn insert(&mut self, store: TrustStore) {
        self.stores.insert(store.source().to_string(), store);
    }

    pub fn with_store(mut self, store: TrustStore) -> Self {
        self.insert(store);
        self
    }
}

#[async_trait]
impl TrustSource for StaticTrustSource {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, name: &str) -> Result<TrustStore, TrustSourceError> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| TrustSourceError::NotFound(name.to_string()))
    }
}

/// PEM bundles on disk, `<root>/<name>` or `<root>/<name>.pem`
#[derive(Clone, Debug)]
pub struct PemDirectoryTrustSource {
    root: PathBuf,
}

impl PemDirectoryTrustSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, name: &str) -> Result<Vec<PathBuf>, TrustSourceError> {
        // components() drops trailing separators and `.`, so check the raw name too
        let has_separator = name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == std::path::MAIN_SEPARATOR);
        let relative = Path::new(name);
        let single_component = relative.components().count() == 1
            && matches!(relative.components().next(), Some(Component::Normal(_)));
        if name.is_empty() || has_separator || !single_component {
            return Err(TrustSourceError::InvalidName(name.to_string()));
        }

        let exact = self.root.join(relative);
        let with_extension = self.root.join(format!("{}.pem", name));
        Ok(vec![exact, with_extension])
    }
}

#[async_trait]
impl TrustSource for PemDirectoryTrustSource {
    fn kind(&self) -> &'static str {
        "pem-directory"
    }

    async fn resolve(&self, name: &str) -> Result<TrustStore, TrustSourceError> {
        for path in self.candidates(name)? {
            match tokio::fs::read(&path).await {
                Ok(pem) => {
                    debug!("Reading trust material from {}", path.display());
                    return TrustStore::from_pem(name, &pem);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(TrustSourceError::unreachable(name, e)),
            }
        }
        Err(TrustSourceError::NotFound(name.to_string()))
    }
}
