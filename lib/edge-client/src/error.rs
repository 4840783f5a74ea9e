use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Failure to turn a named trust source into certificate material
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrustSourceError {
    #[error("Trust source not found: {0}")]
    NotFound(String),

    #[error("Invalid trust source name: {0}")]
    InvalidName(String),

    #[error("Trust source {name} unreachable: {reason}")]
    Unreachable { name: String, reason: String },

    #[error("Malformed trust material in {name}: {reason}")]
    Malformed { name: String, reason: String },
}

impl TrustSourceError {
    pub fn unreachable(name: &str, reason: impl ToString) -> Self {
        Self::Unreachable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(name: &str, reason: impl ToString) -> Self {
        Self::Malformed {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Trust source error: {0}")]
    TrustSource(#[from] TrustSourceError),

    #[error("TLS handshake setup error: {0}")]
    TlsHandshakeSetup(String),

    #[error("Invalid client configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid request URI: {0}")]
    InvalidUri(String),

    #[error("Transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("Response body error: {0}")]
    Body(#[from] hyper::Error),

    #[error("Routing error: {0}")]
    Routing(#[from] edge_core::CoreError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
