use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("No ready endpoints for service: {0}")]
    NoReadyEndpoints(String),

    #[error("Invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid service configuration: {0}")]
    InvalidConfiguration(String),
}
