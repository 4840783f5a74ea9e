//! Core service discovery types shared by the edge clients
//!
//! This library provides:
//! - Service registry mapping service names to their backend endpoints
//! - Endpoint model and address parsing
//! - Core error type for discovery and routing lookups

pub mod registry;
pub mod endpoint;
pub mod error;

pub use registry::{ServiceInfo, ServiceRegistry};
pub use endpoint::Endpoint;
pub use error::{CoreError, Result};
