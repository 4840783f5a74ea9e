//! Endpoint management
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
    pub ready: bool,
}

impl Endpoint {
    /// Create a ready endpoint
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            ready: true,
        }
    }

    /// Parse a `host:port` address (IPv6 hosts in brackets) into a ready endpoint
    pub fn parse(address: &str) -> Result<Self> {
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(Self::new(addr.ip().to_string(), addr.port()));
        }

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidEndpoint(address.to_string()))?;
        if host.is_empty() || host.contains(':') {
            return Err(CoreError::InvalidEndpoint(address.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidEndpoint(address.to_string()))?;

        Ok(Self::new(host, port))
    }

    /// Authority form used when addressing this endpoint in a URI
    pub fn authority(&self) -> String {
        if self.ip.contains(':') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}
