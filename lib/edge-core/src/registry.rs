//! Service registry for managing named services and their endpoints

use crate::{CoreError, Endpoint, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// ServiceRegistry maintains a registry of services and their endpoints
pub struct ServiceRegistry {
    // Map of service name to service info
    services: Arc<RwLock<HashMap<String, ServiceInfo>>>,
}

/// Information about a registered service
#[derive(Clone, Debug)]
pub struct ServiceInfo {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

impl ServiceInfo {
    /// Endpoints currently marked ready
    pub fn ready_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.iter().filter(|e| e.ready).cloned().collect()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register or replace a service
    pub async fn register_service(&self, name: String, endpoints: Vec<Endpoint>) -> Result<()> {
        if name.is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "service name must not be empty".to_string(),
            ));
        }

        let mut services = self.services.write().await;
        debug!("Registered service: {} ({} endpoint(s))", name, endpoints.len());
        services.insert(name.clone(), ServiceInfo { name, endpoints });
        Ok(())
    }

    /// Get service information
    pub async fn get_service(&self, name: &str) -> Result<ServiceInfo> {
        let services = self.services.read().await;
        services
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ServiceNotFound(name.to_string()))
    }

    /// Get endpoints for a service
    pub async fn get_endpoints(&self, name: &str) -> Result<Vec<Endpoint>> {
        let service = self.get_service(name).await?;
        Ok(service.endpoints)
    }

    /// Update endpoints for a service
    pub async fn update_endpoints(&self, name: &str, endpoints: Vec<Endpoint>) -> Result<()> {
        let mut services = self.services.write().await;
        if let Some(service) = services.get_mut(name) {
            service.endpoints = endpoints;
            debug!("Updated endpoints for service: {}", name);
            Ok(())
        } else {
            Err(CoreError::ServiceNotFound(name.to_string()))
        }
    }

    /// List all services
    pub async fn list_services(&self) -> Vec<ServiceInfo> {
        let services = self.services.read().await;
        services.values().cloned().collect()
    }

    /// Deregister a service, returning whether it was present
    pub async fn deregister_service(&self, name: &str) -> bool {
        let mut services = self.services.write().await;
        let removed = services.remove(name).is_some();
        debug!("Deregistered service: {}", name);
        removed
    }

    /// Get count of registered services
    pub async fn service_count(&self) -> usize {
        let services = self.services.read().await;
        services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
