//! Load balancing strategies for distributing requests across endpoints

use edge_core::Endpoint;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Load balancing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Round-robin: distribute requests evenly across endpoints
    #[default]
    RoundRobin,
    /// Random: pick a ready endpoint uniformly at random
    Random,
}

/// Load balancer for selecting endpoints based on a strategy
#[derive(Debug)]
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    round_robin_counter: AtomicUsize,
}

impl LoadBalancer {
    /// Create a new load balancer with the specified strategy
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            round_robin_counter: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Select a ready endpoint from the list based on the configured strategy
    pub fn select<'a>(&self, endpoints: &'a [Endpoint]) -> Option<&'a Endpoint> {
        let ready_endpoints: Vec<&'a Endpoint> = endpoints.iter().filter(|e| e.ready).collect();

        if ready_endpoints.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalancingStrategy::RoundRobin => {
                let current = self.round_robin_counter.fetch_add(1, Ordering::Relaxed);
                ready_endpoints.get(current % ready_endpoints.len()).copied()
            }
            LoadBalancingStrategy::Random => {
                let index = rand::thread_rng().gen_range(0..ready_endpoints.len());
                ready_endpoints.get(index).copied()
            }
        }
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(LoadBalancingStrategy::default())
    }
}
