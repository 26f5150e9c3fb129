//! Host discovery - CIDR enumeration and management-port liveness probing
//!
//! A host counts as reachable when its remote management listener accepts a
//! TCP connection. Individual probe failures are expected and common, so they
//! collapse into [`Reachability::Unreachable`] instead of surfacing as errors.

pub mod engine;
pub mod methods;
pub mod range;

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub use engine::HostScanner;
pub use methods::TcpConnectProbe;
pub use range::{AddressIter, AddressRange};

/// Outcome of a liveness probe against one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable,
}

/// A probed address and its classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub address: Ipv4Addr,
    pub reachability: Reachability,
}

impl Host {
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            reachability: Reachability::Unknown,
        }
    }

    /// Classify a not-yet-probed host. The result is a new value; hosts are
    /// never reclassified after a probe.
    pub fn classified(self, reachability: Reachability) -> Self {
        Self {
            address: self.address,
            reachability,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachability == Reachability::Reachable
    }
}

/// Liveness check for a single address
#[async_trait::async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, address: Ipv4Addr) -> Reachability;
    fn method_name(&self) -> &str;
}

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub parallel_limit: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { parallel_limit: 256 }
    }
}
