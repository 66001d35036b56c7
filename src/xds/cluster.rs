//! Cluster configuration using envoy-types
//!
//! Logical backend-pool descriptors and their conversion to envoy-types
//! `Cluster` resources. Clusters are content-addressed: the same backend
//! referenced by many route groups synthesizes exactly once.

use envoy_types::pb::envoy::config::{
    cluster::v3::{cluster::ClusterDiscoveryType, cluster::DiscoveryType, cluster::LbPolicy, Cluster},
    core::v3::{address::Address as AddressType, Address, SocketAddress},
    endpoint::v3::{ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::utils::sanitize_name;

/// Logical representation of a backend cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClusterConfig {
    #[validate(length(min = 1, message = "Cluster name cannot be empty"))]
    #[validate(regex(
        path = "crate::utils::VALID_NAME_REGEX",
        message = "Cluster name must be a valid identifier"
    ))]
    pub name: String,

    #[validate(length(min = 1, message = "At least one endpoint is required"))]
    #[validate(nested)]
    pub endpoints: Vec<EndpointConfig>,

    pub load_balancing_policy: LoadBalancingPolicy,

    /// Upstream connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Logical representation of a single backend endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    #[validate(length(min = 1, message = "Endpoint address cannot be empty"))]
    pub address: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u32,
}

/// Load balancing policies supported by synthesized clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancingPolicy {
    RoundRobin,
    LeastRequest,
    Random,
}

impl ClusterConfig {
    /// Build a cluster from a backend service reference ("host" or
    /// "host:port"); the port defaults to 80.
    pub fn from_service(service: &str, connect_timeout_ms: u64) -> Self {
        let (address, port) = match service.rsplit_once(':') {
            Some((host, port_str)) => match port_str.parse::<u32>() {
                Ok(port) => (host.to_string(), port),
                Err(_) => (service.to_string(), 80),
            },
            None => (service.to_string(), 80),
        };

        Self {
            name: envoy_cluster_name(service),
            endpoints: vec![EndpointConfig { address, port }],
            load_balancing_policy: LoadBalancingPolicy::RoundRobin,
            connect_timeout_ms,
        }
    }

    /// Stable content fingerprint for cache addressing.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        for ep in &self.endpoints {
            hasher.update(ep.address.as_bytes());
            hasher.update(ep.port.to_be_bytes());
        }
        hasher.update(self.connect_timeout_ms.to_be_bytes());
        hex::encode(&hasher.finalize()[..16])
    }

    /// Validate the cluster configuration
    pub fn validate_config(&self) -> Result<(), crate::Error> {
        self.validate().map_err(crate::Error::from)?;
        Ok(())
    }

    /// Convert to an envoy-types Cluster
    pub fn to_envoy_cluster(&self) -> Result<Cluster, crate::Error> {
        self.validate_config()?;

        let cluster = Cluster {
            name: self.name.clone(),
            lb_policy: self.load_balancing_policy.to_envoy_lb_policy() as i32,
            cluster_discovery_type: Some(ClusterDiscoveryType::Type(
                DiscoveryType::StrictDns as i32,
            )),
            load_assignment: Some(self.create_cluster_load_assignment()),
            connect_timeout: Some(envoy_types::pb::google::protobuf::Duration {
                seconds: (self.connect_timeout_ms / 1000) as i64,
                nanos: ((self.connect_timeout_ms % 1000) * 1_000_000) as i32,
            }),
            ..Default::default()
        };

        Ok(cluster)
    }

    fn create_cluster_load_assignment(&self) -> ClusterLoadAssignment {
        let lb_endpoints: Vec<LbEndpoint> =
            self.endpoints.iter().map(|endpoint| endpoint.to_envoy_lb_endpoint()).collect();

        let locality_lb_endpoints = LocalityLbEndpoints { lb_endpoints, ..Default::default() };

        ClusterLoadAssignment {
            cluster_name: self.name.clone(),
            endpoints: vec![locality_lb_endpoints],
            ..Default::default()
        }
    }
}

impl EndpointConfig {
    fn to_envoy_lb_endpoint(&self) -> LbEndpoint {
        let socket_address = SocketAddress {
            address: self.address.clone(),
            port_specifier: Some(
                envoy_types::pb::envoy::config::core::v3::socket_address::PortSpecifier::PortValue(
                    self.port,
                ),
            ),
            ..Default::default()
        };

        let address = Address { address: Some(AddressType::SocketAddress(socket_address)) };

        let endpoint = Endpoint { address: Some(address), ..Default::default() };

        LbEndpoint {
            host_identifier: Some(
                envoy_types::pb::envoy::config::endpoint::v3::lb_endpoint::HostIdentifier::Endpoint(
                    endpoint,
                ),
            ),
            ..Default::default()
        }
    }
}

impl LoadBalancingPolicy {
    fn to_envoy_lb_policy(&self) -> LbPolicy {
        match self {
            LoadBalancingPolicy::RoundRobin => LbPolicy::RoundRobin,
            LoadBalancingPolicy::LeastRequest => LbPolicy::LeastRequest,
            LoadBalancingPolicy::Random => LbPolicy::Random,
        }
    }
}

/// Deterministic Envoy cluster name for a backend service reference.
pub fn envoy_cluster_name(service: &str) -> String {
    format!("cluster_{}", sanitize_name(service))
}
