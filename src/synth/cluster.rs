//! Cluster synthesis.
//!
//! Backend clusters are content-addressed: a cluster is synthesized once
//! per distinct backend and shared by every mapping that references it,
//! within a compile (the registry) and across compiles (the cache).

use std::collections::BTreeMap;

use crate::cache::{Artifact, ArtifactCache};
use crate::config::CompilerSettings;
use crate::ir::Mapping;
use crate::xds::cluster::ClusterConfig;

/// Clusters accumulated over one compile, keyed by Envoy cluster name.
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: BTreeMap<String, ClusterConfig>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: ClusterConfig) {
        self.clusters.entry(config.name.clone()).or_insert(config);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Clusters in stable name order, for emission.
    pub fn into_ordered(self) -> Vec<ClusterConfig> {
        self.clusters.into_values().collect()
    }
}

/// Get or synthesize the cluster for a mapping's backend, registering it
/// for emission and linking it to its owning group in the cache.
///
/// Returns the Envoy cluster name for the mapping to reference.
pub fn cluster_for_mapping(
    mapping: &Mapping,
    group_key: &str,
    settings: &CompilerSettings,
    cache: &mut ArtifactCache,
    registry: &mut ClusterRegistry,
) -> String {
    let fresh =
        ClusterConfig::from_service(&mapping.service, settings.cluster_defaults.connect_timeout_ms);
    let cache_key = format!("cluster-{}", fresh.fingerprint());

    let config = match cache.fetch(&cache_key) {
        Some(Artifact::Cluster(cached)) => cached.clone(),
        _ => {
            tracing::debug!(key = %cache_key, service = %mapping.service, "synthesizing cluster");
            cache.add(cache_key.clone(), Artifact::Cluster(fresh.clone()));
            fresh
        }
    };

    cache.link(group_key, &cache_key);

    let name = config.name.clone();
    registry.register(config);
    name
}
