//! # Synthesis Pipeline
//!
//! The compile pipeline: normalize weights in place, build canonical
//! routes and clusters (through the artifact cache), then synthesize every
//! listener in stable bind-identity order. One synchronous, single-threaded
//! batch per IR snapshot; no I/O, no suspension, and deterministic output —
//! re-running over an unchanged snapshot produces byte-identical results.

pub mod chain;
pub mod cluster;
pub mod listener;
pub mod route;
pub mod variants;

use serde::{Deserialize, Serialize};

use crate::cache::ArtifactCache;
use crate::config::CompilerSettings;
use crate::diagnostics::DiagnosticSink;
use crate::errors::Result;
use crate::ir::{weights, IrSnapshot};
use crate::secrets::SecretResolver;
use crate::xds::{ClusterConfig, ListenerConfig};

pub use chain::{Chain, ChainKey, TlsIdentity};
pub use cluster::ClusterRegistry;
pub use listener::ListenerSynthesizer;
pub use variants::{Matcher, RouteVariants, VariantAction};

/// Everything one compile produces for the data-plane loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledConfig {
    pub listeners: Vec<ListenerConfig>,
    pub clusters: Vec<ClusterConfig>,
}

impl CompiledConfig {
    /// Convert to envoy-types resources.
    pub fn to_envoy(
        &self,
    ) -> Result<(
        Vec<envoy_types::pb::envoy::config::listener::v3::Listener>,
        Vec<envoy_types::pb::envoy::config::cluster::v3::Cluster>,
    )> {
        let listeners = self
            .listeners
            .iter()
            .map(|l| l.to_envoy_listener())
            .collect::<Result<Vec<_>>>()?;
        let clusters = self
            .clusters
            .iter()
            .map(|c| c.to_envoy_cluster())
            .collect::<Result<Vec<_>>>()?;
        Ok((listeners, clusters))
    }

    /// Deterministic JSON rendering; equal snapshots compile to equal
    /// bytes.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// YAML rendering, for operator-facing dumps.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| crate::Error::synthesis(format!("YAML rendering failed: {}", e)))
    }
}

/// Compile one IR snapshot into data-plane configuration.
///
/// The context is fully explicit: the snapshot (mutable only for weight
/// assignment), deployment settings, the cross-snapshot artifact cache,
/// the secret resolver, and the diagnostic sink. Per-resource problems go
/// to the sink and exclude only the offending resource; an `Err` from this
/// function means the compile itself could not run.
pub fn compile(
    snapshot: &mut IrSnapshot,
    settings: &CompilerSettings,
    cache: &mut ArtifactCache,
    secrets: &dyn SecretResolver,
    sink: &DiagnosticSink,
) -> Result<CompiledConfig> {
    settings.validate_settings()?;

    weights::normalize_snapshot(snapshot, sink);

    let mut registry = ClusterRegistry::new();
    let mut route_variants =
        route::build_routes(snapshot, settings, cache, &mut registry, sink);
    route::register_tcp_clusters(snapshot, settings, cache, &mut registry);

    let mut listeners = Vec::new();
    for listener_id in snapshot.listeners_ordered() {
        let mut synthesizer = ListenerSynthesizer::new(snapshot, settings, sink, listener_id);
        if let Some(listener) = synthesizer.synthesize(&mut route_variants, secrets) {
            tracing::info!(
                listener = %listener.name,
                chains = listener.filter_chains.len(),
                "listener generated"
            );
            listeners.push(listener);
        }
    }

    let stats = cache.stats();
    tracing::debug!(
        hits = stats.hits,
        misses = stats.misses,
        "compile finished, cache consulted"
    );

    Ok(CompiledConfig { listeners, clusters: registry.into_ordered() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Host, HttpMappingGroup, IrSnapshotBuilder, Listener, Mapping, MatchCriteria,
    };
    use crate::secrets::NullSecretResolver;

    fn simple_snapshot() -> IrSnapshot {
        let mut builder = IrSnapshotBuilder::new();
        builder.add_listener(Listener::http("0.0.0.0", 8080));
        builder.add_host(Host::wildcard());
        builder.add_http_group(HttpMappingGroup::new(
            "g",
            MatchCriteria::prefix("/foo/"),
            vec![Mapping::to_service("m", "backend:8080")],
        ));
        builder.build()
    }

    #[test]
    fn test_compile_emits_listener_and_cluster() {
        let mut snapshot = simple_snapshot();
        let settings = CompilerSettings::default();
        let mut cache = ArtifactCache::new();
        let sink = DiagnosticSink::new();

        let compiled =
            compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
                .expect("compile");

        assert_eq!(compiled.listeners.len(), 1);
        assert_eq!(compiled.clusters.len(), 1);
        assert_eq!(compiled.clusters[0].name, "cluster_backend_8080");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let settings = CompilerSettings::default();
        let sink = DiagnosticSink::new();

        let mut first_snapshot = simple_snapshot();
        let mut first_cache = ArtifactCache::new();
        let first = compile(
            &mut first_snapshot,
            &settings,
            &mut first_cache,
            &NullSecretResolver,
            &sink,
        )
        .expect("first compile");

        let mut second_snapshot = simple_snapshot();
        let mut second_cache = ArtifactCache::new();
        let second = compile(
            &mut second_snapshot,
            &settings,
            &mut second_cache,
            &NullSecretResolver,
            &sink,
        )
        .expect("second compile");

        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
    }

    #[test]
    fn test_compile_with_host_action_gap_emits_empty_listener_diagnostic() {
        let mut builder = IrSnapshotBuilder::new();
        builder.add_listener(Listener::http("0.0.0.0", 8080));
        // No hosts at all: the listener has nothing to serve.
        let mut snapshot = builder.build();
        let settings = CompilerSettings::default();
        let mut cache = ArtifactCache::new();
        let sink = DiagnosticSink::new();

        let compiled =
            compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
                .expect("compile");

        assert!(compiled.listeners.is_empty());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_invalid_settings_fail_compile() {
        let mut snapshot = simple_snapshot();
        let mut settings = CompilerSettings::default();
        settings.challenge.force_routes = true; // no fallback cluster

        let mut cache = ArtifactCache::new();
        let sink = DiagnosticSink::new();

        assert!(
            compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink).is_err()
        );
    }
}
