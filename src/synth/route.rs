//! Canonical route synthesis.
//!
//! One canonical route is built per group member (plus one for a pure
//! host-redirect group), memoized in the artifact cache under a key
//! derived from the group identity and the member's content fingerprint.
//! The cache links every route and cluster to its owning group, so
//! invalidating a changed group drops exactly its artifacts.

use crate::cache::{Artifact, ArtifactCache};
use crate::config::CompilerSettings;
use crate::diagnostics::DiagnosticSink;
use crate::ir::{HttpMappingGroup, IrSnapshot, Mapping};
use crate::synth::cluster::{cluster_for_mapping, ClusterRegistry};
use crate::synth::variants::RouteVariants;
use crate::xds::route::{
    CorsPolicyConfig, HeaderMatchConfig, MirrorPolicyConfig, PathMatch, RedirectTarget,
    RetryPolicyConfig, RouteActionConfig, RouteMatchConfig, RouteRule, RouteTarget,
    RuntimeFractionConfig,
};

/// Build the canonical routes (and their backing clusters) for every valid
/// group, in group emission order.
pub fn build_routes(
    snapshot: &IrSnapshot,
    settings: &CompilerSettings,
    cache: &mut ArtifactCache,
    registry: &mut ClusterRegistry,
    sink: &DiagnosticSink,
) -> Vec<RouteVariants> {
    let mut variants = Vec::new();

    for group_id in snapshot.http_groups_ordered() {
        let group = snapshot.http_group(group_id);
        if !group.weights_valid {
            // The weight normalizer already posted the error; the group
            // contributes nothing.
            continue;
        }

        if let PathMatch::Regex(regex) = &group.criteria.path {
            if regex.len() as u32 > settings.regex_max_size {
                sink.post_error(
                    group.resource_ref(),
                    format!("path regex exceeds maximum size {}", settings.regex_max_size),
                );
                continue;
            }
        }

        let group_key = format!("group-{}", group.group_id);
        cache.add(group_key.clone(), Artifact::Group { name: group.name.clone() });

        // A host-redirect group needs no clusters at all: the redirect is
        // just a name to send the client to.
        if let Some(redirect) = &group.host_redirect {
            let key = format!("route-{}-hostredirect", group.group_id);
            let route = get_or_synthesize(cache, &key, &group_key, || {
                build_host_redirect_route(group, redirect)
            });
            variants.push(RouteVariants::new(group_id, route));
            continue;
        }

        // Mirror targets are shared by every member of the group.
        let mirrors: Vec<MirrorPolicyConfig> = group
            .shadow_mappings
            .iter()
            .map(|shadow| MirrorPolicyConfig {
                cluster: cluster_for_mapping(shadow, &group_key, settings, cache, registry),
                fraction_numerator: shadow.weight.unwrap_or(100),
            })
            .collect();

        for mapping in &group.mappings {
            if mapping.cumulative_weight.is_none() {
                sink.post_error(
                    mapping.resource_ref(),
                    "mapping has no normalized weight, excluding route",
                );
                continue;
            }

            let cluster_name =
                cluster_for_mapping(mapping, &group_key, settings, cache, registry);
            let key = format!("route-{}-{}", group.group_id, mapping.fingerprint());
            let route = get_or_synthesize(cache, &key, &group_key, || {
                build_route(group, mapping, &cluster_name, &mirrors, settings)
            });
            variants.push(RouteVariants::new(group_id, route));
        }
    }

    variants
}

fn get_or_synthesize<F: FnOnce() -> RouteRule>(
    cache: &mut ArtifactCache,
    key: &str,
    group_key: &str,
    build: F,
) -> RouteRule {
    let route = match cache.fetch(key) {
        Some(Artifact::Route(cached)) => cached.clone(),
        _ => {
            tracing::debug!(key = %key, "synthesizing route");
            let fresh = build();
            cache.add(key.to_string(), Artifact::Route(fresh.clone()));
            fresh
        }
    };

    cache.link(group_key, key);
    route
}

fn build_match(group: &HttpMappingGroup) -> RouteMatchConfig {
    let criteria = &group.criteria;

    let mut headers = criteria.headers.clone();
    if let Some(method) = &criteria.method {
        headers.push(HeaderMatchConfig::exact(":method", method.clone()));
    }

    RouteMatchConfig {
        path: criteria.path.clone(),
        case_sensitive: criteria.case_sensitive,
        headers,
        query_parameters: criteria.query_parameters.clone(),
        runtime_fraction: None,
    }
}

fn build_route(
    group: &HttpMappingGroup,
    mapping: &Mapping,
    cluster_name: &str,
    mirrors: &[MirrorPolicyConfig],
    settings: &CompilerSettings,
) -> RouteRule {
    let target = RouteTarget {
        cluster: cluster_name.to_string(),
        timeout_ms: mapping
            .timeout_ms
            .unwrap_or(settings.cluster_defaults.request_timeout_ms),
        idle_timeout_ms: mapping.idle_timeout_ms,
        prefix_rewrite: mapping.prefix_rewrite.clone(),
        host_rewrite: mapping.host_rewrite.clone(),
        auto_host_rewrite: mapping.auto_host_rewrite,
        retry_policy: mapping.retry_policy.as_ref().map(|r| RetryPolicyConfig {
            retry_on: r.retry_on.clone(),
            num_retries: r.num_retries,
            per_try_timeout_ms: r.per_try_timeout_ms,
        }),
        mirror_policies: mirrors.to_vec(),
        cors: mapping.cors.as_ref().map(|c| CorsPolicyConfig {
            allow_origins: c.origins.clone(),
            allow_methods: c.methods.clone(),
            allow_headers: c.headers.clone(),
            expose_headers: c.expose_headers.clone(),
            max_age_seconds: c.max_age_seconds,
        }),
        rate_limit_labels: mapping.rate_limit_labels.clone(),
    };

    let mut r#match = build_match(group);
    r#match.runtime_fraction = mapping.cumulative_weight.map(|weight| RuntimeFractionConfig {
        numerator: weight,
        runtime_key: Some(format!("routing.traffic_shift.{}", cluster_name)),
    });

    RouteRule {
        name: Some(mapping.name.clone()),
        r#match,
        action: RouteActionConfig::Route(target),
        auth_bypass: false,
    }
}

fn build_host_redirect_route(
    group: &HttpMappingGroup,
    redirect: &crate::ir::HostRedirect,
) -> RouteRule {
    RouteRule {
        name: Some(group.name.clone()),
        r#match: build_match(group),
        action: RouteActionConfig::Redirect(RedirectTarget {
            https_redirect: false,
            host_redirect: Some(redirect.host.clone()),
            path_redirect: redirect.path_redirect.clone(),
            prefix_rewrite: redirect.prefix_redirect.clone(),
            response_code: redirect.response_code,
        }),
        auth_bypass: false,
    }
}

/// Synthesize clusters for L4 forwarding groups. Their routes are built by
/// the chain finalizer, but the backing clusters are shared, cached state
/// like any others.
pub fn register_tcp_clusters(
    snapshot: &IrSnapshot,
    settings: &CompilerSettings,
    cache: &mut ArtifactCache,
    registry: &mut ClusterRegistry,
) {
    for group_id in snapshot.tcp_groups_ordered() {
        let group = snapshot.tcp_group(group_id);
        if !group.weights_valid {
            continue;
        }

        let group_key = format!(
            "tcpgroup-{}",
            crate::cache::fingerprint(&[
                &group.name,
                &group.port.to_string(),
                group.host_glob.as_deref().unwrap_or("*"),
            ])
        );
        cache.add(group_key.clone(), Artifact::Group { name: group.name.clone() });

        for mapping in &group.mappings {
            cluster_for_mapping(mapping, &group_key, settings, cache, registry);
        }
    }
}
