//! End-to-end synthesis tests: whole IR snapshots through `compile`,
//! asserting on the logical output configuration.

use gatewright::cache::ArtifactCache;
use gatewright::config::settings::CHALLENGE_PATH_PREFIX;
use gatewright::config::CompilerSettings;
use gatewright::diagnostics::DiagnosticSink;
use gatewright::ir::{
    Host, HostAction, HttpMappingGroup, IrSnapshot, IrSnapshotBuilder, Listener, Mapping,
    MatchCriteria, SecurityModel, TcpMappingGroup,
};
use gatewright::secrets::{CertificateMaterial, MemorySecretResolver, NullSecretResolver};
use gatewright::synth::compile;
use gatewright::xds::route::{
    HeaderValueMatch, PathMatch, RouteActionConfig, RouteRule, FORWARDED_PROTO_HEADER,
};
use gatewright::xds::{FilterStackConfig, HttpRouterConfig, ListenerConfig, TransportMatch};

fn http_router(listener: &ListenerConfig, chain_name: &str) -> HttpRouterConfig {
    let chain = listener
        .filter_chains
        .iter()
        .find(|fc| fc.name == chain_name)
        .unwrap_or_else(|| panic!("chain {} missing", chain_name));
    match &chain.filters {
        FilterStackConfig::HttpRouter(http) => http.clone(),
        FilterStackConfig::L4Forward(_) => panic!("chain {} is not HTTP", chain_name),
    }
}

fn has_xfp_exact(route: &RouteRule, value: &str) -> bool {
    route.r#match.headers.iter().any(|h| {
        h.name == FORWARDED_PROTO_HEADER
            && h.value == HeaderValueMatch::Exact(value.to_string())
    })
}

fn has_no_xfp(route: &RouteRule) -> bool {
    route.r#match.headers.iter().all(|h| h.name != FORWARDED_PROTO_HEADER)
}

/// Scenario A: a wildcard cleartext host with a single unweighted member.
#[test]
fn wildcard_insecure_listener_yields_one_cleartext_chain() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::http("0.0.0.0", 8080));
    builder.add_host(Host::wildcard());
    builder.add_http_group(HttpMappingGroup::new(
        "foo",
        MatchCriteria::prefix("/foo/"),
        vec![Mapping::to_service("foo", "foo-backend:8080")],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();

    let compiled = compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
        .expect("compile");

    assert!(sink.is_empty());
    assert_eq!(compiled.listeners.len(), 1);
    assert_eq!(compiled.listeners[0].filter_chains.len(), 1);

    let http = http_router(&compiled.listeners[0], "httphost-shared");
    assert_eq!(http.virtual_hosts.len(), 1);
    assert_eq!(http.virtual_hosts[0].domains, vec!["*"]);

    let routes = &http.virtual_hosts[0].routes;
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].r#match.path, PathMatch::Prefix("/foo/".to_string()));
    assert_eq!(
        routes[0].r#match.runtime_fraction.as_ref().expect("fraction").numerator,
        100
    );
    match &routes[0].action {
        RouteActionConfig::Route(target) => {
            assert_eq!(target.cluster, "cluster_foo-backend_8080")
        }
        other => panic!("unexpected action: {:?}", other),
    }

    assert_eq!(compiled.clusters.len(), 1);
    assert_eq!(compiled.clusters[0].name, "cluster_foo-backend_8080");
}

/// Scenario B: explicit 30 plus an unset member normalizes to [30, 100].
#[test]
fn weighted_group_emits_cumulative_fractions() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::http("0.0.0.0", 8080));
    builder.add_host(Host::wildcard());
    builder.add_http_group(HttpMappingGroup::new(
        "split",
        MatchCriteria::prefix("/split/"),
        vec![
            Mapping::to_service("canary", "canary:8080").with_weight(30),
            Mapping::to_service("stable", "stable:8080"),
        ],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();

    let compiled = compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
        .expect("compile");

    let http = http_router(&compiled.listeners[0], "httphost-shared");
    let fractions: Vec<u32> = http.virtual_hosts[0]
        .routes
        .iter()
        .map(|r| r.r#match.runtime_fraction.as_ref().expect("fraction").numerator)
        .collect();
    assert_eq!(fractions, [30, 100]);
}

/// Scenario C: a TLS host with secure Route / insecure Redirect on an
/// XFP-disambiguated listener.
#[test]
fn xfp_listener_produces_secure_and_redirect_variants() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::https("0.0.0.0", 8443));
    builder.add_host(
        Host::new("web", "foo.com")
            .with_tls("foo-cert")
            .with_actions(Some(HostAction::Route), Some(HostAction::Redirect)),
    );
    builder.add_http_group(HttpMappingGroup::new(
        "app",
        MatchCriteria::prefix("/app/"),
        vec![Mapping::to_service("app", "app:8080")],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();
    let mut secrets = MemorySecretResolver::new();
    secrets.insert("default", "foo-cert", CertificateMaterial::new("CHAIN", "KEY"));

    let compiled =
        compile(&mut snapshot, &settings, &mut cache, &secrets, &sink).expect("compile");

    assert!(sink.is_empty());
    let listener = &compiled.listeners[0];
    assert_eq!(listener.filter_chains.len(), 2);

    // Encrypted chain: keyed by SNI, TLS transport, secure variant routes.
    let encrypted = listener
        .filter_chains
        .iter()
        .find(|fc| fc.name == "httpshost-web")
        .expect("encrypted chain");
    assert_eq!(encrypted.r#match.server_names, vec!["foo.com"]);
    assert_eq!(encrypted.r#match.transport, Some(TransportMatch::Tls));
    assert!(encrypted.tls.is_some());

    let encrypted_http = http_router(listener, "httpshost-web");
    let encrypted_routes = &encrypted_http.virtual_hosts[0].routes;
    assert!(encrypted_routes.iter().any(|r| {
        has_xfp_exact(r, "https") && matches!(r.action, RouteActionConfig::Route(_))
    }));

    // Cleartext chain: the insecure world redirects to secure.
    let cleartext_http = http_router(listener, "httphost-shared");
    let cleartext_routes = &cleartext_http.virtual_hosts[0].routes;
    assert!(cleartext_routes.iter().any(|r| {
        has_no_xfp(r)
            && matches!(
                &r.action,
                RouteActionConfig::Redirect(redirect) if redirect.https_redirect
            )
    }));
}

/// Scenario D: two L4 forwarding rules on one bind identity; the second
/// is excluded with a conflict error and the first is unaffected.
#[test]
fn conflicting_tcp_groups_keep_first_post_error_on_second() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::tls_tcp("0.0.0.0", 9443));

    let mut first = TcpMappingGroup::new(
        "a-first",
        9443,
        vec![Mapping::to_service("m1", "db-primary:5432")],
    )
    .with_host_glob("db.example.com");
    first.tls_ref = Some("db-cert".to_string());
    builder.add_tcp_group(first);

    let mut second = TcpMappingGroup::new(
        "b-second",
        9443,
        vec![Mapping::to_service("m2", "db-other:5432")],
    )
    .with_host_glob("db.example.com");
    second.tls_ref = Some("db-cert".to_string());
    builder.add_tcp_group(second);

    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();
    let mut secrets = MemorySecretResolver::new();
    secrets.insert("default", "db-cert", CertificateMaterial::new("CHAIN", "KEY"));

    let compiled =
        compile(&mut snapshot, &settings, &mut cache, &secrets, &sink).expect("compile");

    assert_eq!(sink.entries_for("tcpmappinggroup/b-second").len(), 1);
    assert!(sink.entries_for("tcpmappinggroup/a-first").is_empty());

    let listener = &compiled.listeners[0];
    assert_eq!(listener.filter_chains.len(), 1);
    assert_eq!(listener.filter_chains[0].name, "tcphost-a-first");

    match &listener.filter_chains[0].filters {
        FilterStackConfig::L4Forward(l4) => {
            assert_eq!(l4.clusters.len(), 1);
            assert_eq!(l4.clusters[0].name, "cluster_db-primary_5432");
            assert_eq!(l4.clusters[0].weight, 100);
        }
        other => panic!("unexpected filter stack: {:?}", other),
    }
}

/// Scenario E: challenge traffic routes unconditionally on a listener
/// whose host rejects insecure traffic by default.
#[test]
fn challenge_route_survives_reject_by_default_policy() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(
        Listener::https("0.0.0.0", 8443).with_security_model(SecurityModel::Secure),
    );
    builder.add_host(
        Host::new("strict", "foo.com")
            .with_tls("foo-cert")
            .with_actions(Some(HostAction::Route), Some(HostAction::Reject)),
    );
    builder.add_http_group(HttpMappingGroup::new(
        "challenge",
        MatchCriteria::prefix(CHALLENGE_PATH_PREFIX),
        vec![Mapping::to_service("challenge", "challenge-receiver:8080")],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();
    let mut secrets = MemorySecretResolver::new();
    secrets.insert("default", "foo-cert", CertificateMaterial::new("CHAIN", "KEY"));

    let compiled =
        compile(&mut snapshot, &settings, &mut cache, &secrets, &sink).expect("compile");

    let listener = &compiled.listeners[0];
    assert_eq!(listener.filter_chains.len(), 2);

    for fc in &listener.filter_chains {
        let FilterStackConfig::HttpRouter(http) = &fc.filters else {
            panic!("expected HTTP chain");
        };
        let challenge: Vec<&RouteRule> = http.virtual_hosts[0]
            .routes
            .iter()
            .filter(|r| {
                r.r#match.path == PathMatch::Prefix(CHALLENGE_PATH_PREFIX.to_string())
            })
            .collect();
        assert!(!challenge.is_empty(), "chain {} lost the challenge route", fc.name);
        for route in challenge {
            assert!(has_no_xfp(route), "challenge route must match unconditionally");
            assert!(matches!(route.action, RouteActionConfig::Route(_)));
        }
    }
}

fn multi_feature_snapshot() -> IrSnapshot {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::https("0.0.0.0", 8443));
    builder.add_listener(Listener::http("0.0.0.0", 8080));
    builder.add_host(Host::wildcard());
    builder.add_host(
        Host::new("web", "foo.com")
            .with_tls("foo-cert")
            .with_actions(Some(HostAction::Route), Some(HostAction::Redirect)),
    );
    builder.add_http_group(HttpMappingGroup::new(
        "api",
        MatchCriteria::prefix("/api/").with_host_glob("foo.com"),
        vec![
            Mapping::to_service("api-canary", "api-canary:8080").with_weight(25),
            Mapping::to_service("api", "api:8080"),
        ],
    ));
    builder.add_http_group(HttpMappingGroup::new(
        "root",
        MatchCriteria::prefix("/"),
        vec![Mapping::to_service("root", "root:8080")],
    ));
    builder.add_tcp_group(TcpMappingGroup::new(
        "db",
        9443,
        vec![Mapping::to_service("db", "db:5432")],
    ));
    builder.add_listener(Listener::tcp("0.0.0.0", 9443));
    builder.build()
}

fn resolver() -> MemorySecretResolver {
    let mut secrets = MemorySecretResolver::new();
    secrets.insert("default", "foo-cert", CertificateMaterial::new("CHAIN", "KEY"));
    secrets
}

/// Re-running synthesis over an unchanged snapshot produces byte-identical
/// output, both with a shared cache (hits) and a cold cache.
#[test]
fn recompilation_is_byte_identical() {
    let settings = CompilerSettings::default();
    let secrets = resolver();

    let mut shared_cache = ArtifactCache::new();

    let mut first_snapshot = multi_feature_snapshot();
    let first_sink = DiagnosticSink::new();
    let first = compile(
        &mut first_snapshot,
        &settings,
        &mut shared_cache,
        &secrets,
        &first_sink,
    )
    .expect("first compile");
    let misses_after_first = shared_cache.stats().misses;

    // Warm cache: same snapshot content again.
    let mut second_snapshot = multi_feature_snapshot();
    let second_sink = DiagnosticSink::new();
    let second = compile(
        &mut second_snapshot,
        &settings,
        &mut shared_cache,
        &secrets,
        &second_sink,
    )
    .expect("second compile");

    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(
        shared_cache.stats().misses,
        misses_after_first,
        "warm recompilation must not resynthesize cached artifacts"
    );

    // Cold cache: still byte-identical.
    let mut cold_cache = ArtifactCache::new();
    let mut third_snapshot = multi_feature_snapshot();
    let third_sink = DiagnosticSink::new();
    let third = compile(
        &mut third_snapshot,
        &settings,
        &mut cold_cache,
        &secrets,
        &third_sink,
    )
    .expect("third compile");

    assert_eq!(first.to_json().unwrap(), third.to_json().unwrap());
}

/// A listener that admits nothing is dropped from output with a
/// diagnostic, not a crash.
#[test]
fn empty_listener_is_dropped_with_diagnostic() {
    let mut builder = IrSnapshotBuilder::new();
    // The selector on this listener matches no host, so it admits nothing.
    let mut empty = Listener::http("0.0.0.0", 8080).with_name("empty-listener");
    empty
        .host_binding
        .host_selector
        .insert("exposure".to_string(), "internal".to_string());
    builder.add_listener(empty);
    builder.add_listener(Listener::http("0.0.0.0", 9090).with_name("live-listener"));
    builder.add_host(Host::wildcard());
    builder.add_http_group(HttpMappingGroup::new(
        "g",
        MatchCriteria::prefix("/"),
        vec![Mapping::to_service("m", "svc:80")],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();

    let compiled = compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
        .expect("compile");

    assert_eq!(compiled.listeners.len(), 1);
    assert_eq!(compiled.listeners[0].name, "live-listener");
    assert_eq!(sink.entries_for("listener/empty-listener").len(), 1);
}

/// Rejected weight groups yield zero clusters and exactly one error while
/// the rest of the snapshot compiles normally.
#[test]
fn invalid_weights_exclude_group_only() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::http("0.0.0.0", 8080));
    builder.add_host(Host::wildcard());
    builder.add_http_group(HttpMappingGroup::new(
        "broken",
        MatchCriteria::prefix("/broken/"),
        vec![
            Mapping::to_service("a", "a-svc:80").with_weight(90),
            Mapping::to_service("b", "b-svc:80").with_weight(90),
        ],
    ));
    builder.add_http_group(HttpMappingGroup::new(
        "fine",
        MatchCriteria::prefix("/fine/"),
        vec![Mapping::to_service("c", "c-svc:80")],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();

    let compiled = compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
        .expect("compile");

    assert_eq!(sink.entries_for("mappinggroup/broken").len(), 1);
    assert_eq!(compiled.clusters.len(), 1);
    assert_eq!(compiled.clusters[0].name, "cluster_c-svc_80");

    let http = http_router(&compiled.listeners[0], "httphost-shared");
    assert_eq!(http.virtual_hosts[0].routes.len(), 1);
    assert_eq!(
        http.virtual_hosts[0].routes[0].r#match.path,
        PathMatch::Prefix("/fine/".to_string())
    );
}

/// Routes are emitted in descending (precedence, specificity) order.
#[test]
fn routes_are_ordered_by_precedence_and_specificity() {
    let mut builder = IrSnapshotBuilder::new();
    builder.add_listener(Listener::http("0.0.0.0", 8080));
    builder.add_host(Host::wildcard());
    builder.add_http_group(HttpMappingGroup::new(
        "root",
        MatchCriteria::prefix("/"),
        vec![Mapping::to_service("root", "root:80")],
    ));
    builder.add_http_group(HttpMappingGroup::new(
        "deep",
        MatchCriteria::prefix("/api/v1/users/"),
        vec![Mapping::to_service("users", "users:80")],
    ));
    builder.add_http_group(HttpMappingGroup::new(
        "override",
        MatchCriteria { precedence: 100, ..MatchCriteria::prefix("/low/") },
        vec![Mapping::to_service("override", "override:80")],
    ));
    let mut snapshot = builder.build();

    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();

    let compiled = compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
        .expect("compile");

    let http = http_router(&compiled.listeners[0], "httphost-shared");
    let paths: Vec<&PathMatch> =
        http.virtual_hosts[0].routes.iter().map(|r| &r.r#match.path).collect();

    assert_eq!(
        paths,
        vec![
            &PathMatch::Prefix("/low/".to_string()),
            &PathMatch::Prefix("/api/v1/users/".to_string()),
            &PathMatch::Prefix("/".to_string()),
        ]
    );
}

/// The full compiled output converts cleanly to envoy-types resources.
#[test]
fn compiled_output_converts_to_envoy_resources() {
    let settings = CompilerSettings::default();
    let mut cache = ArtifactCache::new();
    let sink = DiagnosticSink::new();
    let mut snapshot = multi_feature_snapshot();

    let compiled = compile(&mut snapshot, &settings, &mut cache, &resolver(), &sink)
        .expect("compile");

    let (listeners, clusters) = compiled.to_envoy().expect("envoy conversion");
    assert_eq!(listeners.len(), compiled.listeners.len());
    assert_eq!(clusters.len(), compiled.clusters.len());
    assert!(listeners.iter().all(|l| l.address.is_some()));
}
