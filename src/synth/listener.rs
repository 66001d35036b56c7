//! Per-listener synthesis.
//!
//! One synthesizer instance handles one IR listener: it matches L4
//! forwarding rules and virtual hosts into chains, fills the HTTP chains
//! with route variants, and finalizes everything into the listener's
//! physical filter chains. Chains are deduplicated in exactly one place,
//! [`ListenerSynthesizer::get_or_create_chain`]; no other code constructs
//! a chain.

use std::collections::BTreeMap;

use crate::config::settings::CHALLENGE_PATH_PREFIX;
use crate::config::CompilerSettings;
use crate::diagnostics::DiagnosticSink;
use crate::ir::{
    HostAction, IrSnapshot, Listener, ListenerId, ProtocolLayer, SecurityModel, SocketProtocol,
};
use crate::secrets::SecretResolver;
use crate::synth::chain::{Chain, ChainKey, TlsIdentity};
use crate::synth::variants::{Matcher, RouteVariants, VariantAction};
use crate::xds::cluster::envoy_cluster_name;
use crate::xds::listener::{
    FilterChainConfig, FilterChainMatchConfig, FilterStackConfig, HeaderValueConfig,
    HttpRouterConfig, L4ForwardingConfig, ListenerConfig, ListenerFilterKind, TransportMatch,
    VirtualHostConfig, WeightedForwardTarget,
};
use crate::xds::route::{
    PathMatch, RouteActionConfig, RouteMatchConfig, RouteRule, RouteTarget,
};
use crate::xds::tls::TlsContextConfig;

pub struct ListenerSynthesizer<'a> {
    snapshot: &'a IrSnapshot,
    settings: &'a CompilerSettings,
    sink: &'a DiagnosticSink,
    listener_id: ListenerId,
    chains: BTreeMap<ChainKey, Chain>,
}

impl<'a> ListenerSynthesizer<'a> {
    pub fn new(
        snapshot: &'a IrSnapshot,
        settings: &'a CompilerSettings,
        sink: &'a DiagnosticSink,
        listener_id: ListenerId,
    ) -> Self {
        Self { snapshot, settings, sink, listener_id, chains: BTreeMap::new() }
    }

    fn listener(&self) -> &'a Listener {
        self.snapshot.listener(self.listener_id)
    }

    /// Run the full per-listener pipeline. Returns `None` when the
    /// listener ends up with no filter chains (with a diagnostic) or a
    /// structural error aborted it.
    pub fn synthesize(
        &mut self,
        routes: &mut [RouteVariants],
        secrets: &dyn SecretResolver,
    ) -> Option<ListenerConfig> {
        let listener = self.listener();
        tracing::debug!(
            listener = %listener.name,
            bind = %listener.bind_id(),
            security_model = ?listener.security_model,
            "synthesizing listener"
        );

        // L4 forwarding rules claim chains before hosts do; on a shared
        // physical binding the forwarding rule wins and the host is the
        // one excluded.
        self.compute_tcp_chains();

        if listener.is_http() {
            self.compute_http_chains();
            if self.compute_http_routes(routes).is_err() {
                return None;
            }
        }

        let filter_chains = self.finalize(secrets);
        if filter_chains.is_empty() {
            self.sink.post_error(
                listener.resource_ref(),
                "no matching hosts or TCP forwarding rules found, disabling",
            );
            return None;
        }

        Some(ListenerConfig {
            name: listener.name.clone(),
            address: listener.bind_address.clone(),
            port: u32::from(listener.port),
            socket_protocol: listener.socket_protocol,
            listener_filters: self.listener_filters(),
            filter_chains,
        })
    }

    /// The single chain dedup point: two calls with the same keying
    /// arguments return the same chain.
    ///
    /// Cleartext chains key only on "cleartext" (hostname matching is not
    /// possible without SNI, so every hostname collapses together and
    /// domains are differentiated at finalization). Encrypted chains key
    /// on the SNI identity; `hostname` is bookkeeping only.
    fn get_or_create_chain(
        &mut self,
        tls: Option<TlsIdentity>,
        hostname: &str,
        sni: &str,
    ) -> &mut Chain {
        let key = match tls {
            Some(_) => ChainKey::Tls(sni.to_string()),
            None => ChainKey::Cleartext,
        };

        if self.chains.contains_key(&key) {
            tracing::debug!(chain = %key, host = %hostname, "chain reused");
        } else {
            tracing::debug!(chain = %key, host = %hostname, "chain created");
        }

        self.chains.entry(key.clone()).or_insert_with(|| Chain::new(key, tls))
    }

    fn compute_tcp_chains(&mut self) {
        let snapshot = self.snapshot;
        let sink = self.sink;
        let listener = self.listener();

        if !listener.protocol_stack.contains(&ProtocolLayer::Tcp) {
            return;
        }

        for group_id in snapshot.tcp_groups_ordered() {
            let group = snapshot.tcp_group(group_id);

            if group.bind_id(&self.settings.default_bind_address) != listener.bind_id() {
                continue;
            }
            if !group.weights_valid {
                // Rejected by the weight normalizer; error already posted.
                continue;
            }

            match &group.host_glob {
                None => {
                    // No hostname means an unconditional forward: the
                    // wildcard cleartext chain.
                    self.get_or_create_chain(None, "*", "*")
                        .add_tcp_group(group_id, group, snapshot, sink);
                }
                Some(glob) => {
                    // Hostname matching cannot happen without SNI, so a
                    // TLS identity is mandatory here.
                    match self.resolve_tcp_tls_identity(glob, group_id) {
                        Some(identity) => {
                            self.get_or_create_chain(Some(identity), glob, glob)
                                .add_tcp_group(group_id, group, snapshot, sink);
                        }
                        None => {
                            sink.post_error(
                                group.resource_ref(),
                                "no matching TLS identity found, disabling",
                            );
                        }
                    }
                }
            }
        }
    }

    /// Resolve the TLS identity an SNI-selected forwarding rule
    /// terminates with: virtual-host identities by hostname glob first,
    /// then declared TLS bindings by exact hostname, then the rule's own
    /// directly-declared identity.
    fn resolve_tcp_tls_identity(
        &self,
        glob: &str,
        group_id: crate::ir::TcpGroupId,
    ) -> Option<TlsIdentity> {
        let snapshot = self.snapshot;

        for host_id in snapshot.hosts_by_hostname() {
            let host = snapshot.host(host_id);
            if host.tls_ref.is_some() && crate::utils::hostglob_matches(&host.hostname, glob) {
                return TlsIdentity::for_host(host);
            }
        }

        for binding in snapshot.tls_bindings() {
            if binding.hostnames.iter().any(|hostname| hostname == glob) {
                return Some(TlsIdentity {
                    tls_ref: binding.name.clone(),
                    namespace: binding.namespace.clone(),
                });
            }
        }

        let group = snapshot.tcp_group(group_id);
        group.tls_ref.as_ref().map(|tls_ref| TlsIdentity {
            tls_ref: tls_ref.clone(),
            namespace: group.namespace.clone(),
        })
    }

    fn compute_http_chains(&mut self) {
        let snapshot = self.snapshot;
        let sink = self.sink;
        let listener = self.listener();

        for host_id in snapshot.hosts_by_hostname() {
            let host = snapshot.host(host_id);

            if !listener.matches_host(host) {
                tracing::debug!(host = %host.hostname, "reject: binding rule mismatch");
                continue;
            }

            // A listener synthesized solely for alternate insecure ports
            // only takes the hosts that asked for this port.
            if listener.insecure_only && host.insecure_addl_port != Some(listener.port) {
                tracing::debug!(host = %host.hostname, "reject: insecure-only port mismatch");
                continue;
            }

            // Encrypted chain: needs TLS on the listener and an identity
            // on the host; pointless when a SECURE-only listener would
            // reject everything the chain could produce.
            let rejects_secure =
                host.secure_action.is_none() || host.secure_action == Some(HostAction::Reject);
            if listener.tls_ok()
                && !(listener.security_model == SecurityModel::Secure && rejects_secure)
            {
                if let Some(identity) = TlsIdentity::for_host(host) {
                    self.get_or_create_chain(Some(identity), &host.hostname, host.sni())
                        .add_host(host_id, host, snapshot, sink);
                }
            }

            // Cleartext chain: only skipped when an INSECURE-only listener
            // meets an insecure-Reject host. A host can legally sit on
            // both chains; route matchers disambiguate per request.
            if !(listener.security_model == SecurityModel::Insecure
                && host.insecure_action == Some(HostAction::Reject))
            {
                let sni = host.sni().to_string();
                self.get_or_create_chain(None, &host.hostname, &sni)
                    .add_host(host_id, host, snapshot, sink);
            }
        }
    }

    fn compute_http_routes(&mut self, routes: &mut [RouteVariants]) -> Result<(), ()> {
        let snapshot = self.snapshot;
        let listener = self.listener();
        let security_model = listener.security_model;

        let chain_keys: Vec<ChainKey> = self.chains.keys().cloned().collect();

        for chain_key in chain_keys {
            let Some(chain) = self.chains.get(&chain_key) else { continue };
            if chain.hosts.is_empty() {
                continue;
            }

            let mut additions: Vec<(String, RouteRule)> = Vec::new();
            let mut found_challenge = false;

            for rv in routes.iter_mut() {
                let group = snapshot.http_group(rv.group);
                let matching_hosts = chain.matching_hosts(snapshot, group);

                if matching_hosts.is_empty() {
                    continue;
                }

                let is_challenge =
                    group.criteria.path.as_prefix() == Some(CHALLENGE_PATH_PREFIX);

                for (hostname, host_id) in matching_hosts {
                    let host = snapshot.host(host_id);

                    // Up to two candidates per host: the secure world and
                    // the insecure world.
                    let mut candidates: Vec<(Matcher, HostAction)> = Vec::new();

                    if host.secure_action.is_some()
                        && security_model != SecurityModel::Insecure
                    {
                        let matcher = if security_model == SecurityModel::Secure {
                            Matcher::Always
                        } else {
                            Matcher::XfpHttps
                        };
                        candidates.push((matcher, HostAction::Route));
                    }

                    if let Some(insecure_action) = host.insecure_action {
                        if security_model != SecurityModel::Secure {
                            let matcher = if security_model == SecurityModel::Insecure {
                                Matcher::Always
                            } else {
                                Matcher::XfpHttp
                            };
                            candidates.push((matcher, insecure_action));
                        }
                    }

                    for (mut matcher, mut action) in candidates {
                        if is_challenge {
                            // Challenge traffic must always route, no
                            // matter what the surrounding policy says.
                            matcher = Matcher::Always;
                            action = HostAction::Route;
                            found_challenge = true;
                        }

                        let variant_action = match action {
                            HostAction::Route => VariantAction::Route,
                            HostAction::Redirect => VariantAction::Redirect,
                            HostAction::Reject => {
                                tracing::debug!(
                                    chain = %chain_key,
                                    host = %hostname,
                                    "route candidate rejected"
                                );
                                continue;
                            }
                        };

                        let variant = rv
                            .get_variant(
                                matcher,
                                variant_action,
                                self.settings.challenge.redirect_bypasses_auth,
                            )
                            .clone();
                        additions.push((hostname.clone(), variant));
                    }
                }
            }

            let synthesized_challenge = if self.settings.challenge.force_routes
                && !found_challenge
            {
                match &self.settings.challenge.fallback_cluster {
                    Some(cluster) => Some(self.challenge_route(cluster)),
                    None => {
                        // A shared collaborator the deployment promised is
                        // missing; this listener cannot be synthesized.
                        self.sink.post_fatal(
                            listener.resource_ref(),
                            "challenge fallback cluster is not configured, disabling listener",
                        );
                        return Err(());
                    }
                }
            } else {
                None
            };

            let Some(chain) = self.chains.get_mut(&chain_key) else { continue };
            for (domain, route) in additions {
                chain.add_route(&domain, route);
            }
            if let Some(challenge) = synthesized_challenge {
                // Every domain of the chain gets the unconditional
                // challenge route, ahead of everything else.
                for routes in chain.routes.values_mut() {
                    routes.insert(0, challenge.clone());
                }
            }
        }

        Ok(())
    }

    /// The synthesized unconditional certificate-challenge route.
    fn challenge_route(&self, cluster: &str) -> RouteRule {
        let mut target =
            RouteTarget::to_cluster(cluster, self.settings.cluster_defaults.request_timeout_ms);
        target.prefix_rewrite = Some(CHALLENGE_PATH_PREFIX.to_string());

        RouteRule {
            name: None,
            r#match: RouteMatchConfig {
                path: PathMatch::Prefix(CHALLENGE_PATH_PREFIX.to_string()),
                case_sensitive: true,
                headers: Vec::new(),
                query_parameters: Vec::new(),
                runtime_fraction: None,
            },
            action: RouteActionConfig::Route(target),
            auth_bypass: false,
        }
    }

    fn finalize(&self, secrets: &dyn SecretResolver) -> Vec<FilterChainConfig> {
        let mut filter_chains = Vec::new();

        for chain in self.chains.values() {
            if chain.tcp_group.is_some() {
                if let Some(fc) = self.finalize_tcp_chain(chain, secrets) {
                    filter_chains.push(fc);
                }
            }
        }

        if self.listener().is_http() {
            for chain in self.chains.values() {
                if chain.tcp_group.is_none() && !chain.hosts.is_empty() {
                    if let Some(fc) = self.finalize_http_chain(chain, secrets) {
                        filter_chains.push(fc);
                    }
                }
            }
        }

        filter_chains
    }

    fn finalize_tcp_chain(
        &self,
        chain: &Chain,
        secrets: &dyn SecretResolver,
    ) -> Option<FilterChainConfig> {
        let snapshot = self.snapshot;
        let listener = self.listener();
        let group = snapshot.tcp_group(chain.tcp_group?);

        let mut r#match = FilterChainMatchConfig::default();
        let mut tls_config = None;

        if let Some(identity) = &chain.tls {
            r#match.transport = Some(TransportMatch::Tls);
            match secrets.resolve(&identity.tls_ref, &identity.namespace) {
                Some(material) => tls_config = Some(TlsContextConfig::from_material(&material)),
                None => {
                    self.sink.post_error(
                        group.resource_ref(),
                        format!(
                            "TLS identity {} not found in namespace {}, disabling",
                            identity.tls_ref, identity.namespace
                        ),
                    );
                    return None;
                }
            }
        }

        r#match.server_names = chain.sni_match_names();

        let clusters: Vec<WeightedForwardTarget> = group
            .mappings
            .iter()
            .map(|mapping| WeightedForwardTarget {
                name: envoy_cluster_name(&mapping.service),
                weight: mapping.cumulative_weight.unwrap_or(100),
            })
            .collect();

        Some(FilterChainConfig {
            name: format!("tcphost-{}", group.name),
            r#match,
            tls: tls_config,
            filters: FilterStackConfig::L4Forward(L4ForwardingConfig {
                stat_prefix: listener.stats_prefix.clone(),
                clusters,
            }),
        })
    }

    fn finalize_http_chain(
        &self,
        chain: &Chain,
        secrets: &dyn SecretResolver,
    ) -> Option<FilterChainConfig> {
        let snapshot = self.snapshot;
        let listener = self.listener();
        let quic = listener.socket_protocol == SocketProtocol::Udp && listener.alt_transport;

        let mut r#match = FilterChainMatchConfig::default();
        let mut tls_config = None;
        let name;

        match &chain.tls {
            None => {
                // The upgraded datagram protocol has TLS built in; its
                // listener serves no cleartext chain at all.
                if quic {
                    return None;
                }
                name = "httphost-shared".to_string();
            }
            Some(identity) => {
                r#match.server_names = chain.sni_match_names();
                r#match.transport =
                    Some(if quic { TransportMatch::Quic } else { TransportMatch::Tls });

                match secrets.resolve(&identity.tls_ref, &identity.namespace) {
                    Some(material) => {
                        tls_config = Some(TlsContextConfig::from_material(&material))
                    }
                    None => {
                        let resource = chain
                            .hosts
                            .values()
                            .next()
                            .map(|id| snapshot.host(*id).resource_ref())
                            .unwrap_or_else(|| listener.resource_ref());
                        self.sink.post_error(
                            resource,
                            format!(
                                "TLS identity {} not found in namespace {}, disabling",
                                identity.tls_ref, identity.namespace
                            ),
                        );
                        return None;
                    }
                }

                let first_host = chain
                    .hosts
                    .values()
                    .next()
                    .map(|id| snapshot.host(*id).name.clone())
                    .unwrap_or_default();
                name = format!("httpshost-{}", first_host);
            }
        }

        // A paired datagram listener at the same port advertises the
        // upgraded protocol through a response header on the stream side.
        let inject_advertisement =
            listener.alt_transport && listener.socket_protocol == SocketProtocol::Tcp;

        let virtual_hosts: Vec<VirtualHostConfig> = chain
            .hosts
            .keys()
            .map(|hostname| VirtualHostConfig {
                name: format!("{}-{}", listener.name, hostname),
                domains: vec![hostname.clone()],
                response_headers_to_add: if inject_advertisement {
                    vec![HeaderValueConfig {
                        key: "alt-svc".to_string(),
                        value: self.settings.alt_transport.advertisement.clone(),
                    }]
                } else {
                    Vec::new()
                },
                routes: chain.routes.get(hostname).cloned().unwrap_or_default(),
            })
            .collect();

        Some(FilterChainConfig {
            name,
            r#match,
            tls: tls_config,
            filters: FilterStackConfig::HttpRouter(HttpRouterConfig {
                stat_prefix: listener.stats_prefix.clone(),
                route_config_name: format!("{}-{}", listener.name, chain.key),
                virtual_hosts,
                http3: quic,
            }),
        })
    }

    fn listener_filters(&self) -> Vec<ListenerFilterKind> {
        let listener = self.listener();
        let mut filters = Vec::new();

        for layer in &listener.protocol_stack {
            match layer {
                ProtocolLayer::Proxy => filters.push(ListenerFilterKind::ProxyProtocol),
                // QUIC carries TLS in-protocol; the inspector is only for
                // stream listeners.
                ProtocolLayer::Tls if listener.socket_protocol == SocketProtocol::Tcp => {
                    filters.push(ListenerFilterKind::TlsInspector)
                }
                _ => {}
            }
        }

        filters
    }
}
