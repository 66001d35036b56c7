//! Synthesized chains.
//!
//! A chain is a grouping of hosts (or one L4 forwarding rule) that will
//! share one physical filter chain in the output. Chain identity is
//! (encrypted?, SNI): hostname matching is only possible where SNI exists,
//! so an encrypted chain is fundamentally different from a cleartext one,
//! and every listener has at most one cleartext chain.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::diagnostics::DiagnosticSink;
use crate::ir::{Host, HostId, IrSnapshot, TcpGroupId, TcpMappingGroup};
use crate::xds::route::RouteRule;

/// Chain identity within one listener.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChainKey {
    Cleartext,
    /// Encrypted, keyed by SNI identity.
    Tls(String),
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKey::Cleartext => write!(f, "cleartext"),
            ChainKey::Tls(sni) => write!(f, "tls-{}", sni),
        }
    }
}

/// A TLS identity reference plus the namespace to resolve it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    pub tls_ref: String,
    pub namespace: String,
}

impl TlsIdentity {
    pub fn for_host(host: &Host) -> Option<Self> {
        host.tls_ref
            .as_ref()
            .map(|tls_ref| Self { tls_ref: tls_ref.clone(), namespace: host.namespace.clone() })
    }
}

/// One synthesized chain: TLS identity, occupants, and (for HTTP) the
/// per-domain route lists the route assigner fills in.
#[derive(Debug)]
pub struct Chain {
    pub key: ChainKey,
    pub tls: Option<TlsIdentity>,
    /// At most one L4 forwarding rule owns a chain.
    pub tcp_group: Option<TcpGroupId>,
    /// Participating hosts by hostname.
    pub hosts: BTreeMap<String, HostId>,
    /// SNI names to match when terminating TLS.
    pub server_names: BTreeSet<String>,
    /// Routes per virtual-host domain.
    pub routes: BTreeMap<String, Vec<RouteRule>>,
}

impl Chain {
    pub fn new(key: ChainKey, tls: Option<TlsIdentity>) -> Self {
        Self {
            key,
            tls,
            tcp_group: None,
            hosts: BTreeMap::new(),
            server_names: BTreeSet::new(),
            routes: BTreeMap::new(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.tls.is_some()
    }

    /// Claim this chain for an L4 forwarding rule. L4 rules are computed
    /// before hosts, so an occupied chain means a duplicate rule; the
    /// newcomer is discarded with a conflict error.
    pub fn add_tcp_group(
        &mut self,
        id: TcpGroupId,
        group: &TcpMappingGroup,
        snapshot: &IrSnapshot,
        sink: &DiagnosticSink,
    ) -> bool {
        if let Some(owner) = self.tcp_group {
            sink.post_error(
                group.resource_ref(),
                format!(
                    "discarding because it conflicts with TCPMapping {}",
                    snapshot.tcp_group(owner).name
                ),
            );
            return false;
        }

        if let Some((hostname, _)) = self.hosts.iter().next() {
            sink.post_error(
                group.resource_ref(),
                format!("discarding because it conflicts with Host {}", hostname),
            );
            return false;
        }

        let hostname = group.host_glob.as_deref().unwrap_or("*");
        if self.is_encrypted() {
            self.server_names.insert(hostname.to_string());
        }
        self.tcp_group = Some(id);

        tracing::debug!(chain = %self.key, group = %group.name, "chain: added TCP forwarding rule");
        true
    }

    /// Add a host to this chain. A chain owned by an L4 forwarding rule
    /// rejects hosts (the forwarding rule wins); hosts merging into one
    /// encrypted chain must share its TLS identity.
    pub fn add_host(
        &mut self,
        id: HostId,
        host: &Host,
        snapshot: &IrSnapshot,
        sink: &DiagnosticSink,
    ) -> bool {
        let kind = if self.is_encrypted() { "TLS Host" } else { "Cleartext Host" };

        if let Some(owner) = self.tcp_group {
            sink.post_error(
                host.resource_ref(),
                format!(
                    "{} {}: discarding because it conflicts with TCPMapping {}",
                    kind,
                    host.name,
                    snapshot.tcp_group(owner).name
                ),
            );
            return false;
        }

        if let Some(identity) = &self.tls {
            match TlsIdentity::for_host(host) {
                Some(host_identity) if host_identity == *identity => {}
                _ => {
                    sink.post_error(
                        host.resource_ref(),
                        format!(
                            "{} {}: discarding because of mismatched TLS identity on SNI {}",
                            kind,
                            host.name,
                            host.sni()
                        ),
                    );
                    return false;
                }
            }

            self.server_names.insert(host.sni().to_string());
        }

        self.routes.entry(host.hostname.clone()).or_default();
        self.hosts.insert(host.hostname.clone(), id);

        tracing::debug!(chain = %self.key, host = %host.hostname, "chain: added host");
        true
    }

    /// Hosts on this chain eligible for routes of the given group.
    pub fn matching_hosts(
        &self,
        snapshot: &IrSnapshot,
        group: &crate::ir::HttpMappingGroup,
    ) -> Vec<(String, HostId)> {
        self.hosts
            .iter()
            .filter(|(_, id)| snapshot.host(**id).matches_group(group))
            .map(|(hostname, id)| (hostname.clone(), *id))
            .collect()
    }

    /// Attach a route to one virtual-host domain.
    pub fn add_route(&mut self, domain: &str, route: RouteRule) {
        self.routes.entry(domain.to_string()).or_default().push(route);
    }

    /// Server names with the bare wildcard filtered out: "*" is not a
    /// legal SNI match, and its presence means the chain cannot match on
    /// server names at all.
    pub fn sni_match_names(&self) -> Vec<String> {
        if self.server_names.contains("*") {
            return Vec::new();
        }
        self.server_names.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Host, HostAction, IrSnapshotBuilder, Mapping, TcpMappingGroup,
    };

    fn snapshot_with_two_tcp_groups() -> (IrSnapshot, TcpGroupId, TcpGroupId) {
        let mut builder = IrSnapshotBuilder::new();
        let first = builder.add_tcp_group(TcpMappingGroup::new(
            "first",
            9000,
            vec![Mapping::to_service("m1", "db-a")],
        ));
        let second = builder.add_tcp_group(TcpMappingGroup::new(
            "second",
            9000,
            vec![Mapping::to_service("m2", "db-b")],
        ));
        (builder.build(), first, second)
    }

    #[test]
    fn test_second_tcp_group_conflicts() {
        let (snapshot, first, second) = snapshot_with_two_tcp_groups();
        let sink = DiagnosticSink::new();
        let mut chain = Chain::new(ChainKey::Cleartext, None);

        assert!(chain.add_tcp_group(first, snapshot.tcp_group(first), &snapshot, &sink));
        assert!(!chain.add_tcp_group(second, snapshot.tcp_group(second), &snapshot, &sink));

        assert_eq!(chain.tcp_group, Some(first));
        assert_eq!(sink.entries_for("tcpmappinggroup/second").len(), 1);
    }

    #[test]
    fn test_host_loses_to_tcp_group() {
        let (snapshot, first, _) = snapshot_with_two_tcp_groups();
        let sink = DiagnosticSink::new();
        let mut chain = Chain::new(ChainKey::Cleartext, None);
        chain.add_tcp_group(first, snapshot.tcp_group(first), &snapshot, &sink);

        let host = Host::wildcard();
        assert!(!chain.add_host(HostId(0), &host, &snapshot, &sink));
        assert!(chain.hosts.is_empty());
        assert_eq!(sink.entries_for("host/wildcard").len(), 1);
    }

    #[test]
    fn test_encrypted_chain_requires_matching_identity() {
        let (snapshot, _, _) = snapshot_with_two_tcp_groups();
        let sink = DiagnosticSink::new();
        let identity =
            TlsIdentity { tls_ref: "cert-a".to_string(), namespace: "default".to_string() };
        let mut chain =
            Chain::new(ChainKey::Tls("foo.example.com".to_string()), Some(identity));

        let good = Host::new("good", "foo.example.com")
            .with_tls("cert-a")
            .with_actions(Some(HostAction::Route), None);
        assert!(chain.add_host(HostId(0), &good, &snapshot, &sink));
        assert!(chain.server_names.contains("foo.example.com"));

        let bad = Host::new("bad", "foo.example.com")
            .with_tls("cert-b")
            .with_actions(Some(HostAction::Route), None);
        assert!(!chain.add_host(HostId(1), &bad, &snapshot, &sink));
        assert_eq!(sink.entries_for("host/bad").len(), 1);
    }

    #[test]
    fn test_sni_match_names_drops_wildcard() {
        let mut chain = Chain::new(ChainKey::Tls("*".to_string()), None);
        chain.server_names.insert("*".to_string());
        chain.server_names.insert("foo.example.com".to_string());

        assert!(chain.sni_match_names().is_empty());

        chain.server_names.remove("*");
        assert_eq!(chain.sni_match_names(), vec!["foo.example.com"]);
    }
}
