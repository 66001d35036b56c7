//! # Intermediate Representation
//!
//! The validated routing IR the compiler consumes: listeners, virtual
//! hosts, HTTP route groups, L4 forwarding groups, and declared TLS
//! bindings. Entities live in an arena and reference each other through
//! stable integer IDs, so there are no reference cycles and the ownership
//! graph stays explicit.
//!
//! A snapshot is built once per upstream configuration change via
//! [`IrSnapshotBuilder`] and is immutable to the synthesis core, with one
//! exception: the weight normalizer assigns cumulative weights to group
//! members in place before chain building starts.

pub mod host;
pub mod listener;
pub mod mapping;
pub mod weights;

use serde::{Deserialize, Serialize};

pub use host::{Host, HostAction};
pub use listener::{
    HostBinding, Listener, NamespaceBinding, ProtocolLayer, SecurityModel, SocketProtocol,
};
pub use mapping::{
    CorsPolicy, HostRedirect, HttpMappingGroup, Mapping, MatchCriteria, RetryPolicy,
    TcpMappingGroup,
};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);
    };
}

arena_id!(
    /// Index of a [`Listener`] in its snapshot
    ListenerId
);
arena_id!(
    /// Index of a [`Host`] in its snapshot
    HostId
);
arena_id!(
    /// Index of an [`HttpMappingGroup`] in its snapshot
    HttpGroupId
);
arena_id!(
    /// Index of a [`TcpMappingGroup`] in its snapshot
    TcpGroupId
);

/// A directly-declared TLS identity binding: a named identity valid for an
/// exact set of hostnames. L4 forwarding rules that need SNI fall back to
/// these when no virtual host supplies an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsBinding {
    pub name: String,
    pub namespace: String,
    pub hostnames: Vec<String>,
}

/// One immutable IR snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IrSnapshot {
    listeners: Vec<Listener>,
    hosts: Vec<Host>,
    http_groups: Vec<HttpMappingGroup>,
    tcp_groups: Vec<TcpMappingGroup>,
    tls_bindings: Vec<TlsBinding>,
}

impl IrSnapshot {
    pub fn listener(&self, id: ListenerId) -> &Listener {
        &self.listeners[id.0 as usize]
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id.0 as usize]
    }

    pub fn http_group(&self, id: HttpGroupId) -> &HttpMappingGroup {
        &self.http_groups[id.0 as usize]
    }

    pub fn tcp_group(&self, id: TcpGroupId) -> &TcpMappingGroup {
        &self.tcp_groups[id.0 as usize]
    }

    pub(crate) fn http_group_mut(&mut self, id: HttpGroupId) -> &mut HttpMappingGroup {
        &mut self.http_groups[id.0 as usize]
    }

    pub(crate) fn tcp_group_mut(&mut self, id: TcpGroupId) -> &mut TcpMappingGroup {
        &mut self.tcp_groups[id.0 as usize]
    }

    pub fn tls_bindings(&self) -> &[TlsBinding] {
        &self.tls_bindings
    }

    /// Listener IDs in stable bind-identity order. Emission order is
    /// load-bearing for the data plane, so this is the only iteration
    /// order the compiler uses.
    pub fn listeners_ordered(&self) -> Vec<ListenerId> {
        let mut ids: Vec<ListenerId> =
            (0..self.listeners.len() as u32).map(ListenerId).collect();
        ids.sort_by(|a, b| {
            let (la, lb) = (self.listener(*a), self.listener(*b));
            la.bind_id().cmp(&lb.bind_id()).then_with(|| la.name.cmp(&lb.name))
        });
        ids
    }

    /// Host IDs sorted by hostname, then declaration name.
    pub fn hosts_by_hostname(&self) -> Vec<HostId> {
        let mut ids: Vec<HostId> = (0..self.hosts.len() as u32).map(HostId).collect();
        ids.sort_by(|a, b| {
            let (ha, hb) = (self.host(*a), self.host(*b));
            ha.hostname.cmp(&hb.hostname).then_with(|| ha.name.cmp(&hb.name))
        });
        ids
    }

    /// HTTP group IDs in route emission order: descending (precedence,
    /// specificity), tie-broken by the group fingerprint for determinism.
    pub fn http_groups_ordered(&self) -> Vec<HttpGroupId> {
        let mut ids: Vec<HttpGroupId> =
            (0..self.http_groups.len() as u32).map(HttpGroupId).collect();
        ids.sort_by(|a, b| {
            let (ga, gb) = (self.http_group(*a), self.http_group(*b));
            gb.sort_key().cmp(&ga.sort_key())
        });
        ids
    }

    /// TCP group IDs sorted by group name.
    pub fn tcp_groups_ordered(&self) -> Vec<TcpGroupId> {
        let mut ids: Vec<TcpGroupId> =
            (0..self.tcp_groups.len() as u32).map(TcpGroupId).collect();
        ids.sort_by(|a, b| self.tcp_group(*a).name.cmp(&self.tcp_group(*b).name));
        ids
    }

    pub fn http_group_count(&self) -> usize {
        self.http_groups.len()
    }

    pub fn tcp_group_count(&self) -> usize {
        self.tcp_groups.len()
    }
}

/// Builder for [`IrSnapshot`]. The upstream IR layer (or a test) adds
/// entities in any order; IDs are handed back immediately.
#[derive(Debug, Default)]
pub struct IrSnapshotBuilder {
    snapshot: IrSnapshot,
}

impl IrSnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Listener) -> ListenerId {
        self.snapshot.listeners.push(listener);
        ListenerId(self.snapshot.listeners.len() as u32 - 1)
    }

    pub fn add_host(&mut self, host: Host) -> HostId {
        self.snapshot.hosts.push(host);
        HostId(self.snapshot.hosts.len() as u32 - 1)
    }

    pub fn add_http_group(&mut self, group: HttpMappingGroup) -> HttpGroupId {
        self.snapshot.http_groups.push(group);
        HttpGroupId(self.snapshot.http_groups.len() as u32 - 1)
    }

    pub fn add_tcp_group(&mut self, group: TcpMappingGroup) -> TcpGroupId {
        self.snapshot.tcp_groups.push(group);
        TcpGroupId(self.snapshot.tcp_groups.len() as u32 - 1)
    }

    pub fn add_tls_binding(&mut self, binding: TlsBinding) {
        self.snapshot.tls_bindings.push(binding);
    }

    pub fn build(self) -> IrSnapshot {
        self.snapshot
    }
}
