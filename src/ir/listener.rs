//! Listener IR types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::host::Host;
use crate::utils::selector_matches;

/// Transport the listener binds: stream or datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketProtocol {
    Tcp,
    Udp,
}

impl SocketProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketProtocol::Tcp => "tcp",
            SocketProtocol::Udp => "udp",
        }
    }
}

/// One layer of a listener's protocol-capability stack, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolLayer {
    Tls,
    Http,
    Proxy,
    Tcp,
    Udp,
}

/// How the listener classifies incoming requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityModel {
    /// Every request on this listener is secure.
    Secure,
    /// Every request on this listener is insecure.
    Insecure,
    /// Secure vs insecure is decided per request from the
    /// forwarded-protocol header.
    Xfp,
}

/// Which namespace a listener accepts hosts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceBinding {
    /// Hosts from every namespace.
    All,
    /// Hosts from exactly this namespace.
    Literal(String),
}

/// Rule selecting which virtual hosts a listener may accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    pub namespace: NamespaceBinding,
    /// Label selector over host labels; empty accepts everything.
    pub host_selector: BTreeMap<String, String>,
}

impl Default for HostBinding {
    fn default() -> Self {
        Self { namespace: NamespaceBinding::All, host_selector: BTreeMap::new() }
    }
}

/// A bound network endpoint with its protocol capabilities and security
/// posture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub name: String,
    pub bind_address: String,
    pub port: u16,
    pub socket_protocol: SocketProtocol,
    pub protocol_stack: Vec<ProtocolLayer>,
    pub security_model: SecurityModel,
    pub host_binding: HostBinding,
    /// Synthesized solely to serve hosts' alternate insecure ports; only
    /// hosts whose alternate port equals this listener's port may join.
    pub insecure_only: bool,
    /// A paired datagram listener serves an upgraded protocol at the same
    /// port; stream chains advertise it via a response header.
    pub alt_transport: bool,
    pub stats_prefix: String,
}

impl Listener {
    /// Cleartext HTTP listener (stack HTTP over TCP).
    pub fn http<S: Into<String>>(bind_address: S, port: u16) -> Self {
        Self::new(
            bind_address,
            port,
            SocketProtocol::Tcp,
            vec![ProtocolLayer::Http, ProtocolLayer::Tcp],
            SecurityModel::Insecure,
        )
    }

    /// TLS-terminating HTTP listener (stack TLS/HTTP over TCP),
    /// XFP-disambiguated: the common both-actions-one-port deployment.
    pub fn https<S: Into<String>>(bind_address: S, port: u16) -> Self {
        Self::new(
            bind_address,
            port,
            SocketProtocol::Tcp,
            vec![ProtocolLayer::Tls, ProtocolLayer::Http, ProtocolLayer::Tcp],
            SecurityModel::Xfp,
        )
    }

    /// Raw TCP forwarding listener.
    pub fn tcp<S: Into<String>>(bind_address: S, port: u16) -> Self {
        Self::new(
            bind_address,
            port,
            SocketProtocol::Tcp,
            vec![ProtocolLayer::Tcp],
            SecurityModel::Insecure,
        )
    }

    /// TLS-terminating TCP forwarding listener.
    pub fn tls_tcp<S: Into<String>>(bind_address: S, port: u16) -> Self {
        Self::new(
            bind_address,
            port,
            SocketProtocol::Tcp,
            vec![ProtocolLayer::Tls, ProtocolLayer::Tcp],
            SecurityModel::Secure,
        )
    }

    pub fn new<S: Into<String>>(
        bind_address: S,
        port: u16,
        socket_protocol: SocketProtocol,
        protocol_stack: Vec<ProtocolLayer>,
        security_model: SecurityModel,
    ) -> Self {
        let bind_address = bind_address.into();
        let is_http = protocol_stack.contains(&ProtocolLayer::Http);
        Self {
            name: format!("gateway-listener-{}-{}", bind_address, port),
            bind_address,
            port,
            socket_protocol,
            protocol_stack,
            security_model,
            host_binding: HostBinding::default(),
            insecure_only: false,
            alt_transport: false,
            stats_prefix: if is_http { "ingress_http" } else { "ingress_tcp" }.to_string(),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_security_model(mut self, model: SecurityModel) -> Self {
        self.security_model = model;
        self
    }

    pub fn with_host_binding(mut self, binding: HostBinding) -> Self {
        self.host_binding = binding;
        self
    }

    pub fn insecure_only(mut self) -> Self {
        self.insecure_only = true;
        self.security_model = SecurityModel::Insecure;
        self
    }

    pub fn with_alt_transport(mut self) -> Self {
        self.alt_transport = true;
        self
    }

    /// Stable physical bind identity; listeners and L4 forwarding rules
    /// meet on this.
    pub fn bind_id(&self) -> String {
        format!("{}-{}-{}", self.socket_protocol.as_str(), self.bind_address, self.port)
    }

    pub fn is_http(&self) -> bool {
        self.protocol_stack.contains(&ProtocolLayer::Http)
    }

    /// Whether this listener terminates TLS (and can therefore do SNI).
    pub fn tls_ok(&self) -> bool {
        self.protocol_stack.contains(&ProtocolLayer::Tls)
    }

    pub fn has_proxy_framing(&self) -> bool {
        self.protocol_stack.contains(&ProtocolLayer::Proxy)
    }

    /// Whether this listener wants the given host at all: the host's
    /// namespace and labels must satisfy the listener's binding rule.
    /// Action compatibility is checked later, per chain.
    pub fn matches_host(&self, host: &Host) -> bool {
        let ns_ok = match &self.host_binding.namespace {
            NamespaceBinding::All => true,
            NamespaceBinding::Literal(ns) => *ns == host.namespace,
        };

        ns_ok && selector_matches(&self.host_binding.host_selector, &host.labels)
    }

    pub fn resource_ref(&self) -> String {
        format!("listener/{}", self.name)
    }
}
