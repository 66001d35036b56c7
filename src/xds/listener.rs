//! Listener configuration using envoy-types
//!
//! Logical listener/filter-chain shapes emitted by the chain finalizer, and
//! their conversion to envoy-types `Listener` resources. Each filter chain
//! carries either an HTTP router stack (virtual hosts + routes) or an L4
//! weighted-forwarding stack, never both.

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address, Address, HeaderValue, HeaderValueOption,
    Http3ProtocolOptions, SocketAddress, UdpSocketConfig,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter::ConfigType as FilterConfigType, listener_filter::ConfigType as ListenerFilterConfigType,
    Filter, FilterChain, FilterChainMatch, Listener, ListenerFilter, QuicProtocolOptions,
    UdpListenerConfig,
};
use envoy_types::pb::envoy::config::route::v3::{RouteConfiguration, VirtualHost};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router;
use envoy_types::pb::envoy::extensions::filters::listener::proxy_protocol::v3::ProxyProtocol;
use envoy_types::pb::envoy::extensions::filters::listener::tls_inspector::v3::TlsInspector;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter,
};
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::{
    tcp_proxy::{weighted_cluster::ClusterWeight, ClusterSpecifier, WeightedCluster},
    TcpProxy,
};
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, BoolValue};
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::ir::SocketProtocol;
use crate::xds::route::RouteRule;
use crate::xds::tls::TlsContextConfig;

pub const HTTP_CONNECTION_MANAGER_FILTER: &str = "envoy.filters.network.http_connection_manager";
pub const TCP_PROXY_FILTER: &str = "envoy.filters.network.tcp_proxy";
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";

/// Transport requested by a filter chain match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMatch {
    Tls,
    Quic,
}

/// Logical filter chain match
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterChainMatchConfig {
    /// SNI names; empty means "match any name".
    pub server_names: Vec<String>,
    pub transport: Option<TransportMatch>,
}

/// A response header injected into a virtual host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderValueConfig {
    pub key: String,
    pub value: String,
}

/// Logical virtual host: one hostname domain plus its route list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualHostConfig {
    pub name: String,
    pub domains: Vec<String>,
    pub response_headers_to_add: Vec<HeaderValueConfig>,
    pub routes: Vec<RouteRule>,
}

/// HTTP processing stack of a filter chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRouterConfig {
    pub stat_prefix: String,
    pub route_config_name: String,
    pub virtual_hosts: Vec<VirtualHostConfig>,
    /// Serve the upgraded datagram protocol (the chain lives on a
    /// datagram listener).
    pub http3: bool,
}

/// One weighted member of an L4 forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedForwardTarget {
    pub name: String,
    /// Cumulative weight, per the group's normalized weight table.
    pub weight: u32,
}

/// L4 processing stack of a filter chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L4ForwardingConfig {
    pub stat_prefix: String,
    pub clusters: Vec<WeightedForwardTarget>,
}

/// Which processing stack a filter chain carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterStackConfig {
    HttpRouter(HttpRouterConfig),
    L4Forward(L4ForwardingConfig),
}

/// A complete logical filter chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterChainConfig {
    pub name: String,
    pub r#match: FilterChainMatchConfig,
    pub tls: Option<TlsContextConfig>,
    pub filters: FilterStackConfig,
}

/// Listener-level filters derived from the protocol stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerFilterKind {
    TlsInspector,
    ProxyProtocol,
}

/// A complete logical listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub socket_protocol: SocketProtocol,
    pub listener_filters: Vec<ListenerFilterKind>,
    pub filter_chains: Vec<FilterChainConfig>,
}

impl ListenerConfig {
    /// Convert to an envoy-types Listener
    pub fn to_envoy_listener(&self) -> Result<Listener, crate::Error> {
        let socket_address = SocketAddress {
            address: self.address.clone(),
            protocol: match self.socket_protocol {
                SocketProtocol::Tcp => socket_address::Protocol::Tcp as i32,
                SocketProtocol::Udp => socket_address::Protocol::Udp as i32,
            },
            port_specifier: Some(socket_address::PortSpecifier::PortValue(self.port)),
            ..Default::default()
        };

        let filter_chains: Result<Vec<FilterChain>, crate::Error> =
            self.filter_chains.iter().map(|fc| fc.to_envoy_filter_chain()).collect();

        let mut listener = Listener {
            name: self.name.clone(),
            address: Some(Address { address: Some(AddressType::SocketAddress(socket_address)) }),
            filter_chains: filter_chains?,
            listener_filters: self
                .listener_filters
                .iter()
                .map(|lf| lf.to_envoy_listener_filter())
                .collect(),
            ..Default::default()
        };

        if self.socket_protocol == SocketProtocol::Udp {
            listener.udp_listener_config = Some(UdpListenerConfig {
                quic_options: Some(QuicProtocolOptions::default()),
                downstream_socket_config: Some(UdpSocketConfig {
                    prefer_gro: Some(BoolValue { value: true }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        Ok(listener)
    }
}

impl FilterChainConfig {
    fn to_envoy_filter_chain(&self) -> Result<FilterChain, crate::Error> {
        let filter = match &self.filters {
            FilterStackConfig::HttpRouter(http) => http.to_envoy_filter()?,
            FilterStackConfig::L4Forward(l4) => l4.to_envoy_filter(),
        };

        let transport_socket = self.tls.as_ref().map(|tls| match self.r#match.transport {
            Some(TransportMatch::Quic) => tls.to_envoy_quic_transport_socket(),
            _ => tls.to_envoy_transport_socket(),
        });

        Ok(FilterChain {
            name: self.name.clone(),
            filter_chain_match: Some(self.r#match.to_envoy_filter_chain_match()),
            filters: vec![filter],
            transport_socket,
            ..Default::default()
        })
    }
}

impl FilterChainMatchConfig {
    fn to_envoy_filter_chain_match(&self) -> FilterChainMatch {
        FilterChainMatch {
            server_names: self.server_names.clone(),
            transport_protocol: match self.transport {
                Some(TransportMatch::Tls) => "tls".to_string(),
                Some(TransportMatch::Quic) => "quic".to_string(),
                None => String::new(),
            },
            ..Default::default()
        }
    }
}

impl HttpRouterConfig {
    fn to_envoy_filter(&self) -> Result<Filter, crate::Error> {
        let virtual_hosts: Vec<VirtualHost> = self
            .virtual_hosts
            .iter()
            .map(|vh| vh.to_envoy_virtual_host())
            .collect::<Result<_, crate::Error>>()?;

        let route_config = RouteConfiguration {
            name: self.route_config_name.clone(),
            virtual_hosts,
            ..Default::default()
        };

        let router_filter = HttpFilter {
            name: ROUTER_FILTER_NAME.to_string(),
            config_type: Some(HttpFilterConfigType::TypedConfig(EnvoyAny {
                type_url: "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router"
                    .to_string(),
                value: Router::default().encode_to_vec(),
            })),
            ..Default::default()
        };

        let mut hcm = HttpConnectionManager {
            stat_prefix: self.stat_prefix.clone(),
            codec_type: CodecType::Auto as i32,
            route_specifier: Some(RouteSpecifier::RouteConfig(route_config)),
            http_filters: vec![router_filter],
            normalize_path: Some(BoolValue { value: true }),
            ..Default::default()
        };

        if self.http3 {
            hcm.http3_protocol_options = Some(Http3ProtocolOptions::default());
            hcm.codec_type = CodecType::Http3 as i32;
        }

        Ok(Filter {
            name: HTTP_CONNECTION_MANAGER_FILTER.to_string(),
            config_type: Some(FilterConfigType::TypedConfig(EnvoyAny {
                type_url:
                    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager"
                        .to_string(),
                value: hcm.encode_to_vec(),
            })),
        })
    }
}

impl L4ForwardingConfig {
    fn to_envoy_filter(&self) -> Filter {
        let tcp_proxy = TcpProxy {
            stat_prefix: self.stat_prefix.clone(),
            cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
                clusters: self
                    .clusters
                    .iter()
                    .map(|c| ClusterWeight {
                        name: c.name.clone(),
                        weight: c.weight,
                        ..Default::default()
                    })
                    .collect(),
            })),
            ..Default::default()
        };

        Filter {
            name: TCP_PROXY_FILTER.to_string(),
            config_type: Some(FilterConfigType::TypedConfig(EnvoyAny {
                type_url:
                    "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy"
                        .to_string(),
                value: tcp_proxy.encode_to_vec(),
            })),
        }
    }
}

impl VirtualHostConfig {
    fn to_envoy_virtual_host(&self) -> Result<VirtualHost, crate::Error> {
        let routes = self
            .routes
            .iter()
            .map(|r| r.to_envoy_route())
            .collect::<Result<Vec<_>, crate::Error>>()?;

        Ok(VirtualHost {
            name: self.name.clone(),
            domains: self.domains.clone(),
            routes,
            response_headers_to_add: self
                .response_headers_to_add
                .iter()
                .map(|h| HeaderValueOption {
                    header: Some(HeaderValue {
                        key: h.key.clone(),
                        value: h.value.clone(),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })
    }
}

impl ListenerFilterKind {
    fn to_envoy_listener_filter(&self) -> ListenerFilter {
        match self {
            ListenerFilterKind::TlsInspector => ListenerFilter {
                name: "envoy.filters.listener.tls_inspector".to_string(),
                config_type: Some(ListenerFilterConfigType::TypedConfig(EnvoyAny {
                    type_url:
                        "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector"
                            .to_string(),
                    value: TlsInspector::default().encode_to_vec(),
                })),
                ..Default::default()
            },
            ListenerFilterKind::ProxyProtocol => ListenerFilter {
                name: "envoy.filters.listener.proxy_protocol".to_string(),
                config_type: Some(ListenerFilterConfigType::TypedConfig(EnvoyAny {
                    type_url:
                        "type.googleapis.com/envoy.extensions.filters.listener.proxy_protocol.v3.ProxyProtocol"
                            .to_string(),
                    value: ProxyProtocol::default().encode_to_vec(),
                })),
                ..Default::default()
            },
        }
    }
}
