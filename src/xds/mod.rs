//! Emitted configuration model.
//!
//! Logical listener/route/cluster shapes produced by synthesis, plus their
//! conversions to envoy-types protobuf resources. The logical types are
//! plain serde structs so snapshots of compiler output can be dumped,
//! diffed, and compared byte-for-byte across runs; `to_envoy_*` methods
//! produce the wire objects a data-plane loader consumes.

pub mod cluster;
pub mod listener;
pub mod route;
pub mod tls;

pub use cluster::{ClusterConfig, EndpointConfig, LoadBalancingPolicy};
pub use listener::{
    FilterChainConfig, FilterChainMatchConfig, FilterStackConfig, HeaderValueConfig,
    HttpRouterConfig, L4ForwardingConfig, ListenerConfig, ListenerFilterKind, TransportMatch,
    VirtualHostConfig, WeightedForwardTarget,
};
pub use route::{
    HeaderMatchConfig, HeaderValueMatch, MirrorPolicyConfig, PathMatch, QueryParameterMatchConfig,
    RedirectTarget, RetryPolicyConfig, RouteActionConfig, RouteMatchConfig, RouteRule,
    RouteTarget, RuntimeFractionConfig,
};
pub use tls::TlsContextConfig;
