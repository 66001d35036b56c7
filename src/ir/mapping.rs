//! Route group and mapping IR types.
//!
//! A mapping group is the canonical route: all routes with identical
//! matching criteria merge into one group, identified by a fingerprint of
//! those criteria. Members differ only in backend, weight, and traffic
//! transforms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::xds::route::{HeaderMatchConfig, PathMatch, QueryParameterMatchConfig};

/// Matching criteria shared by every member of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    pub path: PathMatch,
    pub method: Option<String>,
    pub headers: Vec<HeaderMatchConfig>,
    pub query_parameters: Vec<QueryParameterMatchConfig>,
    pub case_sensitive: bool,
    /// Explicit ordering override; higher wins. Defaults to 0.
    pub precedence: i32,
    /// Hostname constraint; `None` means every host.
    pub host_glob: Option<String>,
    /// Label selector over host labels; empty accepts everything.
    pub host_selector: BTreeMap<String, String>,
}

impl MatchCriteria {
    pub fn prefix<P: Into<String>>(prefix: P) -> Self {
        Self {
            path: PathMatch::Prefix(prefix.into()),
            method: None,
            headers: Vec::new(),
            query_parameters: Vec::new(),
            case_sensitive: true,
            precedence: 0,
            host_glob: None,
            host_selector: BTreeMap::new(),
        }
    }

    pub fn with_host_glob<H: Into<String>>(mut self, glob: H) -> Self {
        self.host_glob = Some(glob.into());
        self
    }

    /// Stable identity of these criteria; groups are keyed by this.
    pub fn fingerprint(&self) -> String {
        let serialized =
            serde_json::to_string(self).expect("match criteria always serialize");
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }

    /// Ordering key: (precedence, path specificity, tie-breakers). Groups
    /// are emitted in descending order of this key.
    pub fn sort_key(&self) -> (i32, usize, usize) {
        (self.precedence, self.path.specificity(), self.headers.len())
    }
}

/// Retry policy carried by a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub retry_on: String,
    pub num_retries: u32,
    pub per_try_timeout_ms: Option<u64>,
}

/// CORS policy carried by a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsPolicy {
    pub origins: Vec<String>,
    pub methods: String,
    pub headers: String,
    pub expose_headers: String,
    pub max_age_seconds: Option<u64>,
}

/// Redirect-to-another-host behavior for a whole group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRedirect {
    pub host: String,
    pub path_redirect: Option<String>,
    pub prefix_redirect: Option<String>,
    pub response_code: Option<u32>,
}

/// One weighted member of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub name: String,
    /// Backend service reference ("host" or "host:port").
    pub service: String,
    /// Explicit traffic share in [0, 100], if declared.
    pub weight: Option<u32>,
    /// Cumulative weight assigned by the weight normalizer.
    pub cumulative_weight: Option<u32>,
    pub prefix_rewrite: Option<String>,
    pub host_rewrite: Option<String>,
    pub auto_host_rewrite: bool,
    pub timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub retry_policy: Option<RetryPolicy>,
    pub cors: Option<CorsPolicy>,
    pub rate_limit_labels: Vec<String>,
}

impl Mapping {
    pub fn to_service<N: Into<String>, S: Into<String>>(name: N, service: S) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            weight: None,
            cumulative_weight: None,
            prefix_rewrite: None,
            host_rewrite: None,
            auto_host_rewrite: false,
            timeout_ms: None,
            idle_timeout_ms: None,
            retry_policy: None,
            cors: None,
            rate_limit_labels: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Stable content fingerprint, used in route cache keys.
    pub fn fingerprint(&self) -> String {
        let serialized = serde_json::to_string(self).expect("mappings always serialize");
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }

    pub fn resource_ref(&self) -> String {
        format!("mapping/{}", self.name)
    }
}

/// The canonical HTTP route: shared criteria plus weighted members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpMappingGroup {
    pub name: String,
    /// Fingerprint of the matching criteria.
    pub group_id: String,
    pub criteria: MatchCriteria,
    pub mappings: Vec<Mapping>,
    /// Mirror members: traffic is copied to these, never answered by them.
    pub shadow_mappings: Vec<Mapping>,
    /// Pure host-redirect groups have this set and may have no members.
    pub host_redirect: Option<HostRedirect>,
    /// Cleared by the weight normalizer when the group's weights are
    /// unusable; such a group yields no routes and no clusters.
    pub weights_valid: bool,
}

impl HttpMappingGroup {
    pub fn new<N: Into<String>>(
        name: N,
        criteria: MatchCriteria,
        mappings: Vec<Mapping>,
    ) -> Self {
        let group_id = criteria.fingerprint();
        Self {
            name: name.into(),
            group_id,
            criteria,
            mappings,
            shadow_mappings: Vec::new(),
            host_redirect: None,
            weights_valid: true,
        }
    }

    pub fn with_host_redirect(mut self, redirect: HostRedirect) -> Self {
        self.host_redirect = Some(redirect);
        self
    }

    pub fn with_shadow(mut self, shadow: Mapping) -> Self {
        self.shadow_mappings.push(shadow);
        self
    }

    pub fn sort_key(&self) -> (i32, usize, usize, String) {
        let (precedence, specificity, headers) = self.criteria.sort_key();
        // The fingerprint tie-breaker keeps emission order total.
        (precedence, specificity, headers, self.group_id.clone())
    }

    pub fn resource_ref(&self) -> String {
        format!("mappinggroup/{}", self.name)
    }
}

/// An L4 forwarding rule: weighted members behind one bind identity,
/// optionally selected by SNI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpMappingGroup {
    pub name: String,
    pub namespace: String,
    /// Bind address; `None` means the deployment default.
    pub bind_address: Option<String>,
    pub port: u16,
    /// Hostname glob used only for SNI selection. `None` forwards every
    /// connection on the bind identity.
    pub host_glob: Option<String>,
    /// Directly-declared TLS identity, consulted after virtual-host
    /// identities when resolving SNI termination.
    pub tls_ref: Option<String>,
    pub mappings: Vec<Mapping>,
    pub weights_valid: bool,
}

impl TcpMappingGroup {
    pub fn new<N: Into<String>>(name: N, port: u16, mappings: Vec<Mapping>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            bind_address: None,
            port,
            host_glob: None,
            tls_ref: None,
            mappings,
            weights_valid: true,
        }
    }

    pub fn with_host_glob<H: Into<String>>(mut self, glob: H) -> Self {
        self.host_glob = Some(glob.into());
        self
    }

    /// Physical bind identity; deliberately matches
    /// [`crate::ir::Listener::bind_id`] for stream listeners.
    pub fn bind_id(&self, default_bind_address: &str) -> String {
        let addr = self.bind_address.as_deref().unwrap_or(default_bind_address);
        format!("tcp-{}-{}", addr, self.port)
    }

    pub fn resource_ref(&self) -> String {
        format!("tcpmappinggroup/{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_identity_is_criteria_hash() {
        let a = HttpMappingGroup::new(
            "a",
            MatchCriteria::prefix("/foo/"),
            vec![Mapping::to_service("m1", "svc-a")],
        );
        let b = HttpMappingGroup::new(
            "b",
            MatchCriteria::prefix("/foo/"),
            vec![Mapping::to_service("m2", "svc-b")],
        );
        let c = HttpMappingGroup::new(
            "c",
            MatchCriteria::prefix("/bar/"),
            vec![Mapping::to_service("m3", "svc-c")],
        );

        // Same criteria, same group identity, regardless of members.
        assert_eq!(a.group_id, b.group_id);
        assert_ne!(a.group_id, c.group_id);
    }

    #[test]
    fn test_mapping_fingerprint_tracks_content() {
        let m1 = Mapping::to_service("m", "svc:8080");
        let m2 = Mapping::to_service("m", "svc:8080");
        let m3 = Mapping::to_service("m", "svc:8080").with_weight(30);

        assert_eq!(m1.fingerprint(), m2.fingerprint());
        assert_ne!(m1.fingerprint(), m3.fingerprint());
    }

    #[test]
    fn test_tcp_group_bind_id_matches_listener_form() {
        use crate::ir::Listener;

        let group = TcpMappingGroup::new("fw", 9000, vec![Mapping::to_service("m", "db")]);
        let listener = Listener::tcp("0.0.0.0", 9000);
        assert_eq!(group.bind_id("0.0.0.0"), listener.bind_id());

        let mut pinned = group;
        pinned.bind_address = Some("127.0.0.1".to_string());
        assert_eq!(pinned.bind_id("0.0.0.0"), "tcp-127.0.0.1-9000");
    }
}
