//! Virtual-host IR types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ir::mapping::HttpMappingGroup;
use crate::utils::{hostglob_matches, selector_matches};

/// What a host does with requests on one side of the secure/insecure
/// split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostAction {
    /// Do what the matched route says.
    Route,
    /// Redirect to the secure scheme.
    Redirect,
    /// Refuse the request.
    Reject,
}

/// A declared virtual-host binding: hostname pattern, optional TLS
/// identity, and secure/insecure handling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    /// Hostname glob ("foo.example.com", "*.example.com", or "*").
    pub hostname: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// TLS identity reference, resolved through the secret store at
    /// finalization.
    pub tls_ref: Option<String>,
    pub secure_action: Option<HostAction>,
    pub insecure_action: Option<HostAction>,
    /// Extra cleartext port this host wants served; a synthesized
    /// insecure-only listener picks it up.
    pub insecure_addl_port: Option<u16>,
    /// SNI identity override; defaults to the hostname.
    pub sni: Option<String>,
}

impl Host {
    pub fn new<N: Into<String>, H: Into<String>>(name: N, hostname: H) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            namespace: "default".to_string(),
            labels: BTreeMap::new(),
            tls_ref: None,
            secure_action: None,
            insecure_action: None,
            insecure_addl_port: None,
            sni: None,
        }
    }

    /// The catch-all host: no TLS, route everything insecure.
    pub fn wildcard() -> Self {
        let mut host = Self::new("wildcard", "*");
        host.insecure_action = Some(HostAction::Route);
        host
    }

    pub fn with_tls<R: Into<String>>(mut self, tls_ref: R) -> Self {
        self.tls_ref = Some(tls_ref.into());
        self
    }

    pub fn with_actions(
        mut self,
        secure: Option<HostAction>,
        insecure: Option<HostAction>,
    ) -> Self {
        self.secure_action = secure;
        self.insecure_action = insecure;
        self
    }

    /// SNI identity for encrypted chains this host joins.
    pub fn sni(&self) -> &str {
        self.sni.as_deref().unwrap_or(&self.hostname)
    }

    /// Whether routes of the given group may be attached to this host's
    /// virtual-host domain: the group's host constraint must overlap this
    /// hostname and its host selector must accept this host's labels.
    pub fn matches_group(&self, group: &HttpMappingGroup) -> bool {
        let glob = group.criteria.host_glob.as_deref().unwrap_or("*");

        hostglob_matches(glob, &self.hostname)
            && selector_matches(&group.criteria.host_selector, &self.labels)
    }

    pub fn resource_ref(&self) -> String {
        format!("host/{}", self.name)
    }
}
