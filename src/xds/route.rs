//! Route configuration using envoy-types
//!
//! Logical route rules as synthesized per canonical route group, and their
//! conversion to envoy-types `Route` objects. A rule is a pure value: the
//! variant generator clones and rewrites these without touching the
//! canonical rule, and byte-identical output across recompiles falls out of
//! the types containing no unordered collections.

use envoy_types::pb::envoy::config::core::v3::RuntimeFractionalPercent;
use envoy_types::pb::envoy::config::route::v3::{
    header_matcher::HeaderMatchSpecifier, query_parameter_matcher::QueryParameterMatchSpecifier,
    redirect_action, route::Action, route_action::ClusterSpecifier, route_match::PathSpecifier,
    HeaderMatcher, QueryParameterMatcher, RedirectAction, Route, RouteAction, RouteMatch,
};
use envoy_types::pb::envoy::extensions::filters::http::ext_authz::v3::{
    ext_authz_per_route::Override as ExtAuthzOverride, ExtAuthzPerRoute,
};
use envoy_types::pb::envoy::r#type::matcher::v3::{
    string_matcher::MatchPattern, RegexMatcher, StringMatcher,
};
use envoy_types::pb::envoy::r#type::v3::{fractional_percent, FractionalPercent};
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, BoolValue, UInt32Value};
use prost::Message;
use serde::{Deserialize, Serialize};

/// Header carrying the original request scheme when one physical chain
/// serves both secure and insecure semantics.
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

const EXT_AUTHZ_FILTER_NAME: &str = "envoy.filters.http.ext_authz";

/// Path matching for a route rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

impl PathMatch {
    /// Prefix string when this is a prefix match.
    pub fn as_prefix(&self) -> Option<&str> {
        match self {
            PathMatch::Prefix(prefix) => Some(prefix),
            _ => None,
        }
    }

    /// Longer static paths are more specific; used for route ordering.
    pub fn specificity(&self) -> usize {
        match self {
            PathMatch::Exact(path) => path.len() + 1,
            PathMatch::Prefix(prefix) => prefix.len(),
            PathMatch::Regex(regex) => regex.len(),
        }
    }
}

/// Value side of a header match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderValueMatch {
    Exact(String),
    Regex(String),
    Present,
}

/// A single header match criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatchConfig {
    pub name: String,
    pub value: HeaderValueMatch,
}

impl HeaderMatchConfig {
    pub fn exact<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self { name: name.into(), value: HeaderValueMatch::Exact(value.into()) }
    }
}

/// A single query parameter match criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameterMatchConfig {
    pub name: String,
    pub value: HeaderValueMatch,
}

/// Traffic fraction admitted into a route, in hundredths. The cumulative
/// weight table of a route group lands here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFractionConfig {
    pub numerator: u32,
    pub runtime_key: Option<String>,
}

/// Matching side of a route rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMatchConfig {
    pub path: PathMatch,
    pub case_sensitive: bool,
    pub headers: Vec<HeaderMatchConfig>,
    pub query_parameters: Vec<QueryParameterMatchConfig>,
    pub runtime_fraction: Option<RuntimeFractionConfig>,
}

impl RouteMatchConfig {
    /// Replace any forwarded-proto criterion with an exact match on
    /// `value`, or with nothing when `value` is `None` (an unset header
    /// counts as insecure, so "insecure" is modeled as "no positive secure
    /// match" rather than an exact match on "http").
    pub fn set_forwarded_proto(&mut self, value: Option<&str>) {
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(FORWARDED_PROTO_HEADER));

        if let Some(value) = value {
            self.headers.push(HeaderMatchConfig::exact(FORWARDED_PROTO_HEADER, value));
        }
    }
}

/// Retry policy carried from the mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub retry_on: String,
    pub num_retries: u32,
    pub per_try_timeout_ms: Option<u64>,
}

/// CORS policy carried from the mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsPolicyConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub max_age_seconds: Option<u64>,
}

/// Traffic mirror target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorPolicyConfig {
    pub cluster: String,
    pub fraction_numerator: u32,
}

/// Forwarding side of a routed rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub cluster: String,
    pub timeout_ms: u64,
    pub idle_timeout_ms: Option<u64>,
    pub prefix_rewrite: Option<String>,
    pub host_rewrite: Option<String>,
    pub auto_host_rewrite: bool,
    pub retry_policy: Option<RetryPolicyConfig>,
    pub mirror_policies: Vec<MirrorPolicyConfig>,
    pub cors: Option<CorsPolicyConfig>,
    pub rate_limit_labels: Vec<String>,
}

impl RouteTarget {
    pub fn to_cluster<S: Into<String>>(cluster: S, timeout_ms: u64) -> Self {
        Self {
            cluster: cluster.into(),
            timeout_ms,
            idle_timeout_ms: None,
            prefix_rewrite: None,
            host_rewrite: None,
            auto_host_rewrite: false,
            retry_policy: None,
            mirror_policies: Vec::new(),
            cors: None,
            rate_limit_labels: Vec::new(),
        }
    }
}

/// Redirect side of a redirecting rule. `https_redirect` is the
/// upgrade-to-secure redirect produced by the variant generator; host/path
/// redirects come from host-redirect mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub https_redirect: bool,
    pub host_redirect: Option<String>,
    pub path_redirect: Option<String>,
    pub prefix_rewrite: Option<String>,
    pub response_code: Option<u32>,
}

impl RedirectTarget {
    /// The unconditional upgrade-to-secure redirect.
    pub fn to_secure() -> Self {
        Self {
            https_redirect: true,
            host_redirect: None,
            path_redirect: None,
            prefix_rewrite: None,
            response_code: None,
        }
    }
}

/// What a matched route does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouteActionConfig {
    Route(RouteTarget),
    Redirect(RedirectTarget),
}

/// A complete logical route rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub name: Option<String>,
    pub r#match: RouteMatchConfig,
    pub action: RouteActionConfig,
    /// Per-route override disabling external authorization. Set on
    /// redirect variants when redirect-before-authorization is in force.
    pub auth_bypass: bool,
}

impl RouteRule {
    /// Convert to an envoy-types Route
    pub fn to_envoy_route(&self) -> Result<Route, crate::Error> {
        let action = match &self.action {
            RouteActionConfig::Route(target) => Action::Route(target.to_envoy_route_action()),
            RouteActionConfig::Redirect(target) => {
                Action::Redirect(target.to_envoy_redirect_action())
            }
        };

        let mut route = Route {
            name: self.name.clone().unwrap_or_default(),
            r#match: Some(self.r#match.to_envoy_route_match()),
            action: Some(action),
            ..Default::default()
        };

        if self.auth_bypass {
            let per_route = ExtAuthzPerRoute {
                r#override: Some(ExtAuthzOverride::Disabled(true)),
            };
            route.typed_per_filter_config.insert(
                EXT_AUTHZ_FILTER_NAME.to_string(),
                EnvoyAny {
                    type_url:
                        "type.googleapis.com/envoy.extensions.filters.http.ext_authz.v3.ExtAuthzPerRoute"
                            .to_string(),
                    value: per_route.encode_to_vec(),
                },
            );
        }

        Ok(route)
    }
}

impl RouteMatchConfig {
    fn to_envoy_route_match(&self) -> RouteMatch {
        let path_specifier = match &self.path {
            PathMatch::Exact(path) => PathSpecifier::Path(path.clone()),
            PathMatch::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
            PathMatch::Regex(regex) => PathSpecifier::SafeRegex(RegexMatcher {
                regex: regex.clone(),
                ..Default::default()
            }),
        };

        RouteMatch {
            path_specifier: Some(path_specifier),
            case_sensitive: Some(BoolValue { value: self.case_sensitive }),
            runtime_fraction: self.runtime_fraction.as_ref().map(|f| RuntimeFractionalPercent {
                default_value: Some(FractionalPercent {
                    numerator: f.numerator,
                    denominator: fractional_percent::DenominatorType::Hundred as i32,
                }),
                runtime_key: f.runtime_key.clone().unwrap_or_default(),
            }),
            headers: self.headers.iter().map(|h| h.to_envoy_header_matcher()).collect(),
            query_parameters: self
                .query_parameters
                .iter()
                .map(|q| q.to_envoy_query_parameter_matcher())
                .collect(),
            ..Default::default()
        }
    }
}

impl HeaderMatchConfig {
    fn to_envoy_header_matcher(&self) -> HeaderMatcher {
        let specifier = match &self.value {
            HeaderValueMatch::Exact(value) => {
                HeaderMatchSpecifier::StringMatch(exact_string_matcher(value))
            }
            HeaderValueMatch::Regex(regex) => {
                HeaderMatchSpecifier::StringMatch(regex_string_matcher(regex))
            }
            HeaderValueMatch::Present => HeaderMatchSpecifier::PresentMatch(true),
        };

        HeaderMatcher {
            name: self.name.clone(),
            header_match_specifier: Some(specifier),
            ..Default::default()
        }
    }
}

impl QueryParameterMatchConfig {
    fn to_envoy_query_parameter_matcher(&self) -> QueryParameterMatcher {
        let specifier = match &self.value {
            HeaderValueMatch::Exact(value) => {
                QueryParameterMatchSpecifier::StringMatch(exact_string_matcher(value))
            }
            HeaderValueMatch::Regex(regex) => {
                QueryParameterMatchSpecifier::StringMatch(regex_string_matcher(regex))
            }
            HeaderValueMatch::Present => QueryParameterMatchSpecifier::PresentMatch(true),
        };

        QueryParameterMatcher {
            name: self.name.clone(),
            query_parameter_match_specifier: Some(specifier),
        }
    }
}

impl RouteTarget {
    fn to_envoy_route_action(&self) -> RouteAction {
        #[allow(deprecated)]
        let mut action = RouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(self.cluster.clone())),
            timeout: Some(duration_ms(self.timeout_ms)),
            idle_timeout: self.idle_timeout_ms.map(duration_ms),
            ..Default::default()
        };

        if let Some(prefix) = &self.prefix_rewrite {
            action.prefix_rewrite = prefix.clone();
        }

        if let Some(host) = &self.host_rewrite {
            action.host_rewrite_specifier = Some(
                envoy_types::pb::envoy::config::route::v3::route_action::HostRewriteSpecifier::HostRewriteLiteral(
                    host.clone(),
                ),
            );
        } else if self.auto_host_rewrite {
            action.host_rewrite_specifier = Some(
                envoy_types::pb::envoy::config::route::v3::route_action::HostRewriteSpecifier::AutoHostRewrite(
                    BoolValue { value: true },
                ),
            );
        }

        if let Some(retry) = &self.retry_policy {
            action.retry_policy =
                Some(envoy_types::pb::envoy::config::route::v3::RetryPolicy {
                    retry_on: retry.retry_on.clone(),
                    num_retries: Some(UInt32Value { value: retry.num_retries }),
                    per_try_timeout: retry.per_try_timeout_ms.map(duration_ms),
                    ..Default::default()
                });
        }

        for mirror in &self.mirror_policies {
            #[allow(deprecated)]
            let policy =
                envoy_types::pb::envoy::config::route::v3::route_action::RequestMirrorPolicy {
                    cluster: mirror.cluster.clone(),
                    runtime_fraction: Some(RuntimeFractionalPercent {
                        default_value: Some(FractionalPercent {
                            numerator: mirror.fraction_numerator,
                            denominator: fractional_percent::DenominatorType::Hundred as i32,
                        }),
                        runtime_key: String::new(),
                    }),
                    ..Default::default()
                };
            action.request_mirror_policies.push(policy);
        }

        #[allow(deprecated)]
        if let Some(cors) = &self.cors {
            action.cors = Some(envoy_types::pb::envoy::config::route::v3::CorsPolicy {
                allow_origin_string_match: cors
                    .allow_origins
                    .iter()
                    .map(|o| exact_string_matcher(o))
                    .collect(),
                allow_methods: cors.allow_methods.clone(),
                allow_headers: cors.allow_headers.clone(),
                expose_headers: cors.expose_headers.clone(),
                max_age: cors.max_age_seconds.map(|s| s.to_string()).unwrap_or_default(),
                ..Default::default()
            });
        }

        for label in &self.rate_limit_labels {
            action.rate_limits.push(envoy_types::pb::envoy::config::route::v3::RateLimit {
                actions: vec![envoy_types::pb::envoy::config::route::v3::rate_limit::Action {
                    action_specifier: Some(
                        envoy_types::pb::envoy::config::route::v3::rate_limit::action::ActionSpecifier::GenericKey(
                            envoy_types::pb::envoy::config::route::v3::rate_limit::action::GenericKey {
                                descriptor_value: label.clone(),
                                descriptor_key: String::new(),
                                default_value: String::new(),
                            },
                        ),
                    ),
                }],
                ..Default::default()
            });
        }

        action
    }
}

impl RedirectTarget {
    fn to_envoy_redirect_action(&self) -> RedirectAction {
        let mut action = RedirectAction {
            host_redirect: self.host_redirect.clone().unwrap_or_default(),
            ..Default::default()
        };

        if self.https_redirect {
            action.scheme_rewrite_specifier =
                Some(redirect_action::SchemeRewriteSpecifier::HttpsRedirect(true));
        }

        if let Some(path) = &self.path_redirect {
            action.path_rewrite_specifier =
                Some(redirect_action::PathRewriteSpecifier::PathRedirect(path.clone()));
        } else if let Some(prefix) = &self.prefix_rewrite {
            action.path_rewrite_specifier =
                Some(redirect_action::PathRewriteSpecifier::PrefixRewrite(prefix.clone()));
        }

        if let Some(code) = self.response_code {
            let enum_code = match code {
                301 => redirect_action::RedirectResponseCode::MovedPermanently,
                302 => redirect_action::RedirectResponseCode::Found,
                303 => redirect_action::RedirectResponseCode::SeeOther,
                307 => redirect_action::RedirectResponseCode::TemporaryRedirect,
                308 => redirect_action::RedirectResponseCode::PermanentRedirect,
                _ => redirect_action::RedirectResponseCode::MovedPermanently,
            };
            action.response_code = enum_code as i32;
        }

        action
    }
}

fn exact_string_matcher(value: &str) -> StringMatcher {
    StringMatcher {
        match_pattern: Some(MatchPattern::Exact(value.to_string())),
        ..Default::default()
    }
}

fn regex_string_matcher(regex: &str) -> StringMatcher {
    StringMatcher {
        match_pattern: Some(MatchPattern::SafeRegex(RegexMatcher {
            regex: regex.to_string(),
            ..Default::default()
        })),
        ..Default::default()
    }
}

fn duration_ms(ms: u64) -> envoy_types::pb::google::protobuf::Duration {
    envoy_types::pb::google::protobuf::Duration {
        seconds: (ms / 1000) as i64,
        nanos: ((ms % 1000) * 1_000_000) as i32,
    }
}
