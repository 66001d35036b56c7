//! Route variants.
//!
//! A variant is a canonical route rewritten for one (matcher, action)
//! pair: the matcher constrains the forwarded-protocol header, the action
//! either keeps the route's own behavior or replaces it with an
//! unconditional upgrade-to-secure redirect. Variants depend only on the
//! (matcher, action) pair — not on any host or listener — so they are
//! derived lazily and memoized per canonical route, and the canonical
//! route itself is never mutated.

use std::collections::HashMap;

use crate::ir::HttpGroupId;
use crate::xds::route::{RedirectTarget, RouteActionConfig, RouteRule};

/// How a variant constrains the forwarded-protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Matcher {
    /// No additional condition.
    Always,
    /// Forwarded protocol must be exactly "https".
    XfpHttps,
    /// No positive https match: an unset header counts as insecure.
    XfpHttp,
}

/// What a variant does with matched traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantAction {
    /// Do what the canonical route says (which may itself be a host
    /// redirect).
    Route,
    /// Replace the action with an upgrade-to-secure redirect.
    Redirect,
}

/// Lazily-built collection of variants for one canonical route.
#[derive(Debug)]
pub struct RouteVariants {
    pub group: HttpGroupId,
    pub route: RouteRule,
    variants: HashMap<(Matcher, VariantAction), RouteRule>,
}

impl RouteVariants {
    pub fn new(group: HttpGroupId, route: RouteRule) -> Self {
        Self { group, route, variants: HashMap::new() }
    }

    /// Fetch (building on first request) the variant for a (matcher,
    /// action) pair. Repeated requests return the same object.
    pub fn get_variant(
        &mut self,
        matcher: Matcher,
        action: VariantAction,
        redirect_bypasses_auth: bool,
    ) -> &RouteRule {
        let canonical = &self.route;
        self.variants.entry((matcher, action)).or_insert_with(|| {
            let mut variant = canonical.clone();

            match matcher {
                Matcher::Always => {}
                Matcher::XfpHttps => variant.r#match.set_forwarded_proto(Some("https")),
                Matcher::XfpHttp => variant.r#match.set_forwarded_proto(None),
            }

            match action {
                VariantAction::Route => {}
                VariantAction::Redirect => {
                    variant.action = RouteActionConfig::Redirect(RedirectTarget::to_secure());
                    if redirect_bypasses_auth {
                        variant.auth_bypass = true;
                    }
                }
            }

            variant
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xds::route::{
        HeaderValueMatch, PathMatch, RouteMatchConfig, RouteTarget, FORWARDED_PROTO_HEADER,
    };

    fn canonical() -> RouteRule {
        RouteRule {
            name: None,
            r#match: RouteMatchConfig {
                path: PathMatch::Prefix("/foo/".to_string()),
                case_sensitive: true,
                headers: Vec::new(),
                query_parameters: Vec::new(),
                runtime_fraction: None,
            },
            action: RouteActionConfig::Route(RouteTarget::to_cluster("cluster_foo", 3_000)),
            auth_bypass: false,
        }
    }

    #[test]
    fn test_always_route_is_canonical() {
        let mut variants = RouteVariants::new(HttpGroupId(0), canonical());
        let variant = variants.get_variant(Matcher::Always, VariantAction::Route, false);
        assert_eq!(*variant, canonical());
    }

    #[test]
    fn test_xfp_https_adds_header_match() {
        let mut variants = RouteVariants::new(HttpGroupId(0), canonical());
        let variant =
            variants.get_variant(Matcher::XfpHttps, VariantAction::Route, false).clone();

        let header = variant
            .r#match
            .headers
            .iter()
            .find(|h| h.name == FORWARDED_PROTO_HEADER)
            .expect("forwarded-proto match added");
        assert_eq!(header.value, HeaderValueMatch::Exact("https".to_string()));

        // The canonical route is untouched.
        assert!(variants.route.r#match.headers.is_empty());
    }

    #[test]
    fn test_xfp_http_means_no_positive_match() {
        let mut variants = RouteVariants::new(HttpGroupId(0), canonical());
        let variant = variants.get_variant(Matcher::XfpHttp, VariantAction::Route, false);
        assert!(variant.r#match.headers.is_empty());
    }

    #[test]
    fn test_redirect_replaces_action() {
        let mut variants = RouteVariants::new(HttpGroupId(0), canonical());
        let variant =
            variants.get_variant(Matcher::XfpHttp, VariantAction::Redirect, true).clone();

        match variant.action {
            RouteActionConfig::Redirect(redirect) => assert!(redirect.https_redirect),
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(variant.auth_bypass);
    }

    #[test]
    fn test_variants_are_memoized() {
        let mut variants = RouteVariants::new(HttpGroupId(0), canonical());
        let first =
            variants.get_variant(Matcher::XfpHttps, VariantAction::Route, false).clone();
        let second =
            variants.get_variant(Matcher::XfpHttps, VariantAction::Route, false).clone();
        assert_eq!(first, second);
        assert_eq!(variants.variants.len(), 1);
    }
}
