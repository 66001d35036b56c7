//! Utility functions and helpers

pub mod hostglob;

use std::collections::BTreeMap;

use regex::Regex;

pub use hostglob::hostglob_matches;

/// Regex for validating Envoy resource names.
/// Names must start with a letter or underscore, followed by letters,
/// numbers, underscores, or hyphens.
pub static VALID_NAME_REGEX: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*$").unwrap());

/// Sanitize an arbitrary service string into a name Envoy will accept.
///
/// Dots, colons and slashes all appear in service references
/// ("svc.ns:8080"); everything outside the safe set collapses to '_'.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Check whether a label selector accepts a label set.
///
/// Every key/value pair in the selector must be present verbatim in the
/// labels. An empty selector accepts everything.
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name_regex() {
        assert!(VALID_NAME_REGEX.is_match("cluster_1"));
        assert!(VALID_NAME_REGEX.is_match("_internal"));
        assert!(!VALID_NAME_REGEX.is_match("1cluster"));
        assert!(!VALID_NAME_REGEX.is_match("svc.default"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("svc.default:8080"), "svc_default_8080");
        assert_eq!(sanitize_name("plain-name"), "plain-name");
    }

    #[test]
    fn test_selector_matches() {
        let mut selector = BTreeMap::new();
        let mut labels = BTreeMap::new();

        assert!(selector_matches(&selector, &labels));

        selector.insert("app".to_string(), "web".to_string());
        assert!(!selector_matches(&selector, &labels));

        labels.insert("app".to_string(), "web".to_string());
        labels.insert("tier".to_string(), "frontend".to_string());
        assert!(selector_matches(&selector, &labels));

        selector.insert("tier".to_string(), "backend".to_string());
        assert!(!selector_matches(&selector, &labels));
    }
}
