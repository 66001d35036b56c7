//! Compiler settings.
//!
//! Settings are deliberately small: the IR carries the routing intent, and
//! these knobs only cover deployment-wide policy (challenge routing, the
//! upgraded-transport advertisement, cluster defaults).

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};

/// Fixed path prefix for certificate-challenge traffic. Requests under this
/// prefix must always route, regardless of the surrounding security policy.
pub const CHALLENGE_PATH_PREFIX: &str = "/.well-known/acme-challenge/";

/// Top-level compiler settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CompilerSettings {
    /// Default bind address for listeners that do not specify one.
    #[validate(length(min = 1, message = "Bind address cannot be empty"))]
    pub default_bind_address: String,

    /// Maximum compiled program size allowed for safe-regex route matchers.
    #[validate(range(min = 1, max = 10000, message = "Regex size must be 1..=10000"))]
    pub regex_max_size: u32,

    #[validate(nested)]
    pub challenge: ChallengeSettings,

    #[validate(nested)]
    pub alt_transport: AltTransportSettings,

    #[validate(nested)]
    pub cluster_defaults: ClusterDefaults,
}

/// Certificate-challenge routing policy.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ChallengeSettings {
    /// When true, every HTTP chain is guaranteed an unconditional route for
    /// [`CHALLENGE_PATH_PREFIX`], synthesized against `fallback_cluster` if
    /// no declared route already covers the prefix.
    pub force_routes: bool,

    /// Cluster that absorbs synthesized challenge routes. Required whenever
    /// `force_routes` is enabled; a listener that needs the synthesized
    /// route without it aborts with a fatal diagnostic.
    pub fallback_cluster: Option<String>,

    /// When redirect-to-secure happens before external authorization, the
    /// redirect variant of each route carries a per-route override that
    /// disables the authorization filter.
    pub redirect_bypasses_auth: bool,
}

/// Advertisement of an upgraded protocol served on a paired alternate
/// transport (datagram) listener at the same port.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AltTransportSettings {
    /// Response header value announcing the alternate transport. Injected
    /// into every virtual host of the paired stream-based listener.
    #[validate(length(min = 1, message = "Advertisement value cannot be empty"))]
    pub advertisement: String,
}

/// Defaults applied to synthesized clusters and routes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ClusterDefaults {
    /// Upstream connect timeout in milliseconds.
    #[validate(range(min = 1, message = "Connect timeout must be positive"))]
    pub connect_timeout_ms: u64,

    /// Per-request timeout applied to routes without an explicit timeout,
    /// in milliseconds.
    #[validate(range(min = 1, message = "Request timeout must be positive"))]
    pub request_timeout_ms: u64,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            default_bind_address: "0.0.0.0".to_string(),
            regex_max_size: 200,
            challenge: ChallengeSettings::default(),
            alt_transport: AltTransportSettings::default(),
            cluster_defaults: ClusterDefaults::default(),
        }
    }
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self { force_routes: false, fallback_cluster: None, redirect_bypasses_auth: false }
    }
}

impl Default for AltTransportSettings {
    fn default() -> Self {
        Self { advertisement: "h3=\":443\"; ma=86400, h3-29=\":443\"; ma=86400".to_string() }
    }
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self { connect_timeout_ms: 5_000, request_timeout_ms: 3_000 }
    }
}

impl CompilerSettings {
    /// Load settings from the environment (prefix `GATEWRIGHT_`, `__` as the
    /// nesting separator), after reading an optional `.env` file.
    ///
    /// Example: `GATEWRIGHT_CHALLENGE__FALLBACK_CLUSTER=sidecar`.
    pub fn from_env() -> Result<Self> {
        // Missing .env files are the normal case outside development.
        let _ = dotenvy::dotenv();

        let settings: CompilerSettings = ::config::Config::builder()
            .add_source(
                ::config::Environment::with_prefix("GATEWRIGHT").separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate_settings()?;
        Ok(settings)
    }

    /// Validate the settings, including cross-field rules the `validator`
    /// derive cannot express.
    pub fn validate_settings(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.challenge.force_routes && self.challenge.fallback_cluster.is_none() {
            return Err(Error::config(
                "challenge.force_routes requires challenge.fallback_cluster",
            ));
        }

        Ok(())
    }
}
