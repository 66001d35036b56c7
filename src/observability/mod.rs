//! # Observability Infrastructure
//!
//! Structured logging for the compiler using the tracing ecosystem.
//!
//! The compiler itself only *emits* tracing events; initialization lives
//! here so embedding binaries (and tests) can opt in. Synthesis decisions
//! are logged at `debug`, per-listener generation at `info`, discarded
//! resources at `warn`/`error` alongside the diagnostic sink.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{Error, Result};

/// Initialize the global tracing subscriber.
///
/// `directives` follows `RUST_LOG` syntax (e.g. `"info,gatewright=debug"`);
/// the `RUST_LOG` environment variable wins when set. With `json` the
/// output is line-delimited JSON, otherwise human-readable text.
pub fn init_tracing(directives: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .map_err(|e| Error::config(format!("invalid log filter '{}': {}", directives, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::config(format!("failed to install tracing subscriber: {}", e)))
}
