//! # Gatewright
//!
//! Gatewright is the control-plane compiler for a declarative
//! reverse-proxy gateway: it consumes a validated, in-memory intermediate
//! representation of routing intent — listeners, virtual-host bindings
//! with TLS identities, weighted route groups, and L4 forwarding rules —
//! and synthesizes the listener/filter-chain/route/cluster configuration
//! an Envoy-shaped data plane loads and enforces.
//!
//! ## Architecture
//!
//! ```text
//! IR snapshot → Weight Normalizer → Chain Builder → Route Assigner → Chain Finalizer
//!                                        ↓                ↓                ↓
//!                                  Artifact Cache   Route Variants   xDS resources
//! ```
//!
//! ## Core Components
//!
//! - **IR** (`ir`): arena-addressed snapshot of listeners, hosts, route
//!   groups, and forwarding rules, plus in-place weight normalization
//! - **Synthesis** (`synth`): chain building and dedup, route assignment
//!   with secure/insecure/redirect variants, chain finalization
//! - **Artifact Cache** (`cache`): content-addressed memoization with
//!   ownership links and cascading invalidation across snapshots
//! - **Output model** (`xds`): logical listener/route/cluster shapes and
//!   their envoy-types conversions
//!
//! ## Example
//!
//! ```rust
//! use gatewright::cache::ArtifactCache;
//! use gatewright::config::CompilerSettings;
//! use gatewright::diagnostics::DiagnosticSink;
//! use gatewright::ir::{Host, HttpMappingGroup, IrSnapshotBuilder, Listener, Mapping, MatchCriteria};
//! use gatewright::secrets::NullSecretResolver;
//! use gatewright::synth::compile;
//!
//! let mut builder = IrSnapshotBuilder::new();
//! builder.add_listener(Listener::http("0.0.0.0", 8080));
//! builder.add_host(Host::wildcard());
//! builder.add_http_group(HttpMappingGroup::new(
//!     "quote",
//!     MatchCriteria::prefix("/quote/"),
//!     vec![Mapping::to_service("quote", "quote:8080")],
//! ));
//! let mut snapshot = builder.build();
//!
//! let settings = CompilerSettings::default();
//! let mut cache = ArtifactCache::new();
//! let sink = DiagnosticSink::new();
//!
//! let compiled = compile(&mut snapshot, &settings, &mut cache, &NullSecretResolver, &sink)
//!     .expect("compile");
//! assert_eq!(compiled.listeners.len(), 1);
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod ir;
pub mod observability;
pub mod secrets;
pub mod synth;
pub mod utils;
pub mod xds;

// Re-export commonly used types and functions
pub use config::CompilerSettings;
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity};
pub use errors::{Error, Result};
pub use observability::init_tracing;
pub use synth::{compile, CompiledConfig};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
