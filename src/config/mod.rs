//! # Configuration Management
//!
//! Compiler settings: everything about *how* to synthesize that is not part
//! of the routing IR itself. Loaded from environment variables (with
//! optional `.env` support) or constructed directly by an embedding caller.

pub mod settings;

pub use settings::{
    AltTransportSettings, ChallengeSettings, ClusterDefaults, CompilerSettings,
    CHALLENGE_PATH_PREFIX,
};
