//! Secret resolution abstraction.
//!
//! The compiler never talks to a secret store itself: TLS identities in the
//! IR are *references*, and resolving them to certificate material is the
//! job of whatever backend the surrounding system wires in (a Vault-style
//! store, the platform's secret API, files on disk). The [`SecretResolver`]
//! trait is that seam; [`MemorySecretResolver`] is the in-process
//! implementation used by tests and simple embeddings.

use std::collections::BTreeMap;

/// Resolved TLS certificate material, PEM-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMaterial {
    pub certificate_chain: String,
    pub private_key: String,
}

impl CertificateMaterial {
    pub fn new<C: Into<String>, K: Into<String>>(certificate_chain: C, private_key: K) -> Self {
        Self { certificate_chain: certificate_chain.into(), private_key: private_key.into() }
    }
}

/// Resolves a TLS identity reference to certificate material.
///
/// Returning `None` means the identity is unknown; the chain that needed it
/// is discarded with a posted diagnostic, never a crash.
pub trait SecretResolver {
    fn resolve(&self, tls_ref: &str, namespace: &str) -> Option<CertificateMaterial>;
}

/// In-memory resolver keyed by `(namespace, tls_ref)`.
#[derive(Debug, Default)]
pub struct MemorySecretResolver {
    entries: BTreeMap<(String, String), CertificateMaterial>,
}

impl MemorySecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register material for a TLS identity reference.
    pub fn insert<N: Into<String>, R: Into<String>>(
        &mut self,
        namespace: N,
        tls_ref: R,
        material: CertificateMaterial,
    ) {
        self.entries.insert((namespace.into(), tls_ref.into()), material);
    }
}

impl SecretResolver for MemorySecretResolver {
    fn resolve(&self, tls_ref: &str, namespace: &str) -> Option<CertificateMaterial> {
        self.entries.get(&(namespace.to_string(), tls_ref.to_string())).cloned()
    }
}

/// Resolver that knows no secrets. Useful for compiles that contain no
/// encrypted chains.
#[derive(Debug, Default)]
pub struct NullSecretResolver;

impl SecretResolver for NullSecretResolver {
    fn resolve(&self, _tls_ref: &str, _namespace: &str) -> Option<CertificateMaterial> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver() {
        let mut resolver = MemorySecretResolver::new();
        resolver.insert(
            "default",
            "web-cert",
            CertificateMaterial::new("CHAIN".to_string(), "KEY".to_string()),
        );

        let material = resolver.resolve("web-cert", "default").expect("registered");
        assert_eq!(material.certificate_chain, "CHAIN");

        assert!(resolver.resolve("web-cert", "other-ns").is_none());
        assert!(resolver.resolve("missing", "default").is_none());
    }

    #[test]
    fn test_null_resolver() {
        assert!(NullSecretResolver.resolve("anything", "anywhere").is_none());
    }
}
