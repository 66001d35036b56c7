//! # Artifact Cache
//!
//! Content-addressed store of synthesized artifacts with ownership links
//! and cascading invalidation. The cache is the only state that survives
//! across compiles: when a snapshot replaces its predecessor, the
//! reconfiguration layer invalidates the keys of the resources that
//! actually changed, and everything else resynthesizes as cache hits.
//!
//! Links are directed owner → owned. Invalidating an owner removes
//! everything it transitively owns. Deletion cascades strictly downward:
//! invalidating an artifact in the middle of the ownership tree leaves
//! anything that only its (still-cached) owner points at untouched, and its
//! own owned artifacts are removed even though the owner still references
//! their keys — dangling links are silently ignored on later invalidations.
//! The compiler only invalidates from root (group) keys, so this
//! limitation is not exercised by the pipeline itself.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use sha2::{Digest, Sha256};

use crate::xds::{ClusterConfig, RouteRule};

/// A synthesized artifact the cache can hold. A closed union: every
/// consumer match is exhaustively checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Marker entry for an IR route group, the ownership root for the
    /// routes and clusters synthesized from it.
    Group { name: String },
    Cluster(ClusterConfig),
    Route(RouteRule),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Group { .. } => "group",
            Artifact::Cluster(_) => "cluster",
            Artifact::Route(_) => "route",
        }
    }
}

/// Callback invoked when an artifact is invalidated.
pub type DeletionHandler = Box<dyn FnMut(&Artifact)>;

struct CacheEntry {
    artifact: Artifact,
    on_delete: Option<DeletionHandler>,
}

/// Cache statistics, reset per reporting interval by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidate_calls: u64,
    pub invalidated_objects: u64,
}

/// The cache proper. Single-writer: one compile in flight at a time, with
/// any cross-thread coordination supplied by the surrounding system.
#[derive(Default)]
pub struct ArtifactCache {
    entries: HashMap<String, CacheEntry>,
    links: HashMap<String, BTreeSet<String>>,
    stats: CacheStats,
}

impl fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("entries", &self.entries.len())
            .field("links", &self.links.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry if it is not already present.
    pub fn add<K: Into<String>>(&mut self, key: K, artifact: Artifact) {
        self.add_with_handler(key, artifact, None);
    }

    /// Add an entry with a deletion callback, if not already present.
    pub fn add_with_handler<K: Into<String>>(
        &mut self,
        key: K,
        artifact: Artifact,
        on_delete: Option<DeletionHandler>,
    ) {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return;
        }

        tracing::debug!(key = %key, kind = artifact.kind(), "cache: adding");
        self.entries.insert(key, CacheEntry { artifact, on_delete });
    }

    /// Record an ownership link from `owner` to `owned`. Both must already
    /// be cached; a link to or from an uncached key is dropped with a log
    /// line rather than an error.
    pub fn link(&mut self, owner: &str, owned: &str) {
        if !self.entries.contains_key(owner) {
            tracing::debug!(owner = %owner, "cache: cannot link, owner not cached");
            return;
        }
        if !self.entries.contains_key(owned) {
            tracing::debug!(owned = %owned, "cache: cannot link, owned not cached");
            return;
        }

        self.links.entry(owner.to_string()).or_default().insert(owned.to_string());
    }

    /// Fetch an artifact by key, counting a hit or a miss.
    pub fn fetch(&mut self, key: &str) -> Option<&Artifact> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(&entry.artifact)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recursively invalidate `key` and everything it transitively owns.
    ///
    /// Invalidating a key that is not cached is not an error: dangling
    /// links (two owners sharing an owned artifact, one invalidated first)
    /// must not break anything. The cascade follows links downward only;
    /// see the module docs for the consequences.
    pub fn invalidate(&mut self, key: &str) {
        self.stats.invalidate_calls += 1;

        let mut worklist: Vec<String> = vec![key.to_string()];
        let mut to_delete: Vec<String> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        while let Some(key) = worklist.pop() {
            if !self.entries.contains_key(&key) || !seen.insert(key.clone()) {
                continue;
            }

            if let Some(owned) = self.links.get(&key) {
                worklist.extend(owned.iter().cloned());
            }

            to_delete.push(key);
        }

        for key in to_delete {
            tracing::debug!(key = %key, "cache: invalidating");
            self.stats.invalidated_objects += 1;

            let entry = self.entries.remove(&key);
            self.links.remove(&key);

            if let Some(CacheEntry { artifact, on_delete: Some(mut handler) }) = entry {
                handler(&artifact);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Sorted keys, for debugging and tests.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Stable fingerprint over an ordered list of identity parts.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..16])
}
