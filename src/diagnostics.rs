//! # Diagnostics Sink
//!
//! Accumulating sink for per-resource diagnostics raised during synthesis.
//!
//! The compiler never aborts a whole run because one resource is broken:
//! the offending Host/Mapping/TCPMapping is excluded from output and the
//! reason is posted here, attached to the resource it came from. Operators
//! read these back out after the compile; a crashed compiler is never the
//! reporting channel.

use std::cell::RefCell;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Suspicious but harmless; nothing was excluded.
    Warning,
    /// The resource (or one of its members) was excluded from output.
    Error,
    /// Synthesis for an entire listener was abandoned.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single diagnostic, attached to the resource that caused it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Reference to the originating resource, e.g. `host/foo.example.com`
    /// or `tcpmappinggroup/db-forward`.
    pub resource: String,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.resource, self.message)
    }
}

/// Accumulating diagnostic sink.
///
/// Interior mutability lets synthesis post while iterating a shared
/// snapshot; the whole pipeline is single-threaded (one compile in flight),
/// so a `RefCell` is all that is needed.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a diagnostic for a resource.
    pub fn post<R: Into<String>, M: Into<String>>(
        &self,
        resource: R,
        message: M,
        severity: Severity,
    ) {
        let diag =
            Diagnostic { resource: resource.into(), message: message.into(), severity };

        match severity {
            Severity::Warning => {
                tracing::warn!(resource = %diag.resource, "{}", diag.message)
            }
            Severity::Error | Severity::Fatal => {
                tracing::error!(resource = %diag.resource, severity = %severity, "{}", diag.message)
            }
        }

        self.entries.borrow_mut().push(diag);
    }

    /// Post an error-severity diagnostic.
    pub fn post_error<R: Into<String>, M: Into<String>>(&self, resource: R, message: M) {
        self.post(resource, message, Severity::Error);
    }

    /// Post a fatal-severity diagnostic.
    pub fn post_fatal<R: Into<String>, M: Into<String>>(&self, resource: R, message: M) {
        self.post(resource, message, Severity::Fatal);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Snapshot of all diagnostics posted so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// All diagnostics posted against one resource.
    pub fn entries_for(&self, resource: &str) -> Vec<Diagnostic> {
        self.entries.borrow().iter().filter(|d| d.resource == resource).cloned().collect()
    }

    /// Remove and return all diagnostics.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[tracing_test::traced_test]
    fn test_post_and_query() {
        let sink = DiagnosticSink::new();
        assert!(sink.is_empty());

        sink.post_error("host/foo", "discarded");
        sink.post("listener/bar", "no matching hosts", Severity::Warning);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.entries_for("host/foo").len(), 1);
        assert_eq!(sink.entries_for("host/foo")[0].severity, Severity::Error);

        // Diagnostics are mirrored onto the tracing stream.
        assert!(logs_contain("discarded"));
        assert!(logs_contain("no matching hosts"));
    }

    #[test]
    fn test_drain_empties_sink() {
        let sink = DiagnosticSink::new();
        sink.post_fatal("listener/l", "challenge fallback cluster missing");

        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_display() {
        let diag = Diagnostic {
            resource: "host/a".into(),
            message: "oops".into(),
            severity: Severity::Error,
        };
        assert_eq!(diag.to_string(), "error [host/a]: oops");
    }
}
