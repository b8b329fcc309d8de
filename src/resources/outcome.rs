//! Reconciliation outcomes.
//!
//! Reconcilers distinguish hard failures (nothing remote was touched,
//! the caller can retry wholesale) from partial outcomes where a remote
//! object now exists and the caller must persist its id even though a
//! follow-up step failed. Partial outcomes carry diagnostics instead of
//! failing the whole operation.

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation is incomplete; the caller should surface this as a
    /// failure after persisting state.
    Error,
    /// The operation succeeded but some derived data is degraded.
    Warning,
}

/// A non-fatal finding attached to a reconciliation outcome.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity of the finding.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Longer description, often the underlying error text.
    pub detail: String,
}

impl Diagnostic {
    /// Creates an error-severity diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Creates a warning-severity diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Returns true for error-severity diagnostics.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

/// State produced by a reconciliation step, plus any diagnostics.
#[derive(Debug, Clone)]
pub struct Reconciled<T> {
    /// The state to persist.
    pub state: T,
    /// Findings accumulated along the way.
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Reconciled<T> {
    /// Wraps a clean outcome.
    #[must_use]
    pub const fn new(state: T) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }

    /// Attaches a diagnostic.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Returns true if any diagnostic is error-severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Outcome of refreshing a resource from the remote side.
#[derive(Debug, Clone)]
pub enum ReadOutcome<T> {
    /// The resource still exists; the refreshed state follows.
    Active(Reconciled<T>),
    /// The resource no longer exists remotely and should be dropped
    /// from local state.
    Gone(Diagnostic),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_errors_distinguishes_severity() {
        let outcome = Reconciled::new(())
            .with_diagnostic(Diagnostic::warning("degraded", "order unavailable"));
        assert!(!outcome.has_errors());

        let outcome = outcome.with_diagnostic(Diagnostic::error("failed", "stream closed"));
        assert!(outcome.has_errors());
    }
}
