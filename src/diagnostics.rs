//! Severity-tagged diagnostics and the call-scoped warning accumulator
//!
//! Transformation stages report problems as [`Diagnostic`]s. Only
//! [`Severity::Error`] and [`Severity::Fatal`] abort the running operation;
//! warnings are appended to the [`DiagnosticSink`] owned by that single
//! stage invocation and handed back to the caller when the stage finishes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Whether a diagnostic of this severity aborts the current operation
    pub fn is_abort(self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal error"),
        }
    }
}

/// A single message emitted while transforming or executing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Accumulates the warnings of one stage invocation.
///
/// A sink is never shared: every stage run creates its own and consumes it
/// with [`DiagnosticSink::into_warnings`].
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    warnings: Vec<String>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic. Warnings are kept; anything more severe is
    /// returned as an error so the caller can abort with `?`.
    pub fn report(&mut self, diagnostic: Diagnostic) -> Result<(), Diagnostic> {
        if diagnostic.severity.is_abort() {
            return Err(diagnostic);
        }
        self.warnings.push(diagnostic.message);
        Ok(())
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_is_accumulated() {
        let mut sink = DiagnosticSink::new();
        sink.report(Diagnostic::warning("unused parameter")).unwrap();
        sink.warn("empty message");
        assert_eq!(sink.warnings(), ["unused parameter", "empty message"]);
    }

    #[test]
    fn test_error_and_fatal_abort() {
        let mut sink = DiagnosticSink::new();
        let err = sink.report(Diagnostic::error("bad test")).unwrap_err();
        assert_eq!(err.severity, Severity::Error);
        let err = sink.report(Diagnostic::fatal("missing")).unwrap_err();
        assert_eq!(err.severity, Severity::Fatal);
        assert!(sink.into_warnings().is_empty());
    }
}
