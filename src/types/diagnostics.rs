//! Structured diagnostics emitted by the provider compilers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational note.
    Info,
    /// Suspicious but compilable.
    Warning,
    /// The affected message was dropped or malformed.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single compiler diagnostic.
///
/// `position` is the index of the affected entry in the compiled output,
/// or `-1` when no entry applies (e.g. a cache selector with no match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Affected output index, or -1.
    pub position: i64,
}

impl Diagnostic {
    /// Informational diagnostic.
    pub fn info(message: impl Into<String>, position: i64) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            position,
        }
    }

    /// Warning diagnostic.
    pub fn warning(message: impl Into<String>, position: i64) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            position,
        }
    }

    /// Error diagnostic.
    pub fn error(message: impl Into<String>, position: i64) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_constructors() {
        let d = Diagnostic::warning("no match", -1);
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.position, -1);
    }
}
