//! Diagnostics collected while checking a script.
//!
//! Checking never stops at the first problem: declaration and type errors are
//! pushed into a [`Diagnostics`] collection together with the span of the
//! offending node, and the caller decides what to do once the pass finishes.
//!
//! # Example
//!
//! ```
//! use sctools_core::{Diagnostics, Span, TypeError};
//!
//! let mut diagnostics = Diagnostics::new();
//! diagnostics.error(Span::new(3, 5, 1), TypeError::NotAnLValue);
//! diagnostics.warning(Span::new(4, 1, 1), "unreachable code");
//!
//! assert!(diagnostics.has_errors());
//! assert_eq!(diagnostics.error_count(), 1);
//! assert_eq!(diagnostics.warning_count(), 1);
//! ```

use std::fmt;

use crate::Span;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The script is invalid; no code will be produced.
    Error,
    /// Suspicious but accepted.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A single message attached to a source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span, self.severity, self.message)
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    has_errors: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic, tracking whether any error was seen.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.has_errors = true;
        }
        self.items.push(diagnostic);
    }

    /// Record an error at `span`.
    pub fn error(&mut self, span: Span, message: impl fmt::Display) {
        self.push(Diagnostic {
            severity: Severity::Error,
            span,
            message: message.to_string(),
        });
    }

    /// Record a warning at `span`.
    pub fn warning(&mut self, span: Span, message: impl fmt::Display) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            span,
            message: message.to_string(),
        });
    }

    /// Move every diagnostic of `other` into this collection.
    pub fn extend(&mut self, other: Diagnostics) {
        for d in other.items {
            self.push(d);
        }
    }

    /// Fast check, tracked on insertion.
    #[inline]
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.has_errors = false;
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.items {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
