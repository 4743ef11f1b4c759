//! Collected, non-fatal diagnostics.
//!
//! Parsing and resolution never stop at the first problem. Every stage pushes
//! into a [`Diagnostics`] list and keeps going so a single run reports every
//! problem it can find.

use serde::Serialize;
use std::fmt;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    /// Informational; never fails a run
    Warning,
    /// Fails the run once the stage completes
    Error,
}

impl Severity {
    /// Returns the lowercase label used in rendered diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// The class of problem a diagnostic reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// The schema text does not match the grammar
    Syntax,
    /// A type reference matched no declaration in any searched scope
    UnknownType,
    /// Two fields of one message share a number
    DuplicateFieldNumber,
    /// A field number is out of range, in the implementation band, or reserved
    InvalidFieldNumber,
    /// Two declarations (or two fields) share a name
    DuplicateName,
    /// A field or enum value uses a name listed in `reserved`
    ReservedName,
    /// An enum violates its numbering rules
    InvalidEnum,
    /// A map key type is not integral or string
    InvalidMapKey,
    /// An `extend` block or extension field is malformed
    InvalidExtension,
    /// A null-support request names no field or an ineligible one
    InvalidNullSupport,
}

/// A single problem found while parsing or resolving a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Import-style name of the file the problem was found in
    pub file: String,
    /// 1-based line, or 0 when unknown
    pub line: u32,
    /// 1-based column, or 0 when unknown
    pub column: u32,
    /// Severity
    pub severity: Severity,
    /// Problem class
    pub kind: DiagnosticKind,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Creates an error diagnostic
    pub fn error(
        kind: DiagnosticKind,
        file: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line: span.line,
            column: span.column,
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }

    /// Creates a warning diagnostic
    pub fn warning(
        kind: DiagnosticKind,
        file: impl Into<String>,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, file, span, message)
        }
    }

    /// Returns true if this diagnostic fails the run
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file,
            self.line,
            self.column,
            self.severity.as_str(),
            self.message
        )
    }
}

/// Source position of a token or declaration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    /// Creates a span at the given position
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Ordered list of diagnostics accumulated by a stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Appends every diagnostic of another list, preserving order
    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Returns true if at least one error-severity entry exists
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    /// Number of error-severity entries
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    /// Returns true if the list holds no diagnostics at all
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of diagnostics of any severity
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterates in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    /// Iterates over entries of one kind
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.kind == kind)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
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

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::InvalidNullSupport,
            "a.proto",
            Span::default(),
            "unused",
        ));
        assert!(!diagnostics.has_errors());

        diagnostics.push(Diagnostic::error(
            DiagnosticKind::Syntax,
            "a.proto",
            Span::new(3, 7),
            "expected ';'",
        ));
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_display_format() {
        let d = Diagnostic::error(
            DiagnosticKind::Syntax,
            "a.proto",
            Span::new(3, 7),
            "expected ';'",
        );
        assert_eq!(d.to_string(), "a.proto:3:7: error: expected ';'");
    }
}
