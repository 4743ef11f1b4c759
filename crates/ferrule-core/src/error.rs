//! Error types for the ferrule-core library.
//!
//! Fatal conditions (a missing entry schema, an import cycle, an import that
//! cannot be located, I/O failures) surface as [`Error`] values. Problems
//! found while parsing or resolving are *collected* as
//! [`Diagnostic`](crate::diagnostic::Diagnostic)s instead and only turn into
//! an [`Error::Compilation`] once a whole stage has finished.

use crate::diagnostic::Diagnostics;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ferrule operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all ferrule operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The requested schema file is absent from every search root
    #[error("schema '{name}' not found in any search root ({searched})", searched = display_roots(.roots))]
    SchemaNotFound {
        /// Import-style name of the schema that was requested
        name: String,
        /// Search roots that were tried, in order
        roots: Vec<PathBuf>,
    },

    /// A file was revisited while it was still being resolved
    #[error("cyclic import: {}", display_cycle(.cycle))]
    CyclicImport {
        /// Cycle members in discovery order
        cycle: Vec<String>,
    },

    /// An `import` statement names a file no search root contains
    #[error("unresolved import '{import}' in '{importer}'")]
    UnresolvedImport {
        /// The imported path as written
        import: String,
        /// The file containing the import statement
        importer: String,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// A compilation option could not be interpreted
    #[error("invalid value '{value}' for option '{key}': {reason}")]
    InvalidOption {
        /// Option name
        key: String,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Unsupported proto syntax version
    #[error("unsupported proto syntax: '{syntax}'")]
    UnsupportedSyntax {
        /// The unsupported syntax string
        syntax: String,
    },

    /// No renderer is registered for the requested target
    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    /// Parsing or resolution produced error diagnostics
    #[error("compilation failed with {count} error(s):\n{diagnostics}", count = .0.error_count(), diagnostics = .0)]
    Compilation(Diagnostics),

    /// A null element was found in a collection that cannot carry nulls
    #[error("null element at index {index} of '{field}', which does not support null elements")]
    NullInUnsupportedCollection {
        /// Full name of the repeated field
        field: String,
        /// Position of the null element
        index: usize,
    },

    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Failed to build a descriptor pool from the exported model
    #[error("failed to build descriptor pool: {0}")]
    DescriptorBuild(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

fn display_roots(roots: &[PathBuf]) -> String {
    if roots.is_empty() {
        return "no roots".to_string();
    }
    roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_cycle(cycle: &[String]) -> String {
    let mut out = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        out.push_str(" -> ");
        out.push_str(first);
    }
    out
}

impl Error {
    /// Creates a new schema-not-found error
    pub fn schema_not_found(name: impl Into<String>, roots: &[PathBuf]) -> Self {
        Self::SchemaNotFound {
            name: name.into(),
            roots: roots.to_vec(),
        }
    }

    /// Creates a new unresolved import error
    pub fn unresolved_import(import: impl Into<String>, importer: impl Into<String>) -> Self {
        Self::UnresolvedImport {
            import: import.into(),
            importer: importer.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Creates a new invalid option error
    pub fn invalid_option(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new null-in-collection error
    pub fn null_in_unsupported_collection(field: impl Into<String>, index: usize) -> Self {
        Self::NullInUnsupportedCollection {
            field: field.into(),
            index,
        }
    }

    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for errors that abort the whole run before any model exists
    pub fn is_import_failure(&self) -> bool {
        matches!(
            self,
            Self::SchemaNotFound { .. } | Self::CyclicImport { .. } | Self::UnresolvedImport { .. }
        )
    }

    /// Returns the collected diagnostics if this is a compilation failure
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Compilation(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::path_traversal("/etc/passwd");
        assert!(err.to_string().contains("path traversal"));
        assert!(err.to_string().contains("/etc/passwd"));
    }

    #[test]
    fn test_cycle_display_closes_the_loop() {
        let err = Error::CyclicImport {
            cycle: vec!["a.proto".into(), "b.proto".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic import: a.proto -> b.proto -> a.proto"
        );
    }

    #[test]
    fn test_compilation_display_counts_errors_only() {
        use crate::diagnostic::{Diagnostic, DiagnosticKind, Span};

        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::UnknownType,
            "a.proto",
            Span::new(3, 5),
            "unknown type 'Missing'",
        ));
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::Syntax,
            "a.proto",
            Span::new(1, 1),
            "no syntax declared",
        ));
        let err = Error::Compilation(diagnostics);
        assert_eq!(
            err.to_string(),
            "compilation failed with 1 error(s):\n\
             a.proto:3:5: error: unknown type 'Missing'\n\
             a.proto:1:1: warning: no syntax declared"
        );
    }

    #[test]
    fn test_schema_not_found_lists_roots() {
        let err = Error::schema_not_found("x.proto", &[PathBuf::from("a"), PathBuf::from("b")]);
        assert!(err.to_string().contains("a, b"));
        assert!(err.is_import_failure());
        assert!(!Error::internal("boom").is_import_failure());
    }
}
