//! Schema source providers.
//!
//! The loader never touches the file system directly; it asks a
//! [`SourceProvider`] whether a candidate path exists and for its text. This
//! keeps on-disk and in-memory compilation on the same code path.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Abstracts over where schema text comes from
pub trait SourceProvider: Send + Sync {
    /// Returns true if `path` names a readable schema
    fn exists(&self, path: &Path) -> bool;

    /// Reads the full text at `path`
    fn read(&self, path: &Path) -> Result<String>;
}

/// Reads schemas from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl SourceProvider for FileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))
    }
}

/// Serves schemas from a path-to-text map, mainly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    files: BTreeMap<PathBuf, String>,
}

impl InMemory {
    /// Creates an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file and returns the provider
    pub fn with_file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Adds (or replaces) a file
    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }
}

impl SourceProvider for InMemory {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &Path) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            Error::file_read(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not in memory provider"),
            )
        })
    }
}

/// A schema located on a search root
#[derive(Debug, Clone)]
pub struct Located {
    /// Import-style name (forward slashes, relative to its root)
    pub name: String,
    /// Where the text came from; `None` for built-in schemas
    pub path: Option<PathBuf>,
    /// Schema text
    pub text: String,
}

/// Finds `name` on the first root that contains it, falling back to the
/// built-in well-known schemas.
///
/// Returns `Ok(None)` when nothing matches; I/O failures on a file that does
/// exist are real errors.
pub fn locate(
    provider: &dyn SourceProvider,
    roots: &[PathBuf],
    name: &str,
) -> Result<Option<Located>> {
    let default_root = [PathBuf::new()];
    let roots = if roots.is_empty() { &default_root[..] } else { roots };

    for root in roots {
        let candidate = root.join(name);
        trace!("Trying {}", candidate.display());
        if provider.exists(&candidate) {
            let text = provider.read(&candidate)?;
            return Ok(Some(Located {
                name: name.to_string(),
                path: Some(candidate),
                text,
            }));
        }
    }

    Ok(builtin(name).map(|text| Located {
        name: name.to_string(),
        path: None,
        text: text.to_string(),
    }))
}

/// Returns the bundled text of a well-known schema file
pub fn builtin(name: &str) -> Option<&'static str> {
    BUILTIN_SCHEMAS
        .iter()
        .find(|(builtin_name, _)| *builtin_name == name)
        .map(|(_, text)| *text)
}

const BUILTIN_SCHEMAS: &[(&str, &str)] = &[
    ("google/protobuf/wrappers.proto", WRAPPERS_PROTO),
    ("google/protobuf/timestamp.proto", TIMESTAMP_PROTO),
    ("google/protobuf/duration.proto", DURATION_PROTO),
    ("google/protobuf/empty.proto", EMPTY_PROTO),
];

const WRAPPERS_PROTO: &str = r#"syntax = "proto3";

package google.protobuf;

message DoubleValue { double value = 1; }
message FloatValue { float value = 1; }
message Int64Value { int64 value = 1; }
message UInt64Value { uint64 value = 1; }
message Int32Value { int32 value = 1; }
message UInt32Value { uint32 value = 1; }
message BoolValue { bool value = 1; }
message StringValue { string value = 1; }
message BytesValue { bytes value = 1; }
"#;

const TIMESTAMP_PROTO: &str = r#"syntax = "proto3";

package google.protobuf;

message Timestamp {
  int64 seconds = 1;
  int32 nanos = 2;
}
"#;

const DURATION_PROTO: &str = r#"syntax = "proto3";

package google.protobuf;

message Duration {
  int64 seconds = 1;
  int32 nanos = 2;
}
"#;

const EMPTY_PROTO: &str = r#"syntax = "proto3";

package google.protobuf;

message Empty {}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_first_root_wins() {
        let provider = InMemory::new()
            .with_file("a/x.proto", "// from a")
            .with_file("b/x.proto", "// from b");
        let roots = [PathBuf::from("a"), PathBuf::from("b")];

        let found = locate(&provider, &roots, "x.proto").unwrap().unwrap();
        assert_eq!(found.text, "// from a");
        assert_eq!(found.path, Some(PathBuf::from("a/x.proto")));
    }

    #[test]
    fn test_builtin_fallback() {
        let provider = InMemory::new();
        let found = locate(&provider, &[], "google/protobuf/wrappers.proto")
            .unwrap()
            .unwrap();
        assert!(found.path.is_none());
        assert!(found.text.contains("Int32Value"));
    }

    #[test]
    fn test_search_root_shadows_builtin() {
        let provider = InMemory::new().with_file("google/protobuf/empty.proto", "// mine");
        let found = locate(&provider, &[], "google/protobuf/empty.proto")
            .unwrap()
            .unwrap();
        assert_eq!(found.text, "// mine");
    }

    #[test]
    fn test_missing_returns_none() {
        let provider = InMemory::new();
        assert!(locate(&provider, &[], "nope.proto").unwrap().is_none());
    }

    #[test]
    fn test_file_system_provider() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/a.proto"), "syntax = \"proto3\";").unwrap();

        let roots = [dir.path().to_path_buf()];
        let found = locate(&FileSystem, &roots, "pkg/a.proto").unwrap().unwrap();
        assert_eq!(found.name, "pkg/a.proto");
        assert!(found.text.starts_with("syntax"));
    }
}
