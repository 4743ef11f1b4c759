//! Import graph resolution.
//!
//! Starting from an entry schema, follows `import` statements depth-first,
//! parsing each file exactly once, and produces the files in dependency order:
//! every file appears after everything it imports. Ties are broken by
//! discovery order (depth-first, left to right in declaration order).
//!
//! Missing files and cycles are fatal; syntax errors are not. They travel
//! with each [`ParsedFile`] and are merged by [`ImportGraph::diagnostics`].

use crate::descriptor::{self, ParsedFile};
use crate::diagnostic::Diagnostics;
use crate::error::{Error, Result};
use crate::source::{locate, SourceProvider};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Parsed schema files of one compilation, topologically sorted
#[derive(Debug, Clone)]
pub struct ImportGraph {
    entry: String,
    files: Vec<ParsedFile>,
}

impl ImportGraph {
    /// Import-style name of the entry file
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Files in dependency order
    pub fn files(&self) -> &[ParsedFile] {
        &self.files
    }

    /// File names in dependency order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.file.name.as_str())
    }

    /// All syntax diagnostics, file by file in dependency order
    pub fn diagnostics(&self) -> Diagnostics {
        let mut all = Diagnostics::new();
        for file in &self.files {
            all.extend(file.diagnostics.clone());
        }
        all
    }
}

/// Resolves the transitive imports of `entry` against `roots`.
///
/// Fails with [`Error::SchemaNotFound`] when the entry itself is missing,
/// [`Error::UnresolvedImport`] when an import is missing and
/// [`Error::CyclicImport`] when a file is reached again while still being
/// resolved. Each failure aborts the whole graph.
pub fn resolve_imports(
    provider: &dyn SourceProvider,
    roots: &[PathBuf],
    entry: &str,
) -> Result<ImportGraph> {
    let entry = normalize(entry);
    let mut walker = Walker {
        provider,
        roots,
        in_progress: Vec::new(),
        done: BTreeSet::new(),
        order: Vec::new(),
    };
    walker.visit(&entry, None)?;
    debug!(
        "Resolved import graph for {}: {} file(s)",
        entry,
        walker.order.len()
    );
    Ok(ImportGraph {
        entry,
        files: walker.order,
    })
}

/// Import names always use forward slashes
fn normalize(name: &str) -> String {
    name.replace('\\', "/")
}

struct Walker<'a> {
    provider: &'a dyn SourceProvider,
    roots: &'a [PathBuf],
    /// Files currently being resolved, in discovery order
    in_progress: Vec<String>,
    done: BTreeSet<String>,
    order: Vec<ParsedFile>,
}

impl Walker<'_> {
    fn visit(&mut self, name: &str, importer: Option<&str>) -> Result<()> {
        if self.done.contains(name) {
            return Ok(());
        }
        if let Some(start) = self.in_progress.iter().position(|n| n == name) {
            return Err(Error::CyclicImport {
                cycle: self.in_progress[start..].to_vec(),
            });
        }

        let located = locate(self.provider, self.roots, name)?.ok_or_else(|| match importer {
            Some(importer) => Error::unresolved_import(name, importer),
            None => Error::schema_not_found(name, self.roots),
        })?;
        trace!(
            "Loading {} from {}",
            name,
            located
                .path
                .as_ref()
                .map_or_else(|| "<builtin>".to_string(), |p| p.display().to_string())
        );

        let parsed = descriptor::parse(name, &located.text);
        let imports: Vec<String> = parsed
            .file
            .imports
            .iter()
            .map(|i| normalize(&i.path))
            .collect();

        self.in_progress.push(name.to_string());
        for import in &imports {
            self.visit(import, Some(name))?;
        }
        self.in_progress.pop();

        self.done.insert(name.to_string());
        self.order.push(parsed);
        Ok(())
    }
}
