//! Code rendering contract.
//!
//! A [`CodeRenderer`] turns one file of a frozen [`ResolvedModel`] into
//! source text. [`render_model`] drives a renderer over every file in
//! dependency order and names each [`GeneratedUnit`] after the schema's base
//! name with the renderer's extension.
//!
//! ## Extensibility
//!
//! Renderers are selected by target identifier through a
//! [`RendererRegistry`]. The [`ModelVisitor`] trait gives tools that do not
//! emit source (documentation generators, linters) the same traversal order.

mod proto;
mod rust;
mod visitor;

use crate::config::CompilerConfig;
use crate::error::{Error, Result};
use crate::model::{FileId, ResolvedFile, ResolvedModel};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use tracing::{debug, trace};

pub use proto::ProtoRenderer;
pub use rust::RustRenderer;
pub use visitor::{walk, ModelStats, ModelVisitor};

/// Renderer option holding the indentation width in spaces
pub const OPT_INDENT: &str = "indent";

/// Renderer option toggling the "generated file" header comment
pub const OPT_HEADER: &str = "header";

/// One generated source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    /// Output file name: schema base name plus the target extension
    pub name: String,
    /// Import-style name of the schema the unit was generated from
    pub source: String,
    /// Generated text
    pub text: String,
}

/// Options every renderer understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Indentation string (default: 4 spaces)
    pub indent: String,
    /// Emit a header comment naming the source schema
    pub header: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            indent: "    ".to_string(),
            header: true,
        }
    }
}

impl RenderOptions {
    /// Reads the renderer options out of a compiler config.
    ///
    /// Keys the renderers do not know are ignored.
    pub fn from_config(config: &CompilerConfig) -> Result<Self> {
        let mut options = Self::default();
        if let Some(value) = config.render_options.get(OPT_INDENT) {
            let width: usize = value
                .trim()
                .parse()
                .map_err(|_| Error::invalid_option(OPT_INDENT, value, "expected a number of spaces"))?;
            if width > 16 {
                return Err(Error::invalid_option(OPT_INDENT, value, "at most 16 spaces"));
            }
            options.indent = " ".repeat(width);
        }
        if let Some(value) = config.render_options.get(OPT_HEADER) {
            options.header = match value.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => return Err(Error::invalid_option(OPT_HEADER, value, "expected a boolean")),
            };
        }
        Ok(options)
    }
}

/// A target-language renderer.
///
/// Implementations must be pure: the same model, file and options always
/// produce the same text.
pub trait CodeRenderer: Send + Sync {
    /// Identifier the renderer is selected by
    fn target(&self) -> &'static str;

    /// Source file extension, without the dot
    fn extension(&self) -> &'static str;

    /// Renders one file of the model
    fn render_file(
        &self,
        model: &ResolvedModel,
        file: FileId,
        options: &RenderOptions,
    ) -> Result<String>;
}

/// Renderers keyed by target identifier
pub struct RendererRegistry {
    renderers: BTreeMap<&'static str, Box<dyn CodeRenderer>>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("targets", &self.targets())
            .finish()
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(RustRenderer);
        registry.register(ProtoRenderer);
        registry
    }
}

impl RendererRegistry {
    /// Registry with the built-in renderers
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with no renderers at all
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// Adds a renderer, replacing any other with the same target
    pub fn register(&mut self, renderer: impl CodeRenderer + 'static) {
        self.renderers.insert(renderer.target(), Box::new(renderer));
    }

    /// Looks up a renderer by target identifier
    pub fn get(&self, target: &str) -> Result<&dyn CodeRenderer> {
        self.renderers
            .get(target)
            .map(|r| &**r)
            .ok_or_else(|| Error::UnknownTarget(target.to_string()))
    }

    /// Registered target identifiers, sorted
    pub fn targets(&self) -> Vec<&'static str> {
        self.renderers.keys().copied().collect()
    }
}

/// Renders every file of the model, in dependency order
pub fn render_model(
    model: &ResolvedModel,
    renderer: &dyn CodeRenderer,
    options: &RenderOptions,
) -> Result<Vec<GeneratedUnit>> {
    let mut units = Vec::with_capacity(model.files().len());
    for file in model.files() {
        let text = renderer.render_file(model, file.id, options)?;
        let name = unit_name(&file.name, renderer.extension());
        trace!(unit = %name, bytes = text.len(), "rendered unit");
        units.push(GeneratedUnit {
            name,
            source: file.name.clone(),
            text,
        });
    }
    debug!(
        target_language = renderer.target(),
        units = units.len(),
        "rendering complete"
    );
    Ok(units)
}

/// Output name for a schema: its base name with the extension swapped
pub fn unit_name(schema: &str, extension: &str) -> String {
    let stem = Path::new(schema)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(schema);
    format!("{stem}.{extension}")
}

pub(crate) fn header_comment(out: &mut CodeWriter<'_>, file: &ResolvedFile, prefix: &str) {
    out.line(&format!("{prefix} Generated by ferrule from {}. Do not edit.", file.name));
    out.blank();
}

/// Indentation-aware text sink shared by the renderers
pub(crate) struct CodeWriter<'a> {
    out: String,
    indent_str: &'a str,
    indent_level: usize,
}

impl<'a> CodeWriter<'a> {
    pub(crate) fn new(indent_str: &'a str) -> Self {
        Self {
            out: String::new(),
            indent_str,
            indent_level: 0,
        }
    }

    pub(crate) fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub(crate) fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// Writes one indented line
    pub(crate) fn line(&mut self, s: &str) {
        for _ in 0..self.indent_level {
            self.out.push_str(self.indent_str);
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    /// Writes an empty line, collapsing runs of them
    pub(crate) fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") && !self.out.ends_with("{\n") {
            self.out.push('\n');
        }
    }

    /// Drops a trailing blank line before a closing brace
    pub(crate) fn close(&mut self, s: &str) {
        while self.out.ends_with("\n\n") {
            self.out.pop();
        }
        self.dedent();
        self.line(s);
    }

    pub(crate) fn finish(mut self) -> String {
        while self.out.ends_with("\n\n") {
            self.out.pop();
        }
        self.out
    }
}

impl FmtWrite for CodeWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.out.push_str(s);
        Ok(())
    }
}

/// Escape a string for a double-quoted literal
pub(crate) fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                let _ = write!(result, "\\x{:02x}", c as u8);
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unit_name() {
        assert_eq!(unit_name("shop/order.proto", "rs"), "order.rs");
        assert_eq!(unit_name("order.proto", "proto"), "order.proto");
        assert_eq!(unit_name("noext", "rs"), "noext.rs");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RendererRegistry::default();
        assert_eq!(registry.targets(), vec!["proto", "rust"]);
        assert_eq!(registry.get("rust").unwrap().extension(), "rs");
        assert!(matches!(
            registry.get("cobol"),
            Err(Error::UnknownTarget(t)) if t == "cobol"
        ));
    }

    #[test]
    fn test_render_options_from_config() {
        let config = CompilerConfig::default()
            .render_option("indent", "2")
            .render_option("header", "off")
            .render_option("unrelated", "x");
        let options = RenderOptions::from_config(&config).unwrap();
        assert_eq!(options.indent, "  ");
        assert!(!options.header);

        let bad = CompilerConfig::default().render_option("indent", "wide");
        assert!(matches!(
            RenderOptions::from_config(&bad),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("hello"), "hello");
        assert_eq!(escape_string("hello\\world"), "hello\\\\world");
        assert_eq!(escape_string("hello\"world"), "hello\\\"world");
        assert_eq!(escape_string("hello\nworld"), "hello\\nworld");
        assert_eq!(escape_string("\u{1}"), "\\x01");
    }

    #[test]
    fn test_code_writer_collapses_blank_lines() {
        let mut out = CodeWriter::new("  ");
        out.line("a {");
        out.indent();
        out.blank();
        out.line("b;");
        out.blank();
        out.blank();
        out.close("}");
        assert_eq!(out.finish(), "a {\n  b;\n}\n");
    }
}
