//! Reference renderer emitting Rust source.
//!
//! Each schema becomes one Rust module file. Messages become structs whose
//! fields carry `#[proto(..)]` attributes with the tag and every wire marker
//! the policy engine decided on; nested declarations and oneof enums live in
//! a `pub mod` named after the message. Map entries and null-carrying
//! wrappers are wire artifacts and never appear as structs: maps become
//! `BTreeMap`s and null-carrying collections become `Vec<Option<T>>`.

use super::{escape_string, header_comment, CodeRenderer, CodeWriter, RenderOptions};
use crate::descriptor::{OptionValue, ScalarKind};
use crate::error::{Error, Result};
use crate::model::{
    Cardinality, EnumId, FieldType, FileId, MessageId, MessageOrigin, ResolvedEnum, ResolvedField,
    ResolvedFile, ResolvedMessage, ResolvedModel,
};
use crate::naming::{to_snake_case, to_upper_camel};
use crate::policy::{EffectiveType, NullableTemporal, WireMetadata};
use std::collections::BTreeSet;
use std::path::Path;

/// Renderer for the `rust` target
#[derive(Debug, Clone, Copy, Default)]
pub struct RustRenderer;

impl CodeRenderer for RustRenderer {
    fn target(&self) -> &'static str {
        "rust"
    }

    fn extension(&self) -> &'static str {
        "rs"
    }

    fn render_file(
        &self,
        model: &ResolvedModel,
        file: FileId,
        options: &RenderOptions,
    ) -> Result<String> {
        let file = model.file(file);
        let mut r = RustWriter {
            model,
            file,
            out: CodeWriter::new(&options.indent),
            modules: Vec::new(),
        };
        if options.header {
            header_comment(&mut r.out, file, "//");
        }
        for id in &file.messages {
            r.message(model.message(*id))?;
        }
        for id in &file.enums {
            r.enumeration(model.enumeration(*id));
        }
        Ok(r.out.finish())
    }
}

struct RustWriter<'a> {
    model: &'a ResolvedModel,
    file: &'a ResolvedFile,
    out: CodeWriter<'a>,
    /// Module path from the unit root to where we are writing
    modules: Vec<String>,
}

/// How a field is laid out in its struct
struct FieldShape {
    ty: String,
    attrs: Vec<String>,
    markers: Vec<String>,
}

impl<'a> RustWriter<'a> {
    fn message(&mut self, message: &ResolvedMessage) -> Result<()> {
        if matches!(
            message.origin,
            MessageOrigin::MapEntry | MessageOrigin::NullWrapper { .. }
        ) {
            return Ok(());
        }

        let name = type_ident(&message.name);
        if message.option("deprecated").and_then(OptionValue::as_bool) == Some(true) {
            self.out.line("#[deprecated]");
        }
        self.out.line("#[derive(Clone, PartialEq, Debug, Default)]");
        self.out
            .line(&format!("#[proto(name = \"{}\")]", message.full_name));
        self.out.line(&format!("pub struct {name} {{"));
        self.out.indent();

        let mut oneofs_written = BTreeSet::new();
        for field in &message.fields {
            match field.oneof {
                Some(index) => {
                    if oneofs_written.insert(index) {
                        self.oneof_field(message, index);
                    }
                }
                None => self.field(message, field)?,
            }
        }

        if message.is_extensible() {
            self.out.line("#[proto(extension_data)]");
            self.out.line(
                "pub extension_data: ::std::collections::BTreeMap<u32, ::std::vec::Vec<u8>>,",
            );
        }

        self.out.close("}");
        self.out.blank();

        if self.has_nested(message) {
            self.nested(message)?;
        }
        Ok(())
    }

    fn has_nested(&self, message: &ResolvedMessage) -> bool {
        !message.oneofs.is_empty()
            || !message.enums.is_empty()
            || message
                .messages
                .iter()
                .any(|id| !self.model.message(*id).origin.is_synthetic())
    }

    fn nested(&mut self, message: &ResolvedMessage) -> Result<()> {
        let module = module_ident(&message.name);
        self.out.line(&format!(
            "/// Nested declarations of [`{}`]",
            type_ident(&message.name)
        ));
        self.out.line(&format!("pub mod {module} {{"));
        self.out.indent();
        self.modules.push(module);

        for oneof in &message.oneofs {
            self.out.line("#[derive(Clone, PartialEq, Debug)]");
            self.out.line(&format!("pub enum {} {{", type_ident(&oneof.name)));
            self.out.indent();
            for field in oneof.fields.iter().map(|i| &message.fields[*i]) {
                let shape = self.shape(message, field)?;
                self.attributes(field.number, &shape);
                let inner = strip_option(&shape.ty);
                self.out
                    .line(&format!("{}({inner}),", type_ident(&field.name)));
            }
            self.out.close("}");
            self.out.blank();
        }

        let model = self.model;
        for id in &message.messages {
            self.message(model.message(*id))?;
        }
        for id in &message.enums {
            self.enumeration(model.enumeration(*id));
        }

        self.modules.pop();
        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    fn field(&mut self, message: &ResolvedMessage, field: &ResolvedField) -> Result<()> {
        let shape = self.shape(message, field)?;
        if field.deprecated {
            self.out.line("#[deprecated]");
        }
        self.attributes(field.number, &shape);
        self.out
            .line(&format!("pub {}: {},", field_ident(&field.name), shape.ty));
        Ok(())
    }

    fn attributes(&mut self, number: u32, shape: &FieldShape) {
        let mut attr = format!("tag = {number}");
        for extra in &shape.attrs {
            attr.push_str(", ");
            attr.push_str(extra);
        }
        self.out.line(&format!("#[proto({attr})]"));
        for marker in &shape.markers {
            self.out.line(&format!("#[proto({marker})]"));
        }
    }

    fn oneof_field(&mut self, message: &ResolvedMessage, index: usize) {
        let oneof = &message.oneofs[index];
        let path = format!(
            "{}::{}",
            module_ident(&message.name),
            type_ident(&oneof.name)
        );
        let tags = oneof
            .fields
            .iter()
            .map(|i| message.fields[*i].number.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.out
            .line(&format!("#[proto(oneof = \"{path}\", tags = \"{tags}\")]"));
        self.out.line(&format!(
            "pub {}: ::core::option::Option<{path}>,",
            field_ident(&oneof.name)
        ));
    }

    /// Works out the Rust type, the inline attribute parts and the separate
    /// marker attributes of a field
    fn shape(&self, message: &ResolvedMessage, field: &ResolvedField) -> Result<FieldShape> {
        let mut attrs = Vec::new();
        let mut markers = Vec::new();

        match field.wire {
            WireMetadata::Default => {}
            WireMetadata::NullWrapped(_) => markers.push("null_wrapped".to_string()),
            WireMetadata::CompatLevel(_, level) => markers.push(format!("compat_level = {level}")),
            WireMetadata::WellKnownFormat(_) => {
                attrs.push(format!("data_format = \"{}\"", field.wire.data_format().as_str()))
            }
            WireMetadata::Group => {
                attrs.push(format!("data_format = \"{}\"", field.wire.data_format().as_str()))
            }
        }

        if let FieldType::Message(id) = field.ty {
            let target = self.model.message(id);
            match target.origin {
                MessageOrigin::MapEntry => {
                    let (key, value) = map_entry_fields(target, &field.full_name)?;
                    attrs.push(format!(
                        "map = \"{}, {}\"",
                        self.model.type_name(&key.ty),
                        self.model.type_name(&value.ty)
                    ));
                    if let Some(marker) = value_marker(value.wire) {
                        attrs.push(marker);
                    }
                    let mut value_ty = self.element_type(message, value)?;
                    if value.effective.is_nullable() {
                        value_ty = format!("::core::option::Option<{value_ty}>");
                    }
                    return Ok(FieldShape {
                        ty: format!(
                            "::std::collections::BTreeMap<{}, {value_ty}>",
                            self.element_type(message, key)?
                        ),
                        attrs,
                        markers,
                    });
                }
                MessageOrigin::NullWrapper { element } => {
                    attrs.push("supports_null".to_string());
                    let element = self.message_path(element);
                    return Ok(FieldShape {
                        ty: format!(
                            "::std::vec::Vec<::core::option::Option<{element}>>"
                        ),
                        attrs,
                        markers,
                    });
                }
                MessageOrigin::Declared | MessageOrigin::Group => {}
            }
        }

        if let FieldType::Scalar(kind) = field.ty {
            if let Some(hint) = encoding_hint(kind) {
                attrs.push(format!("kind = \"{hint}\""));
            }
        }
        if let FieldType::Enum(id) = field.ty {
            attrs.push(format!(
                "enumeration = \"{}\"",
                self.enum_path(id)
            ));
        }
        if let Some(packed) = field.packed {
            attrs.push(format!("packed = {packed}"));
        }
        if let Some(default) = &field.default_value {
            attrs.push(format!("default = \"{}\"", escape_string(&default_text(default))));
        }

        let element = self.element_type(message, field)?;
        let recursive = matches!(field.ty, FieldType::Message(id) if self.contains(id, message.id));
        let ty = match field.cardinality {
            Cardinality::Repeated => format!("::std::vec::Vec<{element}>"),
            Cardinality::Required if recursive => format!("::std::boxed::Box<{element}>"),
            Cardinality::Required => element,
            Cardinality::Optional | Cardinality::Singular
                if recursive =>
            {
                format!("::core::option::Option<::std::boxed::Box<{element}>>")
            }
            Cardinality::Optional => format!("::core::option::Option<{element}>"),
            Cardinality::Singular => match field.effective {
                EffectiveType::Scalar(_) | EffectiveType::Enum(_) => element,
                _ => format!("::core::option::Option<{element}>"),
            },
        };

        Ok(FieldShape { ty, attrs, markers })
    }

    /// True if `inner` is `outer` or one of its enclosing messages, meaning a
    /// by-value field would make the struct infinitely sized
    fn contains(&self, inner: MessageId, outer: MessageId) -> bool {
        let mut cursor = Some(outer);
        while let Some(id) = cursor {
            if id == inner {
                return true;
            }
            cursor = self.model.message(id).parent;
        }
        false
    }

    /// Rust type of a single value of the field, before any `Option`/`Vec`
    fn element_type(&self, message: &ResolvedMessage, field: &ResolvedField) -> Result<String> {
        let ty = match field.effective {
            EffectiveType::Scalar(kind) => scalar_type(kind).to_string(),
            EffectiveType::NullableScalar(s) => scalar_type(s.scalar()).to_string(),
            EffectiveType::NullableTemporal(NullableTemporal::Instant) => {
                "::std::time::SystemTime".to_string()
            }
            // signed, unlike std's Duration
            EffectiveType::NullableTemporal(NullableTemporal::Duration) => {
                "::prost_types::Duration".to_string()
            }
            EffectiveType::Message(id) => self.message_path(id),
            EffectiveType::Enum(_) => "i32".to_string(),
            EffectiveType::Unresolved => {
                return Err(Error::internal(format!(
                    "field {} of {} has an unresolved type",
                    field.name, message.full_name
                )))
            }
        };
        Ok(ty)
    }

    fn message_path(&self, id: MessageId) -> String {
        let message = self.model.message(id);
        let (file, chain) = self.declaration_chain(message.file, message.parent);
        self.relative_path(file, &chain, &type_ident(&message.name))
    }

    fn enum_path(&self, id: EnumId) -> String {
        let e = self.model.enumeration(id);
        let (file, chain) = self.declaration_chain(e.file, e.parent);
        self.relative_path(file, &chain, &type_ident(&e.name))
    }

    /// Module names from the unit root down to a declaration's parent
    fn declaration_chain(&self, file: FileId, mut parent: Option<MessageId>) -> (FileId, Vec<String>) {
        let mut chain = Vec::new();
        while let Some(id) = parent {
            let message = self.model.message(id);
            chain.push(module_ident(&message.name));
            parent = message.parent;
        }
        chain.reverse();
        (file, chain)
    }

    fn relative_path(&self, file: FileId, chain: &[String], name: &str) -> String {
        let mut path = String::new();
        if file == self.file.id {
            let common = self
                .modules
                .iter()
                .zip(chain)
                .take_while(|(a, b)| a == b)
                .count();
            for _ in common..self.modules.len() {
                path.push_str("super::");
            }
            for module in &chain[common..] {
                path.push_str(module);
                path.push_str("::");
            }
        } else {
            for _ in 0..=self.modules.len() {
                path.push_str("super::");
            }
            path.push_str(&unit_module(&self.model.file(file).name));
            path.push_str("::");
            for module in chain {
                path.push_str(module);
                path.push_str("::");
            }
        }
        path.push_str(name);
        path
    }

    fn enumeration(&mut self, e: &ResolvedEnum) {
        let name = type_ident(&e.name);
        self.out.line("#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]");
        self.out.line(&format!("#[proto(name = \"{}\")]", e.full_name));
        self.out.line("#[repr(i32)]");
        self.out.line(&format!("pub enum {name} {{"));
        self.out.indent();

        let mut seen = BTreeSet::new();
        let mut aliases = Vec::new();
        for value in &e.values {
            let variant = variant_ident(&e.name, &value.name);
            if !seen.insert(value.number) {
                aliases.push((variant, value.number));
                continue;
            }
            if value.deprecated {
                self.out.line("#[deprecated]");
            }
            self.out.line(&format!("{variant} = {},", value.number));
        }
        self.out.close("}");
        self.out.blank();

        self.out.line(&format!("impl {name} {{"));
        self.out.indent();
        for (alias, number) in &aliases {
            let Some(original) = e.values.iter().find(|v| v.number == *number) else {
                continue;
            };
            self.out.line(&format!(
                "pub const {}: Self = Self::{};",
                to_snake_case(alias).to_ascii_uppercase(),
                variant_ident(&e.name, &original.name)
            ));
        }
        if !aliases.is_empty() {
            self.out.blank();
        }

        self.out.line("/// Name of the value as written in the schema");
        self.out.line("pub fn as_str_name(&self) -> &'static str {");
        self.out.indent();
        self.out.line("match self {");
        self.out.indent();
        let mut seen = BTreeSet::new();
        for value in &e.values {
            if seen.insert(value.number) {
                self.out.line(&format!(
                    "Self::{} => \"{}\",",
                    variant_ident(&e.name, &value.name),
                    value.name
                ));
            }
        }
        self.out.close("}");
        self.out.close("}");
        self.out.blank();

        self.out.line("/// Looks up a value by its schema name, aliases included");
        self.out
            .line("pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {");
        self.out.indent();
        self.out.line("match value {");
        self.out.indent();
        for value in &e.values {
            let target = e
                .values
                .iter()
                .find(|v| v.number == value.number)
                .unwrap_or(value);
            self.out.line(&format!(
                "\"{}\" => Some(Self::{}),",
                value.name,
                variant_ident(&e.name, &target.name)
            ));
        }
        self.out.line("_ => None,");
        self.out.close("}");
        self.out.close("}");
        self.out.close("}");
        self.out.blank();

        if let Some(first) = e.values.first() {
            self.out.line(&format!("impl Default for {name} {{"));
            self.out.indent();
            self.out.line("fn default() -> Self {");
            self.out.indent();
            self.out
                .line(&format!("Self::{}", variant_ident(&e.name, &first.name)));
            self.out.close("}");
            self.out.close("}");
            self.out.blank();
        }
    }
}

fn map_entry_fields<'m>(
    entry: &'m ResolvedMessage,
    field: &str,
) -> Result<(&'m ResolvedField, &'m ResolvedField)> {
    match (entry.field_by_number(1), entry.field_by_number(2)) {
        (Some(key), Some(value)) => Ok((key, value)),
        _ => Err(Error::internal(format!(
            "map entry for {field} lacks its key or value"
        ))),
    }
}

/// Wire marker of a map value, carried on the map field itself
fn value_marker(wire: WireMetadata) -> Option<String> {
    match wire {
        WireMetadata::Default => None,
        WireMetadata::NullWrapped(_) => Some("value_null_wrapped".to_string()),
        WireMetadata::CompatLevel(_, level) => Some(format!("value_compat_level = {level}")),
        WireMetadata::WellKnownFormat(_) | WireMetadata::Group => Some(format!(
            "value_data_format = \"{}\"",
            wire.data_format().as_str()
        )),
    }
}

fn scalar_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Double => "f64",
        ScalarKind::Float => "f32",
        ScalarKind::Int32 | ScalarKind::Sint32 | ScalarKind::Sfixed32 => "i32",
        ScalarKind::Int64 | ScalarKind::Sint64 | ScalarKind::Sfixed64 => "i64",
        ScalarKind::Uint32 | ScalarKind::Fixed32 => "u32",
        ScalarKind::Uint64 | ScalarKind::Fixed64 => "u64",
        ScalarKind::Bool => "bool",
        ScalarKind::String => "::std::string::String",
        ScalarKind::Bytes => "::std::vec::Vec<u8>",
    }
}

/// Scalars sharing a Rust type with a more common encoding need a hint
fn encoding_hint(kind: ScalarKind) -> Option<&'static str> {
    match kind {
        ScalarKind::Sint32
        | ScalarKind::Sint64
        | ScalarKind::Sfixed32
        | ScalarKind::Sfixed64
        | ScalarKind::Fixed32
        | ScalarKind::Fixed64 => Some(kind.as_str()),
        _ => None,
    }
}

fn default_text(value: &OptionValue) -> String {
    match value {
        OptionValue::Bool(b) => b.to_string(),
        OptionValue::Int(i) => i.to_string(),
        OptionValue::UInt(u) => u.to_string(),
        OptionValue::Float(f) => f.to_string(),
        OptionValue::String(s) | OptionValue::Ident(s) | OptionValue::Aggregate(s) => s.clone(),
    }
}

fn strip_option(ty: &str) -> &str {
    ty.strip_prefix("::core::option::Option<")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(ty)
}

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Identifiers that cannot be raw identifiers either
const RESERVED: &[&str] = &["crate", "self", "Self", "super"];

fn escape_ident(ident: String) -> String {
    if RESERVED.contains(&ident.as_str()) {
        format!("{ident}_")
    } else if KEYWORDS.contains(&ident.as_str()) {
        format!("r#{ident}")
    } else {
        ident
    }
}

fn type_ident(name: &str) -> String {
    escape_ident(to_upper_camel(name))
}

fn field_ident(name: &str) -> String {
    escape_ident(to_snake_case(name))
}

fn module_ident(name: &str) -> String {
    escape_ident(to_snake_case(name))
}

/// Module a unit is expected to be mounted as: its file stem
fn unit_module(schema: &str) -> String {
    let stem = Path::new(schema)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(schema);
    module_ident(&stem.replace(['-', '.'], "_"))
}

/// Enum variant name with a leading `ENUM_NAME_` prefix dropped
fn variant_ident(enum_name: &str, value: &str) -> String {
    let prefix = format!("{}_", to_snake_case(enum_name).to_ascii_uppercase());
    let stripped = value
        .strip_prefix(&prefix)
        .filter(|rest| rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
        .unwrap_or(value);
    type_ident(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph::resolve_imports;
    use crate::model::build;
    use crate::render::{render_model, RenderOptions};
    use crate::source::InMemory;
    use pretty_assertions::assert_eq;

    fn render(files: &[(&str, &str)], entry: &str, config: &CompilerConfig) -> Vec<(String, String)> {
        let mut provider = InMemory::new();
        for (name, text) in files {
            provider.insert(*name, *text);
        }
        let graph = resolve_imports(&provider, &[], entry).unwrap();
        let out = build(&graph, config);
        assert!(!out.diagnostics.has_errors(), "{}", out.diagnostics);
        let options = RenderOptions {
            header: false,
            ..RenderOptions::default()
        };
        render_model(&out.model, &RustRenderer, &options)
            .unwrap()
            .into_iter()
            .map(|u| (u.name, u.text))
            .collect()
    }

    fn render_one(text: &str, config: &CompilerConfig) -> String {
        let units = render(&[("test.proto", text)], "test.proto", config);
        units
            .into_iter()
            .find(|(name, _)| name == "test.rs")
            .map(|(_, text)| text)
            .unwrap()
    }

    #[test]
    fn test_wrapper_and_temporal_markers() {
        let schema = r#"
            syntax = "proto3";
            package demo;
            import "google/protobuf/wrappers.proto";
            import "google/protobuf/timestamp.proto";
            message Event {
              google.protobuf.Int32Value count = 1;
              google.protobuf.Timestamp at = 2;
            }
        "#;
        let text = render_one(schema, &CompilerConfig::default());
        assert_eq!(
            text,
            r#"#[derive(Clone, PartialEq, Debug, Default)]
#[proto(name = "demo.Event")]
pub struct Event {
    #[proto(tag = 1)]
    #[proto(null_wrapped)]
    pub count: ::core::option::Option<i32>,
    #[proto(tag = 2)]
    #[proto(compat_level = 300)]
    pub at: ::core::option::Option<::std::time::SystemTime>,
}
"#
        );

        let text = render_one(schema, &CompilerConfig::default().compat_level(false));
        assert!(text.contains(
            "    #[proto(tag = 2, data_format = \"well_known\")]\n    pub at: ::core::option::Option<::std::time::SystemTime>,"
        ));
        assert!(!text.contains("compat_level"));
    }

    #[test]
    fn test_durations_are_signed() {
        let text = render_one(
            r#"
            syntax = "proto3";
            import "google/protobuf/duration.proto";
            message Timer { google.protobuf.Duration offset = 1; }
            "#,
            &CompilerConfig::default(),
        );
        assert!(text.contains("pub offset: ::core::option::Option<::prost_types::Duration>,"));
        assert!(!text.contains("::std::time::Duration"));
    }

    #[test]
    fn test_map_value_markers() {
        let schema = r#"
            syntax = "proto3";
            import "google/protobuf/wrappers.proto";
            import "google/protobuf/timestamp.proto";
            message Sheet {
              map<string, google.protobuf.Int32Value> vals = 1;
              map<int32, google.protobuf.Timestamp> stamps = 2;
            }
        "#;
        let text = render_one(schema, &CompilerConfig::default());
        assert!(text.contains(
            "#[proto(tag = 1, map = \"string, google.protobuf.Int32Value\", value_null_wrapped)]"
        ));
        assert!(text.contains(
            "#[proto(tag = 2, map = \"int32, google.protobuf.Timestamp\", value_compat_level = 300)]"
        ));

        let text = render_one(schema, &CompilerConfig::default().compat_level(false));
        assert!(text.contains(
            "#[proto(tag = 2, map = \"int32, google.protobuf.Timestamp\", value_data_format = \"well_known\")]"
        ));
        assert!(!text.contains("compat_level"));

        let text = render_one(schema, &CompilerConfig::default().null_wrappers(false));
        assert!(!text.contains("value_null_wrapped"));
    }

    #[test]
    fn test_wrappers_disabled_keep_message_type() {
        let text = render_one(
            r#"
            syntax = "proto3";
            import "google/protobuf/wrappers.proto";
            message Event { google.protobuf.StringValue label = 1; }
            "#,
            &CompilerConfig::default().null_wrappers(false),
        );
        assert!(text.contains("pub label: ::core::option::Option<super::wrappers::StringValue>,"));
        assert!(!text.contains("null_wrapped"));
    }

    #[test]
    fn test_nested_oneof_and_map() {
        let text = render_one(
            r#"
            syntax = "proto3";
            package shop;
            message Order {
              message Line { string sku = 1; sint64 delta = 2; }
              enum State { STATE_NEW = 0; STATE_DONE = 1; }
              repeated Line lines = 1;
              map<string, int32> counts = 2;
              State state = 3;
              oneof payment {
                string card = 4;
                Line voucher = 5;
              }
            }
            "#,
            &CompilerConfig::default(),
        );
        assert!(text.contains("    #[proto(tag = 1)]\n    pub lines: ::std::vec::Vec<order::Line>,"));
        assert!(text.contains(
            "    #[proto(tag = 2, map = \"string, int32\")]\n    pub counts: ::std::collections::BTreeMap<::std::string::String, i32>,"
        ));
        assert!(text.contains("#[proto(tag = 3, enumeration = \"order::State\")]\n    pub state: i32,"));
        assert!(text.contains("#[proto(oneof = \"order::Payment\", tags = \"4, 5\")]\n    pub payment: ::core::option::Option<order::Payment>,"));
        assert!(text.contains("pub mod order {"));
        assert!(text.contains("        Voucher(Line),"));
        assert!(text.contains("        #[proto(tag = 2, kind = \"sint64\")]\n        pub delta: i64,"));
        assert!(text.contains("        New = 0,\n        Done = 1,"));
        assert!(!text.contains("CountsEntry"));
    }

    #[test]
    fn test_null_carrying_collection() {
        let config = CompilerConfig::default().support_null("demo.Basket.items");
        let text = render_one(
            r#"
            syntax = "proto3";
            package demo;
            message Item { string name = 1; }
            message Basket { repeated Item items = 1; }
            "#,
            &config,
        );
        assert!(text.contains(
            "    #[proto(tag = 1, data_format = \"group\", supports_null)]\n    pub items: ::std::vec::Vec<::core::option::Option<Item>>,"
        ));
        assert!(!text.contains("NullWrapped"));
    }

    #[test]
    fn test_extension_storage_and_groups() {
        let text = render_one(
            r#"
            syntax = "proto2";
            message Node {
              optional Node next = 1;
              optional group Meta = 2 { optional string note = 3; }
              extensions 100 to max;
            }
            "#,
            &CompilerConfig::default(),
        );
        assert!(text.contains("pub next: ::core::option::Option<::std::boxed::Box<Node>>,"));
        assert!(text.contains(
            "    #[proto(tag = 2, data_format = \"group\")]\n    pub meta: ::core::option::Option<node::Meta>,"
        ));
        assert!(text.contains(
            "    #[proto(extension_data)]\n    pub extension_data: ::std::collections::BTreeMap<u32, ::std::vec::Vec<u8>>,"
        ));
    }

    #[test]
    fn test_enum_aliases_and_keywords() {
        let text = render_one(
            r#"
            syntax = "proto3";
            enum Mode {
              option allow_alias = true;
              MODE_OFF = 0;
              MODE_ON = 1;
              MODE_ENABLED = 1;
            }
            message Keywords { string type = 1; int32 self = 2; }
            "#,
            &CompilerConfig::default(),
        );
        assert!(text.contains("    Off = 0,\n    On = 1,\n}"));
        assert!(text.contains("pub const ENABLED: Self = Self::On;"));
        assert!(text.contains("\"MODE_ENABLED\" => Some(Self::On),"));
        assert!(text.contains("pub r#type: ::std::string::String,"));
        assert!(text.contains("pub self_: i32,"));
    }

    #[test]
    fn test_cross_file_paths() {
        let units = render(
            &[
                ("common.proto", "syntax = \"proto3\"; package c; message Money { int64 cents = 1; }"),
                (
                    "order.proto",
                    "syntax = \"proto3\"; package o; import \"common.proto\"; message Order { c.Money total = 1; }",
                ),
            ],
            "order.proto",
            &CompilerConfig::default(),
        );
        let names: Vec<_> = units.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["common.rs", "order.rs"]);
        assert!(units[1].1.contains("pub total: ::core::option::Option<super::common::Money>,"));
    }

    #[test]
    fn test_variant_ident() {
        assert_eq!(variant_ident("State", "STATE_NEW"), "New");
        assert_eq!(variant_ident("State", "ACTIVE"), "Active");
        assert_eq!(variant_ident("PhoneType", "PHONE_TYPE_MOBILE"), "Mobile");
        assert_eq!(variant_ident("Level", "LEVEL_1"), "Level1");
    }
}
