//! Renderer re-emitting the resolved schema as `.proto` text.
//!
//! The output is normalized: type references are fully qualified, options
//! are written back verbatim and every decision of the policy engine shows
//! up as a trailing `// ferrule:` comment, so the text still parses.

use super::{escape_string, header_comment, CodeRenderer, CodeWriter, RenderOptions};
use crate::descriptor::{ImportKind, OptionDecl, OptionValue, ProtoSyntax};
use crate::error::{Error, Result};
use crate::model::{
    Cardinality, FieldType, FileId, MessageOrigin, ResolvedEnum, ResolvedField, ResolvedFile,
    ResolvedMessage, ResolvedModel, ResolvedService,
};
use crate::policy::WireMetadata;
use crate::MAX_FIELD_NUMBER;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Renderer for the `proto` target
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoRenderer;

impl CodeRenderer for ProtoRenderer {
    fn target(&self) -> &'static str {
        "proto"
    }

    fn extension(&self) -> &'static str {
        "proto"
    }

    fn render_file(
        &self,
        model: &ResolvedModel,
        file: FileId,
        options: &RenderOptions,
    ) -> Result<String> {
        let file = model.file(file);
        let mut writer = ProtoWriter {
            model,
            syntax: file.syntax,
            out: CodeWriter::new(&options.indent),
        };
        if options.header {
            header_comment(&mut writer.out, file, "//");
        }
        writer.write_file(file)?;
        Ok(writer.out.finish())
    }
}

struct ProtoWriter<'a> {
    model: &'a ResolvedModel,
    syntax: ProtoSyntax,
    out: CodeWriter<'a>,
}

impl<'a> ProtoWriter<'a> {
    fn write_file(&mut self, file: &ResolvedFile) -> Result<()> {
        self.out
            .line(&format!("syntax = \"{}\";", file.syntax.as_str()));
        self.out.blank();

        if !file.package.is_empty() {
            self.out.line(&format!("package {};", file.package));
            self.out.blank();
        }

        self.write_options(&file.options);
        self.out.blank();

        for import in &file.imports {
            let modifier = match import.kind {
                ImportKind::Public => "public ",
                ImportKind::Weak => "weak ",
                ImportKind::Default => "",
            };
            self.out
                .line(&format!("import {modifier}\"{}\";", escape_string(&import.path)));
        }
        self.out.blank();

        for service in &file.services {
            self.write_service(service)?;
        }

        let model = self.model;
        for id in &file.messages {
            self.write_message(model.message(*id))?;
        }

        for id in &file.enums {
            self.write_enum(model.enumeration(*id));
        }

        self.write_extensions(&file.extensions)?;
        Ok(())
    }

    fn write_options(&mut self, options: &[OptionDecl]) {
        for option in options {
            self.out.line(&format!(
                "option {} = {};",
                option.name,
                option_literal(&option.value)
            ));
        }
    }

    fn write_service(&mut self, service: &ResolvedService) -> Result<()> {
        self.out.line(&format!("service {} {{", service.name));
        self.out.indent();
        self.write_options(&service.options);

        for method in &service.methods {
            let stream = |on: bool| if on { "stream " } else { "" };
            let signature = format!(
                "rpc {}({}{}) returns ({}{})",
                method.name,
                stream(method.client_streaming),
                self.type_ref(&method.input)?,
                stream(method.server_streaming),
                self.type_ref(&method.output)?,
            );
            if method.options.is_empty() {
                self.out.line(&format!("{signature};"));
            } else {
                self.out.line(&format!("{signature} {{"));
                self.out.indent();
                self.write_options(&method.options);
                self.out.close("}");
            }
        }

        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    fn write_message(&mut self, message: &ResolvedMessage) -> Result<()> {
        if message.origin != MessageOrigin::Declared {
            return Ok(());
        }
        self.out.line(&format!("message {} {{", message.name));
        self.out.indent();
        self.write_message_body(message)?;
        self.out.close("}");
        self.out.blank();
        Ok(())
    }

    fn write_message_body(&mut self, message: &ResolvedMessage) -> Result<()> {
        self.write_options(&message.options);
        self.write_reserved(message);

        let model = self.model;
        for id in &message.messages {
            self.write_message(model.message(*id))?;
        }
        for id in &message.enums {
            self.write_enum(model.enumeration(*id));
        }

        let mut oneofs_written = BTreeSet::new();
        for field in &message.fields {
            match field.oneof {
                Some(index) => {
                    if oneofs_written.insert(index) {
                        self.write_oneof(message, index)?;
                    }
                }
                None => self.write_field(field, true)?,
            }
        }

        self.write_extensions(&message.extensions)?;

        for range in &message.extension_ranges {
            self.out
                .line(&format!("extensions {};", field_range(range)));
        }
        Ok(())
    }

    fn write_reserved(&mut self, message: &ResolvedMessage) {
        if !message.reserved_ranges.is_empty() {
            let ranges: Vec<_> = message.reserved_ranges.iter().map(field_range).collect();
            self.out.line(&format!("reserved {};", ranges.join(", ")));
        }
        if !message.reserved_names.is_empty() {
            self.out
                .line(&format!("reserved {};", quoted_names(&message.reserved_names)));
        }
    }

    fn write_oneof(&mut self, message: &ResolvedMessage, index: usize) -> Result<()> {
        let oneof = &message.oneofs[index];
        self.out.line(&format!("oneof {} {{", oneof.name));
        self.out.indent();
        for field in oneof.fields.iter().map(|i| &message.fields[*i]) {
            self.write_field(field, false)?;
        }
        self.out.close("}");
        Ok(())
    }

    fn write_field(&mut self, field: &ResolvedField, labelled: bool) -> Result<()> {
        let label = if labelled { self.label(field) } else { "" };

        let model = self.model;
        if let FieldType::Message(id) = field.ty {
            let target = model.message(id);
            match target.origin {
                MessageOrigin::MapEntry => return self.write_map_field(field, target),
                MessageOrigin::Group => {
                    self.out.line(&format!(
                        "{label}group {} = {}{} {{",
                        target.name,
                        field.number,
                        field_options(&field.options)
                    ));
                    self.out.indent();
                    self.write_message_body(target)?;
                    self.out.close("}");
                    return Ok(());
                }
                MessageOrigin::NullWrapper { element } => {
                    self.out.line(&format!(
                        "{label}.{} {} = {}{}; // ferrule: data_format = group, supports_null, wrapper = {}",
                        model.message(element).full_name,
                        field.name,
                        field.number,
                        field_options(&field.options),
                        target.name
                    ));
                    return Ok(());
                }
                MessageOrigin::Declared => {}
            }
        }

        let mut line = format!(
            "{label}{} {} = {}{};",
            self.type_ref(&field.ty)?,
            field.name,
            field.number,
            field_options(&field.options)
        );
        if let Some(marker) = marker_comment(field) {
            line.push_str(" // ferrule: ");
            line.push_str(&marker);
        }
        self.out.line(&line);
        Ok(())
    }

    fn write_map_field(&mut self, field: &ResolvedField, entry: &ResolvedMessage) -> Result<()> {
        let (Some(key), Some(value)) = (entry.field_by_number(1), entry.field_by_number(2)) else {
            return Err(Error::internal(format!(
                "map entry for {} lacks its key or value",
                field.full_name
            )));
        };
        let mut line = format!(
            "map<{}, {}> {} = {}{};",
            self.type_ref(&key.ty)?,
            self.type_ref(&value.ty)?,
            field.name,
            field.number,
            field_options(&field.options)
        );
        if let Some(marker) = marker_comment(value) {
            line.push_str(" // ferrule: value ");
            line.push_str(&marker);
        }
        self.out.line(&line);
        Ok(())
    }

    fn label(&self, field: &ResolvedField) -> &'static str {
        match field.cardinality {
            Cardinality::Repeated => "repeated ",
            Cardinality::Required => "required ",
            Cardinality::Optional => "optional ",
            Cardinality::Singular => match self.syntax {
                ProtoSyntax::Proto2 => "optional ",
                ProtoSyntax::Proto3 => "",
            },
        }
    }

    fn type_ref(&self, ty: &FieldType) -> Result<String> {
        match ty {
            FieldType::Scalar(kind) => Ok(kind.as_str().to_string()),
            FieldType::Message(_) | FieldType::Enum(_) => {
                Ok(format!(".{}", self.model.type_name(ty)))
            }
            FieldType::Unresolved(name) => Err(Error::internal(format!(
                "cannot render unresolved type '{name}'"
            ))),
        }
    }

    fn write_extensions(&mut self, extensions: &[ResolvedField]) -> Result<()> {
        for extension in extensions {
            let Some(extendee) = extension.extendee else {
                continue;
            };
            self.out.line(&format!(
                "extend .{} {{",
                self.model.message(extendee).full_name
            ));
            self.out.indent();
            self.write_field(extension, true)?;
            self.out.close("}");
            self.out.blank();
        }
        Ok(())
    }

    fn write_enum(&mut self, e: &ResolvedEnum) {
        self.out.line(&format!("enum {} {{", e.name));
        self.out.indent();
        self.write_options(&e.options);

        if !e.reserved_ranges.is_empty() {
            let ranges: Vec<_> = e
                .reserved_ranges
                .iter()
                .map(|r| {
                    if r.start() == r.end() {
                        r.start().to_string()
                    } else if *r.end() == i32::MAX {
                        format!("{} to max", r.start())
                    } else {
                        format!("{} to {}", r.start(), r.end())
                    }
                })
                .collect();
            self.out.line(&format!("reserved {};", ranges.join(", ")));
        }
        if !e.reserved_names.is_empty() {
            self.out
                .line(&format!("reserved {};", quoted_names(&e.reserved_names)));
        }

        for value in &e.values {
            self.out.line(&format!(
                "{} = {}{};",
                value.name,
                value.number,
                field_options(&value.options)
            ));
        }

        self.out.close("}");
        self.out.blank();
    }
}

/// Trailing marker describing the field's wire metadata, if any
fn marker_comment(field: &ResolvedField) -> Option<String> {
    let effective = field.effective.describe();
    match field.wire {
        WireMetadata::Default | WireMetadata::Group => None,
        WireMetadata::NullWrapped(_) => Some(format!("null_wrapped ({effective})")),
        WireMetadata::CompatLevel(_, level) => {
            Some(format!("compat_level = {level} ({effective})"))
        }
        WireMetadata::WellKnownFormat(_) => Some(format!(
            "data_format = {} ({effective})",
            field.wire.data_format().as_str()
        )),
    }
}

fn field_range(range: &RangeInclusive<u32>) -> String {
    if range.start() == range.end() {
        range.start().to_string()
    } else if *range.end() == MAX_FIELD_NUMBER {
        format!("{} to max", range.start())
    } else {
        format!("{} to {}", range.start(), range.end())
    }
}

fn quoted_names(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn field_options(options: &[OptionDecl]) -> String {
    if options.is_empty() {
        return String::new();
    }
    let list: Vec<_> = options
        .iter()
        .map(|o| format!("{} = {}", o.name, option_literal(&o.value)))
        .collect();
    format!(" [{}]", list.join(", "))
}

fn option_literal(value: &OptionValue) -> String {
    match value {
        OptionValue::Bool(b) => b.to_string(),
        OptionValue::Int(i) => i.to_string(),
        OptionValue::UInt(u) => u.to_string(),
        OptionValue::Float(f) if f.is_infinite() => {
            if *f > 0.0 { "inf" } else { "-inf" }.to_string()
        }
        OptionValue::Float(f) if f.is_nan() => "nan".to_string(),
        OptionValue::Float(f) => format!("{f:?}"),
        OptionValue::String(s) => format!("\"{}\"", escape_string(s)),
        OptionValue::Ident(id) => id.clone(),
        OptionValue::Aggregate(text) => format!("{{ {text} }}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::descriptor::parse;
    use crate::graph::resolve_imports;
    use crate::model::build;
    use crate::render::{render_model, RenderOptions};
    use crate::source::InMemory;
    use pretty_assertions::assert_eq;

    fn render(text: &str, config: &CompilerConfig) -> String {
        let provider = InMemory::new().with_file("test.proto", text);
        let graph = resolve_imports(&provider, &[], "test.proto").unwrap();
        let out = build(&graph, config);
        assert!(!out.diagnostics.has_errors(), "{}", out.diagnostics);
        let options = RenderOptions {
            indent: "  ".to_string(),
            header: false,
        };
        render_model(&out.model, &ProtoRenderer, &options)
            .unwrap()
            .pop()
            .map(|unit| unit.text)
            .unwrap()
    }

    #[test]
    fn test_renders_normalized_schema() {
        let text = render(
            r#"
            syntax = "proto3";
            package shop;
            option go_package = "example.com/shop";
            message Order {
              reserved 4, 10 to max;
              reserved "legacy";
              message Line { string sku = 1; }
              repeated Line lines = 1;
              map<string, Line> by_sku = 2;
              optional int32 priority = 3 [deprecated = true];
              oneof payment {
                string card = 5;
                int64 voucher = 6;
              }
            }
            enum State { NEW = 0; DONE = 1; }
            service Orders {
              rpc Watch(Order) returns (stream Order);
            }
            "#,
            &CompilerConfig::default(),
        );
        assert_eq!(
            text,
            r#"syntax = "proto3";

package shop;

option go_package = "example.com/shop";

service Orders {
  rpc Watch(.shop.Order) returns (stream .shop.Order);
}

message Order {
  reserved 4, 10 to max;
  reserved "legacy";
  message Line {
    string sku = 1;
  }

  repeated .shop.Order.Line lines = 1;
  map<string, .shop.Order.Line> by_sku = 2;
  optional int32 priority = 3 [deprecated = true];
  oneof payment {
    string card = 5;
    int64 voucher = 6;
  }
}

enum State {
  NEW = 0;
  DONE = 1;
}
"#
        );
    }

    #[test]
    fn test_policy_markers_and_groups() {
        let config = CompilerConfig::default()
            .compat_level(false)
            .support_null("demo.Basket.items");
        let text = render(
            r#"
            syntax = "proto2";
            package demo;
            import "google/protobuf/wrappers.proto";
            import "google/protobuf/timestamp.proto";
            message Item { optional string name = 1; }
            message Basket {
              repeated Item items = 1;
              optional google.protobuf.BoolValue gift = 2;
              optional google.protobuf.Timestamp at = 3;
              optional group Note = 4 { optional string text = 5; }
            }
            "#,
            &config,
        );
        assert!(text.contains(
            "  repeated .demo.Item items = 1; // ferrule: data_format = group, supports_null, wrapper = NullWrappedItem\n"
        ));
        assert!(text.contains(
            "  optional .google.protobuf.BoolValue gift = 2; // ferrule: null_wrapped (nullable bool)\n"
        ));
        assert!(text.contains(
            "  optional .google.protobuf.Timestamp at = 3; // ferrule: data_format = well_known (nullable instant)\n"
        ));
        assert!(text.contains("  optional group Note = 4 {\n    optional string text = 5;\n  }\n"));
        assert!(!text.contains("message Note"));
    }

    #[test]
    fn test_output_parses_again() {
        let text = render(
            r#"
            syntax = "proto2";
            package p;
            message Base {
              extensions 100 to 199;
              optional string name = 1 [default = "a\"b"];
            }
            extend Base { optional int32 rank = 100; }
            enum E { option allow_alias = true; A = 0; B = 0; reserved 5 to 9; }
            "#,
            &CompilerConfig::default(),
        );
        assert!(text.contains("extensions 100 to 199;"));
        assert!(text.contains("extend .p.Base {\n  optional int32 rank = 100;\n}"));
        assert!(text.contains("optional string name = 1 [default = \"a\\\"b\"];"));

        let reparsed = parse("again.proto", &text);
        assert!(
            !reparsed.diagnostics.has_errors(),
            "{}",
            reparsed.diagnostics
        );
    }

    #[test]
    fn test_option_literal() {
        assert_eq!(option_literal(&OptionValue::Float(1.0)), "1.0");
        assert_eq!(option_literal(&OptionValue::Float(f64::NEG_INFINITY)), "-inf");
        assert_eq!(option_literal(&OptionValue::Ident("SPEED".into())), "SPEED");
        assert_eq!(
            option_literal(&OptionValue::Aggregate("a: 1".into())),
            "{ a: 1 }"
        );
    }
}
