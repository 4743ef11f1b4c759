//! Canonical snapshot of a resolved model.
//!
//! The snapshot is pretty-printed JSON with a fixed key order: files in
//! dependency order, declarations in declaration order, synthetic messages
//! after the declared ones they belong to. Empty collections and unset
//! values are omitted. Two runs over the same inputs and switches produce
//! byte-identical snapshots.

use crate::descriptor::{ImportKind, OptionDecl, OptionValue, ProtoSyntax};
use crate::error::{Error, Result};
use crate::model::{
    Cardinality, EnumId, MessageId, MessageOrigin, ResolvedField, ResolvedFile, ResolvedModel,
};
use crate::policy::DataFormat;
use serde::Serialize;

/// Serializes the model to its canonical JSON form
pub fn to_json(model: &ResolvedModel) -> Result<String> {
    let snapshot = Snapshot::of(model);
    let mut text = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| Error::internal(format!("failed to serialize snapshot: {e}")))?;
    text.push('\n');
    Ok(text)
}

#[derive(Serialize)]
struct Snapshot<'m> {
    files: Vec<FileSnapshot<'m>>,
}

#[derive(Serialize)]
struct FileSnapshot<'m> {
    name: &'m str,
    #[serde(skip_serializing_if = "str::is_empty")]
    package: &'m str,
    syntax: &'static str,
    compatibility_level: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    imports: Vec<ImportSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<OptionSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<MessageSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enums: Vec<EnumSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    services: Vec<ServiceSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<FieldSnapshot<'m>>,
}

#[derive(Serialize)]
struct ImportSnapshot<'m> {
    path: &'m str,
    #[serde(skip_serializing_if = "is_default_import")]
    kind: ImportKind,
}

#[derive(Serialize)]
struct OptionSnapshot<'m> {
    name: &'m str,
    value: &'m OptionValue,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum OriginSnapshot {
    Declared,
    Group,
    MapEntry,
    NullWrapper { element: String },
}

#[derive(Serialize)]
struct MessageSnapshot<'m> {
    name: &'m str,
    full_name: &'m str,
    #[serde(skip_serializing_if = "is_declared")]
    origin: OriginSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    oneofs: Vec<&'m str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<MessageSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enums: Vec<EnumSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extensions: Vec<FieldSnapshot<'m>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reserved_ranges: Vec<[u32; 2]>,
    #[serde(skip_serializing_if = "no_names")]
    reserved_names: &'m [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    extension_ranges: Vec<[u32; 2]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<OptionSnapshot<'m>>,
}

#[derive(Serialize)]
struct FieldSnapshot<'m> {
    name: &'m str,
    number: u32,
    cardinality: Cardinality,
    #[serde(rename = "type")]
    type_name: String,
    effective_type: String,
    #[serde(skip_serializing_if = "is_default_format")]
    data_format: DataFormat,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    null_wrapped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    compat_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    oneof: Option<&'m str>,
    json_name: &'m str,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<&'m OptionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packed: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    extendee: Option<&'m str>,
}

#[derive(Serialize)]
struct EnumSnapshot<'m> {
    name: &'m str,
    full_name: &'m str,
    values: Vec<EnumValueSnapshot<'m>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    allow_alias: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reserved_ranges: Vec<[i32; 2]>,
    #[serde(skip_serializing_if = "no_names")]
    reserved_names: &'m [String],
}

#[derive(Serialize)]
struct EnumValueSnapshot<'m> {
    name: &'m str,
    number: i32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    deprecated: bool,
}

#[derive(Serialize)]
struct ServiceSnapshot<'m> {
    name: &'m str,
    full_name: &'m str,
    methods: Vec<MethodSnapshot<'m>>,
}

#[derive(Serialize)]
struct MethodSnapshot<'m> {
    name: &'m str,
    input: String,
    output: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    client_streaming: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    server_streaming: bool,
}

fn is_default_import(kind: &ImportKind) -> bool {
    *kind == ImportKind::Default
}

fn is_declared(origin: &OriginSnapshot) -> bool {
    matches!(origin, OriginSnapshot::Declared)
}

fn no_names(names: &&[String]) -> bool {
    names.is_empty()
}

fn is_default_format(format: &DataFormat) -> bool {
    *format == DataFormat::Default
}

fn options(options: &[OptionDecl]) -> Vec<OptionSnapshot<'_>> {
    options
        .iter()
        .map(|o| OptionSnapshot {
            name: &o.name,
            value: &o.value,
        })
        .collect()
}

impl<'m> Snapshot<'m> {
    fn of(model: &'m ResolvedModel) -> Self {
        Self {
            files: model.files().iter().map(|f| file(model, f)).collect(),
        }
    }
}

fn file<'m>(model: &'m ResolvedModel, f: &'m ResolvedFile) -> FileSnapshot<'m> {
    FileSnapshot {
        name: &f.name,
        package: &f.package,
        syntax: match f.syntax {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        },
        compatibility_level: f.compatibility_level.0,
        imports: f
            .imports
            .iter()
            .map(|i| ImportSnapshot {
                path: &i.path,
                kind: i.kind,
            })
            .collect(),
        options: options(&f.options),
        messages: f.messages.iter().map(|id| message(model, *id)).collect(),
        enums: f.enums.iter().map(|id| enumeration(model, *id)).collect(),
        services: f
            .services
            .iter()
            .map(|s| ServiceSnapshot {
                name: &s.name,
                full_name: &s.full_name,
                methods: s
                    .methods
                    .iter()
                    .map(|m| MethodSnapshot {
                        name: &m.name,
                        input: model.type_name(&m.input),
                        output: model.type_name(&m.output),
                        client_streaming: m.client_streaming,
                        server_streaming: m.server_streaming,
                    })
                    .collect(),
            })
            .collect(),
        extensions: f.extensions.iter().map(|x| field(model, x, None)).collect(),
    }
}

fn message(model: &ResolvedModel, id: MessageId) -> MessageSnapshot<'_> {
    let m = model.message(id);
    MessageSnapshot {
        name: &m.name,
        full_name: &m.full_name,
        origin: match m.origin {
            MessageOrigin::Declared => OriginSnapshot::Declared,
            MessageOrigin::Group => OriginSnapshot::Group,
            MessageOrigin::MapEntry => OriginSnapshot::MapEntry,
            MessageOrigin::NullWrapper { element } => OriginSnapshot::NullWrapper {
                element: model.message(element).full_name.clone(),
            },
        },
        fields: m
            .fields
            .iter()
            .map(|f| field(model, f, f.oneof.map(|i| m.oneofs[i].name.as_str())))
            .collect(),
        oneofs: m.oneofs.iter().map(|o| o.name.as_str()).collect(),
        messages: m.messages.iter().map(|id| message(model, *id)).collect(),
        enums: m.enums.iter().map(|id| enumeration(model, *id)).collect(),
        extensions: m.extensions.iter().map(|x| field(model, x, None)).collect(),
        reserved_ranges: m.reserved_ranges.iter().map(|r| [*r.start(), *r.end()]).collect(),
        reserved_names: &m.reserved_names,
        extension_ranges: m.extension_ranges.iter().map(|r| [*r.start(), *r.end()]).collect(),
        options: options(&m.options),
    }
}

fn field<'m>(
    model: &'m ResolvedModel,
    f: &'m ResolvedField,
    oneof: Option<&'m str>,
) -> FieldSnapshot<'m> {
    FieldSnapshot {
        name: &f.name,
        number: f.number,
        cardinality: f.cardinality,
        type_name: model.type_name(&f.ty),
        effective_type: model.describe_effective(&f.effective),
        data_format: f.wire.data_format(),
        null_wrapped: f.wire.is_null_wrapped(),
        compat_level: f.wire.required_compat_level().map(|l| l.0),
        oneof,
        json_name: &f.json_name,
        default: f.default_value.as_ref(),
        packed: f.packed,
        deprecated: f.deprecated,
        extendee: f.extendee.map(|id| model.message(id).full_name.as_str()),
    }
}

fn enumeration(model: &ResolvedModel, id: EnumId) -> EnumSnapshot<'_> {
    let e = model.enumeration(id);
    EnumSnapshot {
        name: &e.name,
        full_name: &e.full_name,
        values: e
            .values
            .iter()
            .map(|v| EnumValueSnapshot {
                name: &v.name,
                number: v.number,
                deprecated: v.deprecated,
            })
            .collect(),
        allow_alias: e.allow_alias,
        reserved_ranges: e.reserved_ranges.iter().map(|r| [*r.start(), *r.end()]).collect(),
        reserved_names: &e.reserved_names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph::resolve_imports;
    use crate::model::build;
    use crate::source::InMemory;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package demo;
        import "google/protobuf/wrappers.proto";
        import "google/protobuf/timestamp.proto";
        message Event {
          google.protobuf.StringValue label = 1;
          google.protobuf.Timestamp at = 2;
          map<string, int32> counts = 3;
        }
    "#;

    fn snapshot(config: &CompilerConfig) -> String {
        let provider = InMemory::new().with_file("demo.proto", SCHEMA);
        let graph = resolve_imports(&provider, &[], "demo.proto").unwrap();
        let out = build(&graph, config);
        assert!(!out.diagnostics.has_errors(), "{}", out.diagnostics);
        to_json(&out.model).unwrap()
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let config = CompilerConfig::default();
        assert_eq!(snapshot(&config), snapshot(&config));
    }

    #[test]
    fn test_snapshot_records_wire_metadata() {
        let json: serde_json::Value =
            serde_json::from_str(&snapshot(&CompilerConfig::default())).unwrap();
        let files = json["files"].as_array().unwrap();
        let demo = files.last().unwrap();
        assert_eq!(demo["name"], "demo.proto");
        assert_eq!(demo["compatibility_level"], 300);

        let fields = &demo["messages"][0]["fields"];
        assert_eq!(fields[0]["effective_type"], "nullable string");
        assert_eq!(fields[0]["null_wrapped"], true);
        assert_eq!(fields[1]["effective_type"], "nullable instant");
        assert_eq!(fields[1]["compat_level"], 300);
        assert_eq!(fields[2]["type"], "demo.Event.CountsEntry");

        let entry = &demo["messages"][0]["messages"][0];
        assert_eq!(entry["origin"], "map_entry");
    }

    #[test]
    fn test_switches_change_the_snapshot() {
        let off = snapshot(&CompilerConfig::default().compat_level(false).null_wrappers(false));
        let json: serde_json::Value = serde_json::from_str(&off).unwrap();
        let fields = &json["files"].as_array().unwrap().last().unwrap()["messages"][0]["fields"];
        assert_eq!(fields[0]["effective_type"], "google.protobuf.StringValue");
        assert!(fields[0].get("null_wrapped").is_none());
        assert_eq!(fields[1]["data_format"], "well_known");
        assert_ne!(off, snapshot(&CompilerConfig::default()));
    }
}
