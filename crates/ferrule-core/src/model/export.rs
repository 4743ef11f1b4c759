//! Export of a resolved model as standard protobuf descriptors.
//!
//! The output is what `protoc --descriptor_set_out` would produce for the same
//! schemas, with two additions: synthetic null-carrying wrappers appear as
//! nested messages holding the element in field `value = 1`, and fields that
//! use them reference the wrapper type.

use super::{
    Cardinality, FieldType, MessageId, MessageOrigin, ResolvedEnum, ResolvedField, ResolvedFile,
    ResolvedMessage, ResolvedModel,
};
use crate::descriptor::{ImportKind, OptionDecl, OptionValue, ProtoSyntax, ScalarKind};
use crate::error::{Error, Result};
use crate::policy::WireMetadata;
use prost::Message;
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    descriptor_proto, enum_descriptor_proto, DescriptorProto, EnumDescriptorProto, EnumOptions,
    EnumValueDescriptorProto, EnumValueOptions, FieldDescriptorProto, FieldOptions,
    FileDescriptorProto, FileDescriptorSet, FileOptions, MessageOptions, MethodDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto,
};

impl ResolvedModel {
    /// Exports every file, in dependency order
    pub fn to_file_descriptor_set(&self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: self.files.iter().map(|f| self.file_proto(f)).collect(),
        }
    }

    /// Encoded [`FileDescriptorSet`]
    pub fn encode_descriptor_set(&self) -> Vec<u8> {
        self.to_file_descriptor_set().encode_to_vec()
    }

    /// Builds a reflection pool from the exported descriptors.
    ///
    /// This is an independent check of the model: the pool re-validates every
    /// name, number and reference.
    pub fn descriptor_pool(&self) -> Result<DescriptorPool> {
        let bytes = self.encode_descriptor_set();
        DescriptorPool::decode(bytes.as_slice()).map_err(|e| {
            Error::descriptor_build(format!("failed to decode descriptor pool: {}", e))
        })
    }

    fn file_proto(&self, file: &ResolvedFile) -> FileDescriptorProto {
        let index_of = |kind: ImportKind| {
            file.imports
                .iter()
                .enumerate()
                .filter(move |(_, i)| i.kind == kind)
                .map(|(n, _)| n as i32)
                .collect::<Vec<_>>()
        };

        FileDescriptorProto {
            name: Some(file.name.clone()),
            package: (!file.package.is_empty()).then(|| file.package.clone()),
            dependency: file.imports.iter().map(|i| i.path.clone()).collect(),
            public_dependency: index_of(ImportKind::Public),
            weak_dependency: index_of(ImportKind::Weak),
            message_type: file
                .messages
                .iter()
                .map(|id| self.message_proto(self.message(*id), file.syntax))
                .collect(),
            enum_type: file
                .enums
                .iter()
                .map(|id| enum_proto(self.enumeration(*id)))
                .collect(),
            service: file
                .services
                .iter()
                .map(|s| ServiceDescriptorProto {
                    name: Some(s.name.clone()),
                    method: s
                        .methods
                        .iter()
                        .map(|m| MethodDescriptorProto {
                            name: Some(m.name.clone()),
                            input_type: Some(format!(".{}", self.type_name(&m.input))),
                            output_type: Some(format!(".{}", self.type_name(&m.output))),
                            client_streaming: Some(m.client_streaming),
                            server_streaming: Some(m.server_streaming),
                            ..Default::default()
                        })
                        .collect(),
                    ..Default::default()
                })
                .collect(),
            extension: file
                .extensions
                .iter()
                .map(|f| self.field_proto(f, file.syntax, false))
                .collect(),
            options: file_options(&file.options),
            syntax: Some(file.syntax.as_str().to_string()),
            ..Default::default()
        }
    }

    fn message_proto(&self, message: &ResolvedMessage, syntax: ProtoSyntax) -> DescriptorProto {
        if let MessageOrigin::NullWrapper { element } = message.origin {
            return self.null_wrapper_proto(message, element);
        }

        let mut oneof_decl: Vec<OneofDescriptorProto> = message
            .oneofs
            .iter()
            .map(|o| OneofDescriptorProto {
                name: Some(o.name.clone()),
                options: None,
            })
            .collect();

        let mut field = Vec::with_capacity(message.fields.len());
        for f in &message.fields {
            let synthetic_optional = syntax == ProtoSyntax::Proto3
                && f.cardinality == Cardinality::Optional
                && f.oneof.is_none()
                && message.origin != MessageOrigin::MapEntry;
            let mut proto = self.field_proto(f, syntax, synthetic_optional);
            if synthetic_optional {
                // proto3 `optional` lives in a synthetic oneof placed after the real ones
                proto.oneof_index = Some(oneof_decl.len() as i32);
                oneof_decl.push(OneofDescriptorProto {
                    name: Some(synthetic_oneof_name(&f.name, &oneof_decl, message)),
                    options: None,
                });
            }
            field.push(proto);
        }

        let deprecated = message.option("deprecated").and_then(OptionValue::as_bool);
        let map_entry = message.origin == MessageOrigin::MapEntry;
        let options = (map_entry || deprecated.is_some()).then(|| MessageOptions {
            map_entry: map_entry.then_some(true),
            deprecated,
            ..Default::default()
        });

        DescriptorProto {
            name: Some(message.name.clone()),
            field,
            extension: message
                .extensions
                .iter()
                .map(|f| self.field_proto(f, syntax, false))
                .collect(),
            nested_type: message
                .messages
                .iter()
                .map(|id| self.message_proto(self.message(*id), syntax))
                .collect(),
            enum_type: message
                .enums
                .iter()
                .map(|id| enum_proto(self.enumeration(*id)))
                .collect(),
            extension_range: message
                .extension_ranges
                .iter()
                .map(|r| descriptor_proto::ExtensionRange {
                    start: Some(*r.start() as i32),
                    end: Some(*r.end() as i32 + 1),
                    options: None,
                })
                .collect(),
            oneof_decl,
            options,
            reserved_range: message
                .reserved_ranges
                .iter()
                .map(|r| descriptor_proto::ReservedRange {
                    start: Some(*r.start() as i32),
                    end: Some(*r.end() as i32 + 1),
                })
                .collect(),
            reserved_name: message.reserved_names.clone(),
            ..Default::default()
        }
    }

    fn null_wrapper_proto(&self, message: &ResolvedMessage, element: MessageId) -> DescriptorProto {
        DescriptorProto {
            name: Some(message.name.clone()),
            field: vec![FieldDescriptorProto {
                name: Some("value".to_string()),
                number: Some(1),
                label: Some(Label::Optional as i32),
                r#type: Some(Type::Message as i32),
                type_name: Some(format!(".{}", self.message(element).full_name)),
                json_name: Some("value".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn field_proto(
        &self,
        field: &ResolvedField,
        syntax: ProtoSyntax,
        proto3_optional: bool,
    ) -> FieldDescriptorProto {
        let label = match field.cardinality {
            Cardinality::Repeated => Label::Repeated,
            Cardinality::Required => Label::Required,
            Cardinality::Singular | Cardinality::Optional => Label::Optional,
        };

        let (ty, type_name) = match &field.ty {
            FieldType::Scalar(kind) => (scalar_type(*kind), None),
            FieldType::Enum(id) => (Type::Enum, Some(self.enumeration(*id).full_name.clone())),
            FieldType::Message(id) => {
                let target = self.message(*id);
                let group = field.wire == WireMetadata::Group && target.origin == MessageOrigin::Group;
                let ty = if group { Type::Group } else { Type::Message };
                (ty, Some(target.full_name.clone()))
            }
            FieldType::Unresolved(name) => (Type::Message, Some(name.clone())),
        };

        let default_value = field
            .default_value
            .as_ref()
            .map(|v| default_literal(v, &field.ty));
        let options = (field.packed.is_some() || field.deprecated).then(|| FieldOptions {
            packed: field.packed,
            deprecated: field.deprecated.then_some(true),
            ..Default::default()
        });

        FieldDescriptorProto {
            name: Some(field.name.clone()),
            number: Some(field.number as i32),
            label: Some(label as i32),
            r#type: Some(ty as i32),
            type_name: type_name.map(|n| format!(".{n}")),
            extendee: field
                .extendee
                .map(|id| format!(".{}", self.message(id).full_name)),
            default_value,
            oneof_index: field.oneof.map(|i| i as i32),
            json_name: Some(field.json_name.clone()),
            options,
            proto3_optional: (proto3_optional && syntax == ProtoSyntax::Proto3).then_some(true),
            ..Default::default()
        }
    }
}

/// protoc's naming for synthetic oneofs: `_name`, prefixed with more
/// underscores until it clashes with nothing
fn synthetic_oneof_name(
    field: &str,
    existing: &[OneofDescriptorProto],
    message: &ResolvedMessage,
) -> String {
    let mut name = format!("_{field}");
    while existing.iter().any(|o| o.name() == name) || message.field(&name).is_some() {
        name.insert(0, 'X');
    }
    name
}

fn enum_proto(e: &ResolvedEnum) -> EnumDescriptorProto {
    let deprecated = e
        .options
        .iter()
        .rev()
        .find(|o| o.name == "deprecated")
        .and_then(|o| o.value.as_bool());
    let options = (e.allow_alias || deprecated.is_some()).then(|| EnumOptions {
        allow_alias: e.allow_alias.then_some(true),
        deprecated,
        ..Default::default()
    });

    EnumDescriptorProto {
        name: Some(e.name.clone()),
        value: e
            .values
            .iter()
            .map(|v| EnumValueDescriptorProto {
                name: Some(v.name.clone()),
                number: Some(v.number),
                options: v.deprecated.then(|| EnumValueOptions {
                    deprecated: Some(true),
                    ..Default::default()
                }),
            })
            .collect(),
        options,
        reserved_range: e
            .reserved_ranges
            .iter()
            .map(|r| enum_descriptor_proto::EnumReservedRange {
                start: Some(*r.start()),
                end: Some(*r.end()),
            })
            .collect(),
        reserved_name: e.reserved_names.clone(),
        ..Default::default()
    }
}

/// Maps the handful of well-known file options onto [`FileOptions`]
fn file_options(options: &[OptionDecl]) -> Option<FileOptions> {
    let mut out = FileOptions::default();
    let mut any = false;

    for option in options {
        let text = option.value.as_str().map(str::to_string);
        let flag = option.value.as_bool();
        let slot_set = match option.name.as_str() {
            "java_package" => text.map(|v| out.java_package = Some(v)),
            "java_outer_classname" => text.map(|v| out.java_outer_classname = Some(v)),
            "java_multiple_files" => flag.map(|v| out.java_multiple_files = Some(v)),
            "go_package" => text.map(|v| out.go_package = Some(v)),
            "cc_enable_arenas" => flag.map(|v| out.cc_enable_arenas = Some(v)),
            "objc_class_prefix" => text.map(|v| out.objc_class_prefix = Some(v)),
            "csharp_namespace" => text.map(|v| out.csharp_namespace = Some(v)),
            "swift_prefix" => text.map(|v| out.swift_prefix = Some(v)),
            "php_namespace" => text.map(|v| out.php_namespace = Some(v)),
            "ruby_package" => text.map(|v| out.ruby_package = Some(v)),
            "deprecated" => flag.map(|v| out.deprecated = Some(v)),
            _ => None,
        };
        any |= slot_set.is_some();
    }

    any.then_some(out)
}

fn scalar_type(kind: ScalarKind) -> Type {
    match kind {
        ScalarKind::Double => Type::Double,
        ScalarKind::Float => Type::Float,
        ScalarKind::Int64 => Type::Int64,
        ScalarKind::Uint64 => Type::Uint64,
        ScalarKind::Int32 => Type::Int32,
        ScalarKind::Fixed64 => Type::Fixed64,
        ScalarKind::Fixed32 => Type::Fixed32,
        ScalarKind::Bool => Type::Bool,
        ScalarKind::String => Type::String,
        ScalarKind::Bytes => Type::Bytes,
        ScalarKind::Uint32 => Type::Uint32,
        ScalarKind::Sfixed32 => Type::Sfixed32,
        ScalarKind::Sfixed64 => Type::Sfixed64,
        ScalarKind::Sint32 => Type::Sint32,
        ScalarKind::Sint64 => Type::Sint64,
    }
}

/// Descriptor-style default literal: strings raw, bytes C-escaped, enums by
/// value name
fn default_literal(value: &OptionValue, ty: &FieldType) -> String {
    match (value, ty) {
        (OptionValue::String(s), FieldType::Scalar(ScalarKind::Bytes)) => escape_bytes(s.as_bytes()),
        (OptionValue::String(s), _) => s.clone(),
        (OptionValue::Bool(b), _) => b.to_string(),
        (OptionValue::Int(v), _) => v.to_string(),
        (OptionValue::UInt(v), _) => v.to_string(),
        (OptionValue::Float(v), _) => {
            if v.is_infinite() {
                if *v > 0.0 { "inf" } else { "-inf" }.to_string()
            } else if v.is_nan() {
                "nan".to_string()
            } else {
                v.to_string()
            }
        }
        (OptionValue::Ident(s), _) | (OptionValue::Aggregate(s), _) => s.clone(),
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph::resolve_imports;
    use crate::model::build;
    use crate::source::InMemory;
    use pretty_assertions::assert_eq;
    use prost_reflect::Kind;

    fn model(text: &str, config: &CompilerConfig) -> ResolvedModel {
        let provider = InMemory::new().with_file("test.proto", text);
        let graph = resolve_imports(&provider, &[], "test.proto").unwrap();
        let out = build(&graph, config);
        assert!(!out.diagnostics.has_errors(), "{}", out.diagnostics);
        out.model
    }

    #[test]
    fn test_pool_accepts_export() {
        let m = model(
            r#"
            syntax = "proto3";
            package shop;
            import "google/protobuf/timestamp.proto";
            message Order {
              string id = 1;
              optional int32 quantity = 2;
              map<string, int64> totals = 3;
              google.protobuf.Timestamp placed = 4;
              oneof payment { string card = 5; string voucher = 6; }
              Status status = 7;
              enum Status { UNKNOWN = 0; PAID = 1; }
            }
            service Orders { rpc Place(Order) returns (Order); }
            "#,
            &CompilerConfig::default(),
        );
        let pool = m.descriptor_pool().unwrap();
        let order = pool.get_message_by_name("shop.Order").unwrap();
        let totals = order.get_field_by_name("totals").unwrap();
        assert!(totals.is_map());
        let quantity = order.get_field_by_name("quantity").unwrap();
        assert!(quantity
            .containing_oneof()
            .is_some_and(|o| o.name() == "_quantity"));
        assert_eq!(order.oneofs().count(), 2);
        assert!(pool.get_service_by_name("shop.Orders").is_some());
    }

    #[test]
    fn test_null_wrapper_export() {
        let m = model(
            r#"
            syntax = "proto2";
            message Foo { repeated Bar items = 1; }
            message Bar { optional int32 x = 1; }
            "#,
            &CompilerConfig::default().support_null("Foo.items"),
        );
        let pool = m.descriptor_pool().unwrap();
        let foo = pool.get_message_by_name("Foo").unwrap();
        let items = foo.get_field_by_name("items").unwrap();
        let Kind::Message(wrapper) = items.kind() else {
            panic!("items should reference the wrapper message");
        };
        assert_eq!(wrapper.full_name(), "Foo.NullWrappedBar");
        let value = wrapper.get_field(1).unwrap();
        assert_eq!(value.name(), "value");
    }

    #[test]
    fn test_group_and_extension_export() {
        let m = model(
            r#"
            syntax = "proto2";
            package p;
            message Search {
              repeated group Result = 1 { optional string url = 2; }
              extensions 100 to max;
            }
            extend Search { optional string note = 100 [default = "x"]; }
            "#,
            &CompilerConfig::default(),
        );
        let set = m.to_file_descriptor_set();
        let search = &set.file[0].message_type[0];
        assert_eq!(search.field[0].r#type(), Type::Group);
        assert_eq!(search.extension_range[0].end, Some(536_870_912));
        assert_eq!(set.file[0].extension[0].default_value(), "x");

        let pool = m.descriptor_pool().unwrap();
        assert!(pool.get_extension_by_name("p.note").is_some());
    }

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"a\n\x01"), "a\\n\\001");
    }
}
