//! Raw, per-file schema descriptors.
//!
//! This module turns schema text into a [`SchemaFile`]: the declarations of a
//! single file exactly as written. Nothing here looks at other files; type
//! references stay as names and field numbers stay unchecked until the
//! [`model`](crate::model) builder binds and validates them.
//!
//! Parsing is error-tolerant. [`parse`] always returns a descriptor together
//! with every syntax error it ran into; a run with no errors and a non-empty
//! descriptor is the success case.

mod lexer;
mod parser;

use crate::diagnostic::{Diagnostics, Span};
use crate::error::{Error, Result};
use serde::Serialize;

pub use parser::parse;

/// Proto syntax version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ProtoSyntax {
    /// Proto2 syntax
    #[default]
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for ProtoSyntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(ProtoSyntax::Proto2),
            "proto3" => Ok(ProtoSyntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// Scalar field types built into the language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarKind {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int64`
    Int64,
    /// `uint64`
    Uint64,
    /// `int32`
    Int32,
    /// `fixed64`
    Fixed64,
    /// `fixed32`
    Fixed32,
    /// `bool`
    Bool,
    /// UTF-8 `string`
    String,
    /// `bytes`
    Bytes,
    /// `uint32`
    Uint32,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `sint32`, zigzag encoded
    Sint32,
    /// `sint64`, zigzag encoded
    Sint64,
}

impl ScalarKind {
    /// Looks up a scalar by its schema keyword
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "double" => ScalarKind::Double,
            "float" => ScalarKind::Float,
            "int64" => ScalarKind::Int64,
            "uint64" => ScalarKind::Uint64,
            "int32" => ScalarKind::Int32,
            "fixed64" => ScalarKind::Fixed64,
            "fixed32" => ScalarKind::Fixed32,
            "bool" => ScalarKind::Bool,
            "string" => ScalarKind::String,
            "bytes" => ScalarKind::Bytes,
            "uint32" => ScalarKind::Uint32,
            "sfixed32" => ScalarKind::Sfixed32,
            "sfixed64" => ScalarKind::Sfixed64,
            "sint32" => ScalarKind::Sint32,
            "sint64" => ScalarKind::Sint64,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the schema keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Double => "double",
            ScalarKind::Float => "float",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Int32 => "int32",
            ScalarKind::Fixed64 => "fixed64",
            ScalarKind::Fixed32 => "fixed32",
            ScalarKind::Bool => "bool",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Sfixed32 => "sfixed32",
            ScalarKind::Sfixed64 => "sfixed64",
            ScalarKind::Sint32 => "sint32",
            ScalarKind::Sint64 => "sint64",
        }
    }

    /// Map keys must be integral or string
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(
            self,
            ScalarKind::Double | ScalarKind::Float | ScalarKind::Bytes
        )
    }

    /// Length-delimited scalars can never be packed
    pub fn is_length_delimited(&self) -> bool {
        matches!(self, ScalarKind::String | ScalarKind::Bytes)
    }
}

/// One `.proto` file, parsed but unresolved
#[derive(Debug, Clone, Default)]
pub struct SchemaFile {
    /// Import-style name, the file's identity
    pub name: String,
    /// Declared syntax (proto2 when absent)
    pub syntax: ProtoSyntax,
    /// Package, empty when undeclared
    pub package: String,
    /// Imports in declaration order
    pub imports: Vec<Import>,
    /// File-level options
    pub options: Vec<OptionDecl>,
    /// Top-level messages
    pub messages: Vec<MessageDecl>,
    /// Top-level enums
    pub enums: Vec<EnumDecl>,
    /// Services
    pub services: Vec<ServiceDecl>,
    /// Top-level `extend` blocks
    pub extends: Vec<ExtendDecl>,
}

impl SchemaFile {
    /// Returns the value of a file option by name
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        find_option(&self.options, name)
    }

    /// Returns true if nothing at all was declared
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.options.is_empty()
            && self.messages.is_empty()
            && self.enums.is_empty()
            && self.services.is_empty()
            && self.extends.is_empty()
    }
}

/// Import modifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ImportKind {
    #[default]
    /// Plain `import`
    Default,
    /// `import public`: re-exported to importers
    Public,
    /// `import weak`
    Weak,
}

/// An `import` statement
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    /// Imported path as written
    pub path: String,
    /// Modifier
    pub kind: ImportKind,
    /// Location of the statement
    pub span: Span,
}

/// A literal option value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OptionValue {
    /// `true` or `false`
    Bool(bool),
    /// Signed integer literal
    Int(i64),
    /// Integer literal too large for `i64`
    UInt(u64),
    /// Floating point literal, `inf` and `nan` included
    Float(f64),
    /// Quoted string
    String(String),
    /// Bare identifier such as an enum constant
    Ident(String),
    /// Text-format message literal, kept verbatim
    Aggregate(String),
}

impl OptionValue {
    /// Interprets the value as a signed integer when it is one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            OptionValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Interprets the value as a boolean when it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Interprets the value as a string literal when it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(v) => Some(v),
            _ => None,
        }
    }
}

/// `option name = value;` or one entry of a `[...]` list
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDecl {
    /// Option name, custom names keep their parentheses
    pub name: String,
    /// Value
    pub value: OptionValue,
    /// Location
    pub span: Span,
}

pub(crate) fn find_option<'a>(options: &'a [OptionDecl], name: &str) -> Option<&'a OptionValue> {
    options.iter().rev().find(|o| o.name == name).map(|o| &o.value)
}

/// Inclusive number range used by `reserved` and `extensions`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberRange {
    /// First number
    pub start: i64,
    /// Last number (inclusive)
    pub end: i64,
    /// Location
    pub span: Span,
}

impl NumberRange {
    /// Returns true if `number` lies inside the range
    pub fn contains(&self, number: i64) -> bool {
        (self.start..=self.end).contains(&number)
    }
}

/// A message declaration
#[derive(Debug, Clone, Default)]
pub struct MessageDecl {
    /// Simple name
    pub name: String,
    /// Location of the name
    pub span: Span,
    /// Fields in declaration order, oneof members included
    pub fields: Vec<FieldDecl>,
    /// `oneof` groups
    pub oneofs: Vec<OneofDecl>,
    /// Nested messages
    pub messages: Vec<MessageDecl>,
    /// Nested enums
    pub enums: Vec<EnumDecl>,
    /// Nested `extend` blocks
    pub extends: Vec<ExtendDecl>,
    /// `reserved` number ranges
    pub reserved_ranges: Vec<NumberRange>,
    /// `reserved` field names
    pub reserved_names: Vec<String>,
    /// `extensions` ranges
    pub extension_ranges: Vec<NumberRange>,
    /// Message options
    pub options: Vec<OptionDecl>,
}

/// Field label as written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// `optional`
    Optional,
    /// `required` (proto2 only)
    Required,
    /// `repeated`
    Repeated,
}

/// A type reference before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Built-in scalar
    Scalar(ScalarKind),
    /// Message or enum name, possibly dotted, possibly with a leading dot
    Named(String),
    /// `map<K, V>`
    Map {
        /// Key type, always a scalar once validated
        key: Box<TypeRef>,
        /// Value type
        value: Box<TypeRef>,
    },
    /// proto2 `group`; names the nested message declared with it
    Group(String),
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Scalar(kind) => f.write_str(kind.as_str()),
            TypeRef::Named(name) | TypeRef::Group(name) => f.write_str(name),
            TypeRef::Map { key, value } => write!(f, "map<{key}, {value}>"),
        }
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Raw number; range checks happen during resolution
    pub number: i64,
    /// Label, `None` when written without one
    pub label: Option<Label>,
    /// Declared type
    pub ty: TypeRef,
    /// Index into the owning message's `oneofs`
    pub oneof: Option<usize>,
    /// Options from the `[...]` list
    pub options: Vec<OptionDecl>,
    /// Location
    pub span: Span,
}

impl FieldDecl {
    /// Returns the value of a field option by name
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        find_option(&self.options, name)
    }
}

/// A `oneof` group
#[derive(Debug, Clone, PartialEq)]
pub struct OneofDecl {
    /// Group name
    pub name: String,
    /// `option` statements inside the group
    pub options: Vec<OptionDecl>,
    /// Location
    pub span: Span,
}

/// An enum declaration
#[derive(Debug, Clone, Default)]
pub struct EnumDecl {
    /// Simple name
    pub name: String,
    /// Location
    pub span: Span,
    /// Constants in declaration order
    pub values: Vec<EnumValueDecl>,
    /// Enum options
    pub options: Vec<OptionDecl>,
    /// `reserved` number ranges
    pub reserved_ranges: Vec<NumberRange>,
    /// `reserved` constant names
    pub reserved_names: Vec<String>,
}

/// One enum constant
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDecl {
    /// Constant name
    pub name: String,
    /// Raw number; range checks happen during resolution
    pub number: i64,
    /// Value options
    pub options: Vec<OptionDecl>,
    /// Location
    pub span: Span,
}

/// A service declaration
#[derive(Debug, Clone, Default)]
pub struct ServiceDecl {
    /// Simple name
    pub name: String,
    /// Location
    pub span: Span,
    /// `rpc` declarations in order
    pub methods: Vec<MethodDecl>,
    /// Service options
    pub options: Vec<OptionDecl>,
}

/// An `rpc` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Request type as written
    pub input: String,
    /// Response type as written
    pub output: String,
    /// Request side is a `stream`
    pub client_streaming: bool,
    /// Response side is a `stream`
    pub server_streaming: bool,
    /// Method options
    pub options: Vec<OptionDecl>,
    /// Location
    pub span: Span,
}

/// An `extend` block
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendDecl {
    /// Extended message name as written
    pub extendee: String,
    /// Extension fields
    pub fields: Vec<FieldDecl>,
    /// Location
    pub span: Span,
}

/// Result of parsing one file
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// The descriptor, possibly partial when errors occurred
    pub file: SchemaFile,
    /// Syntax errors, in source order
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proto_syntax() {
        assert_eq!(ProtoSyntax::try_from("").unwrap(), ProtoSyntax::Proto2);
        assert_eq!(ProtoSyntax::try_from("proto2").unwrap(), ProtoSyntax::Proto2);
        assert_eq!(ProtoSyntax::try_from("proto3").unwrap(), ProtoSyntax::Proto3);
        assert!(ProtoSyntax::try_from("proto4").is_err());
    }

    #[test]
    fn test_scalar_keywords() {
        for word in ["double", "sint64", "bytes", "fixed32"] {
            assert_eq!(ScalarKind::from_keyword(word).unwrap().as_str(), word);
        }
        assert!(ScalarKind::from_keyword("Int32Value").is_none());
        assert!(!ScalarKind::Float.is_valid_map_key());
        assert!(ScalarKind::String.is_valid_map_key());
    }

    #[test]
    fn test_type_ref_display() {
        let map = TypeRef::Map {
            key: Box::new(TypeRef::Scalar(ScalarKind::String)),
            value: Box::new(TypeRef::Named(".pkg.Value".into())),
        };
        assert_eq!(map.to_string(), "map<string, .pkg.Value>");
    }
}
