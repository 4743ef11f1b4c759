//! Resolved semantic model.
//!
//! The model is an arena: files, messages and enums live in flat vectors and
//! refer to each other through [`FileId`], [`MessageId`] and [`EnumId`]. Every
//! type reference is bound, every field carries its effective type and wire
//! metadata, and every file knows its compatibility level.
//!
//! Once built the model is never mutated, so it can be shared across threads
//! and handed to any number of renderers.

mod builder;
mod export;
mod scope;

pub use builder::{build, BuildOutput};

use crate::descriptor::{find_option, ImportKind, OptionDecl, OptionValue, ProtoSyntax, ScalarKind};
use crate::diagnostic::Span;
use crate::policy::{CompatibilityLevel, EffectiveType, WireMetadata};
use serde::Serialize;
use std::ops::RangeInclusive;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Position in the model's arena
            pub fn index(&self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(u32::try_from(index).unwrap_or(u32::MAX))
            }
        }
    };
}

arena_id!(
    /// Index of a file in [`ResolvedModel::files`]
    FileId
);
arena_id!(
    /// Index of a message in [`ResolvedModel::messages`]
    MessageId
);
arena_id!(
    /// Index of an enum in [`ResolvedModel::enums`]
    EnumId
);

/// A fully resolved compilation
#[derive(Debug, Clone, Default)]
pub struct ResolvedModel {
    pub(crate) files: Vec<ResolvedFile>,
    pub(crate) messages: Vec<ResolvedMessage>,
    pub(crate) enums: Vec<ResolvedEnum>,
}

impl ResolvedModel {
    /// Files in dependency order, entry file last
    pub fn files(&self) -> &[ResolvedFile] {
        &self.files
    }

    /// Every message of every file, synthetic ones included
    pub fn messages(&self) -> &[ResolvedMessage] {
        &self.messages
    }

    /// Every enum of every file
    pub fn enums(&self) -> &[ResolvedEnum] {
        &self.enums
    }

    /// File by id; ids always come from this model
    pub fn file(&self, id: FileId) -> &ResolvedFile {
        &self.files[id.index()]
    }

    /// Message by id
    pub fn message(&self, id: MessageId) -> &ResolvedMessage {
        &self.messages[id.index()]
    }

    /// Enum by id. Named so it does not clash with the `enums` accessor
    pub fn enumeration(&self, id: EnumId) -> &ResolvedEnum {
        &self.enums[id.index()]
    }

    /// Looks up a file by its import-style name
    pub fn file_by_name(&self, name: &str) -> Option<&ResolvedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Looks up a message by fully qualified name (leading dot optional)
    pub fn find_message(&self, full_name: &str) -> Option<&ResolvedMessage> {
        let full_name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.messages.iter().find(|m| m.full_name == full_name)
    }

    /// Looks up an enum by fully qualified name (leading dot optional)
    pub fn find_enum(&self, full_name: &str) -> Option<&ResolvedEnum> {
        let full_name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.enums.iter().find(|e| e.full_name == full_name)
    }

    /// Fully qualified name of whatever a field type refers to
    pub fn type_name(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Scalar(kind) => kind.as_str().to_string(),
            FieldType::Message(id) => self.message(*id).full_name.clone(),
            FieldType::Enum(id) => self.enumeration(*id).full_name.clone(),
            FieldType::Unresolved(name) => name.clone(),
        }
    }

    /// Human-readable effective type, with names instead of arena indices
    pub fn describe_effective(&self, effective: &EffectiveType) -> String {
        match effective {
            EffectiveType::Message(id) => self.message(*id).full_name.clone(),
            EffectiveType::Enum(id) => self.enumeration(*id).full_name.clone(),
            other => other.describe(),
        }
    }

    /// Number of fields across all messages, extensions excluded
    pub fn field_count(&self) -> usize {
        self.messages.iter().map(|m| m.fields.len()).sum()
    }
}

/// One schema file after resolution
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Position in [`ResolvedModel::files`]
    pub id: FileId,
    /// Import-style name
    pub name: String,
    /// Declared package, empty when there is none
    pub package: String,
    /// Declared syntax
    pub syntax: ProtoSyntax,
    /// Level from the `compatibility_level` file option, or the default
    pub compatibility_level: CompatibilityLevel,
    /// Imports in declaration order
    pub imports: Vec<ResolvedImport>,
    /// File options
    pub options: Vec<OptionDecl>,
    /// Top-level messages in declaration order
    pub messages: Vec<MessageId>,
    /// Top-level enums in declaration order
    pub enums: Vec<EnumId>,
    /// Services in declaration order
    pub services: Vec<ResolvedService>,
    /// Top-level extensions
    pub extensions: Vec<ResolvedField>,
}

impl ResolvedFile {
    /// Returns the value of a file option by name
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        find_option(&self.options, name)
    }
}

/// An import edge, path as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Imported path
    pub path: String,
    /// Modifier
    pub kind: ImportKind,
}

/// Where a message declaration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageOrigin {
    /// Written in the schema
    Declared,
    /// Body of a proto2 `group` field
    Group,
    /// Key/value entry synthesized for a map field
    MapEntry,
    /// Wrapper synthesized so a collection can carry null elements
    NullWrapper {
        /// Message type of the collection's elements
        element: MessageId,
    },
}

impl MessageOrigin {
    /// Returns true for messages that were not written in the schema
    pub fn is_synthetic(&self) -> bool {
        matches!(self, MessageOrigin::MapEntry | MessageOrigin::NullWrapper { .. })
    }
}

/// A message after resolution, possibly synthesized
#[derive(Debug, Clone)]
pub struct ResolvedMessage {
    /// Position in [`ResolvedModel::messages`]
    pub id: MessageId,
    /// Declaring file
    pub file: FileId,
    /// Enclosing message for nested declarations
    pub parent: Option<MessageId>,
    /// Simple name
    pub name: String,
    /// Dotted name without a leading dot
    pub full_name: String,
    /// Declared, group body or synthesized
    pub origin: MessageOrigin,
    /// Fields in declaration order
    pub fields: Vec<ResolvedField>,
    /// `oneof` groups in declaration order
    pub oneofs: Vec<ResolvedOneof>,
    /// Nested messages, synthetic ones after the declared ones they belong to
    pub messages: Vec<MessageId>,
    /// Nested enums
    pub enums: Vec<EnumId>,
    /// Extensions declared inside this message's scope
    pub extensions: Vec<ResolvedField>,
    /// Reserved numbers
    pub reserved_ranges: Vec<RangeInclusive<u32>>,
    /// Reserved names
    pub reserved_names: Vec<String>,
    /// Numbers open to extensions
    pub extension_ranges: Vec<RangeInclusive<u32>>,
    /// Message options
    pub options: Vec<OptionDecl>,
    /// Location of the declaration
    pub span: Span,
}

impl ResolvedMessage {
    /// Looks up a field by name
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by number
    pub fn field_by_number(&self, number: u32) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Returns the value of a message option by name
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        find_option(&self.options, name)
    }

    /// Returns true if the message accepts extensions
    pub fn is_extensible(&self) -> bool {
        !self.extension_ranges.is_empty()
    }
}

/// Field presence and multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// proto3 implicit presence
    Singular,
    /// Explicit presence (`optional`, proto2 without label, oneof members)
    Optional,
    /// proto2 `required`
    Required,
    /// Zero or more values; maps are repeated entries
    Repeated,
}

/// A resolved field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Built-in scalar
    Scalar(ScalarKind),
    /// Message or group
    Message(MessageId),
    /// Enum
    Enum(EnumId),
    /// Name that matched nothing; only present alongside an error
    Unresolved(String),
}

/// A field after resolution
#[derive(Debug, Clone)]
pub struct ResolvedField {
    /// Simple name
    pub name: String,
    /// Dotted name without a leading dot
    pub full_name: String,
    /// Field number, already range-checked
    pub number: u32,
    /// Presence and multiplicity
    pub cardinality: Cardinality,
    /// Declared type, bound
    pub ty: FieldType,
    /// Index into the owning message's `oneofs`
    pub oneof: Option<usize>,
    /// JSON name, from `json_name` or derived from the field name
    pub json_name: String,
    /// proto2 `default` value
    pub default_value: Option<OptionValue>,
    /// `packed` option when given
    pub packed: Option<bool>,
    /// `deprecated` option
    pub deprecated: bool,
    /// Field options
    pub options: Vec<OptionDecl>,
    /// Extended message, for extension fields
    pub extendee: Option<MessageId>,
    /// Type generated code exposes
    pub effective: EffectiveType,
    /// How values travel on the wire
    pub wire: WireMetadata,
    /// Location
    pub span: Span,
}

impl ResolvedField {
    /// Returns true for repeated fields, maps included
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Returns the value of a field option by name
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        find_option(&self.options, name)
    }
}

/// A `oneof` group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOneof {
    /// Group name
    pub name: String,
    /// Indices into the owning message's `fields`
    pub fields: Vec<usize>,
}

/// An enum after resolution
#[derive(Debug, Clone)]
pub struct ResolvedEnum {
    /// Position in [`ResolvedModel::enums`]
    pub id: EnumId,
    /// Declaring file
    pub file: FileId,
    /// Enclosing message for nested enums
    pub parent: Option<MessageId>,
    /// Simple name
    pub name: String,
    /// Dotted name without a leading dot
    pub full_name: String,
    /// Constants in declaration order
    pub values: Vec<ResolvedEnumValue>,
    /// `allow_alias` option
    pub allow_alias: bool,
    /// Reserved numbers
    pub reserved_ranges: Vec<RangeInclusive<i32>>,
    /// Reserved names
    pub reserved_names: Vec<String>,
    /// Enum options
    pub options: Vec<OptionDecl>,
    /// Location
    pub span: Span,
}

/// One enum constant
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEnumValue {
    /// Constant name
    pub name: String,
    /// Constant number
    pub number: i32,
    /// `deprecated` option
    pub deprecated: bool,
    /// Value options
    pub options: Vec<OptionDecl>,
}

/// A service after resolution
#[derive(Debug, Clone)]
pub struct ResolvedService {
    /// Simple name
    pub name: String,
    /// Dotted name without a leading dot
    pub full_name: String,
    /// Methods in declaration order
    pub methods: Vec<ResolvedMethod>,
    /// Service options
    pub options: Vec<OptionDecl>,
}

/// One `rpc` of a service
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    /// Method name
    pub name: String,
    /// Request message; `Unresolved` when it matched nothing
    pub input: FieldType,
    /// Response message; `Unresolved` when it matched nothing
    pub output: FieldType,
    /// Client streams requests
    pub client_streaming: bool,
    /// Server streams responses
    pub server_streaming: bool,
    /// Method options
    pub options: Vec<OptionDecl>,
}
