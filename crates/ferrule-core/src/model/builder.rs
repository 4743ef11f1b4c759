//! Builds a [`ResolvedModel`] from an [`ImportGraph`].
//!
//! The build runs in fixed passes over the whole graph:
//!
//! 1. declare every message and enum (map entries included) in the symbol table
//! 2. resolve message fields, numbering and names
//! 3. validate enums
//! 4. resolve services and extensions
//! 5. synthesize null-carrying wrappers for configured collections
//! 6. run the null/well-known-type policy on every field, in declaration order
//!
//! Problems are collected, never thrown. The model that comes out is complete
//! when the diagnostics hold no errors and partial otherwise.

use super::scope::{Resolution, Symbol, SymbolTable};
use super::{
    Cardinality, EnumId, FieldType, FileId, MessageId, MessageOrigin, ResolvedEnum,
    ResolvedEnumValue, ResolvedField, ResolvedFile, ResolvedImport, ResolvedMessage,
    ResolvedMethod, ResolvedModel, ResolvedOneof, ResolvedService,
};
use crate::config::CompilerConfig;
use crate::descriptor::{
    EnumDecl, ExtendDecl, FieldDecl, Label, MessageDecl, NumberRange, OptionValue, ProtoSyntax,
    SchemaFile, ServiceDecl, TypeRef,
};
use crate::diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Span};
use crate::graph::ImportGraph;
use crate::naming::{map_entry_name, qualify, to_json_name};
use crate::policy::{self, CompatibilityLevel, EffectiveType, FieldContext, PolicyOptions, WireMetadata};
use crate::{MAX_FIELD_NUMBER, RESERVED_FIELD_NUMBERS};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::{debug, trace};

/// File name used for diagnostics that do not belong to a schema file
const CONFIG_ORIGIN: &str = "<options>";

/// A model together with everything found wrong while building it
#[derive(Debug)]
pub struct BuildOutput {
    /// The model, complete even when diagnostics carry errors
    pub model: ResolvedModel,
    /// Every problem found, errors and warnings
    pub diagnostics: Diagnostics,
}

/// Resolves, validates and annotates every file of `graph`
pub fn build(graph: &ImportGraph, config: &CompilerConfig) -> BuildOutput {
    let mut builder = Builder::default();

    for parsed in graph.files() {
        builder.declare_file(&parsed.file);
    }
    builder.resolve_messages();
    builder.resolve_enums();
    builder.resolve_services();
    builder.resolve_extensions();
    builder.apply_null_support(config);
    builder.apply_policy(PolicyOptions {
        null_wrappers: config.null_wrappers,
        compat_level: config.compat_level,
    });

    debug!(
        "Built model: {} file(s), {} message(s), {} enum(s), {} diagnostic(s)",
        builder.model.files.len(),
        builder.model.messages.len(),
        builder.model.enums.len(),
        builder.diagnostics.len()
    );

    BuildOutput {
        model: builder.model,
        diagnostics: builder.diagnostics,
    }
}

/// Where a field declaration lives
#[derive(Clone, Copy)]
struct Site<'s> {
    file: FileId,
    /// Dotted scope names are resolved in
    scope: &'s str,
    syntax: ProtoSyntax,
}

#[derive(Clone, Copy)]
struct PendingExtend<'g> {
    file: FileId,
    owner: Option<MessageId>,
    decl: &'g ExtendDecl,
}

#[derive(Default)]
struct Builder<'g> {
    model: ResolvedModel,
    symbols: SymbolTable,
    diagnostics: Diagnostics,
    messages: Vec<(MessageId, &'g MessageDecl)>,
    enums: Vec<(EnumId, &'g EnumDecl)>,
    services: Vec<(FileId, &'g ServiceDecl)>,
    extends: Vec<PendingExtend<'g>>,
    /// (owner, field index) to the synthesized entry message
    map_entries: BTreeMap<(MessageId, usize), MessageId>,
}

impl<'g> Builder<'g> {
    fn error(&mut self, kind: DiagnosticKind, file: FileId, span: Span, message: impl Into<String>) {
        let file = self.model.files[file.index()].name.clone();
        self.diagnostics
            .push(Diagnostic::error(kind, file, span, message));
    }

    // ---- pass 1: declarations ------------------------------------------

    fn declare_file(&mut self, file: &'g SchemaFile) {
        let id = FileId::from_index(self.model.files.len());
        self.model.files.push(ResolvedFile {
            id,
            name: file.name.clone(),
            package: file.package.clone(),
            syntax: file.syntax,
            compatibility_level: CompatibilityLevel::DEFAULT,
            imports: file
                .imports
                .iter()
                .map(|i| ResolvedImport {
                    path: i.path.clone(),
                    kind: i.kind,
                })
                .collect(),
            options: file.options.clone(),
            messages: Vec::new(),
            enums: Vec::new(),
            services: Vec::new(),
            extensions: Vec::new(),
        });
        let level = self.compatibility_level(id, file);
        self.model.files[id.index()].compatibility_level = level;
        self.symbols.declare_package(&file.package);

        for decl in &file.messages {
            let message = self.declare_message(decl, id, None, &file.package);
            self.model.files[id.index()].messages.push(message);
        }
        for decl in &file.enums {
            let e = self.declare_enum(decl, id, None, &file.package);
            self.model.files[id.index()].enums.push(e);
        }
        for decl in &file.extends {
            self.extends.push(PendingExtend {
                file: id,
                owner: None,
                decl,
            });
        }
        for decl in &file.services {
            self.services.push((id, decl));
        }
    }

    fn compatibility_level(&mut self, file: FileId, decl: &SchemaFile) -> CompatibilityLevel {
        let Some(option) = decl
            .options
            .iter()
            .rev()
            .find(|o| o.name == "compatibility_level")
        else {
            return CompatibilityLevel::DEFAULT;
        };
        match option.value.as_i64().and_then(|v| u32::try_from(v).ok()) {
            Some(level) => CompatibilityLevel(level),
            None => {
                self.error(
                    DiagnosticKind::Syntax,
                    file,
                    option.span,
                    "compatibility_level must be a non-negative integer",
                );
                CompatibilityLevel::DEFAULT
            }
        }
    }

    fn declare(&mut self, full_name: &str, symbol: Symbol, file: FileId, span: Span) {
        if self.symbols.declare(full_name, symbol).is_err() {
            self.error(
                DiagnosticKind::DuplicateName,
                file,
                span,
                format!("'{full_name}' is already defined"),
            );
        }
    }

    fn push_message(
        &mut self,
        file: FileId,
        parent: Option<MessageId>,
        name: String,
        full_name: String,
        origin: MessageOrigin,
        span: Span,
    ) -> MessageId {
        let id = MessageId::from_index(self.model.messages.len());
        self.model.messages.push(ResolvedMessage {
            id,
            file,
            parent,
            name,
            full_name,
            origin,
            fields: Vec::new(),
            oneofs: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            reserved_ranges: Vec::new(),
            reserved_names: Vec::new(),
            extension_ranges: Vec::new(),
            options: Vec::new(),
            span,
        });
        id
    }

    fn declare_message(
        &mut self,
        decl: &'g MessageDecl,
        file: FileId,
        parent: Option<MessageId>,
        scope: &str,
    ) -> MessageId {
        let full_name = qualify(scope, &decl.name);
        let id = self.push_message(
            file,
            parent,
            decl.name.clone(),
            full_name.clone(),
            MessageOrigin::Declared,
            decl.span,
        );
        self.declare(&full_name, Symbol::Message(id), file, decl.span);
        self.messages.push((id, decl));

        let group_bodies: BTreeSet<&str> = decl
            .fields
            .iter()
            .filter_map(|f| match &f.ty {
                TypeRef::Group(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        for nested in &decl.messages {
            let child = self.declare_message(nested, file, Some(id), &full_name);
            if group_bodies.contains(nested.name.as_str()) {
                self.model.messages[child.index()].origin = MessageOrigin::Group;
            }
            self.model.messages[id.index()].messages.push(child);
        }
        for nested in &decl.enums {
            let child = self.declare_enum(nested, file, Some(id), &full_name);
            self.model.messages[id.index()].enums.push(child);
        }
        for (index, field) in decl.fields.iter().enumerate() {
            if !matches!(field.ty, TypeRef::Map { .. }) {
                continue;
            }
            let entry_name = map_entry_name(&field.name);
            let entry_full = qualify(&full_name, &entry_name);
            let entry = self.push_message(
                file,
                Some(id),
                entry_name,
                entry_full.clone(),
                MessageOrigin::MapEntry,
                field.span,
            );
            self.declare(&entry_full, Symbol::Message(entry), file, field.span);
            self.model.messages[id.index()].messages.push(entry);
            self.map_entries.insert((id, index), entry);
        }
        for extend in &decl.extends {
            self.extends.push(PendingExtend {
                file,
                owner: Some(id),
                decl: extend,
            });
        }
        id
    }

    fn declare_enum(
        &mut self,
        decl: &'g EnumDecl,
        file: FileId,
        parent: Option<MessageId>,
        scope: &str,
    ) -> EnumId {
        let full_name = qualify(scope, &decl.name);
        let id = EnumId::from_index(self.model.enums.len());
        self.model.enums.push(ResolvedEnum {
            id,
            file,
            parent,
            name: decl.name.clone(),
            full_name: full_name.clone(),
            values: Vec::new(),
            allow_alias: false,
            reserved_ranges: Vec::new(),
            reserved_names: decl.reserved_names.clone(),
            options: decl.options.clone(),
            span: decl.span,
        });
        self.declare(&full_name, Symbol::Enum(id), file, decl.span);
        self.enums.push((id, decl));
        id
    }

    // ---- pass 2: messages ----------------------------------------------

    fn resolve_messages(&mut self) {
        let pending = self.messages.clone();
        for (id, decl) in pending {
            self.resolve_message(id, decl);
        }
    }

    fn resolve_message(&mut self, id: MessageId, decl: &'g MessageDecl) {
        let message = &self.model.messages[id.index()];
        let file = message.file;
        let full_name = message.full_name.clone();
        let site = Site {
            file,
            scope: &full_name,
            syntax: self.model.files[file.index()].syntax,
        };

        let reserved_ranges = self.field_ranges(file, &decl.reserved_ranges, "reserved");
        let extension_ranges = self.field_ranges(file, &decl.extension_ranges, "extension");
        for range in &decl.extension_ranges {
            if let Some(clash) = reserved_ranges
                .iter()
                .find(|r| r.contains(&(range.start as u32)) || r.contains(&(range.end as u32)))
            {
                self.error(
                    DiagnosticKind::InvalidExtension,
                    file,
                    range.span,
                    format!(
                        "extension range {} to {} overlaps reserved range {} to {}",
                        range.start,
                        range.end,
                        clash.start(),
                        clash.end()
                    ),
                );
            }
        }

        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut by_number: BTreeMap<u32, &str> = BTreeMap::new();
        let mut by_name: BTreeSet<&str> = BTreeSet::new();

        for (index, field_decl) in decl.fields.iter().enumerate() {
            let field = self.resolve_field(site, field_decl, Some((id, index)));

            if !by_name.insert(field_decl.name.as_str()) {
                self.error(
                    DiagnosticKind::DuplicateName,
                    file,
                    field_decl.span,
                    format!("field '{}' is already defined in '{full_name}'", field_decl.name),
                );
            }
            if decl.reserved_names.contains(&field_decl.name) {
                self.error(
                    DiagnosticKind::ReservedName,
                    file,
                    field_decl.span,
                    format!("field name '{}' is reserved in '{full_name}'", field_decl.name),
                );
            }
            if field.number != 0 {
                if let Some(previous) = by_number.insert(field.number, field_decl.name.as_str()) {
                    self.error(
                        DiagnosticKind::DuplicateFieldNumber,
                        file,
                        field_decl.span,
                        format!(
                            "field number {} of '{}' is already used by '{previous}'",
                            field.number, field_decl.name
                        ),
                    );
                }
                if reserved_ranges.iter().any(|r| r.contains(&field.number)) {
                    self.error(
                        DiagnosticKind::InvalidFieldNumber,
                        file,
                        field_decl.span,
                        format!(
                            "field number {} of '{}' is reserved in '{full_name}'",
                            field.number, field_decl.name
                        ),
                    );
                }
                if extension_ranges.iter().any(|r| r.contains(&field.number)) {
                    self.error(
                        DiagnosticKind::InvalidFieldNumber,
                        file,
                        field_decl.span,
                        format!(
                            "field number {} of '{}' lies in an extension range of '{full_name}'",
                            field.number, field_decl.name
                        ),
                    );
                }
            }
            fields.push(field);
        }

        let oneofs = decl
            .oneofs
            .iter()
            .enumerate()
            .map(|(index, oneof)| ResolvedOneof {
                name: oneof.name.clone(),
                fields: fields
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.oneof == Some(index))
                    .map(|(i, _)| i)
                    .collect(),
            })
            .collect::<Vec<_>>();
        for (oneof, oneof_decl) in oneofs.iter().zip(&decl.oneofs) {
            if oneof.fields.is_empty() {
                self.error(
                    DiagnosticKind::Syntax,
                    file,
                    oneof_decl.span,
                    format!("oneof '{}' must have at least one field", oneof.name),
                );
            }
        }

        let message = &mut self.model.messages[id.index()];
        message.fields = fields;
        message.oneofs = oneofs;
        message.reserved_ranges = reserved_ranges;
        message.reserved_names = decl.reserved_names.clone();
        message.extension_ranges = extension_ranges;
        message.options = decl.options.clone();
    }

    /// Checks `reserved`/`extensions` ranges against the field number space
    fn field_ranges(
        &mut self,
        file: FileId,
        ranges: &[NumberRange],
        what: &str,
    ) -> Vec<RangeInclusive<u32>> {
        let mut out = Vec::with_capacity(ranges.len());
        for range in ranges {
            let valid = 1..=i64::from(MAX_FIELD_NUMBER);
            if !valid.contains(&range.start) || !valid.contains(&range.end) {
                self.error(
                    DiagnosticKind::InvalidFieldNumber,
                    file,
                    range.span,
                    format!(
                        "{what} range {} to {} is outside 1 to {MAX_FIELD_NUMBER}",
                        range.start, range.end
                    ),
                );
                continue;
            }
            out.push(range.start as u32..=range.end as u32);
        }
        out
    }

    fn resolve_field(
        &mut self,
        site: Site<'_>,
        decl: &FieldDecl,
        map_slot: Option<(MessageId, usize)>,
    ) -> ResolvedField {
        let number = self.field_number(site.file, decl);

        let (ty, cardinality) = match &decl.ty {
            TypeRef::Scalar(kind) => (FieldType::Scalar(*kind), self.cardinality(site, decl)),
            TypeRef::Named(name) | TypeRef::Group(name) => {
                let ty = self.resolve_type(site, name, decl.span);
                (ty, self.cardinality(site, decl))
            }
            TypeRef::Map { key, value } => {
                let entry = map_slot.and_then(|slot| self.map_entries.get(&slot).copied());
                let ty = match entry {
                    Some(entry) => {
                        self.fill_map_entry(site, entry, key, value, decl.span);
                        FieldType::Message(entry)
                    }
                    None => FieldType::Unresolved(decl.ty.to_string()),
                };
                (ty, Cardinality::Repeated)
            }
        };

        if let Some(default) = decl.option("default") {
            if site.syntax == ProtoSyntax::Proto3 {
                self.error(
                    DiagnosticKind::Syntax,
                    site.file,
                    decl.span,
                    "explicit default values are not allowed in proto3",
                );
            } else if cardinality == Cardinality::Repeated {
                self.error(
                    DiagnosticKind::Syntax,
                    site.file,
                    decl.span,
                    "repeated fields cannot have default values",
                );
            } else if matches!(ty, FieldType::Message(_)) {
                self.error(
                    DiagnosticKind::Syntax,
                    site.file,
                    decl.span,
                    format!("message field '{}' cannot have a default value", decl.name),
                );
            } else if let (FieldType::Enum(e), OptionValue::Ident(value)) = (&ty, default) {
                let known = self.enum_declares(*e, value);
                if !known {
                    self.error(
                        DiagnosticKind::UnknownType,
                        site.file,
                        decl.span,
                        format!("default value '{value}' is not a value of the field's enum"),
                    );
                }
            }
        }

        let packed = decl.option("packed").and_then(OptionValue::as_bool);
        if packed.is_some() && cardinality != Cardinality::Repeated {
            self.error(
                DiagnosticKind::Syntax,
                site.file,
                decl.span,
                format!("[packed] is only valid on repeated fields, not '{}'", decl.name),
            );
        }

        let wire = if matches!(decl.ty, TypeRef::Group(_)) {
            WireMetadata::Group
        } else {
            WireMetadata::Default
        };

        ResolvedField {
            name: decl.name.clone(),
            full_name: qualify(site.scope, &decl.name),
            number,
            cardinality,
            ty,
            oneof: decl.oneof,
            json_name: decl
                .option("json_name")
                .and_then(OptionValue::as_str)
                .map_or_else(|| to_json_name(&decl.name), str::to_string),
            default_value: decl.option("default").cloned(),
            packed,
            deprecated: decl
                .option("deprecated")
                .and_then(OptionValue::as_bool)
                .unwrap_or(false),
            options: decl.options.clone(),
            extendee: None,
            effective: EffectiveType::Unresolved,
            wire,
            span: decl.span,
        }
    }

    /// Enum names are looked up by declaration since values are filled in
    /// a later pass
    fn enum_declares(&self, id: EnumId, value: &str) -> bool {
        self.enums
            .iter()
            .find(|(e, _)| *e == id)
            .is_some_and(|(_, decl)| decl.values.iter().any(|v| v.name == value))
    }

    /// Range-checks a field number. Returns 0 for unusable numbers.
    fn field_number(&mut self, file: FileId, decl: &FieldDecl) -> u32 {
        let number = match u32::try_from(decl.number) {
            Ok(n) if (1..=MAX_FIELD_NUMBER).contains(&n) => n,
            _ => {
                self.error(
                    DiagnosticKind::InvalidFieldNumber,
                    file,
                    decl.span,
                    format!(
                        "field number {} of '{}' is outside 1 to {MAX_FIELD_NUMBER}",
                        decl.number, decl.name
                    ),
                );
                return 0;
            }
        };
        if RESERVED_FIELD_NUMBERS.contains(&number) {
            self.error(
                DiagnosticKind::InvalidFieldNumber,
                file,
                decl.span,
                format!(
                    "field number {number} of '{}' lies in {} to {}, which is reserved for the implementation",
                    decl.name,
                    RESERVED_FIELD_NUMBERS.start(),
                    RESERVED_FIELD_NUMBERS.end()
                ),
            );
        }
        number
    }

    fn cardinality(&mut self, site: Site<'_>, decl: &FieldDecl) -> Cardinality {
        match decl.label {
            Some(Label::Repeated) => Cardinality::Repeated,
            Some(Label::Required) => Cardinality::Required,
            Some(Label::Optional) => Cardinality::Optional,
            None if decl.oneof.is_some() => Cardinality::Optional,
            None if site.syntax == ProtoSyntax::Proto3 => Cardinality::Singular,
            None => {
                self.error(
                    DiagnosticKind::Syntax,
                    site.file,
                    decl.span,
                    format!("proto2 field '{}' is missing a label", decl.name),
                );
                Cardinality::Optional
            }
        }
    }

    fn resolve_type(&mut self, site: Site<'_>, name: &str, span: Span) -> FieldType {
        match self.symbols.resolve(name, site.scope) {
            Resolution::Found(Symbol::Message(id)) => FieldType::Message(id),
            Resolution::Found(Symbol::Enum(id)) => FieldType::Enum(id),
            Resolution::Found(Symbol::Package) => FieldType::Unresolved(name.to_string()),
            Resolution::NotFound(searched) => {
                self.error(
                    DiagnosticKind::UnknownType,
                    site.file,
                    span,
                    format!("unknown type '{name}' (searched {})", searched.join(", ")),
                );
                FieldType::Unresolved(name.to_string())
            }
        }
    }

    fn fill_map_entry(
        &mut self,
        site: Site<'_>,
        entry: MessageId,
        key: &TypeRef,
        value: &TypeRef,
        span: Span,
    ) {
        let key_ty = match key {
            TypeRef::Scalar(kind) => {
                if !kind.is_valid_map_key() {
                    self.error(
                        DiagnosticKind::InvalidMapKey,
                        site.file,
                        span,
                        format!("'{}' cannot be a map key; use an integral or string type", kind.as_str()),
                    );
                }
                FieldType::Scalar(*kind)
            }
            other => {
                self.error(
                    DiagnosticKind::InvalidMapKey,
                    site.file,
                    span,
                    format!("'{other}' cannot be a map key; use an integral or string type"),
                );
                FieldType::Unresolved(other.to_string())
            }
        };
        let value_ty = match value {
            TypeRef::Scalar(kind) => FieldType::Scalar(*kind),
            TypeRef::Named(name) => self.resolve_type(site, name, span),
            other => FieldType::Unresolved(other.to_string()),
        };

        let entry_full = self.model.messages[entry.index()].full_name.clone();
        let synthetic = |name: &str, number: u32, ty: FieldType| ResolvedField {
            name: name.to_string(),
            full_name: qualify(&entry_full, name),
            number,
            cardinality: Cardinality::Optional,
            ty,
            oneof: None,
            json_name: name.to_string(),
            default_value: None,
            packed: None,
            deprecated: false,
            options: Vec::new(),
            extendee: None,
            effective: EffectiveType::Unresolved,
            wire: WireMetadata::Default,
            span,
        };
        let fields = vec![synthetic("key", 1, key_ty), synthetic("value", 2, value_ty)];
        self.model.messages[entry.index()].fields = fields;
    }

    // ---- pass 3: enums -------------------------------------------------

    fn resolve_enums(&mut self) {
        let pending = self.enums.clone();
        for (id, decl) in pending {
            self.resolve_enum(id, decl);
        }
    }

    fn resolve_enum(&mut self, id: EnumId, decl: &EnumDecl) {
        let file = self.model.enums[id.index()].file;
        let full_name = self.model.enums[id.index()].full_name.clone();
        let syntax = self.model.files[file.index()].syntax;
        let allow_alias = decl
            .options
            .iter()
            .rev()
            .find(|o| o.name == "allow_alias")
            .and_then(|o| o.value.as_bool())
            .unwrap_or(false);

        let mut reserved_ranges = Vec::new();
        for range in &decl.reserved_ranges {
            let start = i32::try_from(range.start);
            // `max` parses to the field maximum; enums extend to i32::MAX
            let end = if range.end == i64::from(MAX_FIELD_NUMBER) {
                Ok(i32::MAX)
            } else {
                i32::try_from(range.end)
            };
            match (start, end) {
                (Ok(start), Ok(end)) => reserved_ranges.push(start..=end),
                _ => self.error(
                    DiagnosticKind::InvalidEnum,
                    file,
                    range.span,
                    format!("reserved range {} to {} is outside the 32-bit range", range.start, range.end),
                ),
            }
        }

        if decl.values.is_empty() {
            self.error(
                DiagnosticKind::InvalidEnum,
                file,
                decl.span,
                format!("enum '{full_name}' must define at least one value"),
            );
        }

        let mut values = Vec::with_capacity(decl.values.len());
        let mut by_number: BTreeMap<i32, &str> = BTreeMap::new();
        let mut by_name: BTreeSet<&str> = BTreeSet::new();
        let mut aliased = false;

        for value in &decl.values {
            let Ok(number) = i32::try_from(value.number) else {
                self.error(
                    DiagnosticKind::InvalidEnum,
                    file,
                    value.span,
                    format!("value {} of '{}' is outside the 32-bit range", value.number, value.name),
                );
                continue;
            };
            if !by_name.insert(value.name.as_str()) {
                self.error(
                    DiagnosticKind::DuplicateName,
                    file,
                    value.span,
                    format!("'{}' is already defined in '{full_name}'", value.name),
                );
            }
            if let Some(previous) = by_number.get(&number) {
                aliased = true;
                if !allow_alias {
                    self.error(
                        DiagnosticKind::InvalidEnum,
                        file,
                        value.span,
                        format!(
                            "'{}' reuses number {number} of '{previous}'; set option allow_alias = true to permit this",
                            value.name
                        ),
                    );
                }
            } else {
                by_number.insert(number, value.name.as_str());
            }
            if reserved_ranges.iter().any(|r| r.contains(&number)) {
                self.error(
                    DiagnosticKind::InvalidEnum,
                    file,
                    value.span,
                    format!("'{}' uses reserved number {number}", value.name),
                );
            }
            if decl.reserved_names.contains(&value.name) {
                self.error(
                    DiagnosticKind::ReservedName,
                    file,
                    value.span,
                    format!("enum value name '{}' is reserved in '{full_name}'", value.name),
                );
            }
            values.push(ResolvedEnumValue {
                name: value.name.clone(),
                number,
                deprecated: value
                    .options
                    .iter()
                    .rev()
                    .find(|o| o.name == "deprecated")
                    .and_then(|o| o.value.as_bool())
                    .unwrap_or(false),
                options: value.options.clone(),
            });
        }

        if syntax == ProtoSyntax::Proto3
            && !decl.values.is_empty()
            && !values.iter().any(|v| v.number == 0)
        {
            self.error(
                DiagnosticKind::InvalidEnum,
                file,
                decl.span,
                format!("proto3 enum '{full_name}' must have a value numbered zero"),
            );
        }
        if allow_alias && !aliased {
            self.error(
                DiagnosticKind::InvalidEnum,
                file,
                decl.span,
                format!("'{full_name}' sets allow_alias but declares no aliases"),
            );
        }

        let resolved = &mut self.model.enums[id.index()];
        resolved.values = values;
        resolved.allow_alias = allow_alias;
        resolved.reserved_ranges = reserved_ranges;
    }

    // ---- pass 4: services and extensions --------------------------------

    fn resolve_services(&mut self) {
        let pending = self.services.clone();
        for (file, decl) in pending {
            let package = self.model.files[file.index()].package.clone();
            let site = Site {
                file,
                scope: &package,
                syntax: self.model.files[file.index()].syntax,
            };
            let methods = decl
                .methods
                .iter()
                .map(|method| ResolvedMethod {
                    name: method.name.clone(),
                    input: self.resolve_message_type(site, &method.input, method.span),
                    output: self.resolve_message_type(site, &method.output, method.span),
                    client_streaming: method.client_streaming,
                    server_streaming: method.server_streaming,
                    options: method.options.clone(),
                })
                .collect();
            self.model.files[file.index()].services.push(ResolvedService {
                name: decl.name.clone(),
                full_name: qualify(&package, &decl.name),
                methods,
                options: decl.options.clone(),
            });
        }
    }

    fn resolve_message_type(&mut self, site: Site<'_>, name: &str, span: Span) -> FieldType {
        match self.resolve_type(site, name, span) {
            FieldType::Enum(id) => {
                let full_name = self.model.enums[id.index()].full_name.clone();
                self.error(
                    DiagnosticKind::UnknownType,
                    site.file,
                    span,
                    format!("'{full_name}' is an enum, not a message type"),
                );
                FieldType::Unresolved(name.to_string())
            }
            other => other,
        }
    }

    fn resolve_extensions(&mut self) {
        let pending = self.extends.clone();
        let mut used: BTreeMap<(MessageId, u32), String> = BTreeMap::new();

        for PendingExtend { file, owner, decl } in pending {
            let scope = match owner {
                Some(owner) => self.model.messages[owner.index()].full_name.clone(),
                None => self.model.files[file.index()].package.clone(),
            };
            let site = Site {
                file,
                scope: &scope,
                syntax: self.model.files[file.index()].syntax,
            };
            let extendee = match self.resolve_type(site, &decl.extendee, decl.span) {
                FieldType::Message(id) => Some(id),
                FieldType::Enum(id) => {
                    let full_name = self.model.enums[id.index()].full_name.clone();
                    self.error(
                        DiagnosticKind::InvalidExtension,
                        file,
                        decl.span,
                        format!("'{full_name}' is an enum and cannot be extended"),
                    );
                    None
                }
                _ => None,
            };

            for field_decl in &decl.fields {
                let mut field = self.resolve_field(site, field_decl, None);
                field.extendee = extendee;

                if let (Some(target), true) = (extendee, field.number != 0) {
                    let target_message = &self.model.messages[target.index()];
                    let target_name = target_message.full_name.clone();
                    let in_range = target_message
                        .extension_ranges
                        .iter()
                        .any(|r| r.contains(&field.number));
                    if !in_range {
                        self.error(
                            DiagnosticKind::InvalidExtension,
                            file,
                            field_decl.span,
                            format!(
                                "'{target_name}' does not declare {} as an extension number",
                                field.number
                            ),
                        );
                    }
                    if let Some(previous) = used.insert((target, field.number), field.full_name.clone()) {
                        self.error(
                            DiagnosticKind::InvalidExtension,
                            file,
                            field_decl.span,
                            format!(
                                "extension number {} of '{target_name}' is already used by '{previous}'",
                                field.number
                            ),
                        );
                    }
                }
                if field.cardinality == Cardinality::Required {
                    self.error(
                        DiagnosticKind::InvalidExtension,
                        file,
                        field_decl.span,
                        format!("extension '{}' cannot be required", field.name),
                    );
                }

                match owner {
                    Some(owner) => self.model.messages[owner.index()].extensions.push(field),
                    None => self.model.files[file.index()].extensions.push(field),
                }
            }
        }
    }

    // ---- pass 5: null-carrying collections ------------------------------

    fn apply_null_support(&mut self, config: &CompilerConfig) {
        for path in &config.null_support {
            let Some((owner, field)) = self.null_support_target(path) else {
                self.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::InvalidNullSupport,
                    CONFIG_ORIGIN,
                    Span::default(),
                    format!("null support requested for '{path}', which names no field"),
                ));
                continue;
            };

            let message = &self.model.messages[owner.index()];
            let target = &message.fields[field];
            let element = match target.ty {
                FieldType::Message(element)
                    if target.is_repeated()
                        && self.model.messages[element.index()].origin != MessageOrigin::MapEntry =>
                {
                    Some(element)
                }
                _ => None,
            };
            let Some(element) = element else {
                let (file, span) = (message.file, target.span);
                self.error(
                    DiagnosticKind::InvalidNullSupport,
                    file,
                    span,
                    format!("'{path}' must be a repeated message field to carry null elements"),
                );
                continue;
            };

            let wrapper = self.synthesize_null_wrapper(owner, element);
            let target = &mut self.model.messages[owner.index()].fields[field];
            target.ty = FieldType::Message(wrapper);
            target.wire = WireMetadata::Group;
            debug!(
                "Field {} carries null elements through {}",
                path,
                self.model.messages[wrapper.index()].full_name
            );
        }
    }

    fn null_support_target(&self, path: &str) -> Option<(MessageId, usize)> {
        let (owner, field) = path.rsplit_once('.')?;
        let Symbol::Message(owner) = self.symbols.get(owner)? else {
            return None;
        };
        let index = self.model.messages[owner.index()]
            .fields
            .iter()
            .position(|f| f.name == field)?;
        Some((owner, index))
    }

    fn synthesize_null_wrapper(&mut self, owner: MessageId, element: MessageId) -> MessageId {
        let owner_message = &self.model.messages[owner.index()];
        let (file, span) = (owner_message.file, owner_message.span);
        let owner_name = owner_message.full_name.clone();

        let mut name = format!("NullWrapped{}", self.model.messages[element.index()].name);
        while self.symbols.get(&qualify(&owner_name, &name)).is_some() {
            name.push('_');
        }
        let full_name = qualify(&owner_name, &name);
        let wrapper = self.push_message(
            file,
            Some(owner),
            name,
            full_name.clone(),
            MessageOrigin::NullWrapper { element },
            span,
        );
        self.declare(&full_name, Symbol::Message(wrapper), file, span);
        self.model.messages[owner.index()].messages.push(wrapper);
        wrapper
    }

    // ---- pass 6: policy -------------------------------------------------

    fn apply_policy(&mut self, options: PolicyOptions) {
        for index in 0..self.model.messages.len() {
            let file = self.model.messages[index].file;
            let level = self.model.files[file.index()].compatibility_level;
            for f in 0..self.model.messages[index].fields.len() {
                let decision = self.decide(&self.model.messages[index].fields[f], level, options);
                apply(&mut self.model.messages[index].fields[f], decision);
            }
            for f in 0..self.model.messages[index].extensions.len() {
                let decision = self.decide(&self.model.messages[index].extensions[f], level, options);
                apply(&mut self.model.messages[index].extensions[f], decision);
            }
        }
        for index in 0..self.model.files.len() {
            let level = self.model.files[index].compatibility_level;
            for f in 0..self.model.files[index].extensions.len() {
                let decision = self.decide(&self.model.files[index].extensions[f], level, options);
                apply(&mut self.model.files[index].extensions[f], decision);
            }
        }
    }

    fn decide(
        &self,
        field: &ResolvedField,
        file_level: CompatibilityLevel,
        options: PolicyOptions,
    ) -> policy::Decision {
        let target = match field.ty {
            FieldType::Message(id) => Some(self.model.messages[id.index()].full_name.as_str()),
            _ => None,
        };
        policy::decide(
            &FieldContext {
                cardinality: field.cardinality,
                ty: &field.ty,
                target,
                file_level,
                group_framed: field.wire == WireMetadata::Group,
            },
            options,
        )
    }
}

fn apply(field: &mut ResolvedField, decision: policy::Decision) {
    if decision.wire != WireMetadata::Default {
        trace!("{}: {:?}", field.full_name, decision.wire);
    }
    field.effective = decision.effective;
    field.wire = decision.wire;
}
