//! Read-only traversal of a resolved model.
//!
//! This module provides the [`ModelVisitor`] trait for tools that need to see
//! every declaration without re-parsing, and [`walk`], which drives a visitor
//! in the same order the renderers emit declarations.

use crate::model::{
    ResolvedEnum, ResolvedField, ResolvedFile, ResolvedMessage, ResolvedMethod, ResolvedModel,
    ResolvedOneof, ResolvedService,
};

/// Callbacks for each kind of declaration.
///
/// Every method has an empty default, so implementors only override what
/// they care about.
///
/// # Example
///
/// ```
/// use ferrule_core::render::ModelVisitor;
/// use ferrule_core::model::ResolvedMessage;
///
/// struct Names(Vec<String>);
///
/// impl ModelVisitor for Names {
///     fn visit_message(&mut self, message: &ResolvedMessage) {
///         self.0.push(message.full_name.clone());
///     }
/// }
/// ```
pub trait ModelVisitor {
    /// Called once per file, before its declarations
    fn visit_file(&mut self, file: &ResolvedFile) {
        let _ = file;
    }

    /// Called for every message, synthetic ones included
    fn visit_message(&mut self, message: &ResolvedMessage) {
        let _ = message;
    }

    /// Called for every field and extension
    fn visit_field(&mut self, field: &ResolvedField) {
        let _ = field;
    }

    /// Called for every `oneof`, after its message's fields
    fn visit_oneof(&mut self, oneof: &ResolvedOneof) {
        let _ = oneof;
    }

    /// Called for every enum, nested ones after their message
    fn visit_enum(&mut self, enumeration: &ResolvedEnum) {
        let _ = enumeration;
    }

    /// Called for every service
    fn visit_service(&mut self, service: &ResolvedService) {
        let _ = service;
    }

    /// Called for every method, after its service
    fn visit_method(&mut self, method: &ResolvedMethod) {
        let _ = method;
    }
}

/// Visits every file of the model depth-first, in dependency order
pub fn walk(model: &ResolvedModel, visitor: &mut dyn ModelVisitor) {
    for file in model.files() {
        visitor.visit_file(file);
        for id in &file.messages {
            walk_message(model, model.message(*id), visitor);
        }
        for id in &file.enums {
            visitor.visit_enum(model.enumeration(*id));
        }
        for service in &file.services {
            visitor.visit_service(service);
            for method in &service.methods {
                visitor.visit_method(method);
            }
        }
        for extension in &file.extensions {
            visitor.visit_field(extension);
        }
    }
}

fn walk_message(model: &ResolvedModel, message: &ResolvedMessage, visitor: &mut dyn ModelVisitor) {
    visitor.visit_message(message);
    for field in &message.fields {
        visitor.visit_field(field);
    }
    for oneof in &message.oneofs {
        visitor.visit_oneof(oneof);
    }
    for id in &message.messages {
        walk_message(model, model.message(*id), visitor);
    }
    for id in &message.enums {
        visitor.visit_enum(model.enumeration(*id));
    }
    for extension in &message.extensions {
        visitor.visit_field(extension);
    }
}

/// A visitor that counts declarations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModelStats {
    /// Number of files
    pub file_count: usize,
    /// Number of declared messages (groups included)
    pub message_count: usize,
    /// Number of compiler-generated messages
    pub synthetic_count: usize,
    /// Number of fields and extensions
    pub field_count: usize,
    /// Number of enums
    pub enum_count: usize,
    /// Number of services
    pub service_count: usize,
    /// Number of methods
    pub method_count: usize,
}

impl ModelStats {
    /// Counts the declarations of a whole model
    pub fn of(model: &ResolvedModel) -> Self {
        let mut stats = Self::default();
        walk(model, &mut stats);
        stats
    }
}

impl ModelVisitor for ModelStats {
    fn visit_file(&mut self, _file: &ResolvedFile) {
        self.file_count += 1;
    }

    fn visit_message(&mut self, message: &ResolvedMessage) {
        if message.origin.is_synthetic() {
            self.synthetic_count += 1;
        } else {
            self.message_count += 1;
        }
    }

    fn visit_field(&mut self, _field: &ResolvedField) {
        self.field_count += 1;
    }

    fn visit_enum(&mut self, _enumeration: &ResolvedEnum) {
        self.enum_count += 1;
    }

    fn visit_service(&mut self, _service: &ResolvedService) {
        self.service_count += 1;
    }

    fn visit_method(&mut self, _method: &ResolvedMethod) {
        self.method_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::graph::resolve_imports;
    use crate::model::build;
    use crate::source::InMemory;

    #[test]
    fn test_stats_visitor() {
        let provider = InMemory::new().with_file(
            "shop.proto",
            r#"
            syntax = "proto3";
            package shop;
            message Order {
              message Line { string sku = 1; }
              repeated Line lines = 1;
              map<string, string> tags = 2;
              enum State { NEW = 0; DONE = 1; }
              State state = 3;
            }
            service Orders {
              rpc Get(Order) returns (Order);
              rpc Watch(Order) returns (stream Order);
            }
            "#,
        );
        let graph = resolve_imports(&provider, &[], "shop.proto").unwrap();
        let out = build(&graph, &CompilerConfig::default());
        assert!(!out.diagnostics.has_errors(), "{}", out.diagnostics);

        let stats = ModelStats::of(&out.model);
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.synthetic_count, 1);
        // sku, lines, tags, state, plus key and value of the map entry
        assert_eq!(stats.field_count, 6);
        assert_eq!(stats.enum_count, 1);
        assert_eq!(stats.service_count, 1);
        assert_eq!(stats.method_count, 2);
    }

    #[test]
    fn test_default_visitor_ignores_everything() {
        struct Nothing;
        impl ModelVisitor for Nothing {}
        walk(&ResolvedModel::default(), &mut Nothing);
    }
}
