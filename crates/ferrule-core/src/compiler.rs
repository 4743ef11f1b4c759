//! One-call compilation pipeline.
//!
//! [`Compiler`] ties the stages together: locate and parse the import graph,
//! build the resolved model, and hand it to a renderer. Every run reads its
//! settings from the [`CompilerConfig`] the compiler was created with.

use crate::config::CompilerConfig;
use crate::diagnostic::Diagnostics;
use crate::error::{Error, Result};
use crate::graph::{resolve_imports, ImportGraph};
use crate::model::{build, ResolvedModel};
use crate::render::{render_model, CodeRenderer, GeneratedUnit, RenderOptions, RendererRegistry};
use crate::snapshot;
use crate::source::{FileSystem, SourceProvider};
use tracing::{debug, info, warn};

/// A successfully compiled set of schemas
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The frozen model
    pub model: ResolvedModel,
    /// Warnings collected on the way; never contains errors
    pub warnings: Diagnostics,
}

/// Outcome of analysis, whether or not it found errors
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Possibly partial model
    pub model: ResolvedModel,
    /// Syntax diagnostics followed by semantic ones
    pub diagnostics: Diagnostics,
}

/// Compilation driver
#[derive(Debug)]
pub struct Compiler<P = FileSystem> {
    config: CompilerConfig,
    provider: P,
    registry: RendererRegistry,
}

impl Compiler<FileSystem> {
    /// Creates a compiler reading schemas from disk
    pub fn new(config: CompilerConfig) -> Self {
        Self::with_provider(config, FileSystem)
    }
}

impl<P: SourceProvider> Compiler<P> {
    /// Creates a compiler reading schemas through `provider`
    pub fn with_provider(config: CompilerConfig, provider: P) -> Self {
        Self {
            config,
            provider,
            registry: RendererRegistry::default(),
        }
    }

    /// Adds or replaces a renderer
    pub fn with_renderer(mut self, renderer: impl CodeRenderer + 'static) -> Self {
        self.registry.register(renderer);
        self
    }

    /// Configuration the compiler was built with
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Renderers available to [`Compiler::generate`]
    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    /// Parses `entry` and everything it imports
    pub fn load(&self, entry: &str) -> Result<ImportGraph> {
        resolve_imports(&self.provider, &self.config.search_roots, entry)
    }

    /// Loads and resolves `entry`, returning every diagnostic instead of
    /// failing on them. Only fatal loader errors are returned as `Err`.
    pub fn analyze(&self, entry: &str) -> Result<Analysis> {
        let graph = self.load(entry)?;
        let mut diagnostics = graph.diagnostics();
        let output = build(&graph, &self.config);
        diagnostics.extend(output.diagnostics);
        Ok(Analysis {
            model: output.model,
            diagnostics,
        })
    }

    /// Compiles `entry` into a resolved model.
    ///
    /// Fails with [`Error::Compilation`] carrying every diagnostic when any
    /// of them is an error.
    pub fn compile(&self, entry: &str) -> Result<Compilation> {
        let analysis = self.analyze(entry)?;
        if analysis.diagnostics.has_errors() {
            debug!(
                "{} failed with {} error(s)",
                entry,
                analysis.diagnostics.error_count()
            );
            return Err(Error::Compilation(analysis.diagnostics));
        }
        for warning in analysis.diagnostics.iter() {
            warn!("{}", warning);
        }
        info!(
            "Compiled {}: {} file(s), {} message(s), {} enum(s)",
            entry,
            analysis.model.files().len(),
            analysis.model.messages().len(),
            analysis.model.enums().len()
        );
        Ok(Compilation {
            model: analysis.model,
            warnings: analysis.diagnostics,
        })
    }

    /// Compiles `entry` and renders one unit per schema file for `target`
    pub fn generate(&self, entry: &str, target: &str) -> Result<Vec<GeneratedUnit>> {
        let renderer = self.registry.get(target)?;
        let options = RenderOptions::from_config(&self.config)?;
        let compilation = self.compile(entry)?;
        render_model(&compilation.model, renderer, &options)
    }

    /// Compiles `entry` and returns its canonical JSON snapshot
    pub fn snapshot(&self, entry: &str) -> Result<String> {
        let compilation = self.compile(entry)?;
        snapshot::to_json(&compilation.model)
    }

    /// Compiles `entry` and returns the encoded `FileDescriptorSet`, after
    /// checking it builds a descriptor pool
    pub fn descriptor_set(&self, entry: &str) -> Result<Vec<u8>> {
        let compilation = self.compile(entry)?;
        compilation.model.descriptor_pool()?;
        Ok(compilation.model.encode_descriptor_set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;
    use crate::policy::{
        CompatibilityLevel, EffectiveType, NullableScalar, NullableTemporal, WireMetadata,
    };
    use crate::model::MessageOrigin;
    use crate::source::InMemory;
    use crate::wire::encode_collection;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const WRAPPERS: [(&str, NullableScalar); 9] = [
        ("DoubleValue", NullableScalar::Double),
        ("FloatValue", NullableScalar::Float),
        ("Int64Value", NullableScalar::Int64),
        ("UInt64Value", NullableScalar::Uint64),
        ("Int32Value", NullableScalar::Int32),
        ("UInt32Value", NullableScalar::Uint32),
        ("BoolValue", NullableScalar::Bool),
        ("StringValue", NullableScalar::String),
        ("BytesValue", NullableScalar::Bytes),
    ];

    fn compiler(files: &[(&str, &str)], config: CompilerConfig) -> Compiler<InMemory> {
        let mut provider = InMemory::new();
        for (name, text) in files {
            provider.insert(*name, *text);
        }
        Compiler::with_provider(config, provider)
    }

    fn wrapper_schema() -> String {
        let mut text = String::from(
            "syntax = \"proto3\";\npackage w;\nimport \"google/protobuf/wrappers.proto\";\nmessage All {\n",
        );
        for (i, (name, _)) in WRAPPERS.iter().enumerate() {
            text.push_str(&format!("  .google.protobuf.{name} f{} = {};\n", i + 1, i + 1));
        }
        text.push_str("}\n");
        text
    }

    #[test]
    fn test_generation_is_deterministic() {
        let schema = wrapper_schema();
        let files = [("w.proto", schema.as_str())];
        let first = compiler(&files, CompilerConfig::default());
        let second = compiler(&files, CompilerConfig::default());
        for target in ["rust", "proto"] {
            assert_eq!(
                first.generate("w.proto", target).unwrap(),
                second.generate("w.proto", target).unwrap()
            );
        }
        assert_eq!(
            first.snapshot("w.proto").unwrap(),
            second.snapshot("w.proto").unwrap()
        );
    }

    #[test]
    fn test_all_wrappers_collapse() {
        let schema = wrapper_schema();
        let compilation = compiler(&[("w.proto", &schema)], CompilerConfig::default())
            .compile("w.proto")
            .unwrap();
        let all = compilation.model.find_message("w.All").unwrap();
        for (i, (_, nullable)) in WRAPPERS.iter().enumerate() {
            let field = &all.fields[i];
            assert_eq!(field.effective, EffectiveType::NullableScalar(*nullable));
            assert_eq!(field.wire, WireMetadata::NullWrapped(*nullable));
            assert!(field.wire.is_null_wrapped());
        }
    }

    #[test]
    fn test_wrappers_disabled_drop_marker() {
        let schema = wrapper_schema();
        let config = CompilerConfig::default().null_wrappers(false);
        let compilation = compiler(&[("w.proto", &schema)], config)
            .compile("w.proto")
            .unwrap();
        let all = compilation.model.find_message("w.All").unwrap();
        for field in &all.fields {
            assert!(!field.wire.is_null_wrapped(), "{}", field.name);
            assert!(matches!(field.effective, EffectiveType::Message(_)));
        }
    }

    #[test]
    fn test_temporal_marker_moves_to_data_format() {
        let schema = r#"
            syntax = "proto3";
            package t;
            import "google/protobuf/timestamp.proto";
            import "google/protobuf/duration.proto";
            message Span {
              google.protobuf.Timestamp start = 42;
              google.protobuf.Duration length = 43;
            }
        "#;
        let on = compiler(&[("t.proto", schema)], CompilerConfig::default())
            .compile("t.proto")
            .unwrap();
        let start = on.model.find_message("t.Span").unwrap().field("start").unwrap();
        assert_eq!(start.effective, EffectiveType::NullableTemporal(NullableTemporal::Instant));
        assert_eq!(start.wire.required_compat_level(), Some(CompatibilityLevel(300)));

        let off = compiler(&[("t.proto", schema)], CompilerConfig::default().compat_level(false))
            .compile("t.proto")
            .unwrap();
        let span = off.model.find_message("t.Span").unwrap();
        let start = span.field_by_number(42).unwrap();
        assert_eq!(start.effective, EffectiveType::NullableTemporal(NullableTemporal::Instant));
        assert_eq!(start.wire.required_compat_level(), None);
        assert_eq!(
            start.wire,
            WireMetadata::WellKnownFormat(NullableTemporal::Instant)
        );
        assert_eq!(start.wire.data_format().as_str(), "well_known");
        let length = span.field("length").unwrap();
        assert_eq!(length.effective, EffectiveType::NullableTemporal(NullableTemporal::Duration));
    }

    #[test]
    fn test_null_carrying_collection_end_to_end() {
        let schema = r#"
            syntax = "proto3";
            package n;
            message Item { int32 id = 1; }
            message Bag { repeated Item items = 1; repeated Item plain = 2; }
        "#;
        let config = CompilerConfig::default().support_null(".n.Bag.items");
        let compilation = compiler(&[("n.proto", schema)], config)
            .compile("n.proto")
            .unwrap();
        let model = &compilation.model;
        let wrapper = model.find_message("n.Bag.NullWrappedItem").unwrap();
        assert!(wrapper.fields.is_empty());
        assert!(matches!(wrapper.origin, MessageOrigin::NullWrapper { .. }));

        let bag = model.find_message("n.Bag").unwrap();
        let items = bag.field("items").unwrap();
        assert_eq!(items.wire, WireMetadata::Group);

        let json: serde_json::Value =
            serde_json::from_str(&snapshot::to_json(model).unwrap()).unwrap();
        let bag_json = &json["files"][0]["messages"][1];
        assert_eq!(bag_json["fields"][0]["type"], "n.Bag.NullWrappedItem");
        assert_eq!(bag_json["fields"][0]["data_format"], "group");
        assert_eq!(bag_json["messages"][0]["origin"]["null_wrapper"]["element"], "n.Item");

        let mut buf = Vec::new();
        encode_collection(model, items, &[Some(&[0x08, 0x01][..]), None], &mut buf).unwrap();

        let plain = bag.field("plain").unwrap();
        let err = encode_collection(model, plain, &[Some(&[0x08, 0x01][..]), None], &mut Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NullInUnsupportedCollection { index: 1, ref field } if field == "n.Bag.plain"
        ));
    }

    #[test]
    fn test_import_failures() {
        let c = compiler(
            &[("a.proto", "syntax = \"proto3\"; import \"missing.proto\";")],
            CompilerConfig::default(),
        );
        assert!(matches!(
            c.compile("a.proto"),
            Err(Error::UnresolvedImport { ref import, .. }) if import == "missing.proto"
        ));

        let c = compiler(
            &[
                ("a.proto", "syntax = \"proto3\"; import \"b.proto\";"),
                ("b.proto", "syntax = \"proto3\"; import \"a.proto\";"),
            ],
            CompilerConfig::default(),
        );
        match c.compile("a.proto") {
            Err(Error::CyclicImport { cycle }) => assert_eq!(cycle, vec!["a.proto", "b.proto"]),
            other => panic!("expected a cycle, got {other:?}"),
        }

        let c = compiler(&[], CompilerConfig::default().search_root("nowhere"));
        match c.compile("gone.proto") {
            Err(Error::SchemaNotFound { name, roots }) => {
                assert_eq!(name, "gone.proto");
                assert_eq!(roots, vec![PathBuf::from("nowhere")]);
            }
            other => panic!("expected SchemaNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_numbering_errors_are_collected() {
        let c = compiler(
            &[(
                "m.proto",
                "syntax = \"proto3\"; message M { int32 a = 5; int32 b = 5; int32 c = 19500; }",
            )],
            CompilerConfig::default(),
        );
        let Err(Error::Compilation(diagnostics)) = c.compile("m.proto") else {
            panic!("expected compilation errors");
        };
        assert_eq!(diagnostics.of_kind(DiagnosticKind::DuplicateFieldNumber).count(), 1);
        assert_eq!(diagnostics.of_kind(DiagnosticKind::InvalidFieldNumber).count(), 1);
        assert!(c.generate("m.proto", "rust").is_err());
    }

    #[test]
    fn test_syntax_and_semantic_errors_reported_together() {
        let c = compiler(
            &[(
                "m.proto",
                "syntax = \"proto3\"; message M { int32 = 1; Missing m = 2; }",
            )],
            CompilerConfig::default(),
        );
        let analysis = c.analyze("m.proto").unwrap();
        assert!(analysis.diagnostics.of_kind(DiagnosticKind::Syntax).count() >= 1);
        assert_eq!(analysis.diagnostics.of_kind(DiagnosticKind::UnknownType).count(), 1);
    }

    #[test]
    fn test_nested_declaration_shadows_global() {
        let c = compiler(
            &[(
                "s.proto",
                r#"
                syntax = "proto3";
                package s;
                message Inner { string global = 1; }
                message Outer {
                  message Inner { int32 local = 1; }
                  Inner value = 1;
                }
                "#,
            )],
            CompilerConfig::default(),
        );
        let compilation = c.compile("s.proto").unwrap();
        let model = &compilation.model;
        let value = model.find_message("s.Outer").unwrap().field("value").unwrap();
        assert_eq!(model.type_name(&value.ty), "s.Outer.Inner");
    }

    #[test]
    fn test_unknown_target() {
        let c = compiler(&[("e.proto", "syntax = \"proto3\";")], CompilerConfig::default());
        assert!(matches!(
            c.generate("e.proto", "cobol"),
            Err(Error::UnknownTarget(_))
        ));
        let units = c.generate("e.proto", "rust").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "e.rs");
    }

    #[test]
    fn test_descriptor_set_round_trips_through_prost() {
        use prost::Message;
        let c = compiler(
            &[("d.proto", "syntax = \"proto3\"; package d; message D { map<string, int64> m = 1; }")],
            CompilerConfig::default(),
        );
        let bytes = c.descriptor_set("d.proto").unwrap();
        let set = prost_types::FileDescriptorSet::decode(bytes.as_slice()).unwrap();
        assert_eq!(set.file.len(), 1);
        assert_eq!(set.file[0].message_type[0].nested_type[0].name(), "MEntry");
    }
}
