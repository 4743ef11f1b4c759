//! # ferrule-core
//!
//! A compiler for Protocol Buffer schema files.
//!
//! This crate provides the core functionality for:
//! - Locating schema files and resolving their import graph
//! - Building a resolved, cross-file semantic model with collected diagnostics
//! - Deciding how nullable wrappers, temporal well-known types and
//!   null-carrying collections are represented on the wire
//! - Rendering the model into source code, snapshots and descriptor sets
//!
//! ## Architecture
//!
//! The pipeline runs in stages, each consuming the previous one's output:
//!
//! - [`source`] and [`descriptor`]: locate and parse schema text
//! - [`graph`]: follow imports, detect cycles, order files by dependency
//! - [`model`]: bind names, validate numbering, synthesize map entries
//! - [`policy`]: per-field wire decisions for well-known types
//! - [`render`]: the renderer contract and the built-in renderers
//! - [`snapshot`], [`wire`]: canonical JSON export and wire framing helpers
//!
//! ## Example
//!
//! ```no_run
//! use ferrule_core::{Compiler, CompilerConfig};
//!
//! let config = CompilerConfig::new()
//!     .search_root("./proto")
//!     .support_null("shop.Basket.items");
//!
//! let compiler = Compiler::new(config);
//! for unit in compiler.generate("shop/basket.proto", "rust")? {
//!     println!("// {}\n{}", unit.name, unit.text);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`SourceProvider`]: read schemas from somewhere other than disk
//! - [`CodeRenderer`]: add a target language
//! - [`ModelVisitor`]: walk the resolved model without re-parsing

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod compiler;
pub mod config;
pub mod descriptor;
pub mod diagnostic;
pub mod error;
pub mod graph;
pub mod model;
pub mod naming;
pub mod policy;
pub mod render;
pub mod snapshot;
pub mod source;
pub mod wire;

// Re-export primary types for convenience
pub use compiler::{Analysis, Compilation, Compiler};
pub use config::CompilerConfig;
pub use diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{Error, Result};
pub use model::ResolvedModel;
pub use policy::{CompatibilityLevel, DataFormat, EffectiveType, WireMetadata};
pub use render::{CodeRenderer, GeneratedUnit, ModelStats, ModelVisitor, RendererRegistry};
pub use source::{FileSystem, InMemory, SourceProvider};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
/// Used for `reserved X to max` ranges
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Field numbers reserved for the protobuf implementation itself
pub const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<u32> = 19_000..=19_999;
