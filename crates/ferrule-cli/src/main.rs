//! ferrule - Compile Protocol Buffer schemas into generated source
//!
//! This tool resolves `.proto` files and their imports, applies the nullable
//! well-known type policies and writes one generated unit per schema file.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use ferrule_core::model::{
    ResolvedEnum, ResolvedField, ResolvedFile, ResolvedMessage, ResolvedMethod, ResolvedModel,
    ResolvedService,
};
use ferrule_core::render::{render_model, unit_name, walk, RenderOptions};
use ferrule_core::{snapshot, Compiler, CompilerConfig, ModelStats, ModelVisitor};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Compile Protocol Buffer schemas into generated source
#[derive(Parser, Debug)]
#[command(name = "ferrule")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Directory searched for imports; may be repeated, first match wins
    #[arg(short = 'I', long = "proto-path", value_name = "DIR")]
    proto_path: Vec<PathBuf>,

    /// Renderer to generate code with
    #[arg(short, long, default_value = "rust")]
    target: String,

    /// Compiler or renderer option, e.g. nullwrappers=false or indent=2
    #[arg(long = "opt", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    options: Vec<(String, String)>,

    /// Full name of a repeated field whose elements may be null, e.g. shop.Order.items
    #[arg(long = "support-null", value_name = "FIELD")]
    support_null: Vec<String>,

    /// Write the canonical JSON snapshot instead of generated code
    #[arg(long, conflicts_with = "descriptor_set")]
    snapshot: bool,

    /// Write the encoded FileDescriptorSet instead of generated code
    #[arg(long)]
    descriptor_set: bool,

    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry run - don't write files, just show what would be generated
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files whose content differs
    #[arg(long)]
    force: bool,

    /// Only list the files that would be generated
    #[arg(long)]
    list_only: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single schema file to compile
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory whose .proto files are all compiled
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// One file to be written, relative to the output directory
#[derive(Debug)]
struct Artifact {
    path: PathBuf,
    contents: Vec<u8>,
}

/// Outcome of registering an artifact
#[derive(Debug, PartialEq, Eq)]
enum Registration {
    New,
    /// Same path, same content; another entry already produced it
    Duplicate,
    /// Same path, different content
    Conflict,
}

/// Tracks artifacts across entries so shared imports are written once
#[derive(Default)]
struct OutputRegistry {
    /// Maps relative output path -> content hash
    seen: HashMap<PathBuf, blake3::Hash>,
    /// Schemas already counted in `stats.model`
    counted: BTreeSet<String>,
    stats: RunStats,
}

#[derive(Default, Debug)]
struct RunStats {
    entries: usize,
    failed: usize,
    produced: usize,
    duplicates_skipped: usize,
    conflicts: usize,
    unchanged: usize,
    written: usize,
    model: ModelStats,
}

impl OutputRegistry {
    fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, path: &Path, hash: blake3::Hash) -> Registration {
        self.stats.produced += 1;
        match self.seen.get(path) {
            Some(previous) if *previous == hash => {
                debug!("Skipping duplicate: {}", path.display());
                self.stats.duplicates_skipped += 1;
                Registration::Duplicate
            }
            Some(_) => {
                warn!(
                    "Conflicting output for {} (hash: {}); keeping the first",
                    path.display(),
                    short_hash(&hash)
                );
                self.stats.conflicts += 1;
                Registration::Conflict
            }
            None => {
                self.seen.insert(path.to_path_buf(), hash);
                Registration::New
            }
        }
    }

    /// Adds the declaration counts of every schema not counted yet
    fn count(&mut self, model: &ResolvedModel) {
        let mut counter = NewFileCounter {
            counted: &mut self.counted,
            stats: &mut self.stats.model,
            active: false,
        };
        walk(model, &mut counter);
    }

    fn print_summary(&self) {
        let s = &self.stats;
        let m = &s.model;
        println!(
            "Compiled {} schema(s) from {} entr{}: {} message(s), {} enum(s), {} field(s), {} service(s), {} method(s)",
            m.file_count,
            s.entries,
            if s.entries == 1 { "y" } else { "ies" },
            m.message_count,
            m.enum_count,
            m.field_count,
            m.service_count,
            m.method_count
        );
        info!(
            "Summary: {} produced, {} duplicates skipped, {} conflicts, {} unchanged, {} written",
            s.produced, s.duplicates_skipped, s.conflicts, s.unchanged, s.written
        );
    }
}

/// Counts declarations of files seen for the first time
struct NewFileCounter<'a> {
    counted: &'a mut BTreeSet<String>,
    stats: &'a mut ModelStats,
    active: bool,
}

impl ModelVisitor for NewFileCounter<'_> {
    fn visit_file(&mut self, file: &ResolvedFile) {
        self.active = self.counted.insert(file.name.clone());
        if self.active {
            self.stats.visit_file(file);
        }
    }

    fn visit_message(&mut self, message: &ResolvedMessage) {
        if self.active {
            self.stats.visit_message(message);
        }
    }

    fn visit_field(&mut self, field: &ResolvedField) {
        if self.active {
            self.stats.visit_field(field);
        }
    }

    fn visit_enum(&mut self, enumeration: &ResolvedEnum) {
        if self.active {
            self.stats.visit_enum(enumeration);
        }
    }

    fn visit_service(&mut self, service: &ResolvedService) {
        if self.active {
            self.stats.visit_service(service);
        }
    }

    fn visit_method(&mut self, method: &ResolvedMethod) {
        if self.active {
            self.stats.visit_method(method);
        }
    }
}

fn short_hash(hash: &blake3::Hash) -> String {
    hash.to_hex()[..8].to_string()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let registry = run(&cli)?;
    if !cli.list_only && !cli.dry_run {
        registry.print_summary();
    }
    Ok(())
}

/// Compiles every requested entry and writes its artifacts
fn run(cli: &Cli) -> Result<OutputRegistry> {
    let (roots, entries) = if let Some(ref file) = cli.input.file {
        single_file_entry(file, &cli.proto_path)?
    } else if let Some(ref directory) = cli.input.directory {
        directory_entries(directory, &cli.proto_path)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    let config = build_config(cli, roots)?;
    let compiler = Compiler::new(config);

    // Fail on a bad target or render option before compiling anything
    let render_options = RenderOptions::from_config(compiler.config())?;
    compiler.registry().get(&cli.target)?;

    let mut registry = OutputRegistry::new();
    let directory_mode = cli.input.directory.is_some();

    for entry in &entries {
        registry.stats.entries += 1;
        debug!("Compiling entry: {}", entry);
        match process_entry(cli, &compiler, &render_options, entry, &mut registry) {
            Ok(()) => {}
            Err(e) if directory_mode => {
                // Log error but continue with other entries
                error!("{:#}", e);
                registry.stats.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if registry.stats.failed > 0 {
        bail!(
            "{} of {} schema(s) failed to compile",
            registry.stats.failed,
            registry.stats.entries
        );
    }
    Ok(registry)
}

fn build_config(cli: &Cli, roots: Vec<PathBuf>) -> Result<CompilerConfig> {
    let mut config =
        CompilerConfig::from_options(cli.options.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .context("Invalid --opt value")?;
    for root in roots {
        config = config.search_root(root);
    }
    for field in &cli.support_null {
        config = config.support_null(field.as_str());
    }
    Ok(config)
}

/// Resolves `--file` into search roots and an import-style entry name.
///
/// A file below one of the given roots is named relative to it; otherwise its
/// parent directory becomes the last search root.
fn single_file_entry(file: &Path, proto_path: &[PathBuf]) -> Result<(Vec<PathBuf>, Vec<String>)> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut roots = proto_path.to_vec();
    let normalized = normalize(file);
    for root in proto_path {
        if let Ok(relative) = normalized.strip_prefix(normalize(root)) {
            if let Some(name) = import_name(relative) {
                return Ok((roots, vec![name]));
            }
        }
    }

    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Input file name is not valid UTF-8: {}", file.display()))?
        .to_string();
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    trace!("Using {} as search root for {}", parent.display(), name);
    roots.push(parent);
    Ok((roots, vec![name]))
}

/// Collects every `.proto` file below `directory`, which becomes the first
/// search root
fn directory_entries(
    directory: &Path,
    proto_path: &[PathBuf],
) -> Result<(Vec<PathBuf>, Vec<String>)> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut entries = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("proto") {
            trace!("Skipping non-schema: {}", path.display());
            continue;
        }
        let Ok(relative) = path.strip_prefix(directory) else {
            continue;
        };
        match import_name(relative) {
            Some(name) => entries.push(name),
            None => warn!("Skipping schema with a non UTF-8 path: {}", path.display()),
        }
    }

    if entries.is_empty() {
        bail!("No .proto files found in {}", directory.display());
    }
    info!("Found {} schema(s)", entries.len());

    let mut roots = vec![directory.to_path_buf()];
    roots.extend(proto_path.iter().cloned());
    Ok((roots, entries))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Joins the components of a relative path with forward slashes
fn import_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Output path of a unit generated from `schema`, relative to the output
/// directory. Schemas keep their directory so equal stems never collide.
fn output_path(schema: &str, name: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    if let Some(parent) = Path::new(schema).parent() {
        for component in parent.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(ferrule_core::Error::path_traversal(schema).into()),
            }
        }
    }
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        return Err(ferrule_core::Error::path_traversal(name).into());
    }
    path.push(name);
    Ok(path)
}

/// Compiles one entry and hands its artifacts to the writer
fn process_entry(
    cli: &Cli,
    compiler: &Compiler,
    render_options: &RenderOptions,
    entry: &str,
    registry: &mut OutputRegistry,
) -> Result<()> {
    let compilation = compiler
        .compile(entry)
        .with_context(|| format!("Failed to compile {}", entry))?;
    let model = &compilation.model;

    let stats = ModelStats::of(model);
    info!(
        "{}: {} file(s), {} message(s), {} enum(s), {} service(s)",
        entry, stats.file_count, stats.message_count, stats.enum_count, stats.service_count
    );
    registry.count(model);

    for artifact in artifacts(cli, compiler, render_options, entry, model)? {
        emit(cli, registry, artifact)?;
    }
    Ok(())
}

fn artifacts(
    cli: &Cli,
    compiler: &Compiler,
    render_options: &RenderOptions,
    entry: &str,
    model: &ResolvedModel,
) -> Result<Vec<Artifact>> {
    if cli.snapshot {
        let json = snapshot::to_json(model)
            .with_context(|| format!("Failed to snapshot {}", entry))?;
        return Ok(vec![Artifact {
            path: output_path(entry, &unit_name(entry, "json"))?,
            contents: json.into_bytes(),
        }]);
    }

    if cli.descriptor_set {
        model
            .descriptor_pool()
            .with_context(|| format!("Descriptor set for {} is not valid", entry))?;
        return Ok(vec![Artifact {
            path: output_path(entry, &unit_name(entry, "pb"))?,
            contents: model.encode_descriptor_set(),
        }]);
    }

    let renderer = compiler.registry().get(&cli.target)?;
    let units = render_model(model, renderer, render_options)
        .with_context(|| format!("Failed to render {} for {}", entry, cli.target))?;
    units
        .into_iter()
        .map(|unit| {
            Ok(Artifact {
                path: output_path(&unit.source, &unit.name)?,
                contents: unit.text.into_bytes(),
            })
        })
        .collect()
}

/// Writes one artifact unless it is a duplicate or already up to date
fn emit(cli: &Cli, registry: &mut OutputRegistry, artifact: Artifact) -> Result<()> {
    let hash = blake3::hash(&artifact.contents);
    if registry.register(&artifact.path, hash) != Registration::New {
        return Ok(());
    }

    if cli.list_only {
        println!("{}", artifact.path.display());
        return Ok(());
    }

    let output_path = cli.output.join(&artifact.path);
    if cli.dry_run {
        println!("Would write: {}", output_path.display());
        if cli.verbose > 0 {
            if let Ok(text) = std::str::from_utf8(&artifact.contents) {
                println!("---");
                println!("{}", text);
                println!("---");
            }
        }
        return Ok(());
    }

    if is_unchanged(&output_path, &hash) {
        debug!("Unchanged: {} (hash: {})", output_path.display(), short_hash(&hash));
        registry.stats.unchanged += 1;
        return Ok(());
    }

    write_output_file(&output_path, &artifact.contents, cli.force)?;
    println!("Wrote {}", output_path.display());
    registry.stats.written += 1;
    Ok(())
}

fn is_unchanged(path: &Path, hash: &blake3::Hash) -> bool {
    match fs::read(path) {
        Ok(existing) => blake3::hash(&existing) == *hash,
        Err(_) => false,
    }
}

/// Write a generated file to disk
fn write_output_file(output_path: &Path, contents: &[u8], force: bool) -> Result<()> {
    // Create parent directories
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ferrule_core::Error::directory_create(parent, e))?;
    }

    // Check if file exists
    if output_path.exists() && !force {
        bail!(
            "File already exists with different content: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .map_err(|e| ferrule_core::Error::file_write(output_path, e))?;
    file.write_all(contents)
        .map_err(|e| ferrule_core::Error::file_write(output_path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ORDER_PROTO: &str = r#"
syntax = "proto3";
package shop;

import "google/protobuf/wrappers.proto";

message Order {
  string id = 1;
  google.protobuf.StringValue note = 2;
}
"#;

    fn write(dir: &Path, name: &str, text: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ferrule"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_input_mode_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["ferrule"]).is_err());
        assert!(Cli::try_parse_from(["ferrule", "-f", "a.proto", "-d", "dir"]).is_err());
        assert!(
            Cli::try_parse_from(["ferrule", "-f", "a.proto", "--snapshot", "--descriptor-set"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("nullwrappers=false").unwrap(),
            ("nullwrappers".to_string(), "false".to_string())
        );
        assert_eq!(
            parse_key_value("header = no").unwrap(),
            ("header".to_string(), "no".to_string())
        );
        assert!(parse_key_value("indent").is_err());
        assert!(parse_key_value("=4").is_err());
    }

    #[test]
    fn test_import_name() {
        assert_eq!(
            import_name(Path::new("shop/order.proto")).as_deref(),
            Some("shop/order.proto")
        );
        assert_eq!(
            import_name(Path::new("./order.proto")).as_deref(),
            Some("order.proto")
        );
        assert_eq!(import_name(Path::new("../order.proto")), None);
        assert_eq!(import_name(Path::new("")), None);
    }

    #[test]
    fn test_output_path_rejects_traversal() {
        assert_eq!(
            output_path("shop/order.proto", "order.rs").unwrap(),
            PathBuf::from("shop").join("order.rs")
        );
        assert_eq!(
            output_path("order.proto", "order.json").unwrap(),
            PathBuf::from("order.json")
        );
        assert!(output_path("../escape.proto", "escape.rs").is_err());
        assert!(output_path("/etc/escape.proto", "escape.rs").is_err());
        assert!(output_path("ok.proto", "../escape.rs").is_err());
    }

    #[test]
    fn test_registry_deduplication() {
        let mut registry = OutputRegistry::new();
        let path = PathBuf::from("shop/order.rs");
        let first = blake3::hash(b"pub struct Order;");
        let other = blake3::hash(b"pub struct Other;");

        assert_eq!(registry.register(&path, first), Registration::New);
        assert_eq!(registry.register(&path, first), Registration::Duplicate);
        assert_eq!(registry.register(&path, other), Registration::Conflict);

        assert_eq!(registry.stats.produced, 3);
        assert_eq!(registry.stats.duplicates_skipped, 1);
        assert_eq!(registry.stats.conflicts, 1);
    }

    #[test]
    fn test_single_file_entry_uses_matching_root() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "shop/order.proto", ORDER_PROTO);
        let file = temp.path().join("shop/order.proto");

        let (roots, entries) = single_file_entry(&file, &[temp.path().to_path_buf()]).unwrap();
        assert_eq!(entries, vec!["shop/order.proto".to_string()]);
        assert_eq!(roots, vec![temp.path().to_path_buf()]);

        let (roots, entries) = single_file_entry(&file, &[]).unwrap();
        assert_eq!(entries, vec!["order.proto".to_string()]);
        assert_eq!(roots, vec![temp.path().join("shop")]);
    }

    #[test]
    fn test_directory_entries_skip_hidden_and_other_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.proto", "syntax = \"proto3\";\n");
        write(temp.path(), "a/c.proto", "syntax = \"proto3\";\n");
        write(temp.path(), ".hidden/d.proto", "syntax = \"proto3\";\n");
        write(temp.path(), ".e.proto", "syntax = \"proto3\";\n");
        write(temp.path(), "notes.txt", "not a schema");

        let (roots, entries) = directory_entries(temp.path(), &[]).unwrap();
        assert_eq!(entries, vec!["a/c.proto".to_string(), "b.proto".to_string()]);
        assert_eq!(roots, vec![temp.path().to_path_buf()]);
    }

    #[test]
    fn test_generate_then_skip_unchanged() {
        let schemas = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(schemas.path(), "shop/order.proto", ORDER_PROTO);
        let file = schemas.path().join("shop/order.proto");
        let args = [
            "-f",
            file.to_str().unwrap(),
            "-I",
            schemas.path().to_str().unwrap(),
            "-o",
            out.path().to_str().unwrap(),
        ];

        let registry = run(&cli(&args)).unwrap();
        // the entry plus the bundled wrappers schema
        assert_eq!(registry.stats.written, 2);
        assert_eq!(registry.stats.model.file_count, 2);
        assert_eq!(registry.stats.model.message_count, 10);

        let generated = fs::read_to_string(out.path().join("shop/order.rs")).unwrap();
        assert!(generated.contains("pub struct Order"));
        assert!(generated.contains("#[proto(null_wrapped)]"));
        assert!(out.path().join("google/protobuf/wrappers.rs").is_file());

        let registry = run(&cli(&args)).unwrap();
        assert_eq!(registry.stats.written, 0);
        assert_eq!(registry.stats.unchanged, 2);
    }

    #[test]
    fn test_existing_file_needs_force() {
        let schemas = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(schemas.path(), "order.proto", ORDER_PROTO);
        write(out.path(), "order.rs", "// hand written\n");
        let file = schemas.path().join("order.proto");
        let file = file.to_str().unwrap();
        let output = out.path().to_str().unwrap();

        let err = run(&cli(&["-f", file, "-o", output])).err().unwrap();
        assert!(format!("{:#}", err).contains("--force"));

        run(&cli(&["-f", file, "-o", output, "--force"])).unwrap();
        let generated = fs::read_to_string(out.path().join("order.rs")).unwrap();
        assert!(generated.contains("pub struct Order"));
    }

    #[test]
    fn test_directory_mode_writes_shared_imports_once() {
        let schemas = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(
            schemas.path(),
            "common/money.proto",
            "syntax = \"proto3\";\npackage common;\nmessage Money { int64 units = 1; }\n",
        );
        write(
            schemas.path(),
            "shop/cart.proto",
            "syntax = \"proto3\";\npackage shop;\nimport \"common/money.proto\";\nmessage Cart { common.Money total = 1; }\n",
        );

        let registry = run(&cli(&[
            "-d",
            schemas.path().to_str().unwrap(),
            "-o",
            out.path().to_str().unwrap(),
            "--target",
            "proto",
        ]))
        .unwrap();

        assert_eq!(registry.stats.entries, 2);
        assert_eq!(registry.stats.written, 2);
        assert_eq!(registry.stats.duplicates_skipped, 1);
        assert_eq!(registry.stats.model.file_count, 2);
        assert!(out.path().join("common/money.proto").is_file());
        assert!(out.path().join("shop/cart.proto").is_file());
    }

    #[test]
    fn test_directory_mode_reports_failures() {
        let schemas = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(schemas.path(), "good.proto", "syntax = \"proto3\";\nmessage Good {}\n");
        write(
            schemas.path(),
            "bad.proto",
            "syntax = \"proto3\";\nmessage Bad { Missing m = 1; }\n",
        );

        let err = run(&cli(&[
            "-d",
            schemas.path().to_str().unwrap(),
            "-o",
            out.path().to_str().unwrap(),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("1 of 2"));
        assert!(out.path().join("good.rs").is_file());
    }

    #[test]
    fn test_snapshot_and_descriptor_set_outputs() {
        let schemas = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(schemas.path(), "order.proto", ORDER_PROTO);
        let file = schemas.path().join("order.proto");
        let file = file.to_str().unwrap();
        let output = out.path().to_str().unwrap();

        run(&cli(&["-f", file, "-o", output, "--snapshot"])).unwrap();
        let json = fs::read_to_string(out.path().join("order.json")).unwrap();
        assert!(json.contains("\"nullable string\""));

        run(&cli(&["-f", file, "-o", output, "--descriptor-set"])).unwrap();
        let bytes = fs::read(out.path().join("order.pb")).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_dry_run_and_list_only_write_nothing() {
        let schemas = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        write(schemas.path(), "order.proto", ORDER_PROTO);
        let file = schemas.path().join("order.proto");
        let file = file.to_str().unwrap();
        let output = out.path().to_str().unwrap();

        let registry = run(&cli(&["-f", file, "-o", output, "--dry-run"])).unwrap();
        assert_eq!(registry.stats.written, 0);
        let registry = run(&cli(&["-f", file, "-o", output, "--list-only"])).unwrap();
        assert_eq!(registry.stats.written, 0);
        assert!(!out.path().join("order.rs").exists());
    }

    #[test]
    fn test_bad_option_and_target_fail_early() {
        let schemas = TempDir::new().unwrap();
        write(schemas.path(), "order.proto", ORDER_PROTO);
        let file = schemas.path().join("order.proto");
        let file = file.to_str().unwrap();

        assert!(run(&cli(&["-f", file, "--opt", "nullwrappers=maybe"])).is_err());
        assert!(run(&cli(&["-f", file, "--target", "cobol"])).is_err());
    }
}
