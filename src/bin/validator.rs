//! Schematron Validator CLI
//!
//! Compiles rule schemas and validates XML documents against them.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use schematron_validation::{
    CompileWarning, RuleSchema, SchemaCompiler, SchematronValidator, ServiceConfig, ValidationError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "schematron-validate")]
#[command(about = "Compile Schematron schemas and validate XML documents")]
struct Cli {
    /// Configuration file (defaults to schematron.toml and friends)
    #[arg(short, long)]
    config: Option<String>,

    /// Rule schema, resolved below the resource root
    #[arg(short, long)]
    schema: Option<String>,

    /// Resource root for schemas and included fragments
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Phase to compile
    #[arg(short, long)]
    phase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the schema and print compile warnings
    Compile,

    /// Validate documents; directories are searched for *.xml
    Validate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Warnings do not make a document invalid
        #[arg(long)]
        suppress_warnings: bool,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print the raw SVRL report for one document
    Svrl { path: PathBuf },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether everything validated
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = ServiceConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(schema) = cli.schema {
        config.validator.schema = Some(schema);
    }
    if let Some(root) = cli.root {
        config.resources.root = root;
    }
    if cli.phase.is_some() {
        config.compiler.phase = cli.phase;
    }

    match cli.command {
        Commands::Compile => compile(&config),

        Commands::Validate {
            paths,
            suppress_warnings,
            format,
        } => {
            let validator = SchematronValidator::from_config(&config)?;
            if suppress_warnings {
                validator.set_suppress_warnings(true);
            }
            validate(&validator, &paths, format)
        }

        Commands::Svrl { path } => {
            let validator = SchematronValidator::from_config(&config)?;
            let document = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let report = validator.check(&document)?;
            println!("{}", report.svrl());
            Ok(true)
        }
    }
}

fn compile(config: &ServiceConfig) -> anyhow::Result<bool> {
    let Some(resource) = config.validator.schema.as_deref() else {
        bail!("No schema given; pass --schema or set validator.schema");
    };
    let resolver = config.resolver();
    let schema = RuleSchema::load(&resolver, resource)?;
    let (program, warnings) =
        SchemaCompiler::with_options(config.compiler.options()).compile_with_warnings(&schema, &resolver)?;

    println!("✅ Compiled {} ({})", schema.resource(), program.schema_digest().short());
    println!(
        "   {} pattern(s), {} rule(s), {} assertion(s)",
        program.patterns().len(),
        program.rule_count(),
        program.assertion_count()
    );
    if let Some(phase) = program.phase() {
        println!("   phase: {}", phase);
    }
    print_warnings(&warnings);
    Ok(true)
}

fn print_warnings(warnings: &[CompileWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("⚠️  {} warning(s):", warnings.len());
    for warning in warnings {
        println!("   └─ {}", warning);
    }
}

/// Files named on the command line, with directories expanded to their
/// `.xml` files in sorted order
fn collect_documents(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut documents = Vec::new();
    for path in paths {
        if path.is_dir() {
            documents.extend(
                WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter(|e| e.path().extension().map(|ext| ext == "xml").unwrap_or(false))
                    .map(|e| e.into_path()),
            );
        } else {
            documents.push(path.clone());
        }
    }
    documents
}

fn validate(validator: &SchematronValidator, paths: &[PathBuf], format: Format) -> anyhow::Result<bool> {
    let files = collect_documents(paths);
    if files.is_empty() {
        bail!("No documents to validate");
    }
    let contents = files
        .iter()
        .map(|path| std::fs::read(path).with_context(|| format!("Failed to read {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let batch = validator.validate_batch(&contents);

    match format {
        Format::Text => {
            for (path, entry) in files.iter().zip(batch.entries()) {
                print_entry(path, &entry.outcome);
            }
            println!();
            if batch.is_valid() {
                println!("✅ {} document(s) valid", files.len());
            } else {
                println!("❌ {} of {} document(s) failed", batch.failures().count(), files.len());
            }
        }
        Format::Json => {
            let documents: Vec<serde_json::Value> = files
                .iter()
                .zip(batch.entries())
                .map(|(path, entry)| entry_json(path, entry.entry, &entry.outcome))
                .collect();
            let report = serde_json::json!({
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "schema_id": validator.schema_id(),
                "schema_digest": validator.schema_digest().as_str(),
                "suppress_warnings": validator.suppress_warnings(),
                "valid": batch.is_valid(),
                "documents": documents,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(batch.is_valid())
}

fn print_entry(
    path: &Path,
    outcome: &Result<Arc<schematron_validation::ValidationReport>, ValidationError>,
) {
    match outcome {
        Ok(report) => {
            println!("✅ {}", path.display());
            for warning in report.warning_messages() {
                println!("   └─ warning: {}", warning);
            }
        }
        Err(ValidationError::Failed(failure)) => {
            println!("❌ {}", path.display());
            for error in &failure.errors {
                println!("   └─ error: {}", error);
            }
            for warning in &failure.warnings {
                println!("   └─ warning: {}", warning);
            }
        }
        Err(ValidationError::Execution(err)) => {
            println!("❌ {} - {}", path.display(), err);
        }
    }
}

fn entry_json(
    path: &Path,
    entry: usize,
    outcome: &Result<Arc<schematron_validation::ValidationReport>, ValidationError>,
) -> serde_json::Value {
    match outcome {
        Ok(report) => serde_json::json!({
            "entry": entry,
            "path": path.display().to_string(),
            "valid": true,
            "report": report.as_ref(),
        }),
        Err(ValidationError::Failed(failure)) => serde_json::json!({
            "entry": entry,
            "path": path.display().to_string(),
            "valid": false,
            "errors": failure.errors,
            "warnings": failure.warnings,
        }),
        Err(ValidationError::Execution(err)) => serde_json::json!({
            "entry": entry,
            "path": path.display().to_string(),
            "valid": false,
            "error": err.to_string(),
        }),
    }
}
