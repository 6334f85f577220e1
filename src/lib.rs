//! Schematron Validation Service
//!
//! Validates XML documents against ISO Schematron rule schemas. A schema is
//! compiled once into an immutable check program and then executed against
//! any number of documents.
//!
//! ## Features
//!
//! - **Three-stage compilation**: inclusion expansion, abstract pattern
//!   expansion and skeleton compilation, each driven by a preprocessor program
//! - **Injected resources**: schemas, fragments and programs come through a
//!   [`ResourceResolver`]
//! - **SVRL output**: every run produces a Schematron Validation Report
//!   Language tree
//! - **Severity channels**: errors always invalidate a document; warnings do
//!   unless suppressed
//! - **Pipeline hooks**: create/update/delete pre-ingest adapters
//!
//! ## Architecture
//!
//! ```text
//! RuleSchema ──► SchemaCompiler ──► CompiledCheckProgram (Arc, shared)
//!                  │ include                    │
//!                  │ abstract                   ▼
//!                  │ skeleton         document ─► CheckExecutor ─► SVRL
//!                                                                   │
//!                       SchematronValidator ◄── ReportBuilder ◄─────┘
//! ```

pub mod checksum;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod preprocess;
pub mod program;
pub mod report;
pub mod resolver;
pub mod validator;
pub mod xml;
pub mod xpath;

pub use checksum::Checksum;
pub use compiler::{CompilerOptions, RuleSchema, SchemaCompiler};
pub use config::ServiceConfig;
pub use diagnostics::{Diagnostic, Severity};
pub use error::{
    CompileError, Error, ExecutionError, Result, StopProcessing, ValidationError, ValidationFailure,
};
pub use executor::{CheckExecutor, ExecutionOutput};
pub use pipeline::{CreateRequest, DeleteRequest, Entry, EntryValidator, PreIngestPlugin, UpdateRequest};
pub use preprocess::{CompileWarning, PreprocessorProgram, Stage};
pub use program::CompiledCheckProgram;
pub use report::{Assertion, AssertionKind, AssertionSeverity, ReportBuilder, ValidationReport};
pub use resolver::{
    with_builtin_programs, ChainResolver, EmbeddedResolver, FsResolver, MemoryResolver, ResourceResolver,
};
pub use validator::{BatchEntry, BatchReport, Priority, SchematronValidator, ValidatorSettings};
