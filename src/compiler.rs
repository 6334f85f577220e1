//! Schema compilation
//!
//! [`SchemaCompiler`] runs the three preprocessing stages in order, each
//! with the program resolved for it, and hands back an immutable
//! [`CompiledCheckProgram`]. An error or fatal diagnostic in any stage aborts
//! the compilation; no partial program is ever returned.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::CompileError;
use crate::preprocess::{
    compile_skeleton, expand_abstractions, expand_inclusions, CompileWarning, PreprocessorProgram, ProgramSpec, Stage,
};
use crate::program::CompiledCheckProgram;
use crate::resolver::{normalize_path, ResourceResolver};
use crate::xml::Document;

/// A rule schema: source bytes plus the resource path they came from.
/// Relative includes resolve against that path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSchema {
    resource: String,
    content: Vec<u8>,
}

impl RuleSchema {
    pub fn new(resource: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            resource: normalize_path(&resource.into()),
            content: content.into(),
        }
    }

    /// Fetch a schema through a resolver
    pub fn load(resolver: &dyn ResourceResolver, resource: &str) -> Result<Self, CompileError> {
        let content = resolver
            .resolve(resource)
            .map_err(|err| CompileError::from_resolve(resource, err))?;
        Ok(Self::new(resource, content))
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// SHA-256 digest of the source
    pub fn checksum(&self) -> Checksum {
        Checksum::from_bytes(&self.content)
    }
}

/// Which programs drive the stages, and which phase to compile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub include_program: String,
    pub abstract_program: String,
    pub skeleton_program: String,
    /// Overrides the skeleton program's phase
    pub phase: Option<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            include_program: Stage::Inclusion.default_program().to_string(),
            abstract_program: Stage::Abstraction.default_program().to_string(),
            skeleton_program: Stage::Skeleton.default_program().to_string(),
            phase: None,
        }
    }
}

impl CompilerOptions {
    fn program(&self, stage: Stage) -> &str {
        match stage {
            Stage::Inclusion => &self.include_program,
            Stage::Abstraction => &self.abstract_program,
            Stage::Skeleton => &self.skeleton_program,
        }
    }
}

/// Compiles rule schemas. Holds only options; reusable and shareable.
#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    options: CompilerOptions,
}

impl SchemaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile a schema. Stage warnings are logged and dropped.
    pub fn compile(
        &self,
        schema: &RuleSchema,
        resolver: &dyn ResourceResolver,
    ) -> Result<CompiledCheckProgram, CompileError> {
        self.compile_with_warnings(schema, resolver)
            .map(|(program, _)| program)
    }

    /// Compile a schema, also returning every stage warning
    pub fn compile_with_warnings(
        &self,
        schema: &RuleSchema,
        resolver: &dyn ResourceResolver,
    ) -> Result<(CompiledCheckProgram, Vec<CompileWarning>), CompileError> {
        let digest = schema.checksum();
        debug!(schema = %schema.resource(), digest = %digest.short(), "Compiling rule schema");

        let source = Document::parse_bytes(schema.content()).map_err(|source| CompileError::MalformedXml {
            resource: schema.resource().to_string(),
            source,
        })?;
        let mut warnings = Vec::new();

        let program = self.load(Stage::Inclusion, resolver)?;
        let included = match program.spec() {
            ProgramSpec::InclusionExpander { options } => run_stage(Stage::Inclusion, schema, &mut warnings, |sink| {
                expand_inclusions(&source, schema.resource(), resolver, options, sink)
            })?,
            _ => return Err(program.kind_mismatch(Stage::Inclusion)),
        };

        let program = self.load(Stage::Abstraction, resolver)?;
        let concrete = match program.spec() {
            ProgramSpec::AbstractionExpander { options } => {
                run_stage(Stage::Abstraction, schema, &mut warnings, |sink| {
                    expand_abstractions(&included, options, sink)
                })?
            }
            _ => return Err(program.kind_mismatch(Stage::Abstraction)),
        };

        let program = self.load(Stage::Skeleton, resolver)?;
        let compiled = match program.spec() {
            ProgramSpec::SkeletonCompiler { options } => run_stage(Stage::Skeleton, schema, &mut warnings, |sink| {
                compile_skeleton(&concrete, schema.resource(), digest, options, self.options.phase.as_deref(), sink)
            })?,
            _ => return Err(program.kind_mismatch(Stage::Skeleton)),
        };

        debug!(
            schema = %schema.resource(),
            warnings = warnings.len(),
            "Rule schema compiled"
        );
        Ok((compiled, warnings))
    }

    fn load(&self, stage: Stage, resolver: &dyn ResourceResolver) -> Result<PreprocessorProgram, CompileError> {
        let resource = self.options.program(stage);
        debug!(stage = %stage, program = %resource, "Resolving preprocessor program");
        PreprocessorProgram::load(resolver, resource)
    }
}

/// Run one stage with its own warning sink
fn run_stage<T>(
    stage: Stage,
    schema: &RuleSchema,
    warnings: &mut Vec<CompileWarning>,
    body: impl FnOnce(&mut DiagnosticSink) -> Result<T, Diagnostic>,
) -> Result<T, CompileError> {
    let mut sink = DiagnosticSink::new();
    let result = body(&mut sink);
    for message in sink.into_warnings() {
        warn!(schema = %schema.resource(), stage = %stage, "{}", message);
        warnings.push(CompileWarning { stage, message });
    }
    result.map_err(|diagnostic| CompileError::Stage {
        schema: schema.resource().to_string(),
        stage,
        severity: diagnostic.severity,
        message: diagnostic.message,
    })
}
