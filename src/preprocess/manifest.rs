//! Preprocessor program manifests
//!
//! A program is a TOML document naming the transformation a stage runs and
//! its parameters:
//!
//! ```toml
//! kind = "inclusion-expander"
//!
//! [options]
//! max_depth = 16
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Stage;
use crate::error::CompileError;
use crate::report::AssertionSeverity;
use crate::resolver::ResourceResolver;

/// Options of the inclusion expander
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncludeOptions {
    /// Longest allowed chain of nested includes
    pub max_depth: usize,
}

impl Default for IncludeOptions {
    fn default() -> Self {
        Self { max_depth: 16 }
    }
}

/// Options of the abstraction expander
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbstractOptions {
    /// Drop abstract patterns from the expanded schema
    pub remove_abstract: bool,
    /// Attributes in which `$param` references are substituted
    pub param_attributes: Vec<String>,
}

impl Default for AbstractOptions {
    fn default() -> Self {
        Self {
            remove_abstract: true,
            param_attributes: ["context", "test", "select", "path", "value", "subject"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Options of the skeleton compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonOptions {
    /// Accepted values of `schema/@queryBinding`
    pub query_bindings: Vec<String>,
    /// Phase to compile: `#DEFAULT`, `#ALL` or a phase id
    pub phase: String,
    /// Role (or flag) values marking an assertion as a warning
    pub warning_roles: Vec<String>,
    /// Role (or flag) values marking an assertion as an error
    pub error_roles: Vec<String>,
    pub assert_default: AssertionSeverity,
    pub report_default: AssertionSeverity,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for SkeletonOptions {
    fn default() -> Self {
        Self {
            query_bindings: strings(&["xslt", "xslt2", "xslt3", "xpath", "xpath2"]),
            phase: "#DEFAULT".to_string(),
            warning_roles: strings(&["warning", "warn", "info", "information", "advisory"]),
            error_roles: strings(&["error", "fatal", "mandatory"]),
            assert_default: AssertionSeverity::Error,
            report_default: AssertionSeverity::Warning,
        }
    }
}

/// The transformation a program runs, with its options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProgramSpec {
    InclusionExpander {
        #[serde(default)]
        options: IncludeOptions,
    },
    AbstractionExpander {
        #[serde(default)]
        options: AbstractOptions,
    },
    SkeletonCompiler {
        #[serde(default)]
        options: SkeletonOptions,
    },
}

impl ProgramSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgramSpec::InclusionExpander { .. } => Stage::Inclusion.program_kind(),
            ProgramSpec::AbstractionExpander { .. } => Stage::Abstraction.program_kind(),
            ProgramSpec::SkeletonCompiler { .. } => Stage::Skeleton.program_kind(),
        }
    }
}

/// A loaded preprocessor program. Stateless and reusable.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessorProgram {
    resource: String,
    spec: ProgramSpec,
}

impl PreprocessorProgram {
    /// Fetch and parse a program. A resolver miss names the resource.
    pub fn load(resolver: &dyn ResourceResolver, resource: &str) -> Result<Self, CompileError> {
        let bytes = resolver
            .resolve(resource)
            .map_err(|err| CompileError::from_resolve(resource, err))?;
        debug!(program = %resource, bytes = bytes.len(), "Loaded preprocessor program");
        Self::parse(resource, &bytes)
    }

    pub fn parse(resource: &str, bytes: &[u8]) -> Result<Self, CompileError> {
        let invalid = |reason: String| CompileError::InvalidProgram {
            program: resource.to_string(),
            reason,
        };
        let text = std::str::from_utf8(bytes).map_err(|_| invalid("not valid UTF-8".to_string()))?;
        let spec: ProgramSpec = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            resource: resource.to_string(),
            spec,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn spec(&self) -> &ProgramSpec {
        &self.spec
    }

    pub fn kind(&self) -> &'static str {
        self.spec.kind()
    }

    /// The error for running this program in the wrong stage
    pub(crate) fn kind_mismatch(&self, stage: Stage) -> CompileError {
        CompileError::ProgramKindMismatch {
            program: self.resource.clone(),
            stage,
            expected: stage.program_kind(),
            found: self.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{EmbeddedResolver, MemoryResolver};

    #[test]
    fn test_builtin_programs_parse() {
        let resolver = EmbeddedResolver::builtin();
        for stage in Stage::ALL {
            let program = PreprocessorProgram::load(&resolver, stage.default_program()).unwrap();
            assert_eq!(program.kind(), stage.program_kind());
        }
    }

    #[test]
    fn test_builtin_skeleton_options_match_defaults() {
        let program =
            PreprocessorProgram::load(&EmbeddedResolver::builtin(), Stage::Skeleton.default_program()).unwrap();
        match program.spec() {
            ProgramSpec::SkeletonCompiler { options } => assert_eq!(options, &SkeletonOptions::default()),
            other => panic!("unexpected program {:?}", other),
        }
    }

    #[test]
    fn test_missing_options_use_defaults() {
        let program = PreprocessorProgram::parse("p.toml", b"kind = \"inclusion-expander\"").unwrap();
        assert_eq!(
            program.spec(),
            &ProgramSpec::InclusionExpander {
                options: IncludeOptions::default()
            }
        );
    }

    #[test]
    fn test_unknown_kind_is_invalid() {
        let err = PreprocessorProgram::parse("p.toml", b"kind = \"xslt\"").unwrap_err();
        assert!(matches!(err, CompileError::InvalidProgram { .. }));
    }

    #[test]
    fn test_missing_program_names_resource() {
        let err = PreprocessorProgram::load(&MemoryResolver::new(), "./progs/missing.toml").unwrap_err();
        match err {
            CompileError::ResourceNotFound { resource } => assert_eq!(resource, "progs/missing.toml"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
