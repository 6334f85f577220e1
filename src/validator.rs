//! Validator facade
//!
//! Compile once, execute many. A [`SchematronValidator`] owns one compiled
//! program and the runtime policy around it: whether warnings count against
//! validity, the plugin priority, and the report of the most recent run.
//! Every entry point funnels into [`SchematronValidator::check`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::checksum::Checksum;
use crate::compiler::{RuleSchema, SchemaCompiler};
use crate::config::ServiceConfig;
use crate::error::{CompileError, Error, ExecutionError, ValidationError, ValidationFailure};
use crate::executor::CheckExecutor;
use crate::program::CompiledCheckProgram;
use crate::report::{ReportBuilder, ValidationReport};
use crate::resolver::ResourceResolver;

const FAILURE_HEADER: &str = "Schematron validation failed.\n\n";

fn entry_header(entry: usize) -> String {
    format!("Schematron validation failed for entry #{}.\n\n", entry)
}

/// Plugin priority, always within `1..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct Priority(i32);

impl Priority {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 100;
    pub const DEFAULT: Priority = Priority(Self::MAX);

    pub fn new(value: i32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

/// Runtime settings; absent fields leave the current value alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSettings {
    #[serde(default)]
    pub suppress_warnings: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Compiled rule schema plus validation policy
#[derive(Debug)]
pub struct SchematronValidator {
    program: Arc<CompiledCheckProgram>,
    suppress_warnings: AtomicBool,
    priority: AtomicI32,
    last_report: RwLock<Option<Arc<ValidationReport>>>,
}

impl SchematronValidator {
    /// Wrap an already compiled program
    pub fn new(program: Arc<CompiledCheckProgram>) -> Self {
        Self {
            program,
            suppress_warnings: AtomicBool::new(false),
            priority: AtomicI32::new(Priority::DEFAULT.get()),
            last_report: RwLock::new(None),
        }
    }

    /// Compile `schema` with the default programs
    pub fn compile(schema: &RuleSchema, resolver: &dyn ResourceResolver) -> Result<Self, CompileError> {
        let program = SchemaCompiler::new().compile(schema, resolver)?;
        Ok(Self::new(Arc::new(program)))
    }

    /// Build a validator from service configuration. The schema named by
    /// `validator.schema` is resolved through the configured resolver.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, Error> {
        let resolver = config.resolver();
        let resource = config
            .validator
            .schema
            .as_deref()
            .ok_or_else(|| config_crate::ConfigError::NotFound("validator.schema".to_string()))?;
        let schema = RuleSchema::load(&resolver, resource)?;
        let program = SchemaCompiler::with_options(config.compiler.options()).compile(&schema, &resolver)?;

        let validator = Self::new(Arc::new(program));
        validator.apply_settings(config.validator.settings());
        Ok(validator)
    }

    /// The compiled program, for sharing with other validators
    pub fn program(&self) -> &Arc<CompiledCheckProgram> {
        &self.program
    }

    /// Schema identifier: the resource path the schema was loaded from
    pub fn schema_id(&self) -> &str {
        self.program.schema_resource()
    }

    pub fn schema_digest(&self) -> &Checksum {
        self.program.schema_digest()
    }

    /// Run the program over one document and record the report. Invalid
    /// documents are not an error here; see [`Self::validate`].
    pub fn check(&self, document: &[u8]) -> Result<Arc<ValidationReport>, ExecutionError> {
        let suppress = self.suppress_warnings();
        let output = CheckExecutor::new(&self.program).execute(document)?;
        let report = Arc::new(ReportBuilder::new(suppress).build(&output));
        debug!(
            schema = %self.schema_id(),
            errors = report.errors().len(),
            warnings = report.warnings().len(),
            valid = report.is_valid(),
            "Document checked"
        );
        self.store(&report);
        Ok(report)
    }

    /// Validate one document, failing when the report is invalid
    pub fn validate(&self, document: &[u8]) -> Result<Arc<ValidationReport>, ValidationError> {
        let report = self.check(document)?;
        if report.is_valid() {
            Ok(report)
        } else {
            Err(failure(&report, FAILURE_HEADER.to_string(), None).into())
        }
    }

    /// Validate documents independently, numbering entries from 1
    pub fn validate_batch<D: AsRef<[u8]>>(&self, documents: &[D]) -> BatchReport {
        let entries = documents
            .iter()
            .enumerate()
            .map(|(index, document)| {
                let entry = index + 1;
                BatchEntry {
                    entry,
                    outcome: self.validate_entry(entry, document.as_ref()),
                }
            })
            .collect();
        BatchReport { entries }
    }

    /// Validate the `entry`th document of a batch
    pub(crate) fn validate_entry(
        &self,
        entry: usize,
        document: &[u8],
    ) -> Result<Arc<ValidationReport>, ValidationError> {
        let report = self.check(document)?;
        if report.is_valid() {
            Ok(report)
        } else {
            Err(failure(&report, entry_header(entry), Some(entry)).into())
        }
    }

    /// Report of the most recent run
    pub fn report(&self) -> Option<Arc<ValidationReport>> {
        match self.last_report.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_suppress_warnings(&self, suppress: bool) {
        self.suppress_warnings.store(suppress, Ordering::SeqCst);
    }

    pub fn suppress_warnings(&self) -> bool {
        self.suppress_warnings.load(Ordering::SeqCst)
    }

    /// Set the priority, clamped to `1..=100`
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(Priority::new(priority).get(), Ordering::SeqCst);
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::SeqCst)
    }

    pub fn apply_settings(&self, settings: ValidatorSettings) {
        if let Some(suppress) = settings.suppress_warnings {
            self.set_suppress_warnings(suppress);
        }
        if let Some(priority) = settings.priority {
            self.set_priority(priority);
        }
    }

    fn store(&self, report: &Arc<ValidationReport>) {
        let mut guard = match self.last_report.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::clone(report));
    }
}

fn failure(report: &ValidationReport, header: String, entry: Option<usize>) -> ValidationFailure {
    let warnings = if report.suppress_warnings() {
        Vec::new()
    } else {
        report.warning_messages().into_iter().map(str::to_string).collect()
    };
    ValidationFailure {
        message: report.failure_message(&header),
        errors: report.error_messages().into_iter().map(str::to_string).collect(),
        warnings,
        entry,
    }
}

/// Outcome of one batch entry
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// 1-based position in the batch
    pub entry: usize,
    pub outcome: Result<Arc<ValidationReport>, ValidationError>,
}

impl BatchEntry {
    pub fn is_valid(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Failure text naming this entry, `None` when it is valid
    pub fn failure_message(&self) -> Option<String> {
        match &self.outcome {
            Ok(_) => None,
            Err(ValidationError::Failed(failure)) => Some(failure.message.clone()),
            Err(ValidationError::Execution(err)) => Some(format!("{}{}\n", entry_header(self.entry), err)),
        }
    }
}

/// Per-entry outcomes of [`SchematronValidator::validate_batch`]
#[derive(Debug, Clone)]
pub struct BatchReport {
    entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn is_valid(&self) -> bool {
        self.entries.iter().all(BatchEntry::is_valid)
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| !e.is_valid())
    }

    /// Failure messages of every failing entry, in order; `None` when the
    /// whole batch is valid
    pub fn failure_message(&self) -> Option<String> {
        let message: String = self.entries.iter().filter_map(BatchEntry::failure_message).collect();
        if message.is_empty() {
            None
        } else {
            Some(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{with_builtin_programs, MemoryResolver};

    const SCHEMA: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
  <pattern id="metadata">
    <rule context="record">
      <assert test="normalize-space(title)">title must be non-empty</assert>
      <assert test="normalize-space(description)" role="warning">description should be non-empty</assert>
    </rule>
  </pattern>
</schema>"#;

    fn validator() -> SchematronValidator {
        let resolver = with_builtin_programs(MemoryResolver::new());
        SchematronValidator::compile(&RuleSchema::new("metadata.sch", SCHEMA), &resolver).unwrap()
    }

    #[test]
    fn test_priority_is_clamped() {
        let validator = validator();
        assert_eq!(validator.priority(), 100);
        validator.set_priority(0);
        assert_eq!(validator.priority(), 1);
        validator.set_priority(150);
        assert_eq!(validator.priority(), 100);
        validator.set_priority(50);
        assert_eq!(validator.priority(), 50);
        assert_eq!(Priority::new(i32::MIN).get(), 1);
    }

    #[test]
    fn test_clean_document_is_valid() {
        let validator = validator();
        let report = validator
            .validate(b"<record><title>T</title><description>D</description></record>")
            .unwrap();
        assert!(report.is_valid());
        assert!(Arc::ptr_eq(&report, &validator.report().unwrap()));
    }

    #[test]
    fn test_failure_message_lists_errors_then_warnings() {
        let validator = validator();
        let err = validator.validate(b"<record><title/><description/></record>").unwrap_err();
        match err {
            ValidationError::Failed(failure) => {
                assert_eq!(
                    failure.message,
                    "Schematron validation failed.\n\ntitle must be non-empty\ndescription should be non-empty\n"
                );
                assert_eq!(failure.entry, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        let report = validator.report().unwrap();
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_warning_only_depends_on_policy() {
        let validator = validator();
        let doc = b"<record><title>T</title><description> </description></record>";
        assert!(validator.validate(doc).is_err());

        validator.set_suppress_warnings(true);
        let report = validator.validate(doc).unwrap();
        assert_eq!(report.warnings().len(), 1);
        assert!(report.suppress_warnings());
    }

    #[test]
    fn test_suppressed_failure_omits_warnings() {
        let validator = validator();
        validator.set_suppress_warnings(true);
        match validator.validate(b"<record><description/></record>").unwrap_err() {
            ValidationError::Failed(failure) => {
                assert_eq!(failure.message, "Schematron validation failed.\n\ntitle must be non-empty\n");
                assert!(failure.warnings.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batch_names_failing_entry() {
        let validator = validator();
        let batch = validator.validate_batch(&[
            "<record><title>A</title><description>a</description></record>",
            "<record><description>b</description></record>",
            "<record><title>C</title><description>c</description></record>",
        ]);
        assert!(!batch.is_valid());
        let failing: Vec<usize> = batch.failures().map(|e| e.entry).collect();
        assert_eq!(failing, vec![2]);
        let message = batch.failure_message().unwrap();
        assert!(message.starts_with("Schematron validation failed for entry #2.\n\n"));
        assert!(message.contains("title must be non-empty"));
    }

    #[test]
    fn test_execution_error_fails_only_its_entry() {
        let validator = validator();
        let batch = validator.validate_batch(&[
            "<record><title>A</title><description>a</description></record>",
            "<record>",
        ]);
        assert!(batch.entries()[0].is_valid());
        assert!(matches!(
            batch.entries()[1].outcome,
            Err(ValidationError::Execution(ExecutionError::MalformedDocument(_)))
        ));
        assert!(batch
            .failure_message()
            .unwrap()
            .starts_with("Schematron validation failed for entry #2."));
    }

    #[test]
    fn test_apply_settings() {
        let validator = validator();
        validator.apply_settings(ValidatorSettings {
            suppress_warnings: Some(true),
            priority: Some(-3),
        });
        assert!(validator.suppress_warnings());
        assert_eq!(validator.priority(), 1);

        validator.apply_settings(ValidatorSettings::default());
        assert!(validator.suppress_warnings());
        assert_eq!(validator.priority(), 1);
    }

    #[test]
    fn test_priority_deserializes_clamped() {
        let priority: Priority = serde_json::from_str("500").unwrap();
        assert_eq!(priority.get(), 100);
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("metadata.sch"), SCHEMA).unwrap();
        let mut config = ServiceConfig::default();
        config.resources.root = dir.path().to_path_buf();
        config.validator.schema = Some("./metadata.sch".to_string());
        config.validator.suppress_warnings = true;
        config.validator.priority = 7;

        let validator = SchematronValidator::from_config(&config).unwrap();
        assert!(validator.suppress_warnings());
        assert_eq!(validator.priority(), 7);
        assert_eq!(validator.schema_id(), "metadata.sch");
        assert_eq!(validator.schema_digest(), &Checksum::from_bytes(SCHEMA.as_bytes()));

        config.validator.schema = None;
        assert!(matches!(
            SchematronValidator::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
