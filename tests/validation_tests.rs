//! End-to-end tests: compile the fixture schemas and validate documents

use schematron_validation::{
    with_builtin_programs, CheckExecutor, CompileError, FsResolver, MemoryResolver, RuleSchema, SchemaCompiler,
    SchematronValidator, Stage, ValidationError,
};
use std::path::PathBuf;
use std::sync::Arc;

const VALID: &str = include_str!("fixtures/documents/valid.xml");
const MISSING_TITLE: &str = include_str!("fixtures/documents/missing-title.xml");
const ADVISORY_ONLY: &str = include_str!("fixtures/documents/advisory-only.xml");

const RECORD_RULES: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
  <pattern>
    <rule context="record">
      <assert test="normalize-space(title)">title must be non-empty</assert>
      <assert test="normalize-space(description)" role="warning">description should be non-empty</assert>
    </rule>
  </pattern>
</schema>"#;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_validator() -> SchematronValidator {
    let resolver = with_builtin_programs(FsResolver::new(fixtures()));
    let schema = RuleSchema::load(&resolver, "./rules/metadata.sch").unwrap();
    SchematronValidator::compile(&schema, &resolver).unwrap()
}

fn record_validator() -> SchematronValidator {
    let resolver = with_builtin_programs(MemoryResolver::new());
    SchematronValidator::compile(&RuleSchema::new("records.sch", RECORD_RULES), &resolver).unwrap()
}

#[test]
fn test_fixture_schema_compiles_all_stages() {
    let validator = fixture_validator();
    let program = validator.program();
    assert_eq!(program.title(), Some("Record metadata rules"));
    let ids: Vec<Option<&str>> = program.patterns().iter().map(|p| p.id()).collect();
    assert_eq!(
        ids,
        vec![Some("identifier"), Some("required-fields"), Some("keyword-limit")]
    );
    assert_eq!(program.patterns()[2].rules()[0].context(), "record");
    assert_eq!(program.patterns()[2].rules()[0].assertions()[0].test(), "count(dc:subject) <= 3");
}

#[test]
fn test_schema_identifier_is_resource_path() {
    let validator = fixture_validator();
    assert_eq!(validator.schema_id(), "rules/metadata.sch");
    assert_eq!(validator.program().schema_resource(), "rules/metadata.sch");
    assert_eq!(validator.schema_digest().as_str().len(), 64);
}

#[test]
fn test_clean_document_valid_under_both_policies() {
    let validator = fixture_validator();
    for suppress in [false, true] {
        validator.set_suppress_warnings(suppress);
        let report = validator.validate(VALID.as_bytes()).unwrap();
        assert!(report.errors().is_empty());
        assert!(report.warnings().is_empty());
    }
}

#[test]
fn test_mandatory_violation_invalid_under_both_policies() {
    let validator = fixture_validator();
    for suppress in [false, true] {
        validator.set_suppress_warnings(suppress);
        match validator.validate(MISSING_TITLE.as_bytes()) {
            Err(ValidationError::Failed(failure)) => {
                assert_eq!(failure.errors, vec!["A record must have a non-empty title."]);
            }
            other => panic!("unexpected {:?}", other),
        }
        let report = validator.report().unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.errors()[0].location, "/record[1]");
    }
}

#[test]
fn test_advisory_only_violation_depends_on_policy() {
    let validator = fixture_validator();
    let err = validator.validate(ADVISORY_ONLY.as_bytes()).unwrap_err();
    let expected = [
        "Record id tmp-102 is temporary.",
        "A record should have a description.",
        "record has more than 3 keywords.",
    ];
    match err {
        ValidationError::Failed(failure) => {
            assert!(failure.errors.is_empty());
            assert_eq!(failure.warnings, expected);
            assert_eq!(
                failure.message,
                format!("Schematron validation failed.\n\n{}\n", expected.join("\n"))
            );
        }
        other => panic!("unexpected {:?}", other),
    }

    validator.set_suppress_warnings(true);
    let report = validator.validate(ADVISORY_ONLY.as_bytes()).unwrap();
    assert_eq!(report.warning_messages(), expected);
    assert!(!report.is_valid_with(false));
}

#[test]
fn test_title_and_description_scenario() {
    let validator = record_validator();
    let report = validator
        .check(b"<record><title></title><description></description></record>")
        .unwrap();
    assert_eq!(report.error_messages(), vec!["title must be non-empty"]);
    assert_eq!(report.warning_messages(), vec!["description should be non-empty"]);
    assert!(!report.is_valid());

    validator.set_suppress_warnings(true);
    let report = validator
        .check(b"<record><title>T</title><description/></record>")
        .unwrap();
    assert!(report.is_valid());
    assert_eq!(report.warnings().len(), 1);
}

#[test]
fn test_batch_reports_failing_entry_number() {
    let validator = record_validator();
    let batch = validator.validate_batch(&[
        "<record><title>One</title><description>first</description></record>",
        "<record><title/><description>second</description></record>",
        "<record><title>Three</title><description>third</description></record>",
    ]);
    assert!(batch.entries()[0].is_valid());
    assert!(!batch.entries()[1].is_valid());
    assert!(batch.entries()[2].is_valid());
    let message = batch.failure_message().unwrap();
    assert!(message.contains("entry #2"));
    assert!(!message.contains("entry #1"));
    assert!(!message.contains("entry #3"));
}

#[test]
fn test_priority_clamping() {
    let validator = record_validator();
    validator.set_priority(0);
    assert_eq!(validator.priority(), 1);
    validator.set_priority(150);
    assert_eq!(validator.priority(), 100);
    validator.set_priority(50);
    assert_eq!(validator.priority(), 50);
}

#[test]
fn test_resolver_miss_names_resource() {
    let resolver = MemoryResolver::new();
    let err = RuleSchema::load(&resolver, "rules/absent.sch").unwrap_err();
    assert!(err.to_string().contains("rules/absent.sch"));

    // the skeleton program is missing
    let resolver = MemoryResolver::new()
        .with(
            Stage::Inclusion.default_program(),
            "kind = \"inclusion-expander\"",
        )
        .with(
            Stage::Abstraction.default_program(),
            "kind = \"abstraction-expander\"",
        );
    let err = SchemaCompiler::new()
        .compile(&RuleSchema::new("records.sch", RECORD_RULES), &resolver)
        .unwrap_err();
    match err {
        CompileError::ResourceNotFound { resource } => {
            assert_eq!(resource, "iso-schematron/iso_svrl_for_xslt2.toml")
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_two_compilations_behave_identically() {
    let resolver = with_builtin_programs(FsResolver::new(fixtures()));
    let schema = RuleSchema::load(&resolver, "rules/metadata.sch").unwrap();
    let first = SchemaCompiler::new().compile(&schema, &resolver).unwrap();
    let second = SchemaCompiler::new().compile(&schema, &resolver).unwrap();
    assert_eq!(first.schema_resource(), second.schema_resource());
    assert_eq!(first.schema_digest(), second.schema_digest());

    for document in [VALID, MISSING_TITLE, ADVISORY_ONLY] {
        let a = CheckExecutor::new(&first).execute(document.as_bytes()).unwrap();
        let b = CheckExecutor::new(&second).execute(document.as_bytes()).unwrap();
        assert_eq!(a.svrl_text(), b.svrl_text());
    }
}

#[test]
fn test_shared_program_across_threads() {
    let validator = fixture_validator();
    let program = Arc::clone(validator.program());
    let documents = [VALID, MISSING_TITLE, ADVISORY_ONLY];

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let program = Arc::clone(&program);
            scope.spawn(move || {
                let local = SchematronValidator::new(program);
                for _ in 0..10 {
                    assert!(local.validate(documents[0].as_bytes()).is_ok());
                    assert!(local.validate(documents[1].as_bytes()).is_err());
                    let report = local.check(documents[2].as_bytes()).unwrap();
                    assert_eq!(report.warnings().len(), 3);
                }
            });
        }
    });

    let shared = Arc::new(validator);
    std::thread::scope(|scope| {
        for document in documents {
            let shared = Arc::clone(&shared);
            scope.spawn(move || shared.check(document.as_bytes()).unwrap());
        }
    });
    assert!(shared.report().is_some());
}
