//! Schemas spread over several files on disk, and the pipeline hooks on top

use schematron_validation::{
    with_builtin_programs, CompileError, CreateRequest, DeleteRequest, Entry, FsResolver, PreIngestPlugin,
    RuleSchema, SchemaCompiler, SchematronValidator, Severity, Stage, UpdateRequest,
};
use std::fs;
use std::path::Path;

const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

fn compile(root: &Path, path: &str) -> Result<SchematronValidator, CompileError> {
    let resolver = with_builtin_programs(FsResolver::new(root));
    let schema = RuleSchema::load(&resolver, path)?;
    SchematronValidator::compile(&schema, &resolver)
}

#[test]
fn test_nested_includes_resolve_relative_to_includer() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.sch",
        &format!(r#"<schema xmlns="{SCH}"><include href="./parts/record.sch"/></schema>"#),
    );
    write(
        dir.path(),
        "parts/record.sch",
        &format!(
            r#"<pattern xmlns="{SCH}" id="record"><include href="rules.sch#title-rule"/></pattern>"#
        ),
    );
    write(
        dir.path(),
        "parts/rules.sch",
        &format!(
            r#"<library xmlns:sch="{SCH}">
                 <sch:rule id="title-rule" context="record"><sch:assert test="title">title required</sch:assert></sch:rule>
                 <sch:rule id="other" context="other"><sch:assert test="x">x</sch:assert></sch:rule>
               </library>"#
        ),
    );

    let validator = compile(dir.path(), "main.sch").unwrap();
    assert_eq!(validator.program().rule_count(), 1);
    assert!(validator.validate(b"<record><title>T</title></record>").is_ok());
    assert!(validator.validate(b"<record/>").is_err());
}

#[test]
fn test_include_cycle_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.sch",
        &format!(r#"<schema xmlns="{SCH}"><include href="b.sch"/></schema>"#),
    );
    write(
        dir.path(),
        "b.sch",
        &format!(r#"<pattern xmlns="{SCH}"><include href="a.sch"/></pattern>"#),
    );
    match compile(dir.path(), "a.sch").unwrap_err() {
        CompileError::Stage {
            stage,
            severity,
            message,
            ..
        } => {
            assert_eq!(stage, Stage::Inclusion);
            assert_eq!(severity, Severity::Fatal);
            assert!(message.contains("cycle"), "{}", message);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_include_names_resource() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "rules/main.sch",
        &format!(r#"<schema xmlns="{SCH}"><include href="./shared/common.sch"/></schema>"#),
    );
    let err = compile(dir.path(), "rules/main.sch").unwrap_err();
    assert!(err.to_string().contains("rules/shared/common.sch"), "{}", err);
}

#[test]
fn test_compile_warnings_are_reported_per_stage() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "warn.sch",
        &format!(
            r#"<schema xmlns="{SCH}">
                 <pattern abstract="true" id="present">
                   <rule context="$parent"><assert test="$child">missing</assert></rule>
                 </pattern>
                 <pattern is-a="present">
                   <param name="parent" value="record"/>
                   <param name="child" value="title"/>
                   <param name="unused" value="x"/>
                 </pattern>
                 <pattern id="empty"/>
               </schema>"#
        ),
    );
    let resolver = with_builtin_programs(FsResolver::new(dir.path()));
    let schema = RuleSchema::load(&resolver, "warn.sch").unwrap();
    let (_, warnings) = SchemaCompiler::new().compile_with_warnings(&schema, &resolver).unwrap();
    assert!(warnings
        .iter()
        .any(|w| w.stage == Stage::Abstraction && w.message.contains("unused")));
    assert!(warnings
        .iter()
        .any(|w| w.stage == Stage::Skeleton && w.message.contains("has no rules")));
}

#[test]
fn test_pipeline_hooks() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "records.sch",
        &format!(
            r#"<schema xmlns="{SCH}"><pattern><rule context="record">
                 <assert test="title">title required</assert>
               </rule></pattern></schema>"#
        ),
    );
    let validator = compile(dir.path(), "records.sch").unwrap();

    let good = Entry::new("1", "<record><title>A</title></record>");
    let bad = Entry::new("2", "<record/>");

    let create = CreateRequest {
        entries: vec![good.clone(), bad.clone(), good.clone()],
    };
    let stop = validator.process_create(create).unwrap_err();
    assert_eq!(stop.0, "Schematron validation failed for entry #2.\n\ntitle required\n");

    let update = UpdateRequest {
        updates: vec![("1".to_string(), good.clone())],
    };
    assert_eq!(validator.process_update(update.clone()).unwrap(), update);

    let delete = DeleteRequest {
        ids: vec!["2".to_string()],
    };
    assert_eq!(validator.process_delete(delete.clone()).unwrap(), delete);
}
