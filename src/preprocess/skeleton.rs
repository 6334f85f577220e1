//! Skeleton compilation
//!
//! Turns a concrete (include- and abstraction-free) schema into a
//! [`CompiledCheckProgram`]. Every expression is compiled here, so a schema
//! that compiles can only fail at run time on dynamic type errors.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::checksum::Checksum;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::program::{
    CheckAssertion, CheckPattern, CheckRule, CompiledCheckProgram, DiagnosticTemplate, LetValue, MessagePart,
    MessageTemplate, Variable,
};
use crate::report::{AssertionKind, AssertionSeverity};
use crate::xml::{Document, NodeId, NodeKind};
use crate::xpath::{StaticContext, XPath};

use super::{attr, normalized_text, schematron_children, schematron_local, SkeletonOptions};

const SCHEMA_CHILDREN: &[&str] = &["ns", "title", "p", "let", "phase", "pattern", "diagnostics", "properties", "rules"];

pub(crate) fn compile(
    doc: &Document,
    schema_resource: &str,
    schema_digest: Checksum,
    options: &SkeletonOptions,
    phase_override: Option<&str>,
    sink: &mut DiagnosticSink,
) -> Result<CompiledCheckProgram, Diagnostic> {
    let schema = doc
        .document_element()
        .filter(|e| schematron_local(doc, *e) == Some("schema"))
        .ok_or_else(|| Diagnostic::fatal("Document element is not a Schematron <schema>"))?;

    let query_binding = attr(doc, schema, "queryBinding").map(str::to_ascii_lowercase);
    if let Some(binding) = &query_binding {
        if !options.query_bindings.iter().any(|b| b.eq_ignore_ascii_case(binding)) {
            return Err(Diagnostic::error(format!(
                "Unsupported queryBinding '{}' (accepted: {})",
                binding,
                options.query_bindings.join(", ")
            )));
        }
    }

    for child in doc.element_children(schema) {
        if let Some(local) = schematron_local(doc, child) {
            if !SCHEMA_CHILDREN.contains(&local) {
                sink.warn(format!("Unknown Schematron element <{}> in <schema> ignored", local));
            }
        }
    }

    let mut statics = StaticContext::new();
    let mut namespaces = Vec::new();
    for ns in schematron_children(doc, schema, "ns") {
        match (attr(doc, ns, "prefix"), attr(doc, ns, "uri")) {
            (Some(prefix), Some(uri)) => {
                statics.namespaces.insert(prefix.to_string(), uri.to_string());
                namespaces.push((prefix.to_string(), uri.to_string()));
            }
            _ => return Err(Diagnostic::error("<ns> needs both a prefix and a uri")),
        }
    }

    let mut abstract_rules = HashMap::new();
    let mut diagnostics = HashMap::new();
    for node in doc.descendants(schema) {
        match schematron_local(doc, node) {
            Some("rule") if is_abstract(doc, node) => {
                let id = attr(doc, node, "id").ok_or_else(|| Diagnostic::error("Abstract rule without an id"))?;
                abstract_rules.insert(id, node);
            }
            Some("diagnostic") => {
                if let Some(id) = attr(doc, node, "id") {
                    diagnostics.insert(id, node);
                }
            }
            _ => {}
        }
    }

    let mut skeleton = Skeleton {
        doc,
        options,
        sink,
        abstract_rules,
        diagnostics,
    };

    let (phase_id, phase) = skeleton.select_phase(schema, phase_override)?;
    let patterns = skeleton.active_patterns(schema, phase)?;

    let mut globals: Vec<Variable> = Vec::new();
    let global_lets = schematron_children(doc, schema, "let")
        .chain(phase.into_iter().flat_map(|p| schematron_children(doc, p, "let")))
        .chain(patterns.iter().flat_map(|p| schematron_children(doc, *p, "let")));
    for node in global_lets {
        let variable = skeleton.compile_let(node, &statics)?;
        if globals.iter().any(|g| g.name == variable.name) {
            return Err(Diagnostic::error(format!("Variable ${} is declared twice", variable.name)));
        }
        statics.variables.insert(variable.name.clone());
        globals.push(variable);
    }

    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        compiled.push(skeleton.compile_pattern(pattern, &statics)?);
    }

    let program = CompiledCheckProgram {
        schema_resource: schema_resource.to_string(),
        schema_digest,
        title: schematron_children(doc, schema, "title")
            .next()
            .map(|t| normalized_text(doc, t)),
        schema_version: attr(doc, schema, "schemaVersion").map(str::to_string),
        query_binding,
        phase: phase_id,
        namespaces,
        globals,
        patterns: compiled,
    };
    debug!(
        patterns = program.patterns.len(),
        rules = program.rule_count(),
        assertions = program.assertion_count(),
        phase = program.phase.as_deref().unwrap_or("#ALL"),
        "Compiled check program"
    );
    Ok(program)
}

fn is_abstract(doc: &Document, node: NodeId) -> bool {
    attr(doc, node, "abstract") == Some("true")
}

/// Rule-level scope being built while compiling one rule
struct RuleBody<'d> {
    statics: StaticContext,
    role: Option<&'d str>,
    flag: Option<&'d str>,
    lets: Vec<Variable>,
    assertions: Vec<CheckAssertion>,
}

struct Skeleton<'d, 's> {
    doc: &'d Document,
    options: &'s SkeletonOptions,
    sink: &'s mut DiagnosticSink,
    abstract_rules: HashMap<&'d str, NodeId>,
    diagnostics: HashMap<&'d str, NodeId>,
}

impl<'d, 's> Skeleton<'d, 's> {
    /// Resolve the requested phase. `None` means every pattern is active.
    fn select_phase(
        &self,
        schema: NodeId,
        phase_override: Option<&str>,
    ) -> Result<(Option<String>, Option<NodeId>), Diagnostic> {
        let doc = self.doc;
        let mut requested = phase_override.unwrap_or(self.options.phase.as_str());
        if requested == "#DEFAULT" {
            requested = attr(doc, schema, "defaultPhase").unwrap_or("#ALL");
        }
        if requested == "#ALL" {
            return Ok((None, None));
        }
        let phase = schematron_children(doc, schema, "phase")
            .find(|p| attr(doc, *p, "id") == Some(requested))
            .ok_or_else(|| Diagnostic::error(format!("Unknown phase '{}'", requested)))?;
        Ok((Some(requested.to_string()), Some(phase)))
    }

    /// Concrete patterns active in `phase`, in schema order
    fn active_patterns(&mut self, schema: NodeId, phase: Option<NodeId>) -> Result<Vec<NodeId>, Diagnostic> {
        let doc = self.doc;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut concrete = Vec::new();
        for pattern in schematron_children(doc, schema, "pattern") {
            if is_abstract(doc, pattern) {
                continue;
            }
            if let Some(is_a) = attr(doc, pattern, "is-a") {
                self.sink.warn(format!("Unexpanded instance of abstract pattern '{}' ignored", is_a));
                continue;
            }
            if let Some(id) = attr(doc, pattern, "id") {
                if !seen.insert(id) {
                    self.sink.warn(format!("Duplicate pattern id '{}'", id));
                }
            }
            concrete.push(pattern);
        }

        let phase = match phase {
            Some(phase) => phase,
            None => return Ok(concrete),
        };
        let phase_name = attr(doc, phase, "id").unwrap_or_default();
        let mut active: HashSet<&str> = HashSet::new();
        for a in schematron_children(doc, phase, "active") {
            let id = attr(doc, a, "pattern")
                .ok_or_else(|| Diagnostic::error(format!("<active> without a pattern in phase '{}'", phase_name)))?;
            if !seen.contains(id) {
                self.sink
                    .warn(format!("Phase '{}' activates unknown pattern '{}'", phase_name, id));
            }
            active.insert(id);
        }
        Ok(concrete
            .into_iter()
            .filter(|p| attr(doc, *p, "id").map_or(false, |id| active.contains(id)))
            .collect())
    }

    fn compile_let(&mut self, node: NodeId, statics: &StaticContext) -> Result<Variable, Diagnostic> {
        let doc = self.doc;
        let name = attr(doc, node, "name").ok_or_else(|| Diagnostic::error("<let> without a name"))?;
        let value = match doc.attribute(node, "value") {
            Some(expr) => LetValue::Expr(
                XPath::compile(expr, statics)
                    .map_err(|e| Diagnostic::error(format!("Invalid value of ${}: {}", name, e)))?,
            ),
            None => LetValue::Literal(doc.string_value(node)),
        };
        Ok(Variable {
            name: name.to_string(),
            value,
        })
    }

    fn compile_pattern(&mut self, node: NodeId, statics: &StaticContext) -> Result<CheckPattern, Diagnostic> {
        let doc = self.doc;
        let id = attr(doc, node, "id");
        let label = id.unwrap_or("(anonymous)");
        let mut rules: Vec<CheckRule> = Vec::new();

        for child in doc.element_children(node) {
            match schematron_local(doc, child) {
                Some("rule") => {
                    if is_abstract(doc, child) {
                        continue;
                    }
                    let rule = self.compile_rule(child, label, statics)?;
                    if rules.iter().any(|r| r.context() == rule.context()) {
                        self.sink.warn(format!(
                            "Rule with context '{}' in pattern '{}' never fires: an earlier rule has the same context",
                            rule.context(),
                            label
                        ));
                    }
                    rules.push(rule);
                }
                Some("let" | "title" | "p" | "param") | None => {}
                Some(other) => self
                    .sink
                    .warn(format!("Unknown Schematron element <{}> in pattern '{}' ignored", other, label)),
            }
        }
        if rules.is_empty() {
            self.sink.warn(format!("Pattern '{}' has no rules", label));
        }

        Ok(CheckPattern {
            id: id.map(str::to_string),
            title: schematron_children(doc, node, "title")
                .next()
                .map(|t| normalized_text(doc, t)),
            rules,
        })
    }

    fn compile_rule(&mut self, node: NodeId, pattern: &str, statics: &StaticContext) -> Result<CheckRule, Diagnostic> {
        let doc = self.doc;
        let context = attr(doc, node, "context")
            .ok_or_else(|| Diagnostic::error(format!("Rule in pattern '{}' has no context", pattern)))?;
        let context_xpath = XPath::compile_pattern(context, statics)
            .map_err(|e| Diagnostic::error(format!("Invalid rule context '{}': {}", context, e)))?;

        let mut body = RuleBody {
            statics: statics.clone(),
            role: attr(doc, node, "role"),
            flag: attr(doc, node, "flag"),
            lets: Vec::new(),
            assertions: Vec::new(),
        };
        self.compile_body(node, &mut body, &mut Vec::new())?;

        Ok(CheckRule {
            id: attr(doc, node, "id").map(str::to_string),
            context: context_xpath,
            role: body.role.map(str::to_string),
            flag: body.flag.map(str::to_string),
            lets: body.lets,
            assertions: body.assertions,
        })
    }

    /// Compile the lets and assertions of `node` into `body`, splicing in
    /// abstract rules named by `extends`.
    fn compile_body(&mut self, node: NodeId, body: &mut RuleBody<'d>, chain: &mut Vec<&'d str>) -> Result<(), Diagnostic> {
        let doc = self.doc;
        for child in doc.element_children(node) {
            match schematron_local(doc, child) {
                Some("let") => {
                    let variable = self.compile_let(child, &body.statics)?;
                    body.statics.variables.insert(variable.name.clone());
                    body.lets.push(variable);
                }
                Some("assert") => {
                    let assertion = self.compile_assertion(child, AssertionKind::Assert, body)?;
                    body.assertions.push(assertion);
                }
                Some("report") => {
                    let assertion = self.compile_assertion(child, AssertionKind::Report, body)?;
                    body.assertions.push(assertion);
                }
                Some("extends") => {
                    let id = attr(doc, child, "rule").ok_or_else(|| {
                        Diagnostic::error("<extends> needs a rule attribute (href references are expanded earlier)")
                    })?;
                    let target = self
                        .abstract_rules
                        .get(id)
                        .copied()
                        .ok_or_else(|| Diagnostic::error(format!("<extends> names unknown abstract rule '{}'", id)))?;
                    if chain.contains(&id) {
                        return Err(Diagnostic::error(format!(
                            "Abstract rules extend each other in a cycle: {} -> {}",
                            chain.join(" -> "),
                            id
                        )));
                    }
                    chain.push(id);
                    self.compile_body(target, body, chain)?;
                    chain.pop();
                }
                Some("title" | "p") | None => {}
                Some(other) => self
                    .sink
                    .warn(format!("Unknown Schematron element <{}> in rule ignored", other)),
            }
        }
        Ok(())
    }

    fn severity(&self, kind: AssertionKind, role: Option<&str>, flag: Option<&str>) -> AssertionSeverity {
        let options = self.options;
        for marker in [role, flag].into_iter().flatten() {
            if options.warning_roles.iter().any(|r| r.eq_ignore_ascii_case(marker)) {
                return AssertionSeverity::Warning;
            }
            if options.error_roles.iter().any(|r| r.eq_ignore_ascii_case(marker)) {
                return AssertionSeverity::Error;
            }
        }
        match kind {
            AssertionKind::Assert => options.assert_default,
            AssertionKind::Report => options.report_default,
        }
    }

    fn compile_assertion(
        &mut self,
        node: NodeId,
        kind: AssertionKind,
        body: &RuleBody<'d>,
    ) -> Result<CheckAssertion, Diagnostic> {
        let doc = self.doc;
        let element = kind.schema_element();
        let test = attr(doc, node, "test").ok_or_else(|| Diagnostic::error(format!("<{}> without a test", element)))?;
        let test_xpath = XPath::compile(test, &body.statics)
            .map_err(|e| Diagnostic::error(format!("Invalid test '{}': {}", test, e)))?;

        let role = attr(doc, node, "role").or(body.role);
        let severity = self.severity(kind, role, attr(doc, node, "flag").or(body.flag));
        if let Some(flag) = attr(doc, node, "flag") {
            if !flag.eq_ignore_ascii_case(severity.as_flag()) {
                self.sink.warn(format!(
                    "flag '{}' on <{} test=\"{}\"> is replaced by severity marker '{}'",
                    flag,
                    element,
                    test,
                    severity.as_flag()
                ));
            }
        }

        let message = self.compile_message(node, &body.statics)?;
        if message.is_empty() {
            self.sink
                .warn(format!("<{} test=\"{}\"> has an empty message", element, test));
        }

        let mut diagnostics = Vec::new();
        for id in doc.attribute(node, "diagnostics").unwrap_or_default().split_whitespace() {
            match self.diagnostics.get(id).copied() {
                Some(diagnostic) => diagnostics.push(DiagnosticTemplate {
                    id: id.to_string(),
                    message: self.compile_message(diagnostic, &body.statics)?,
                }),
                None => self.sink.warn(format!(
                    "<{} test=\"{}\"> references unknown diagnostic '{}'",
                    element, test, id
                )),
            }
        }

        Ok(CheckAssertion {
            kind,
            id: attr(doc, node, "id").map(str::to_string),
            test: test_xpath,
            severity,
            role: role.map(str::to_string),
            message,
            diagnostics,
        })
    }

    fn compile_message(&self, node: NodeId, statics: &StaticContext) -> Result<MessageTemplate, Diagnostic> {
        let mut template = MessageTemplate::default();
        self.collect_message(node, statics, &mut template)?;
        Ok(template)
    }

    fn collect_message(
        &self,
        node: NodeId,
        statics: &StaticContext,
        template: &mut MessageTemplate,
    ) -> Result<(), Diagnostic> {
        let doc = self.doc;
        for &child in doc.children(node) {
            match doc.kind(child) {
                NodeKind::Text(text) => template.push_text(text),
                NodeKind::Element { .. } => match schematron_local(doc, child) {
                    Some("value-of") => {
                        let select = attr(doc, child, "select")
                            .ok_or_else(|| Diagnostic::error("<value-of> without a select"))?;
                        let xpath = XPath::compile(select, statics)
                            .map_err(|e| Diagnostic::error(format!("Invalid value-of '{}': {}", select, e)))?;
                        template.parts.push(MessagePart::ValueOf(xpath));
                    }
                    Some("name") => {
                        let path = match attr(doc, child, "path") {
                            Some(path) => Some(
                                XPath::compile(path, statics)
                                    .map_err(|e| Diagnostic::error(format!("Invalid name path '{}': {}", path, e)))?,
                            ),
                            None => None,
                        };
                        template.parts.push(MessagePart::Name(path));
                    }
                    _ => self.collect_message(child, statics, template)?,
                },
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_with(schema: &str, phase: Option<&str>) -> Result<(CompiledCheckProgram, Vec<String>), Diagnostic> {
        let doc = Document::parse(schema).unwrap();
        let mut sink = DiagnosticSink::new();
        let program = compile(
            &doc,
            "test.sch",
            Checksum::from_bytes(schema.as_bytes()),
            &SkeletonOptions::default(),
            phase,
            &mut sink,
        )?;
        Ok((program, sink.into_warnings()))
    }

    fn compile_str(schema: &str) -> Result<(CompiledCheckProgram, Vec<String>), Diagnostic> {
        compile_with(schema, None)
    }

    #[test]
    fn test_roles_decide_severity() {
        let (program, warnings) = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron" queryBinding="xslt2">
                 <pattern id="p">
                   <rule context="record">
                     <assert test="title">title must be present</assert>
                     <assert test="description" role="warning">description should be present</assert>
                     <report test="legacy" role="fatal">legacy elements are not allowed</report>
                     <report test="note">has a note</report>
                   </rule>
                 </pattern>
               </schema>"#,
        )
        .unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
        let severities: Vec<AssertionSeverity> = program.patterns()[0].rules()[0]
            .assertions()
            .iter()
            .map(CheckAssertion::severity)
            .collect();
        assert_eq!(
            severities,
            vec![
                AssertionSeverity::Error,
                AssertionSeverity::Warning,
                AssertionSeverity::Error,
                AssertionSeverity::Warning
            ]
        );
        assert_eq!(program.query_binding(), Some("xslt2"));
    }

    #[test]
    fn test_unsupported_query_binding() {
        let err = compile_str(r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron" queryBinding="stx"/>"#)
            .unwrap_err();
        assert!(err.message.contains("queryBinding 'stx'"));
    }

    #[test]
    fn test_phase_selection() {
        let schema = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron" defaultPhase="quick">
             <phase id="quick"><active pattern="a"/><active pattern="ghost"/></phase>
             <phase id="full"><active pattern="a"/><active pattern="b"/></phase>
             <pattern id="a"><rule context="x"><assert test="true()">a</assert></rule></pattern>
             <pattern id="b"><rule context="y"><assert test="true()">b</assert></rule></pattern>
           </schema>"#;

        let (program, warnings) = compile_with(schema, None).unwrap();
        assert_eq!(program.phase(), Some("quick"));
        assert_eq!(program.patterns().len(), 1);
        assert_eq!(warnings, vec!["Phase 'quick' activates unknown pattern 'ghost'"]);

        let (program, _) = compile_with(schema, Some("#ALL")).unwrap();
        assert_eq!(program.phase(), None);
        assert_eq!(program.patterns().len(), 2);

        let (program, _) = compile_with(schema, Some("full")).unwrap();
        assert_eq!(program.patterns().len(), 2);

        let err = compile_with(schema, Some("nightly")).unwrap_err();
        assert_eq!(err.message, "Unknown phase 'nightly'");
    }

    #[test]
    fn test_extends_splices_abstract_rule() {
        let (program, _) = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern id="p">
                   <rule abstract="true" id="identified">
                     <let name="ident" value="@id"/>
                     <assert test="string-length($ident) &gt; 0">id required</assert>
                   </rule>
                   <rule context="record">
                     <extends rule="identified"/>
                     <assert test="$ident != 'x'">id must not be x</assert>
                   </rule>
                 </pattern>
               </schema>"#,
        )
        .unwrap();
        let rules = program.patterns()[0].rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].assertions().len(), 2);
        assert_eq!(rules[0].lets.len(), 1);
    }

    #[test]
    fn test_extends_errors() {
        let err = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern><rule context="a"><extends rule="missing"/></rule></pattern>
               </schema>"#,
        )
        .unwrap_err();
        assert!(err.message.contains("unknown abstract rule 'missing'"));

        let err = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern>
                   <rule abstract="true" id="r1"><extends rule="r2"/></rule>
                   <rule abstract="true" id="r2"><extends rule="r1"/></rule>
                   <rule context="a"><extends rule="r1"/></rule>
                 </pattern>
               </schema>"#,
        )
        .unwrap_err();
        assert!(err.message.contains("cycle"), "{}", err.message);
    }

    #[test]
    fn test_expression_errors() {
        let undeclared = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern><rule context="ex:item"><assert test="true()">m</assert></rule></pattern>
               </schema>"#,
        )
        .unwrap_err();
        assert!(undeclared.message.contains("'ex'"), "{}", undeclared.message);

        let declared = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <ns prefix="ex" uri="urn:ex"/>
                 <pattern><rule context="ex:item"><assert test="true()">m</assert></rule></pattern>
               </schema>"#,
        );
        assert!(declared.is_ok());

        let variable = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern><rule context="a"><assert test="$nope">m</assert></rule></pattern>
               </schema>"#,
        )
        .unwrap_err();
        assert!(variable.message.contains("$nope"), "{}", variable.message);

        let function = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern><rule context="a"><assert test="frobnicate(.)">m</assert></rule></pattern>
               </schema>"#,
        )
        .unwrap_err();
        assert!(function.message.contains("frobnicate"), "{}", function.message);
    }

    #[test]
    fn test_global_lets_are_visible_to_rules() {
        let (program, _) = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <let name="max" value="3"/>
                 <pattern id="p">
                   <let name="min">1</let>
                   <rule context="list"><assert test="count(item) &lt;= $max and count(item) &gt;= $min">size</assert></rule>
                 </pattern>
               </schema>"#,
        )
        .unwrap();
        let names: Vec<&str> = program.globals().iter().map(Variable::name).collect();
        assert_eq!(names, vec!["max", "min"]);
    }

    #[test]
    fn test_compile_warnings() {
        let (_, warnings) = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern id="dup"><rule context="a"><assert test="b"/></rule></pattern>
                 <pattern id="dup">
                   <rule context="c"><assert test="d" flag="bogus" diagnostics="nope">m</assert></rule>
                   <rule context="c"><assert test="e">m</assert></rule>
                 </pattern>
                 <pattern id="empty"/>
                 <oddity/>
               </schema>"#,
        )
        .unwrap();
        let expected = [
            "Unknown Schematron element <oddity>",
            "Duplicate pattern id 'dup'",
            "<assert test=\"b\"> has an empty message",
            "flag 'bogus'",
            "unknown diagnostic 'nope'",
            "never fires",
            "Pattern 'empty' has no rules",
        ];
        assert_eq!(warnings.len(), expected.len(), "{:?}", warnings);
        for (warning, fragment) in warnings.iter().zip(expected) {
            assert!(warning.contains(fragment), "{} should contain {}", warning, fragment);
        }
    }

    #[test]
    fn test_diagnostics_and_message_parts() {
        let (program, warnings) = compile_str(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern>
                   <rule context="record">
                     <assert test="@id" diagnostics="d1"><name/> needs an <emph>id</emph> (has <value-of select="count(@*)"/>)</assert>
                   </rule>
                 </pattern>
                 <diagnostics><diagnostic id="d1">found <value-of select="name()"/></diagnostic></diagnostics>
               </schema>"#,
        )
        .unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
        let assertion = &program.patterns()[0].rules()[0].assertions()[0];
        assert_eq!(assertion.diagnostics.len(), 1);
        assert_eq!(assertion.diagnostics[0].id, "d1");
        let kinds: Vec<&str> = assertion
            .message
            .parts
            .iter()
            .map(|p| match p {
                MessagePart::Text(_) => "text",
                MessagePart::ValueOf(_) => "value-of",
                MessagePart::Name(_) => "name",
            })
            .collect();
        assert_eq!(kinds, vec!["name", "text", "value-of", "text"]);
    }

    #[test]
    fn test_not_a_schema() {
        let err = compile_str("<html/>").unwrap_err();
        assert_eq!(err.severity, crate::diagnostics::Severity::Fatal);
    }
}
