//! Check executor
//!
//! Runs a [`CompiledCheckProgram`] over one document and records what
//! happened as an SVRL tree. For every active pattern each node of the
//! document, in document order, is offered to the pattern's rules; the first
//! rule whose context matches fires.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::preprocess::SVRL_NS;
use crate::program::{evaluation_error, CheckAssertion, CheckPattern, CheckRule, CompiledCheckProgram};
use crate::report::AssertionKind;
use crate::xml::{Document, NodeId, NodeKind, QName};
use crate::xpath::{Bindings, EvalContext};

/// SVRL tree and run-time messages for one document
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    svrl: Document,
    messages: Vec<String>,
}

impl ExecutionOutput {
    pub fn svrl(&self) -> &Document {
        &self.svrl
    }

    /// Serialized SVRL
    pub fn svrl_text(&self) -> String {
        self.svrl.to_xml_string()
    }

    /// Run-time warnings, such as a `<name path>` that selected nothing
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

/// Applies a compiled program to documents. Holds no per-document state, so
/// one executor (or many) may run concurrently against the same program.
#[derive(Debug, Clone, Copy)]
pub struct CheckExecutor<'p> {
    program: &'p CompiledCheckProgram,
}

impl<'p> CheckExecutor<'p> {
    pub fn new(program: &'p CompiledCheckProgram) -> Self {
        Self { program }
    }

    /// Parse and check a document
    pub fn execute(&self, document: &[u8]) -> Result<ExecutionOutput, ExecutionError> {
        let doc = Document::parse_bytes(document)?;
        self.execute_document(&doc)
    }

    pub fn execute_document(&self, doc: &Document) -> Result<ExecutionOutput, ExecutionError> {
        let program = self.program;
        let mut messages = Vec::new();

        let mut bindings = Bindings::new();
        for global in &program.globals {
            let value = global.evaluate(&EvalContext::new(doc, doc.root(), &bindings))?;
            bindings.push(global.name(), value);
        }

        let mut svrl = SvrlWriter::new(program);
        let mut fired = 0usize;
        for pattern in &program.patterns {
            svrl.active_pattern(pattern);

            let mut matches: Vec<HashSet<NodeId>> = Vec::with_capacity(pattern.rules.len());
            for rule in &pattern.rules {
                let nodes = rule
                    .context
                    .select_from_root(doc, &bindings)
                    .map_err(evaluation_error(&rule.context))?;
                matches.push(nodes.into_iter().collect());
            }

            for node in doc.node_ids() {
                let rule = match matches.iter().position(|m| m.contains(&node)) {
                    Some(index) => &pattern.rules[index],
                    None => continue,
                };
                svrl.fired_rule(rule);

                let mark = bindings.len();
                for variable in &rule.lets {
                    let value = variable.evaluate(&EvalContext::new(doc, node, &bindings))?;
                    bindings.push(variable.name(), value);
                }
                {
                    let ctx = EvalContext::new(doc, node, &bindings);
                    for assertion in &rule.assertions {
                        let holds = assertion
                            .test
                            .evaluate_boolean(&ctx)
                            .map_err(evaluation_error(&assertion.test))?;
                        let fires = match assertion.kind {
                            AssertionKind::Assert => !holds,
                            AssertionKind::Report => holds,
                        };
                        if !fires {
                            continue;
                        }
                        fired += 1;
                        let text = assertion.message.render(&ctx, &mut messages)?;
                        let mut diagnostics = Vec::with_capacity(assertion.diagnostics.len());
                        for diagnostic in &assertion.diagnostics {
                            diagnostics.push((diagnostic.id.as_str(), diagnostic.message.render(&ctx, &mut messages)?));
                        }
                        svrl.assertion(assertion, &location(doc, node), &text, &diagnostics);
                    }
                }
                bindings.truncate(mark);
            }
        }

        for message in &messages {
            warn!(schema = %program.schema_resource(), "{}", message);
        }
        debug!(
            schema = %program.schema_resource(),
            patterns = program.patterns.len(),
            fired,
            "Executed check program"
        );
        Ok(ExecutionOutput {
            svrl: svrl.finish(),
            messages,
        })
    }
}

/// Location path of a node, e.g. `/record[1]/title[2]` or `/record[1]/@id`.
/// Namespaced elements are written as `*:local[namespace-uri()='...']`.
pub fn location(doc: &Document, node: NodeId) -> String {
    let mut steps = Vec::new();
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        let step = match doc.kind(current) {
            NodeKind::Element { name, .. } => {
                let position = sibling_position(doc, parent, current, |kind| {
                    matches!(kind, NodeKind::Element { name: n, .. }
                        if n.local == name.local && n.namespace == name.namespace)
                });
                match &name.namespace {
                    Some(ns) => format!("*:{}[namespace-uri()='{}'][{}]", name.local, ns, position),
                    None => format!("{}[{}]", name.local, position),
                }
            }
            NodeKind::Attribute { name, .. } => match &name.namespace {
                Some(ns) => format!("@*[local-name()='{}' and namespace-uri()='{}']", name.local, ns),
                None => format!("@{}", name.local),
            },
            NodeKind::Text(_) => format!(
                "text()[{}]",
                sibling_position(doc, parent, current, |k| matches!(k, NodeKind::Text(_)))
            ),
            NodeKind::Comment(_) => format!(
                "comment()[{}]",
                sibling_position(doc, parent, current, |k| matches!(k, NodeKind::Comment(_)))
            ),
            NodeKind::Document => break,
        };
        steps.push(step);
        current = parent;
    }
    steps.reverse();
    format!("/{}", steps.join("/"))
}

fn sibling_position(doc: &Document, parent: NodeId, node: NodeId, same: impl Fn(&NodeKind) -> bool) -> usize {
    doc.children(parent)
        .iter()
        .take_while(|c| **c != node)
        .filter(|c| same(doc.kind(**c)))
        .count()
        + 1
}

fn svrl_name(local: &str) -> QName {
    QName::qualified("svrl", local, SVRL_NS)
}

/// Incrementally builds the `svrl:schematron-output` tree
struct SvrlWriter {
    doc: Document,
    root: NodeId,
}

impl SvrlWriter {
    fn new(program: &CompiledCheckProgram) -> Self {
        let mut doc = Document::new();
        let top = doc.root();
        let root = doc.append_element(top, svrl_name("schematron-output"));
        doc.declare_namespace(root, Some("svrl"), SVRL_NS);
        if let Some(title) = program.title() {
            doc.set_attribute(root, QName::local("title"), title);
        }
        if let Some(phase) = program.phase() {
            doc.set_attribute(root, QName::local("phase"), phase);
        }
        if let Some(version) = &program.schema_version {
            doc.set_attribute(root, QName::local("schemaVersion"), version.as_str());
        }
        for (prefix, uri) in program.namespaces() {
            let ns = doc.append_element(root, svrl_name("ns-prefix-in-attribute-values"));
            doc.set_attribute(ns, QName::local("prefix"), prefix.as_str());
            doc.set_attribute(ns, QName::local("uri"), uri.as_str());
        }
        Self { doc, root }
    }

    fn optional(&mut self, element: NodeId, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.doc.set_attribute(element, QName::local(name), value);
        }
    }

    fn active_pattern(&mut self, pattern: &CheckPattern) {
        let element = self.doc.append_element(self.root, svrl_name("active-pattern"));
        self.optional(element, "id", pattern.id());
        self.optional(element, "name", pattern.title());
    }

    fn fired_rule(&mut self, rule: &CheckRule) {
        let element = self.doc.append_element(self.root, svrl_name("fired-rule"));
        self.doc
            .set_attribute(element, QName::local("context"), rule.context());
        self.optional(element, "id", rule.id.as_deref());
        self.optional(element, "role", rule.role.as_deref());
        self.optional(element, "flag", rule.flag.as_deref());
    }

    fn assertion(&mut self, assertion: &CheckAssertion, location: &str, text: &str, diagnostics: &[(&str, String)]) {
        let element = self
            .doc
            .append_element(self.root, svrl_name(assertion.kind.svrl_element()));
        self.doc
            .set_attribute(element, QName::local("test"), assertion.test());
        self.doc.set_attribute(element, QName::local("location"), location);
        self.doc
            .set_attribute(element, QName::local("flag"), assertion.severity.as_flag());
        self.optional(element, "id", assertion.id());
        self.optional(element, "role", assertion.role());
        for (id, message) in diagnostics {
            let reference = self
                .doc
                .append_element(element, svrl_name("diagnostic-reference"));
            self.doc
                .set_attribute(reference, QName::local("diagnostic"), *id);
            let body = self.doc.append_element(reference, svrl_name("text"));
            self.doc.append_text(body, message);
        }
        let body = self.doc.append_element(element, svrl_name("text"));
        self.doc.append_text(body, text);
    }

    fn finish(self) -> Document {
        self.doc
    }
}
