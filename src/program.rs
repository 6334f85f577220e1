//! The compiled check program
//!
//! Output of skeleton compilation and input of the executor. A program is
//! immutable once built and is shared between threads behind an `Arc`.

use crate::checksum::Checksum;
use crate::error::{ExecutionError, XPathError};
use crate::report::{AssertionKind, AssertionSeverity};
use crate::xpath::{EvalContext, Value, XPath};

/// A `let` binding
#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) value: LetValue,
}

#[derive(Debug, Clone)]
pub enum LetValue {
    /// `<let name="n" value="expr"/>`
    Expr(XPath),
    /// `<let name="n">text</let>`
    Literal(String),
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Value, ExecutionError> {
        match &self.value {
            LetValue::Expr(xpath) => xpath.evaluate(ctx).map_err(evaluation_error(xpath)),
            LetValue::Literal(text) => Ok(Value::String(text.clone())),
        }
    }
}

pub(crate) fn evaluation_error(xpath: &XPath) -> impl Fn(XPathError) -> ExecutionError + '_ {
    move |source| ExecutionError::Evaluation {
        expr: xpath.source().to_string(),
        source,
    }
}

/// One piece of an assertion or diagnostic message
#[derive(Debug, Clone)]
pub enum MessagePart {
    Text(String),
    /// `<value-of select="..."/>`
    ValueOf(XPath),
    /// `<name/>` (context node) or `<name path="..."/>`
    Name(Option<XPath>),
}

/// A message with embedded expressions
#[derive(Debug, Clone, Default)]
pub struct MessageTemplate {
    pub(crate) parts: Vec<MessagePart>,
}

impl MessageTemplate {
    pub(crate) fn push_text(&mut self, text: &str) {
        if let Some(MessagePart::Text(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(MessagePart::Text(text.to_string()));
        }
    }

    /// No dynamic parts and nothing but whitespace
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| match p {
            MessagePart::Text(t) => t.trim().is_empty(),
            _ => false,
        })
    }

    /// Render the message at `ctx`. Warnings about parts that selected
    /// nothing go to `messages`.
    pub(crate) fn render(&self, ctx: &EvalContext<'_>, messages: &mut Vec<String>) -> Result<String, ExecutionError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                MessagePart::Text(t) => out.push_str(t),
                MessagePart::ValueOf(xpath) => {
                    out.push_str(&xpath.evaluate_string(ctx).map_err(evaluation_error(xpath))?);
                }
                MessagePart::Name(None) => {
                    if let Some(name) = ctx.doc.name(ctx.node) {
                        out.push_str(&name.lexical());
                    }
                }
                MessagePart::Name(Some(path)) => {
                    let nodes = path
                        .evaluate(ctx)
                        .and_then(|v| v.into_nodes(&format!("<name path=\"{}\">", path)))
                        .map_err(evaluation_error(path))?;
                    match nodes.first().and_then(|n| ctx.doc.name(*n)) {
                        Some(name) => out.push_str(&name.lexical()),
                        None => messages.push(format!("<name path=\"{}\"> selected no named node", path)),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// A diagnostic referenced by an assertion, compiled in the assertion's scope
#[derive(Debug, Clone)]
pub struct DiagnosticTemplate {
    pub(crate) id: String,
    pub(crate) message: MessageTemplate,
}

/// A compiled `assert` or `report`
#[derive(Debug, Clone)]
pub struct CheckAssertion {
    pub(crate) kind: AssertionKind,
    pub(crate) id: Option<String>,
    pub(crate) test: XPath,
    /// Severity marker written into the SVRL `flag` attribute
    pub(crate) severity: AssertionSeverity,
    pub(crate) role: Option<String>,
    pub(crate) message: MessageTemplate,
    pub(crate) diagnostics: Vec<DiagnosticTemplate>,
}

impl CheckAssertion {
    pub fn kind(&self) -> AssertionKind {
        self.kind
    }

    pub fn test(&self) -> &str {
        self.test.source()
    }

    pub fn severity(&self) -> AssertionSeverity {
        self.severity
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct CheckRule {
    pub(crate) id: Option<String>,
    pub(crate) context: XPath,
    pub(crate) role: Option<String>,
    pub(crate) flag: Option<String>,
    pub(crate) lets: Vec<Variable>,
    pub(crate) assertions: Vec<CheckAssertion>,
}

impl CheckRule {
    pub fn context(&self) -> &str {
        self.context.source()
    }

    pub fn assertions(&self) -> &[CheckAssertion] {
        &self.assertions
    }
}

#[derive(Debug, Clone)]
pub struct CheckPattern {
    pub(crate) id: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) rules: Vec<CheckRule>,
}

impl CheckPattern {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn rules(&self) -> &[CheckRule] {
        &self.rules
    }
}

/// An executable rule schema
#[derive(Debug, Clone)]
pub struct CompiledCheckProgram {
    /// Resource path the schema was loaded from
    pub(crate) schema_resource: String,
    pub(crate) schema_digest: Checksum,
    pub(crate) title: Option<String>,
    pub(crate) schema_version: Option<String>,
    pub(crate) query_binding: Option<String>,
    /// Selected phase id; `None` when every pattern is active
    pub(crate) phase: Option<String>,
    /// `sch:ns` bindings, in declaration order
    pub(crate) namespaces: Vec<(String, String)>,
    /// Schema, phase and pattern lets, evaluated once per document
    pub(crate) globals: Vec<Variable>,
    /// Active patterns in schema order
    pub(crate) patterns: Vec<CheckPattern>,
}

impl CompiledCheckProgram {
    /// Normalized resource path of the schema; identifies the program
    pub fn schema_resource(&self) -> &str {
        &self.schema_resource
    }

    /// SHA-256 digest of the schema source
    pub fn schema_digest(&self) -> &Checksum {
        &self.schema_digest
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn query_binding(&self) -> Option<&str> {
        self.query_binding.as_deref()
    }

    pub fn phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    pub fn globals(&self) -> &[Variable] {
        &self.globals
    }

    pub fn patterns(&self) -> &[CheckPattern] {
        &self.patterns
    }

    pub fn rule_count(&self) -> usize {
        self.patterns.iter().map(|p| p.rules.len()).sum()
    }

    pub fn assertion_count(&self) -> usize {
        self.patterns
            .iter()
            .flat_map(|p| &p.rules)
            .map(|r| r.assertions.len())
            .sum()
    }
}
