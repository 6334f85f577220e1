//! Validation reports
//!
//! [`ReportBuilder`] reads the SVRL tree produced by the executor and sorts
//! every fired assertion into an error or warning channel, preserving
//! emission order. The severity comes from the `flag` marker the skeleton
//! compiler writes onto each assertion.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::executor::ExecutionOutput;
use crate::preprocess::SVRL_NS;
use crate::xml::{Document, NodeId};

/// Severity of a fired assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionSeverity {
    Error,
    Warning,
}

impl AssertionSeverity {
    /// Value of the SVRL `flag` marker
    pub fn as_flag(self) -> &'static str {
        match self {
            AssertionSeverity::Error => "error",
            AssertionSeverity::Warning => "warning",
        }
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            f if f.eq_ignore_ascii_case("error") => Some(AssertionSeverity::Error),
            f if f.eq_ignore_ascii_case("warning") => Some(AssertionSeverity::Warning),
            _ => None,
        }
    }
}

impl fmt::Display for AssertionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

/// Whether an assertion fired because an `assert` failed or a `report`
/// succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    Assert,
    Report,
}

impl AssertionKind {
    /// Schematron element the assertion was written as
    pub fn schema_element(self) -> &'static str {
        match self {
            AssertionKind::Assert => "assert",
            AssertionKind::Report => "report",
        }
    }

    /// SVRL element the executor emits when the assertion fires
    pub fn svrl_element(self) -> &'static str {
        match self {
            AssertionKind::Assert => "failed-assert",
            AssertionKind::Report => "successful-report",
        }
    }

    fn from_svrl_element(local: &str) -> Option<Self> {
        match local {
            "failed-assert" => Some(AssertionKind::Assert),
            "successful-report" => Some(AssertionKind::Report),
            _ => None,
        }
    }

    /// Severity used when the SVRL carries no usable marker
    fn default_severity(self) -> AssertionSeverity {
        match self {
            AssertionKind::Assert => AssertionSeverity::Error,
            AssertionKind::Report => AssertionSeverity::Warning,
        }
    }
}

/// One fired assertion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assertion {
    pub severity: AssertionSeverity,
    pub kind: AssertionKind,
    /// Whitespace-normalized message text
    pub message: String,
    /// Location path of the node the rule fired on
    pub location: String,
    pub test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    errors: Vec<Assertion>,
    warnings: Vec<Assertion>,
    suppress_warnings: bool,
    #[serde(skip)]
    svrl: String,
}

impl ValidationReport {
    pub fn errors(&self) -> &[Assertion] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Assertion] {
        &self.warnings
    }

    pub fn error_messages(&self) -> Vec<&str> {
        self.errors.iter().map(|a| a.message.as_str()).collect()
    }

    pub fn warning_messages(&self) -> Vec<&str> {
        self.warnings.iter().map(|a| a.message.as_str()).collect()
    }

    /// The suppress-warnings policy this report was built with
    pub fn suppress_warnings(&self) -> bool {
        self.suppress_warnings
    }

    /// Any error makes a report invalid; warnings do too unless suppressed
    pub fn is_valid(&self) -> bool {
        self.is_valid_with(self.suppress_warnings)
    }

    /// The verdict under a different suppress-warnings policy
    pub fn is_valid_with(&self, suppress_warnings: bool) -> bool {
        if !self.errors.is_empty() {
            return false;
        }
        self.warnings.is_empty() || suppress_warnings
    }

    /// Serialized SVRL the report was built from
    pub fn svrl(&self) -> &str {
        &self.svrl
    }

    /// Failure text: `header`, then every error and (unless suppressed)
    /// every warning, one per line
    pub fn failure_message(&self, header: &str) -> String {
        let mut message = String::from(header);
        for line in self.failure_lines() {
            message.push_str(line);
            message.push('\n');
        }
        message
    }

    fn failure_lines(&self) -> impl Iterator<Item = &str> {
        let warnings: &[Assertion] = if self.suppress_warnings { &[] } else { &self.warnings };
        self.errors
            .iter()
            .chain(warnings.iter())
            .map(|a| a.message.as_str())
    }
}

/// Builds [`ValidationReport`]s from executor output
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportBuilder {
    suppress_warnings: bool,
}

impl ReportBuilder {
    pub fn new(suppress_warnings: bool) -> Self {
        Self { suppress_warnings }
    }

    pub fn build(&self, output: &ExecutionOutput) -> ValidationReport {
        self.from_svrl(output.svrl())
    }

    /// Build a report from any SVRL tree
    pub fn from_svrl(&self, svrl: &Document) -> ValidationReport {
        let text = svrl.to_xml_string();
        trace!(svrl = %text, "SVRL report");

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for node in svrl.node_ids() {
            let kind = match svrl.name(node) {
                Some(name) if svrl.is_element(node) && name.namespace.as_deref() == Some(SVRL_NS) => {
                    match AssertionKind::from_svrl_element(&name.local) {
                        Some(kind) => kind,
                        None => continue,
                    }
                }
                _ => continue,
            };
            let assertion = read_assertion(svrl, node, kind);
            match assertion.severity {
                AssertionSeverity::Error => errors.push(assertion),
                AssertionSeverity::Warning => warnings.push(assertion),
            }
        }

        ValidationReport {
            errors,
            warnings,
            suppress_warnings: self.suppress_warnings,
            svrl: text,
        }
    }
}

fn svrl_children<'d>(svrl: &'d Document, node: NodeId, local: &'d str) -> impl Iterator<Item = NodeId> + 'd {
    svrl.element_children(node)
        .filter(move |c| svrl.name(*c).map_or(false, |n| n.is(SVRL_NS, local)))
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read_assertion(svrl: &Document, node: NodeId, kind: AssertionKind) -> Assertion {
    let severity = svrl
        .attribute(node, "flag")
        .and_then(AssertionSeverity::from_flag)
        .unwrap_or_else(|| kind.default_severity());
    let message = svrl_children(svrl, node, "text")
        .next()
        .map(|t| normalize(&svrl.string_value(t)))
        .unwrap_or_default();
    let diagnostics = svrl_children(svrl, node, "diagnostic-reference")
        .map(|d| normalize(&svrl.string_value(d)))
        .collect();
    let owned = |name: &str| svrl.attribute(node, name).map(str::to_string);

    Assertion {
        severity,
        kind,
        message,
        location: owned("location").unwrap_or_default(),
        test: owned("test").unwrap_or_default(),
        id: owned("id"),
        role: owned("role"),
        diagnostics,
    }
}
