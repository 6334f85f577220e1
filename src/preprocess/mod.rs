//! ISO Schematron preprocessing
//!
//! A rule schema goes through three ordered stages before it can be run:
//!
//! 1. **Inclusion expansion**: `sch:include` and `sch:extends[@href]` are
//!    replaced by the referenced resources.
//! 2. **Abstraction expansion**: abstract patterns are instantiated with
//!    their parameters and then removed.
//! 3. **Skeleton compilation**: the concrete schema becomes a
//!    [`CompiledCheckProgram`](crate::program::CompiledCheckProgram).
//!
//! Each stage is driven by a [`PreprocessorProgram`] loaded through the
//! resource resolver, and reports problems as
//! [`Diagnostic`](crate::diagnostics::Diagnostic)s into a sink that lives
//! for exactly one stage run.

mod abstract_expand;
mod include;
mod manifest;
mod skeleton;

use serde::Serialize;
use std::fmt;

use crate::xml::{Document, NodeId, NodeKind};

pub use manifest::{AbstractOptions, IncludeOptions, PreprocessorProgram, ProgramSpec, SkeletonOptions};

pub(crate) use abstract_expand::expand as expand_abstractions;
pub(crate) use include::expand as expand_inclusions;
pub(crate) use skeleton::compile as compile_skeleton;

/// ISO Schematron namespace
pub const SCHEMATRON_NS: &str = "http://purl.oclc.org/dsdl/schematron";

/// Schematron 1.5 namespace, still found in older schemas
pub const SCHEMATRON_1_5_NS: &str = "http://www.ascc.net/xml/schematron";

/// Schematron Validation Report Language namespace
pub const SVRL_NS: &str = "http://purl.oclc.org/dsdl/svrl";

/// One of the three compilation stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Inclusion,
    Abstraction,
    Skeleton,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Inclusion, Stage::Abstraction, Stage::Skeleton];

    /// Resource name of the built-in program for this stage
    pub fn default_program(self) -> &'static str {
        match self {
            Stage::Inclusion => "iso-schematron/iso_dsdl_include.toml",
            Stage::Abstraction => "iso-schematron/iso_abstract_expand.toml",
            Stage::Skeleton => "iso-schematron/iso_svrl_for_xslt2.toml",
        }
    }

    /// Program kind this stage runs
    pub fn program_kind(self) -> &'static str {
        match self {
            Stage::Inclusion => "inclusion-expander",
            Stage::Abstraction => "abstraction-expander",
            Stage::Skeleton => "skeleton-compiler",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Inclusion => write!(f, "inclusion expansion"),
            Stage::Abstraction => write!(f, "abstraction expansion"),
            Stage::Skeleton => write!(f, "skeleton compilation"),
        }
    }
}

/// A warning captured while running one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileWarning {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

fn is_schematron_ns(ns: Option<&str>) -> bool {
    matches!(ns, Some(SCHEMATRON_NS) | Some(SCHEMATRON_1_5_NS))
}

/// Local name of `id` when it is a Schematron element
pub(crate) fn schematron_local(doc: &Document, id: NodeId) -> Option<&str> {
    match doc.kind(id) {
        NodeKind::Element { name, .. } if is_schematron_ns(name.namespace.as_deref()) => Some(name.local.as_str()),
        _ => None,
    }
}

/// Schematron element children of `parent` with the given local name
pub(crate) fn schematron_children<'d>(
    doc: &'d Document,
    parent: NodeId,
    local: &'d str,
) -> impl Iterator<Item = NodeId> + 'd {
    doc.element_children(parent)
        .filter(move |c| schematron_local(doc, *c) == Some(local))
}

/// Trimmed, non-empty attribute value
pub(crate) fn attr<'d>(doc: &'d Document, element: NodeId, local: &str) -> Option<&'d str> {
    doc.attribute(element, local).map(str::trim).filter(|v| !v.is_empty())
}

/// Copy an element and its attributes (not its children) under `parent`.
///
/// With `carry_scope` every namespace declaration in scope at `node` is
/// repeated on the copy; otherwise only the element's own declarations are.
pub(crate) fn copy_shell(out: &mut Document, parent: NodeId, src: &Document, node: NodeId, carry_scope: bool) -> NodeId {
    let (name, own) = match src.kind(node) {
        NodeKind::Element { name, namespaces } => (name.clone(), namespaces.clone()),
        _ => return parent,
    };
    let copy = out.append_element(parent, name);
    let declarations = if carry_scope { src.namespaces_in_scope(node) } else { own };
    for (prefix, uri) in declarations {
        out.declare_namespace(copy, prefix.as_deref(), &uri);
    }
    for a in src.attributes(node) {
        if let NodeKind::Attribute { name, value } = src.kind(*a) {
            out.set_attribute(copy, name.clone(), value.clone());
        }
    }
    copy
}

/// Whitespace-normalized string value
pub(crate) fn normalized_text(doc: &Document, id: NodeId) -> String {
    doc.string_value(id).split_whitespace().collect::<Vec<_>>().join(" ")
}
