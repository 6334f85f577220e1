//! Abstract pattern expansion
//!
//! `<pattern is-a="p" id="i"><param name="n" value="v"/></pattern>` becomes a
//! copy of abstract pattern `p`'s content in which every `$n` reference is
//! replaced by `v`. Substitution only touches the attributes listed in the
//! program options.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::xml::{Document, NodeId, NodeKind};

use super::{attr, copy_shell, schematron_local, AbstractOptions};

pub(crate) fn expand(
    doc: &Document,
    options: &AbstractOptions,
    sink: &mut DiagnosticSink,
) -> Result<Document, Diagnostic> {
    let schema = doc
        .document_element()
        .ok_or_else(|| Diagnostic::fatal("Schema has no document element"))?;

    let patterns: Vec<NodeId> = doc
        .descendants(schema)
        .into_iter()
        .filter(|n| schematron_local(doc, *n) == Some("pattern"))
        .collect();

    let mut abstracts: Vec<(&str, NodeId)> = Vec::new();
    let mut concrete: HashSet<&str> = HashSet::new();
    for &pattern in &patterns {
        let id = attr(doc, pattern, "id");
        if is_abstract(doc, pattern) {
            let id = id.ok_or_else(|| Diagnostic::error("Abstract pattern without an id"))?;
            abstracts.push((id, pattern));
        } else if let Some(id) = id {
            concrete.insert(id);
        }
    }

    let variables: HashSet<&str> = doc
        .descendants(schema)
        .into_iter()
        .filter(|n| schematron_local(doc, *n) == Some("let"))
        .filter_map(|n| attr(doc, n, "name"))
        .collect();

    let mut expander = Expander {
        doc,
        options,
        abstracts: abstracts.iter().copied().collect(),
        concrete,
        variables,
        instantiated: HashSet::new(),
        sink,
    };
    let mut out = Document::new();
    let root = out.root();
    expander.copy(&mut out, root, doc.root(), None)?;

    for (id, _) in &abstracts {
        if !expander.instantiated.contains(id) {
            expander
                .sink
                .warn(format!("Abstract pattern '{}' is never instantiated", id));
        }
    }
    Ok(out)
}

/// The concrete pattern replacing an instance: its attributes minus `is-a`
fn instance_shell(out: &mut Document, parent: NodeId, doc: &Document, instance: NodeId) -> NodeId {
    let name = match doc.name(instance) {
        Some(name) => name.clone(),
        None => return parent,
    };
    let copy = out.append_element(parent, name);
    for (prefix, uri) in doc.namespaces_in_scope(instance) {
        out.declare_namespace(copy, prefix.as_deref(), &uri);
    }
    for a in doc.attributes(instance) {
        if let NodeKind::Attribute { name, value } = doc.kind(*a) {
            if !(name.namespace.is_none() && name.local == "is-a") {
                out.set_attribute(copy, name.clone(), value.clone());
            }
        }
    }
    copy
}

fn is_abstract(doc: &Document, pattern: NodeId) -> bool {
    attr(doc, pattern, "abstract") == Some("true")
}

/// Parameter values of one instantiation and what became of them
struct Substitution<'d> {
    instance: String,
    source: &'d str,
    params: Vec<(&'d str, &'d str)>,
    referenced: HashSet<&'d str>,
    unresolved: Vec<String>,
}

impl<'d> Substitution<'d> {
    /// Replace each `$name` whose name is a parameter. The whole name is
    /// read before lookup, so `$a` never matches the start of `$ab`.
    fn apply(&mut self, text: &str, variables: &HashSet<&str>) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let len = after
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
                .unwrap_or(after.len());
            let name = &after[..len];
            match self.params.iter().find(|(n, _)| *n == name) {
                Some((n, value)) => {
                    self.referenced.insert(*n);
                    out.push_str(value);
                }
                None => {
                    if !name.is_empty() && !variables.contains(name) && !self.unresolved.iter().any(|u| u == name) {
                        self.unresolved.push(name.to_string());
                    }
                    out.push('$');
                    out.push_str(name);
                }
            }
            rest = &after[len..];
        }
        out.push_str(rest);
        out
    }
}

struct Expander<'a, 'd> {
    doc: &'d Document,
    options: &'a AbstractOptions,
    abstracts: HashMap<&'d str, NodeId>,
    concrete: HashSet<&'d str>,
    variables: HashSet<&'d str>,
    instantiated: HashSet<&'d str>,
    sink: &'a mut DiagnosticSink,
}

impl<'a, 'd> Expander<'a, 'd> {
    fn copy(
        &mut self,
        out: &mut Document,
        parent: NodeId,
        node: NodeId,
        mut subst: Option<&mut Substitution<'d>>,
    ) -> Result<(), Diagnostic> {
        let doc = self.doc;
        match doc.kind(node) {
            NodeKind::Document => {
                for &child in doc.children(node) {
                    self.copy(out, parent, child, subst.as_deref_mut())?;
                }
            }
            NodeKind::Element { .. } => {
                if schematron_local(doc, node) == Some("pattern") {
                    if is_abstract(doc, node) && self.options.remove_abstract {
                        return Ok(());
                    }
                    if attr(doc, node, "is-a").is_some() {
                        return self.instantiate(out, parent, node);
                    }
                }
                let copy = copy_shell(out, parent, doc, node, false);
                if let Some(s) = subst.as_deref_mut() {
                    self.substitute_attributes(out, copy, node, s);
                }
                for &child in doc.children(node) {
                    self.copy(out, copy, child, subst.as_deref_mut())?;
                }
            }
            NodeKind::Attribute { .. } => {}
            NodeKind::Text(text) => {
                out.append_text(parent, text);
            }
            NodeKind::Comment(text) => {
                out.append_comment(parent, text);
            }
        }
        Ok(())
    }

    fn substitute_attributes(&self, out: &mut Document, copy: NodeId, node: NodeId, subst: &mut Substitution<'d>) {
        for a in self.doc.attributes(node) {
            if let NodeKind::Attribute { name, value } = self.doc.kind(*a) {
                if name.namespace.is_none() && self.options.param_attributes.iter().any(|p| *p == name.local) {
                    let replaced = subst.apply(value, &self.variables);
                    out.set_attribute(copy, name.clone(), replaced);
                }
            }
        }
    }

    fn instantiate(&mut self, out: &mut Document, parent: NodeId, instance: NodeId) -> Result<(), Diagnostic> {
        let doc = self.doc;
        let is_a = attr(doc, instance, "is-a").unwrap_or_default();
        let instance_name = attr(doc, instance, "id").unwrap_or("(anonymous)").to_string();

        let source = match self.abstracts.get(is_a) {
            Some(source) => *source,
            None if self.concrete.contains(is_a) => {
                return Err(Diagnostic::error(format!(
                    "Pattern '{}' instantiates '{}', which is not an abstract pattern",
                    instance_name, is_a
                )))
            }
            None => {
                return Err(Diagnostic::error(format!(
                    "Pattern '{}' instantiates unknown abstract pattern '{}'",
                    instance_name, is_a
                )))
            }
        };
        self.instantiated.insert(is_a);

        let mut params = Vec::new();
        for param in doc.element_children(instance) {
            if schematron_local(doc, param) != Some("param") {
                continue;
            }
            let name = attr(doc, param, "name").ok_or_else(|| {
                Diagnostic::error(format!("Parameter without a name in pattern '{}'", instance_name))
            })?;
            params.push((name, doc.attribute(param, "value").unwrap_or_default()));
        }

        let copy = instance_shell(out, parent, doc, instance);

        for &child in doc.children(instance) {
            if doc.is_element(child) && schematron_local(doc, child) == Some("param") {
                continue;
            }
            self.copy(out, copy, child, None)?;
        }

        let mut subst = Substitution {
            instance: instance_name,
            source: is_a,
            params,
            referenced: HashSet::new(),
            unresolved: Vec::new(),
        };
        for &child in doc.children(source) {
            self.copy(out, copy, child, Some(&mut subst))?;
        }

        for (name, _) in &subst.params {
            if !subst.referenced.contains(name) {
                self.sink.warn(format!(
                    "Parameter '{}' of pattern '{}' is not used by abstract pattern '{}'",
                    name, subst.instance, subst.source
                ));
            }
        }
        for name in &subst.unresolved {
            self.sink.warn(format!(
                "Abstract pattern '{}' references ${}, which pattern '{}' does not supply",
                subst.source, name, subst.instance
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

    fn run(schema: &str) -> Result<(Document, Vec<String>), Diagnostic> {
        let doc = Document::parse(schema).unwrap();
        let mut sink = DiagnosticSink::new();
        let out = expand(&doc, &AbstractOptions::default(), &mut sink)?;
        Ok((out, sink.into_warnings()))
    }

    fn elements<'d>(doc: &'d Document, local: &'d str) -> impl Iterator<Item = NodeId> + 'd {
        doc.node_ids()
            .filter(move |n| doc.name(*n).map_or(false, |q| q.is(SCH, local)) && doc.is_element(*n))
    }

    #[test]
    fn test_instance_replaces_parameters() {
        let (doc, warnings) = run(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern abstract="true" id="required">
                   <rule context="$parent">
                     <assert test="$child and $children">$child is required</assert>
                   </rule>
                 </pattern>
                 <pattern is-a="required" id="record-title">
                   <param name="parent" value="record"/>
                   <param name="child" value="title"/>
                   <param name="children" value="count(title) = 1"/>
                 </pattern>
               </schema>"#,
        )
        .unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);

        let patterns: Vec<NodeId> = elements(&doc, "pattern").collect();
        assert_eq!(patterns.len(), 1);
        assert_eq!(doc.attribute(patterns[0], "id"), Some("record-title"));
        assert_eq!(doc.attribute(patterns[0], "is-a"), None);

        let rule = elements(&doc, "rule").next().unwrap();
        assert_eq!(doc.attribute(rule, "context"), Some("record"));
        let assert = elements(&doc, "assert").next().unwrap();
        assert_eq!(doc.attribute(assert, "test"), Some("title and count(title) = 1"));
        // element content is not an expression
        assert_eq!(doc.string_value(assert), "$child is required");
    }

    #[test]
    fn test_unknown_abstract_pattern_is_error() {
        let err = run(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern is-a="nowhere" id="p"/>
               </schema>"#,
        )
        .unwrap_err();
        assert!(err.message.contains("unknown abstract pattern 'nowhere'"), "{}", err.message);
    }

    #[test]
    fn test_instantiating_concrete_pattern_is_error() {
        let err = run(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern id="real"><rule context="a"/></pattern>
                 <pattern is-a="real" id="p"/>
               </schema>"#,
        )
        .unwrap_err();
        assert!(err.message.contains("not an abstract pattern"), "{}", err.message);
    }

    #[test]
    fn test_parameter_warnings() {
        let (_, warnings) = run(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <let name="limit" value="10"/>
                 <pattern abstract="true" id="a">
                   <rule context="$ctx"><assert test="count(*) &lt; $limit and $missing">m</assert></rule>
                 </pattern>
                 <pattern abstract="true" id="unused"/>
                 <pattern is-a="a" id="p">
                   <param name="ctx" value="item"/>
                   <param name="extra" value="1"/>
                 </pattern>
               </schema>"#,
        )
        .unwrap();
        assert_eq!(warnings.len(), 3, "{:?}", warnings);
        assert!(warnings[0].contains("'extra'"));
        assert!(warnings[1].contains("$missing"));
        assert!(warnings[2].contains("'unused' is never instantiated"));
    }

    #[test]
    fn test_longer_names_are_not_split() {
        let (doc, _) = run(
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                 <pattern abstract="true" id="a"><rule context="$a/$ab"/></pattern>
                 <pattern is-a="a"><param name="a" value="x"/><param name="ab" value="y"/></pattern>
               </schema>"#,
        )
        .unwrap();
        let rule = elements(&doc, "rule").next().unwrap();
        assert_eq!(doc.attribute(rule, "context"), Some("x/y"));
    }
}
