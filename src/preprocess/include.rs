//! Inclusion expansion
//!
//! `sch:include` is replaced by the element it references: the document
//! element of the resource, or the element with a matching `id` for
//! `href="file#id"`. `sch:extends` with an `href` is replaced by the
//! children of the referenced element. Hrefs resolve against the resource
//! the reference appears in.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::ResolveError;
use crate::resolver::{join_relative, ResourceResolver};
use crate::xml::{Document, NodeId, NodeKind, QName};

use super::{copy_shell, schematron_local, IncludeOptions};

/// Expand every inclusion reachable from `schema`, which was loaded from
/// `resource`.
pub(crate) fn expand(
    schema: &Document,
    resource: &str,
    resolver: &dyn ResourceResolver,
    options: &IncludeOptions,
    sink: &mut DiagnosticSink,
) -> Result<Document, Diagnostic> {
    let mut expander = Expander {
        resolver,
        options,
        sink,
        chain: vec![resource.to_string()],
    };
    let mut out = Document::new();
    let root = out.root();
    expander.copy(&mut out, root, schema, schema.root(), resource, true)?;
    Ok(out)
}

#[derive(Clone, Copy)]
enum Splice {
    Element,
    Children,
}

struct Expander<'a> {
    resolver: &'a dyn ResourceResolver,
    options: &'a IncludeOptions,
    sink: &'a mut DiagnosticSink,
    /// Resources (and fragments) currently being expanded, outermost first
    chain: Vec<String>,
}

impl Expander<'_> {
    fn copy(
        &mut self,
        out: &mut Document,
        parent: NodeId,
        src: &Document,
        node: NodeId,
        resource: &str,
        top: bool,
    ) -> Result<(), Diagnostic> {
        match src.kind(node) {
            NodeKind::Document => {
                for &child in src.children(node) {
                    self.copy(out, parent, src, child, resource, top)?;
                }
            }
            NodeKind::Element { .. } => {
                match schematron_local(src, node) {
                    Some("include") => return self.include(out, parent, src, node, resource, Splice::Element),
                    Some("extends") if src.attribute(node, "href").is_some() => {
                        return self.include(out, parent, src, node, resource, Splice::Children)
                    }
                    _ => {}
                }
                let copy = copy_shell(out, parent, src, node, top);
                for &child in src.children(node) {
                    self.copy(out, copy, src, child, resource, false)?;
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

    fn include(
        &mut self,
        out: &mut Document,
        parent: NodeId,
        src: &Document,
        node: NodeId,
        resource: &str,
        splice: Splice,
    ) -> Result<(), Diagnostic> {
        let element = src.name(node).map(QName::lexical).unwrap_or_default();
        let href = src
            .attribute(node, "href")
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Diagnostic::error(format!("<{}> in {} has no href", element, resource)))?;

        let (path, fragment) = match href.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (href, None),
        };
        let target_resource = if path.is_empty() {
            resource.to_string()
        } else {
            join_relative(resource, path)
        };
        let key = match fragment {
            Some(id) => format!("{}#{}", target_resource, id),
            None => target_resource.clone(),
        };

        if self.chain.contains(&key) {
            return Err(Diagnostic::fatal(format!(
                "Inclusion cycle: {} -> {}",
                self.chain.join(" -> "),
                key
            )));
        }
        if self.chain.len() > self.options.max_depth {
            return Err(Diagnostic::fatal(format!(
                "Inclusions nested deeper than {} levels at {}",
                self.options.max_depth, key
            )));
        }

        let loaded;
        let (doc, base) = if path.is_empty() {
            (src, resource)
        } else {
            let bytes = self.resolver.resolve(&target_resource).map_err(|err| match err {
                ResolveError::NotFound(missing) => Diagnostic::fatal(format!("Resource not found: {}", missing)),
                other => Diagnostic::fatal(other.to_string()),
            })?;
            loaded = Document::parse_bytes(&bytes)
                .map_err(|err| Diagnostic::fatal(format!("Malformed XML in {}: {}", target_resource, err)))?;
            (&loaded, target_resource.as_str())
        };

        let target = match fragment {
            Some(id) => find_by_id(doc, id)
                .ok_or_else(|| Diagnostic::error(format!("No element with id '{}' in {}", id, base)))?,
            None => doc
                .document_element()
                .ok_or_else(|| Diagnostic::error(format!("{} has no document element", base)))?,
        };

        self.chain.push(key);
        let result = match splice {
            Splice::Element => {
                if schematron_local(doc, target).is_none() {
                    let name = doc.name(target).map(QName::lexical).unwrap_or_default();
                    self.sink.warn(format!(
                        "{} includes <{}> from {}, which is not a Schematron element",
                        resource, name, base
                    ));
                }
                self.copy(out, parent, doc, target, base, true)
            }
            Splice::Children => doc
                .children(target)
                .iter()
                .try_for_each(|&child| self.copy(out, parent, doc, child, base, true)),
        };
        self.chain.pop();
        result
    }
}

fn find_by_id(doc: &Document, id: &str) -> Option<NodeId> {
    doc.node_ids()
        .find(|n| doc.is_element(*n) && doc.attribute(*n, "id") == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::resolver::MemoryResolver;

    const SCH: &str = "http://purl.oclc.org/dsdl/schematron";

    fn run(resolver: &MemoryResolver, resource: &str) -> Result<(Document, Vec<String>), Diagnostic> {
        let bytes = resolver.resolve(resource).unwrap();
        let schema = Document::parse_bytes(&bytes).unwrap();
        let mut sink = DiagnosticSink::new();
        let doc = expand(&schema, resource, resolver, &IncludeOptions::default(), &mut sink)?;
        Ok((doc, sink.into_warnings()))
    }

    fn pattern_ids(doc: &Document) -> Vec<String> {
        doc.node_ids()
            .filter(|n| doc.name(*n).map_or(false, |q| q.is(SCH, "pattern")))
            .filter_map(|n| doc.attribute(n, "id").map(str::to_string))
            .collect()
    }

    #[test]
    fn test_include_replaces_element() {
        let resolver = MemoryResolver::new()
            .with(
                "rules/main.sch",
                r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                     <include href="./common.sch"/>
                     <pattern id="local"/>
                   </schema>"#,
            )
            .with(
                "rules/common.sch",
                r#"<sch:pattern xmlns:sch="http://purl.oclc.org/dsdl/schematron" id="shared"/>"#,
            );
        let (doc, warnings) = run(&resolver, "rules/main.sch").unwrap();
        assert_eq!(pattern_ids(&doc), vec!["shared", "local"]);
        assert!(warnings.is_empty());
        assert!(!doc.to_xml_string().contains("include"));
    }

    #[test]
    fn test_nested_and_fragment_includes() {
        let resolver = MemoryResolver::new()
            .with(
                "main.sch",
                r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron"><include href="lib/a.sch"/></schema>"#,
            )
            .with(
                "lib/a.sch",
                r#"<pattern xmlns="http://purl.oclc.org/dsdl/schematron" id="a"><include href="b.sch#r2"/></pattern>"#,
            )
            .with(
                "lib/b.sch",
                r#"<library xmlns="http://purl.oclc.org/dsdl/schematron">
                     <rule id="r1" context="x"/><rule id="r2" context="y"/>
                   </library>"#,
            );
        let (doc, _) = run(&resolver, "main.sch").unwrap();
        let rule = doc
            .node_ids()
            .find(|n| doc.name(*n).map_or(false, |q| q.is(SCH, "rule")))
            .unwrap();
        assert_eq!(doc.attribute(rule, "context"), Some("y"));
    }

    #[test]
    fn test_extends_href_splices_children() {
        let resolver = MemoryResolver::new()
            .with(
                "main.sch",
                r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
                     <pattern><rule context="a"><extends href="base.sch#common"/></rule></pattern>
                   </schema>"#,
            )
            .with(
                "base.sch",
                r#"<rules xmlns="http://purl.oclc.org/dsdl/schematron">
                     <rule abstract="true" id="common"><assert test="@id">id required</assert></rule>
                   </rules>"#,
            );
        let (doc, _) = run(&resolver, "main.sch").unwrap();
        let rule = doc
            .node_ids()
            .find(|n| doc.name(*n).map_or(false, |q| q.is(SCH, "rule")))
            .unwrap();
        let children: Vec<String> = doc
            .element_children(rule)
            .filter_map(|c| doc.name(c).map(|q| q.local.clone()))
            .collect();
        assert_eq!(children, vec!["assert"]);
    }

    #[test]
    fn test_missing_include_names_resource() {
        let resolver = MemoryResolver::new().with(
            "main.sch",
            r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron"><include href="./gone.sch"/></schema>"#,
        );
        let err = run(&resolver, "main.sch").unwrap_err();
        assert!(err.severity.is_abort());
        assert!(err.message.contains("gone.sch"), "{}", err.message);
    }

    #[test]
    fn test_cycle_detected() {
        let resolver = MemoryResolver::new()
            .with(
                "a.sch",
                r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron"><include href="b.sch"/></schema>"#,
            )
            .with(
                "b.sch",
                r#"<pattern xmlns="http://purl.oclc.org/dsdl/schematron"><include href="c.sch"/></pattern>"#,
            )
            .with(
                "c.sch",
                r#"<rule xmlns="http://purl.oclc.org/dsdl/schematron"><include href="b.sch"/></rule>"#,
            );
        let err = run(&resolver, "a.sch").unwrap_err();
        assert!(err.message.contains("cycle"), "{}", err.message);
        assert!(err.message.contains("b.sch -> c.sch -> b.sch"), "{}", err.message);
    }

    /// `main.sch` includes `f0.sch`, each `f{i}.sch` includes the next and
    /// `f{last}.sch` is a leaf pattern
    fn include_chain(last: usize) -> MemoryResolver {
        let mut resolver = MemoryResolver::new().with(
            "main.sch",
            format!(r#"<schema xmlns="{SCH}"><include href="f0.sch"/></schema>"#),
        );
        for i in 0..last {
            resolver = resolver.with(
                &format!("f{}.sch", i),
                format!(r#"<pattern xmlns="{SCH}" id="p{i}"><include href="f{}.sch"/></pattern>"#, i + 1),
            );
        }
        resolver.with(&format!("f{}.sch", last), format!(r#"<pattern xmlns="{SCH}" id="leaf"/>"#))
    }

    #[test]
    fn test_include_chain_at_max_depth() {
        let resolver = include_chain(15);
        let (doc, _) = run(&resolver, "main.sch").unwrap();
        let ids = pattern_ids(&doc);
        assert_eq!(ids.len(), 16);
        assert_eq!(ids.last().map(String::as_str), Some("leaf"));
    }

    #[test]
    fn test_include_chain_too_deep() {
        let resolver = include_chain(16);
        let err = run(&resolver, "main.sch").unwrap_err();
        assert_eq!(err.severity, Severity::Fatal);
        assert_eq!(err.message, "Inclusions nested deeper than 16 levels at f16.sch");
    }

    #[test]
    fn test_non_schematron_include_warns() {
        let resolver = MemoryResolver::new()
            .with(
                "main.sch",
                r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron"><include href="x.xml"/></schema>"#,
            )
            .with("x.xml", "<foreign/>");
        let (_, warnings) = run(&resolver, "main.sch").unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("<foreign>"));
    }
}
