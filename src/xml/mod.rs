//! Namespace-aware XML tree
//!
//! Every tree the crate touches (rule schemas, intermediate stage outputs,
//! documents under validation and SVRL reports) is a [`Document`]: an arena
//! of nodes addressed by [`NodeId`].
//!
//! Nodes are allocated depth-first (an element, then its attributes, then its
//! children), so for trees built by the parser or by depth-first builders the
//! arena index is also the document order. XPath evaluation relies on this.

mod parser;
mod writer;

use std::fmt;

use crate::error::XmlError;

pub use parser::parse;
pub use writer::write_document;

/// Namespace permanently bound to the `xml` prefix
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Handle to a node inside a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A qualified name with its resolved namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl QName {
    /// A name in no namespace
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
            namespace: None,
        }
    }

    /// A prefixed name bound to `namespace`
    pub fn qualified(prefix: &str, local: impl Into<String>, namespace: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            local: local.into(),
            namespace: Some(namespace.to_string()),
        }
    }

    /// Whether this name is `local` in namespace `ns`
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(ns)
    }

    /// The name as written in the source (`prefix:local`)
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

/// A namespace declaration: `xmlns:prefix="uri"` or `xmlns="uri"`
pub type NamespaceDecl = (Option<String>, String);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element {
        name: QName,
        namespaces: Vec<NamespaceDecl>,
    },
    Attribute {
        name: QName,
        value: String,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

/// An XML document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                attributes: Vec::new(),
            }],
        }
    }

    /// Parse a document from text
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        parse(text)
    }

    /// Parse a document from UTF-8 bytes
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(bytes).map_err(|_| XmlError::Encoding)?;
        parse(text.strip_prefix('\u{feff}').unwrap_or(text))
    }

    /// Serialize the document
    pub fn to_xml_string(&self) -> String {
        write_document(self)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element, if any
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root()).next()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_element().is_none()
    }

    /// Every node, in arena order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].attributes
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |c| self.is_element(*c))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element { .. })
    }

    pub fn is_attribute(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Attribute { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Text(_))
    }

    /// Name of an element or attribute
    pub fn name(&self, id: NodeId) -> Option<&QName> {
        match self.kind(id) {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Value of the no-namespace attribute `local` on an element
    pub fn attribute(&self, element: NodeId, local: &str) -> Option<&str> {
        self.attributes(element).iter().find_map(|a| match self.kind(*a) {
            NodeKind::Attribute { name, value } if name.namespace.is_none() && name.local == local => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    /// XPath string-value of a node
    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::Document | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            match self.kind(next) {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => stack.extend(self.children(next).iter().rev().copied()),
                _ => {}
            }
        }
    }

    /// Descendants of `id` (attributes excluded), in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent(p);
        }
        out
    }

    /// Namespace declarations visible at `id`, innermost first
    pub fn namespaces_in_scope(&self, id: NodeId) -> Vec<NamespaceDecl> {
        let mut out: Vec<NamespaceDecl> = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            if let NodeKind::Element { namespaces, .. } = self.kind(n) {
                for decl in namespaces {
                    if !out.iter().any(|(p, _)| *p == decl.0) {
                        out.push(decl.clone());
                    }
                }
            }
            cur = self.parent(n);
        }
        out
    }

    fn push(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
        });
        id
    }

    /// Append a child element
    pub fn append_element(&mut self, parent: NodeId, name: QName) -> NodeId {
        let id = self.push(
            NodeKind::Element {
                name,
                namespaces: Vec::new(),
            },
            parent,
        );
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Record a namespace declaration on an element
    pub fn declare_namespace(&mut self, element: NodeId, prefix: Option<&str>, uri: &str) {
        if let NodeKind::Element { namespaces, .. } = &mut self.nodes[element.0].kind {
            let prefix = prefix.map(str::to_string);
            if !namespaces.iter().any(|(p, _)| *p == prefix) {
                namespaces.push((prefix, uri.to_string()));
            }
        }
    }

    /// Set an attribute, replacing an existing one with the same name
    pub fn set_attribute(&mut self, element: NodeId, name: QName, value: impl Into<String>) -> NodeId {
        let value = value.into();
        let existing = self.nodes[element.0].attributes.iter().copied().find(|a| {
            matches!(self.kind(*a), NodeKind::Attribute { name: n, .. }
                if n.local == name.local && n.namespace == name.namespace)
        });
        if let Some(attr) = existing {
            if let NodeKind::Attribute { value: v, .. } = &mut self.nodes[attr.0].kind {
                *v = value;
            }
            return attr;
        }
        let id = self.push(NodeKind::Attribute { name, value }, element);
        self.nodes[element.0].attributes.push(id);
        id
    }

    /// Append text, merging with a directly preceding text node
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> Option<NodeId> {
        if text.is_empty() {
            return None;
        }
        let last = self.nodes[parent.0].children.last().copied();
        if let Some(last) = last {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return Some(last);
            }
        }
        let id = self.push(NodeKind::Text(text.to_string()), parent);
        self.nodes[parent.0].children.push(id);
        Some(id)
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.push(NodeKind::Comment(text.to_string()), parent);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Deep-copy `node` of `source` as the last child of `parent`.
    /// Namespace declarations in scope at `node` are carried onto the copy of
    /// an element so the subtree stays self-describing.
    pub fn import(&mut self, parent: NodeId, source: &Document, node: NodeId) -> Option<NodeId> {
        match source.kind(node) {
            NodeKind::Document => {
                for child in source.children(node) {
                    self.import(parent, source, *child);
                }
                None
            }
            NodeKind::Element { name, .. } => {
                let copy = self.append_element(parent, name.clone());
                for (prefix, uri) in source.namespaces_in_scope(node) {
                    self.declare_namespace(copy, prefix.as_deref(), &uri);
                }
                self.import_contents(copy, source, node);
                Some(copy)
            }
            NodeKind::Attribute { name, value } => {
                Some(self.set_attribute(parent, name.clone(), value.clone()))
            }
            NodeKind::Text(t) => self.append_text(parent, t),
            NodeKind::Comment(c) => Some(self.append_comment(parent, c)),
        }
    }

    /// Copy the attributes and children of `node` onto `target`
    pub fn import_contents(&mut self, target: NodeId, source: &Document, node: NodeId) {
        for attr in source.attributes(node) {
            self.import(target, source, *attr);
        }
        for child in source.children(node) {
            self.import(target, source, *child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builds_document_order() {
        let doc = Document::parse(r#"<a x="1"><b>hi</b><c/></a>"#).unwrap();
        let a = doc.document_element().unwrap();
        let ids: Vec<usize> = std::iter::once(a)
            .chain(doc.attributes(a).iter().copied())
            .chain(doc.descendants(a))
            .map(NodeId::index)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(doc.attribute(a, "x"), Some("1"));
        assert_eq!(doc.string_value(a), "hi");
    }

    #[test]
    fn test_string_value_of_deep_nesting() {
        let depth = 20_000;
        let xml = format!("<r>{}t{}</r>", "<n>".repeat(depth), "</n>".repeat(depth));
        let doc = Document::parse(&xml).unwrap();
        let r = doc.document_element().unwrap();
        assert_eq!(doc.string_value(r), "t");
        assert_eq!(doc.descendants(r).len(), depth + 1);
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = Document::parse(
            r#"<r:root xmlns:r="urn:r" xmlns="urn:d"><child r:at="v"/></r:root>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        assert!(doc.name(root).unwrap().is("urn:r", "root"));
        let child = doc.element_children(root).next().unwrap();
        assert!(doc.name(child).unwrap().is("urn:d", "child"));
        let attr = doc.attributes(child)[0];
        assert!(doc.name(attr).unwrap().is("urn:r", "at"));
    }

    #[test]
    fn test_import_copies_subtree() {
        let src = Document::parse(r#"<p:a xmlns:p="urn:p"><b k="v">t</b></p:a>"#).unwrap();
        let mut dst = Document::new();
        let root = dst.root();
        let copy = dst.import(root, &src, src.document_element().unwrap()).unwrap();
        assert!(dst.name(copy).unwrap().is("urn:p", "a"));
        let reparsed = Document::parse(&dst.to_xml_string()).unwrap();
        let b = reparsed.element_children(reparsed.document_element().unwrap()).next().unwrap();
        assert_eq!(reparsed.attribute(b, "k"), Some("v"));
        assert_eq!(reparsed.string_value(b), "t");
    }

    #[test]
    fn test_set_attribute_replaces() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.append_element(root, QName::local("e"));
        doc.set_attribute(el, QName::local("a"), "1");
        doc.set_attribute(el, QName::local("a"), "2");
        assert_eq!(doc.attributes(el).len(), 1);
        assert_eq!(doc.attribute(el, "a"), Some("2"));
    }
}
