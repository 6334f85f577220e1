//! Serialization of [`Document`] trees back to text.

use quick_xml::escape::escape;

use super::{Document, NamespaceDecl, NodeId, NodeKind, QName, XML_NS};

/// Serialize a document. Namespace declarations recorded on elements are
/// written as-is; any binding a name needs that is not yet in scope is
/// declared on the element that uses it.
pub fn write_document(doc: &Document) -> String {
    let mut out = String::new();
    let mut scopes: Vec<Vec<NamespaceDecl>> = Vec::new();
    for child in doc.children(doc.root()) {
        write_node(doc, *child, &mut out, &mut scopes);
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String, scopes: &mut Vec<Vec<NamespaceDecl>>) {
    match doc.kind(id) {
        NodeKind::Document => {
            for child in doc.children(id) {
                write_node(doc, *child, out, scopes);
            }
        }
        NodeKind::Text(t) => out.push_str(&escape(t.as_str())),
        NodeKind::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        NodeKind::Attribute { .. } => {}
        NodeKind::Element { name, namespaces } => {
            let mut declared: Vec<NamespaceDecl> = namespaces.clone();
            ensure_bound(name, &mut declared, scopes);
            for attr in doc.attributes(id) {
                if let Some(attr_name) = doc.name(*attr) {
                    if attr_name.prefix.is_some() {
                        ensure_bound(attr_name, &mut declared, scopes);
                    }
                }
            }

            out.push('<');
            out.push_str(&name.lexical());
            for (prefix, uri) in &declared {
                match prefix {
                    Some(p) => out.push_str(&format!(" xmlns:{}=\"{}\"", p, escape(uri.as_str()))),
                    None => out.push_str(&format!(" xmlns=\"{}\"", escape(uri.as_str()))),
                }
            }
            for attr in doc.attributes(id) {
                if let NodeKind::Attribute { name, value } = doc.kind(*attr) {
                    out.push_str(&format!(" {}=\"{}\"", name.lexical(), escape(value.as_str())));
                }
            }

            scopes.push(declared);
            if doc.children(id).is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for child in doc.children(id) {
                    write_node(doc, *child, out, scopes);
                }
                out.push_str("</");
                out.push_str(&name.lexical());
                out.push('>');
            }
            scopes.pop();
        }
    }
}

fn ensure_bound(name: &QName, declared: &mut Vec<NamespaceDecl>, scopes: &[Vec<NamespaceDecl>]) {
    if name.prefix.as_deref() == Some("xml") || name.namespace.as_deref() == Some(XML_NS) {
        return;
    }
    let wanted = name.namespace.clone().unwrap_or_default();
    let bound = declared
        .iter()
        .chain(scopes.iter().rev().flatten())
        .find(|(p, _)| *p == name.prefix)
        .map(|(_, uri)| uri.as_str())
        .unwrap_or("");
    if bound != wanted && !declared.iter().any(|(p, _)| *p == name.prefix) {
        declared.push((name.prefix.clone(), wanted));
    }
}
