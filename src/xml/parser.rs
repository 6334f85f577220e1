//! XML parser that builds [`Document`] trees with resolved namespaces.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Document, NamespaceDecl, NodeId, QName, XML_NS};
use crate::error::XmlError;

/// Parse XML text into a [`Document`].
///
/// Comments are kept, processing instructions, the XML declaration and
/// DOCTYPE are skipped. Whitespace-only text inside elements is preserved so
/// that string values match the source exactly.
pub fn parse(content: &str) -> Result<Document, XmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text_start = false;
    reader.config_mut().trim_text_end = false;

    let mut doc = Document::new();
    let mut open: Vec<(NodeId, String)> = Vec::new();
    let mut bindings: Vec<Binding> = Vec::new();
    let mut seen_root = false;

    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let parent = current_parent(&doc, &open, &mut seen_root)?;
                let (id, raw) = start_element(&mut doc, parent, &e, &mut bindings, open.len(), position)?;
                open.push((id, raw));
            }
            Ok(Event::Empty(e)) => {
                let parent = current_parent(&doc, &open, &mut seen_root)?;
                start_element(&mut doc, parent, &e, &mut bindings, open.len(), position)?;
                release(&mut bindings, open.len());
            }
            Ok(Event::End(e)) => {
                let found = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let (_, expected) = open.pop().ok_or_else(|| XmlError::Syntax {
                    message: format!("Unexpected closing tag </{}>", found),
                    position,
                })?;
                if expected != found {
                    return Err(XmlError::MismatchedEndTag { expected, found });
                }
                release(&mut bindings, open.len());
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| XmlError::Syntax {
                    message: format!("Invalid text content: {}", err),
                    position,
                })?;
                append_text(&mut doc, &open, &text, position)?;
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                append_text(&mut doc, &open, &text, position)?;
            }
            Ok(Event::Comment(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                let parent = open.last().map(|(id, _)| *id).unwrap_or_else(|| doc.root());
                doc.append_comment(parent, &text);
            }
            Ok(Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError::Syntax {
                    message: e.to_string(),
                    position: reader.error_position() as u64,
                });
            }
        }
    }

    if let Some((_, name)) = open.pop() {
        return Err(XmlError::UnexpectedEof(name));
    }
    if !seen_root {
        return Err(XmlError::EmptyDocument);
    }
    Ok(doc)
}

fn current_parent(
    doc: &Document,
    open: &[(NodeId, String)],
    seen_root: &mut bool,
) -> Result<NodeId, XmlError> {
    match open.last() {
        Some((id, _)) => Ok(*id),
        None if *seen_root => Err(XmlError::MultipleRoots),
        None => {
            *seen_root = true;
            Ok(doc.root())
        }
    }
}

fn append_text(
    doc: &mut Document,
    open: &[(NodeId, String)],
    text: &str,
    position: u64,
) -> Result<(), XmlError> {
    match open.last() {
        Some((id, _)) => {
            doc.append_text(*id, text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::Syntax {
            message: "Text outside of the root element".to_string(),
            position,
        }),
    }
}

/// A namespace declaration and the depth of the element that made it
type Binding = (NamespaceDecl, usize);

/// Drop the bindings made at `depth` or deeper
fn release(bindings: &mut Vec<Binding>, depth: usize) {
    while bindings.last().map_or(false, |(_, d)| *d >= depth) {
        bindings.pop();
    }
}

/// Create the element for a start (or empty) tag at `depth`. Pushes the
/// tag's declarations; the caller releases them when the element closes.
fn start_element(
    doc: &mut Document,
    parent: NodeId,
    e: &BytesStart<'_>,
    bindings: &mut Vec<Binding>,
    depth: usize,
    position: u64,
) -> Result<(NodeId, String), XmlError> {
    let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

    let mut declared: Vec<NamespaceDecl> = Vec::new();
    let mut plain: Vec<(String, String)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Syntax {
            message: format!("Attribute error: {}", err),
            position,
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Syntax {
                message: format!("Invalid attribute value: {}", err),
                position,
            })?
            .into_owned();
        if key == "xmlns" {
            declared.push((None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.push((Some(prefix.to_string()), value));
        } else {
            plain.push((key, value));
        }
    }
    bindings.extend(declared.iter().cloned().map(|decl| (decl, depth)));

    let name = resolve(&raw_name, bindings, true)?;
    let id = doc.append_element(parent, name);
    for (prefix, uri) in &declared {
        doc.declare_namespace(id, prefix.as_deref(), uri);
    }
    for (key, value) in plain {
        let attr_name = resolve(&key, bindings, false).map_err(|err| match err {
            XmlError::UnboundPrefix { prefix, .. } => XmlError::UnboundPrefix {
                prefix,
                name: raw_name.clone(),
            },
            other => other,
        })?;
        doc.set_attribute(id, attr_name, value);
    }
    Ok((id, raw_name))
}

/// Resolve a lexical name against the bindings in scope. Unprefixed
/// attributes are never in a namespace; unprefixed elements take the
/// default namespace.
fn resolve(raw: &str, bindings: &[Binding], is_element: bool) -> Result<QName, XmlError> {
    let (prefix, local) = match raw.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, raw),
    };

    let namespace = match prefix {
        Some("xml") => Some(XML_NS.to_string()),
        Some(p) => Some(lookup(bindings, Some(p)).ok_or_else(|| XmlError::UnboundPrefix {
            prefix: p.to_string(),
            name: raw.to_string(),
        })?),
        None if is_element => lookup(bindings, None),
        None => None,
    };

    Ok(QName {
        prefix: prefix.map(str::to_string),
        local: local.to_string(),
        namespace: namespace.filter(|uri| !uri.is_empty()),
    })
}

fn lookup(bindings: &[Binding], prefix: Option<&str>) -> Option<String> {
    bindings
        .iter()
        .rev()
        .find(|((p, _), _)| p.as_deref() == prefix)
        .map(|((_, uri), _)| uri.clone())
}
