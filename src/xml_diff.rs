//! Structural XML diff
//!
//! Both documents are parsed into a normalized tree before comparison:
//! comments are dropped, text is whitespace-normalized and whitespace-only
//! text disappears, attribute order is irrelevant. What remains (element
//! names, attributes, text and document order) must match.
//!
//! Documents are decoded with the encoding their byte order mark or XML
//! declaration names (UTF-8 by default) before parsing. A byte that is not
//! valid in that encoding makes the document not well-formed.
//!
//! Differences are reported as a diffgram, one `<change>` per mismatching
//! node path:
//!
//! ```xml
//! <diffgram>
//!   <change kind="element-name" path="/GAEB[1]/Award[1]" baseline="Award" candidate="Awards"/>
//! </diffgram>
//! ```

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use roxmltree::{Document, Node, ParsingOptions};

use crate::error::{DiffError, DiffResult};
use crate::text_diff::read_bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
    Instruction { target: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct XmlElement {
    /// Local name, used in paths
    name: String,
    /// `{namespace}local` or just `local`, used for equality
    expanded: String,
    attrs: BTreeMap<String, String>,
    children: Vec<XmlNode>,
}

/// One structural mismatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlChange {
    pub kind: ChangeKind,
    pub path: String,
    pub baseline: Option<String>,
    pub candidate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    ElementName,
    AttributeMissing,
    AttributeExtra,
    AttributeValue,
    Text,
    Instruction,
    NodeKind,
    NodeMissing,
    NodeExtra,
}

impl ChangeKind {
    fn as_str(self) -> &'static str {
        match self {
            ChangeKind::ElementName => "element-name",
            ChangeKind::AttributeMissing => "attribute-missing",
            ChangeKind::AttributeExtra => "attribute-extra",
            ChangeKind::AttributeValue => "attribute-value",
            ChangeKind::Text => "text",
            ChangeKind::Instruction => "processing-instruction",
            ChangeKind::NodeKind => "node-kind",
            ChangeKind::NodeMissing => "node-missing",
            ChangeKind::NodeExtra => "node-extra",
        }
    }
}

/// Structure-aware XML diff engine
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDiffEngine;

impl XmlDiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compare two XML files
    pub async fn diff_files(&self, left: &Path, right: &Path) -> DiffResult<Option<String>> {
        let left_text = decode_document(&read_bytes(left).await?, left)?;
        let right_text = decode_document(&read_bytes(right).await?, right)?;

        let left_root = parse(&left_text, left)?;
        let right_root = parse(&right_text, right)?;
        Ok(render_changes(&compare_roots(&left_root, &right_root)))
    }

    /// Compare two XML documents held in memory. `None` means the documents
    /// are structurally equivalent.
    pub fn diff(&self, left: &str, right: &str) -> DiffResult<Option<String>> {
        Ok(render_changes(&self.changes(left, right)?))
    }

    /// List every structural mismatch between two documents
    pub fn changes(&self, left: &str, right: &str) -> DiffResult<Vec<XmlChange>> {
        let left_root = parse(left, Path::new("<baseline>"))?;
        let right_root = parse(right, Path::new("<candidate>"))?;
        Ok(compare_roots(&left_root, &right_root))
    }
}

/// Decode raw document bytes to text
fn decode_document(bytes: &[u8], origin: &Path) -> DiffResult<String> {
    let encoding = declared_encoding(bytes)
        .and_then(Encoding::for_label)
        .map(Encoding::output_encoding)
        .unwrap_or(UTF_8);

    // A byte order mark overrides the declaration
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DiffError::XmlParse {
            path: origin.to_path_buf(),
            details: format!("byte sequence not valid in {}", used.name()),
        });
    }
    Ok(text.into_owned())
}

/// The `encoding` pseudo-attribute of the XML declaration, if any
fn declared_encoding(bytes: &[u8]) -> Option<&[u8]> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let rest = bytes.strip_prefix(b"<?xml")?;
    let end = rest.windows(2).position(|w| w == b"?>")?;
    let declaration = &rest[..end];

    let at = declaration.windows(8).position(|w| w == b"encoding")?;
    let value = declaration[at + 8..]
        .trim_ascii_start()
        .strip_prefix(b"=")?
        .trim_ascii_start();
    let quote = *value.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value = &value[1..];
    let close = value.iter().position(|&b| b == quote)?;
    Some(&value[..close])
}

fn parse(text: &str, origin: &Path) -> DiffResult<XmlElement> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options).map_err(|e| DiffError::XmlParse {
        path: origin.to_path_buf(),
        details: e.to_string(),
    })?;
    Ok(element_from_node(doc.root_element()))
}

fn element_from_node(node: Node<'_, '_>) -> XmlElement {
    let tag = node.tag_name();
    let name = tag.name().to_string();
    let expanded = expanded_name(tag.namespace(), tag.name());

    let attrs = node
        .attributes()
        .map(|a| (expanded_name(a.namespace(), a.name()), a.value().to_string()))
        .collect();

    let mut children = Vec::new();
    let mut pending_text = String::new();

    for child in node.children() {
        if child.is_comment() {
            continue;
        }
        if child.is_text() {
            pending_text.push_str(child.text().unwrap_or_default());
            continue;
        }

        flush_text(&mut pending_text, &mut children);
        if child.is_element() {
            children.push(XmlNode::Element(element_from_node(child)));
        } else if let Some(pi) = child.pi() {
            children.push(XmlNode::Instruction {
                target: pi.target.to_string(),
                value: normalize_whitespace(pi.value.unwrap_or_default()),
            });
        }
    }
    flush_text(&mut pending_text, &mut children);

    XmlElement {
        name,
        expanded,
        attrs,
        children,
    }
}

fn expanded_name(namespace: Option<&str>, local: &str) -> String {
    match namespace {
        Some(ns) => format!("{{{}}}{}", ns, local),
        None => local.to_string(),
    }
}

fn flush_text(pending: &mut String, children: &mut Vec<XmlNode>) {
    let text = normalize_whitespace(pending);
    pending.clear();
    if !text.is_empty() {
        children.push(XmlNode::Text(text));
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compare_roots(left: &XmlElement, right: &XmlElement) -> Vec<XmlChange> {
    let mut changes = Vec::new();
    let path = format!("/{}[1]", left.name);
    compare_elements(left, right, &path, &mut changes);
    changes
}

fn compare_elements(left: &XmlElement, right: &XmlElement, path: &str, out: &mut Vec<XmlChange>) {
    if left.expanded != right.expanded {
        out.push(XmlChange {
            kind: ChangeKind::ElementName,
            path: path.to_string(),
            baseline: Some(left.name.clone()),
            candidate: Some(right.name.clone()),
        });
        return;
    }

    for (key, left_value) in &left.attrs {
        let attr_path = format!("{}/@{}", path, key);
        match right.attrs.get(key) {
            None => out.push(XmlChange {
                kind: ChangeKind::AttributeMissing,
                path: attr_path,
                baseline: Some(left_value.clone()),
                candidate: None,
            }),
            Some(right_value) if right_value != left_value => out.push(XmlChange {
                kind: ChangeKind::AttributeValue,
                path: attr_path,
                baseline: Some(left_value.clone()),
                candidate: Some(right_value.clone()),
            }),
            Some(_) => {}
        }
    }
    for (key, right_value) in &right.attrs {
        if !left.attrs.contains_key(key) {
            out.push(XmlChange {
                kind: ChangeKind::AttributeExtra,
                path: format!("{}/@{}", path, key),
                baseline: None,
                candidate: Some(right_value.clone()),
            });
        }
    }

    let left_paths = child_paths(path, &left.children);
    let right_paths = child_paths(path, &right.children);

    for (i, (l, r)) in left.children.iter().zip(&right.children).enumerate() {
        let child_path = &left_paths[i];
        match (l, r) {
            (XmlNode::Element(le), XmlNode::Element(re)) => {
                compare_elements(le, re, child_path, out)
            }
            (XmlNode::Text(lt), XmlNode::Text(rt)) => {
                if lt != rt {
                    out.push(XmlChange {
                        kind: ChangeKind::Text,
                        path: child_path.clone(),
                        baseline: Some(lt.clone()),
                        candidate: Some(rt.clone()),
                    });
                }
            }
            (
                XmlNode::Instruction {
                    target: ltarget,
                    value: lvalue,
                },
                XmlNode::Instruction {
                    target: rtarget,
                    value: rvalue,
                },
            ) => {
                if ltarget != rtarget || lvalue != rvalue {
                    out.push(XmlChange {
                        kind: ChangeKind::Instruction,
                        path: child_path.clone(),
                        baseline: Some(format!("{} {}", ltarget, lvalue)),
                        candidate: Some(format!("{} {}", rtarget, rvalue)),
                    });
                }
            }
            _ => out.push(XmlChange {
                kind: ChangeKind::NodeKind,
                path: child_path.clone(),
                baseline: Some(describe(l)),
                candidate: Some(describe(r)),
            }),
        }
    }

    let common = left.children.len().min(right.children.len());
    for (node, node_path) in left.children.iter().zip(&left_paths).skip(common) {
        out.push(XmlChange {
            kind: ChangeKind::NodeMissing,
            path: node_path.clone(),
            baseline: Some(describe(node)),
            candidate: None,
        });
    }
    for (node, node_path) in right.children.iter().zip(&right_paths).skip(common) {
        out.push(XmlChange {
            kind: ChangeKind::NodeExtra,
            path: node_path.clone(),
            baseline: None,
            candidate: Some(describe(node)),
        });
    }
}

/// XPath-like location of each child, indexed among same-named siblings
fn child_paths(parent: &str, children: &[XmlNode]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    children
        .iter()
        .map(|child| {
            let step = match child {
                XmlNode::Element(e) => e.name.clone(),
                XmlNode::Text(_) => "text()".to_string(),
                XmlNode::Instruction { .. } => "processing-instruction()".to_string(),
            };
            let counter = seen.entry(step.clone()).or_insert(0);
            *counter += 1;
            format!("{}/{}[{}]", parent, step, counter)
        })
        .collect()
}

fn describe(node: &XmlNode) -> String {
    match node {
        XmlNode::Element(e) => format!("<{}>", e.name),
        XmlNode::Text(t) => t.clone(),
        XmlNode::Instruction { target, .. } => format!("<?{}?>", target),
    }
}

fn render_changes(changes: &[XmlChange]) -> Option<String> {
    if changes.is_empty() {
        return None;
    }

    let mut report = String::from("<diffgram>\n");
    for change in changes {
        let _ = write!(
            report,
            "  <change kind=\"{}\" path=\"{}\"",
            change.kind.as_str(),
            escape_attr(&change.path)
        );
        if let Some(baseline) = &change.baseline {
            let _ = write!(report, " baseline=\"{}\"", escape_attr(baseline));
        }
        if let Some(candidate) = &change.candidate {
            let _ = write!(report, " candidate=\"{}\"", escape_attr(candidate));
        }
        report.push_str("/>\n");
    }
    report.push_str("</diffgram>\n");
    Some(report)
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
