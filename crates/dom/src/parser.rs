//! HTML5 parsing into `DOMUpdate` batches using html5ever.

use crate::updating::DOMUpdate;
use crate::{KeyAllocator, NodeKey};
use anyhow::{Error, anyhow};
use html5ever::tendril::TendrilSink as _;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parse a full document into one batch rooted at `NodeKey::ROOT`.
///
/// The batch lists every element and non-blank text node in document order,
/// each element followed by its attributes, and ends with `EndOfDocument`.
///
/// # Errors
/// Returns an error if the input cannot be read by the parser.
pub fn parse_html(html: &str, keys: &mut KeyAllocator) -> Result<Vec<DOMUpdate>, Error> {
    let dom = parse(html)?;
    let mut batch = Vec::new();
    let mut converter = Converter {
        keys,
        out: &mut batch,
    };
    let mut pos = 0_usize;
    for child in dom.document.children.borrow().iter() {
        converter.convert_node(child, NodeKey::ROOT, &mut pos);
    }
    batch.push(DOMUpdate::EndOfDocument);
    Ok(batch)
}

/// Produce the updates that insert a markup fragment under `parent`, starting at child index `pos`.
///
/// The fragment is parsed as body content; only the nodes inside `<body>` are emitted.
///
/// # Errors
/// Returns an error if the input cannot be read by the parser.
pub fn fragment_updates(
    html: &str,
    parent: NodeKey,
    pos: usize,
    keys: &mut KeyAllocator,
) -> Result<Vec<DOMUpdate>, Error> {
    let dom = parse(html)?;
    let body = find_element(&dom.document, "body")
        .ok_or_else(|| anyhow!("Fragment did not produce a body element"))?;
    let mut batch = Vec::new();
    let mut converter = Converter {
        keys,
        out: &mut batch,
    };
    let mut next_pos = pos;
    for child in body.children.borrow().iter() {
        converter.convert_node(child, parent, &mut next_pos);
    }
    Ok(batch)
}

fn parse(html: &str) -> Result<RcDom, Error> {
    parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|err| anyhow!("Failed to parse HTML: {err}"))
}

fn find_element(node: &Handle, tag: &str) -> Option<Handle> {
    if let NodeData::Element { name, .. } = &node.data {
        if &*name.local == tag {
            return Some(node.clone());
        }
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

struct Converter<'out> {
    keys: &'out mut KeyAllocator,
    out: &'out mut Vec<DOMUpdate>,
}

impl Converter<'_> {
    /// Convert an html5ever node, appending its updates. `pos` is the next child slot under `parent`.
    fn convert_node(&mut self, rc_node: &Handle, parent: NodeKey, pos: &mut usize) {
        match &rc_node.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                // Skip empty or whitespace-only text nodes
                if text.trim().is_empty() {
                    return;
                }
                let node = self.keys.next_key();
                self.out.push(DOMUpdate::InsertText {
                    parent,
                    node,
                    text,
                    pos: *pos,
                });
                *pos += 1;
            }
            NodeData::Element { name, attrs, .. } => {
                let node = self.keys.next_key();
                self.out.push(DOMUpdate::InsertElement {
                    parent,
                    node,
                    tag: name.local.to_string(),
                    pos: *pos,
                });
                *pos += 1;
                for attr in attrs.borrow().iter() {
                    self.out.push(DOMUpdate::SetAttr {
                        node,
                        name: attr.name.local.to_string(),
                        value: attr.value.to_string(),
                    });
                }
                let mut child_pos = 0_usize;
                for child in rc_node.children.borrow().iter() {
                    self.convert_node(child, node, &mut child_pos);
                }
            }
            NodeData::Document
            | NodeData::Doctype { .. }
            | NodeData::Comment { .. }
            | NodeData::ProcessingInstruction { .. } => {}
        }
    }
}
