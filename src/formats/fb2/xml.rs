//! Owned XML element tree
//!
//! FB2 books are parsed once into an arena of nodes addressed by integer
//! handles. Chapter and footnote indices hold handles into the arena, so
//! nothing outside the tree keeps references into it.

use std::borrow::Cow;

use encoding_rs::Encoding;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Handle of a node inside an [`XmlTree`]
pub(crate) type NodeId = usize;

/// Elements nested deeper than this are rejected
const MAX_NESTING_DEPTH: usize = 512;

#[derive(Debug)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
pub(crate) struct Element {
    /// Local name (namespace prefix stripped)
    pub name: String,
    /// Attributes keyed by local name
    pub attrs: Vec<(String, String)>,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) struct XmlTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl XmlTree {
    /// Parse raw bytes, honoring the encoding named in the XML declaration
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let text = decode_input(data)?;
        Self::parse(&text)
    }

    /// Parse a well-formed XML document
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(false);
        reader.check_end_names(true);

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("XML error at position {}: {}", reader.buffer_position(), e))?;

            match event {
                Event::Start(start) => {
                    let id = push_element(&mut nodes, &start)?;
                    attach(&mut nodes, &stack, &mut root, id)?;
                    stack.push(id);
                    if stack.len() > MAX_NESTING_DEPTH {
                        return Err(format!(
                            "elements nested deeper than {} levels",
                            MAX_NESTING_DEPTH
                        ));
                    }
                }
                Event::Empty(start) => {
                    let id = push_element(&mut nodes, &start)?;
                    attach(&mut nodes, &stack, &mut root, id)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    if stack.is_empty() {
                        if !text.iter().all(u8::is_ascii_whitespace) {
                            return Err(format!(
                                "text outside of the root element at position {}",
                                reader.buffer_position()
                            ));
                        }
                        continue;
                    }
                    let value = text
                        .unescape()
                        .map_err(|e| format!("XML error at position {}: {}", reader.buffer_position(), e))?;
                    push_text(&mut nodes, &stack, value.into_owned());
                }
                Event::CData(data) => {
                    if !stack.is_empty() {
                        let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        push_text(&mut nodes, &stack, value);
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctype
                _ => {}
            }
        }

        if let Some(&open) = stack.last() {
            let name = match &nodes[open] {
                Node::Element(element) => element.name.clone(),
                Node::Text(_) => String::new(),
            };
            return Err(format!("unexpected end of document: <{}> is not closed", name));
        }

        let root = root.ok_or_else(|| "document has no root element".to_string())?;
        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id] {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    /// Local name of an element, empty for text nodes
    pub fn name(&self, id: NodeId) -> &str {
        self.element(id).map(|e| e.name.as_str()).unwrap_or("")
    }

    /// Attribute value by local name
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    /// Child elements with the given local name, in document order
    pub fn child_elements<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&child| self.name(child) == name)
    }

    pub fn first_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.child_elements(id, name).next()
    }

    /// Concatenated text of all descendants
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            match &self.nodes[current] {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => pending.extend(element.children.iter().rev()),
            }
        }
        out
    }
}

fn push_element(nodes: &mut Vec<Node>, start: &BytesStart<'_>) -> Result<NodeId, String> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| format!("invalid attribute in <{}>: {}", name, e))?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| format!("invalid attribute value in <{}>: {}", name, e))?
            .into_owned();
        attrs.push((key, value));
    }

    nodes.push(Node::Element(Element {
        name,
        attrs,
        children: Vec::new(),
    }));
    Ok(nodes.len() - 1)
}

fn attach(
    nodes: &mut [Node],
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    id: NodeId,
) -> Result<(), String> {
    match stack.last() {
        Some(&parent) => {
            if let Node::Element(element) = &mut nodes[parent] {
                element.children.push(id);
            }
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(id);
            Ok(())
        }
        None => Err("document has more than one root element".to_string()),
    }
}

fn push_text(nodes: &mut Vec<Node>, stack: &[NodeId], value: String) {
    let Some(&parent) = stack.last() else {
        return;
    };
    nodes.push(Node::Text(value));
    let id = nodes.len() - 1;
    if let Node::Element(element) = &mut nodes[parent] {
        element.children.push(id);
    }
}

/// Decode raw bytes to UTF-8 text
///
/// Byte order marks win over the XML declaration; without either the
/// input must be UTF-8.
pub(crate) fn decode_input(data: &[u8]) -> Result<Cow<'_, str>, String> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(data) {
        return decode_with(encoding, &data[bom_len..]);
    }

    match declared_encoding(data) {
        Some(label) => {
            let encoding = Encoding::for_label(label.as_bytes())
                .ok_or_else(|| format!("unsupported encoding: {}", label))?;
            decode_with(encoding, data)
        }
        None => decode_with(encoding_rs::UTF_8, data),
    }
}

fn decode_with<'a>(encoding: &'static Encoding, data: &'a [u8]) -> Result<Cow<'a, str>, String> {
    if encoding == encoding_rs::UTF_8 {
        return std::str::from_utf8(data)
            .map(Cow::Borrowed)
            .map_err(|e| format!("invalid UTF-8: {}", e));
    }
    encoding
        .decode_without_bom_handling_and_without_replacement(data)
        .ok_or_else(|| format!("invalid {} byte sequence", encoding.name()))
}

/// Encoding label from `<?xml ... encoding="..."?>`, if any
fn declared_encoding(data: &[u8]) -> Option<String> {
    let head = &data[..data.len().min(256)];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let close = value.find(quote)?;
    Some(value[..close].trim().to_string())
}
