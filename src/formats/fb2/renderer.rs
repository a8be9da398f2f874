//! FB2 section -> HTML fragment
//!
//! Rendering is a pure function of the section node, the footnote index
//! and the book id. Footnote bodies are appended for the notes the
//! section references, in order of first reference.

use std::collections::{HashMap, HashSet};

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::xml::{Node, NodeId, XmlTree};

/// Locator of an embedded image as served by the reader API
pub(crate) fn image_url(book_id: &str, image_id: &str) -> String {
    format!(
        "/api/books/{}/image/{}",
        urlencoding::encode(book_id),
        urlencoding::encode(image_id)
    )
}

/// Everything a section needs besides its own node
pub(crate) struct RenderContext<'a> {
    pub tree: &'a XmlTree,
    pub book_id: &'a str,
    pub notes: &'a HashMap<String, NodeId>,
}

/// Note ids referenced while rendering, in order of first reference
#[derive(Debug, Default)]
struct NoteRefs {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl NoteRefs {
    fn record(&mut self, id: &str) {
        if !id.is_empty() && self.seen.insert(id.to_string()) {
            self.ids.push(id.to_string());
        }
    }
}

impl RenderContext<'_> {
    /// Render a section's own content (nested sections excluded)
    pub fn render_section(&self, section: NodeId) -> String {
        let tree = self.tree;
        let mut out = String::new();
        let mut refs = NoteRefs::default();

        if let Some(title) = tree.first_child(section, "title") {
            out.push_str("<h2 class=\"chapter-title\">");
            for p in tree.child_elements(title, "p") {
                out.push_str(&encode_text(&tree.text(p)));
                out.push(' ');
            }
            out.push_str("</h2>\n");
        }

        for epigraph in tree.child_elements(section, "epigraph") {
            self.quote_block(epigraph, "epigraph", &mut out, &mut refs);
        }

        for &child in tree.children(section) {
            match tree.name(child) {
                "p" => self.paragraph(child, None, &mut out, &mut refs),
                "subtitle" => self.paragraph(child, Some("subtitle"), &mut out, &mut refs),
                "poem" => self.poem(child, &mut out, &mut refs),
                "cite" => self.quote_block(child, "cite", &mut out, &mut refs),
                "empty-line" => out.push_str("<br/>\n"),
                "image" => {
                    if let Some(tag) = self.image_tag(child) {
                        out.push_str(&tag);
                        out.push('\n');
                    }
                }
                // title, epigraph, nested sections, annotations
                _ => {}
            }
        }

        self.footnotes(&refs, &mut out);
        out
    }

    fn paragraph(&self, p: NodeId, class: Option<&str>, out: &mut String, refs: &mut NoteRefs) {
        match class {
            Some(class) => {
                out.push_str("<p class=\"");
                out.push_str(class);
                out.push_str("\">");
            }
            None => out.push_str("<p>"),
        }
        self.inline_children(p, out, refs);
        out.push_str("</p>\n");
    }

    /// Epigraph or citation
    fn quote_block(&self, block: NodeId, class: &str, out: &mut String, refs: &mut NoteRefs) {
        let tree = self.tree;
        out.push_str("<blockquote class=\"");
        out.push_str(class);
        out.push_str("\">");
        for p in tree.child_elements(block, "p") {
            self.paragraph(p, None, out, refs);
        }
        for author in tree.child_elements(block, "text-author") {
            out.push_str("<p class=\"epigraph-author\">");
            out.push_str(&encode_text(&tree.text(author)));
            out.push_str("</p>");
        }
        out.push_str("</blockquote>\n");
    }

    fn poem(&self, poem: NodeId, out: &mut String, refs: &mut NoteRefs) {
        let tree = self.tree;
        out.push_str("<div class=\"poem\">");

        if let Some(title) = tree.first_child(poem, "title") {
            let text = title_text(tree, title);
            if !text.is_empty() {
                out.push_str("<p class=\"subtitle\">");
                out.push_str(&encode_text(&text));
                out.push_str("</p>");
            }
        }

        for stanza in tree.child_elements(poem, "stanza") {
            out.push_str("<div class=\"stanza\">");
            for verse in tree.child_elements(stanza, "v") {
                out.push_str("<p class=\"verse\">");
                self.inline_children(verse, out, refs);
                out.push_str("</p>");
            }
            out.push_str("</div>");
        }

        for author in tree.child_elements(poem, "text-author") {
            out.push_str("<p class=\"poem-author\">");
            out.push_str(&encode_text(&tree.text(author)));
            out.push_str("</p>");
        }

        out.push_str("</div>\n");
    }

    fn image_tag(&self, image: NodeId) -> Option<String> {
        let href = self.tree.attr(image, "href")?;
        let id = href.trim_start_matches('#');
        if id.is_empty() {
            return None;
        }
        Some(format!(
            "<img src=\"{}\" alt=\"\" loading=\"lazy\"/>",
            image_url(self.book_id, id)
        ))
    }

    fn inline_children(&self, parent: NodeId, out: &mut String, refs: &mut NoteRefs) {
        for &child in self.tree.children(parent) {
            self.inline(child, out, refs);
        }
    }

    fn inline(&self, node: NodeId, out: &mut String, refs: &mut NoteRefs) {
        let tree = self.tree;
        let element = match tree.node(node) {
            Node::Text(text) => {
                out.push_str(&encode_text(text));
                return;
            }
            Node::Element(element) => element,
        };

        let html_tag = match element.name.as_str() {
            "emphasis" => Some("em"),
            "strong" => Some("strong"),
            "strikethrough" => Some("del"),
            "code" => Some("code"),
            "sup" => Some("sup"),
            "sub" => Some("sub"),
            _ => None,
        };
        if let Some(tag) = html_tag {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            self.inline_children(node, out, refs);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
            return;
        }

        match element.name.as_str() {
            "a" => {
                let href = tree.attr(node, "href").unwrap_or("");
                if tree.attr(node, "type") == Some("note") {
                    let note_id = href.trim_start_matches('#');
                    refs.record(note_id);
                    out.push_str("<a class=\"footnote-ref\" data-note-id=\"");
                    out.push_str(&encode_double_quoted_attribute(note_id));
                    out.push_str("\">");
                    self.inline_children(node, out, refs);
                    out.push_str("</a>");
                } else if is_safe_link(href) {
                    out.push_str("<a href=\"");
                    out.push_str(&encode_double_quoted_attribute(href));
                    out.push_str("\">");
                    self.inline_children(node, out, refs);
                    out.push_str("</a>");
                } else {
                    self.inline_children(node, out, refs);
                }
            }
            "image" => {
                if let Some(tag) = self.image_tag(node) {
                    out.push_str(&tag);
                }
            }
            _ => self.inline_children(node, out, refs),
        }
    }

    fn footnotes(&self, refs: &NoteRefs, out: &mut String) {
        let tree = self.tree;
        for id in &refs.ids {
            let Some(&note) = self.notes.get(id) else {
                continue;
            };
            out.push_str("<div class=\"footnote-body\" id=\"");
            out.push_str(&encode_double_quoted_attribute(id));
            out.push_str("\">");
            // nested references do not pull in further bodies
            let mut nested = NoteRefs::default();
            for p in tree.child_elements(note, "p") {
                out.push_str("<p>");
                self.inline_children(p, out, &mut nested);
                out.push_str("</p>");
            }
            out.push_str("</div>\n");
        }
    }
}

/// Links that stay live in chapter HTML: web, mail and in-page fragments
fn is_safe_link(href: &str) -> bool {
    let href = href.trim();
    if href.len() > 1 && href.starts_with('#') {
        return true;
    }
    let lower = href.to_ascii_lowercase();
    ["http://", "https://", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

/// Plain text of a `<title>`: its paragraphs joined by single spaces
pub(crate) fn title_text(tree: &XmlTree, title: NodeId) -> String {
    tree.child_elements(title, "p")
        .map(|p| tree.text(p).trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
