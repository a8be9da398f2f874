//! FB2 converter
//!
//! Parses a FictionBook document once and answers chapter and image
//! queries from the in-memory tree.

use std::collections::{BTreeMap, HashMap, HashSet};

use html_escape::encode_double_quoted_attribute;

use super::binary::BinaryIndex;
use super::renderer::{image_url, title_text, RenderContext};
use super::xml::{NodeId, XmlTree};
use crate::document::{
    BookContent, BookConverter, BookFormat, BookMetadata, ChapterContent, DocumentError,
    ImageData, ParsedBook, Result, TocEntry,
};

/// Added to the first chapter's size estimate when the book has a cover
pub const COVER_OVERHEAD: usize = 2000;

/// Bodies with these names hold notes instead of reading content
const ANNEX_BODIES: [&str; 2] = ["notes", "comments"];

/// Converter for FictionBook 2 documents
#[derive(Debug, Default, Clone, Copy)]
pub struct Fb2Converter;

impl Fb2Converter {
    pub fn new() -> Self {
        Self
    }
}

impl BookConverter for Fb2Converter {
    fn format(&self) -> BookFormat {
        BookFormat::Fb2
    }

    fn parse(&self, data: &[u8], book_id: &str) -> Result<Box<dyn ParsedBook>> {
        Ok(Box::new(Fb2Book::parse(data, book_id)?))
    }
}

#[derive(Debug)]
struct ChapterRef {
    node: NodeId,
    title: String,
}

/// A parsed FB2 document
#[derive(Debug)]
pub struct Fb2Book {
    tree: XmlTree,
    book_id: String,
    content: BookContent,
    chapters: HashMap<String, ChapterRef>,
    notes: HashMap<String, NodeId>,
    binaries: BinaryIndex,
}

impl Fb2Book {
    pub fn parse(data: &[u8], book_id: &str) -> Result<Self> {
        let tree = XmlTree::from_bytes(data).map_err(DocumentError::MalformedDocument)?;
        let root = tree.root();
        if tree.name(root) != "FictionBook" {
            return Err(DocumentError::MalformedDocument(format!(
                "root element is <{}>, expected <FictionBook>",
                tree.name(root)
            )));
        }

        let title_info = tree
            .first_child(root, "description")
            .and_then(|description| tree.first_child(description, "title-info"));
        let language = title_info
            .and_then(|info| tree.first_child(info, "lang"))
            .map(|lang| tree.text(lang).trim().to_string())
            .unwrap_or_default();

        let notes = index_notes(&tree);
        let binaries = BinaryIndex::build(&tree);
        let (toc, chapters) = build_toc(&tree, &language);

        let cover = title_info.and_then(|info| cover_image_id(&tree, info));
        if let Some(id) = &cover {
            if !binaries.contains(id) {
                tracing::debug!(book_id = %book_id, image_id = %id, "Cover image not embedded");
            }
        }

        let metadata = BookMetadata {
            title: title_info
                .and_then(|info| tree.first_child(info, "book-title"))
                .map(|title| tree.text(title).trim().to_string())
                .unwrap_or_default(),
            author: title_info
                .and_then(|info| tree.first_child(info, "author"))
                .map(|author| author_name(&tree, author))
                .unwrap_or_default(),
            cover: cover.map(|id| image_url(book_id, &id)),
            language,
            format: BookFormat::Fb2.code().to_string(),
        };

        let mut book = Self {
            tree,
            book_id: book_id.to_string(),
            content: BookContent {
                metadata,
                chapters: toc.iter().map(|entry| entry.id.clone()).collect(),
                total_chapters: toc.len(),
                toc,
                chapter_sizes: BTreeMap::new(),
            },
            chapters,
            notes,
            binaries,
        };
        book.content.chapter_sizes = book.estimate_sizes();

        tracing::debug!(
            book_id = %book_id,
            chapters = book.content.total_chapters,
            notes = book.notes.len(),
            binaries = book.binaries.len(),
            "Parsed FB2 document"
        );

        Ok(book)
    }

    fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            tree: &self.tree,
            book_id: &self.book_id,
            notes: &self.notes,
        }
    }

    /// Rendered length of each chapter, cover overhead on the first
    fn estimate_sizes(&self) -> BTreeMap<String, usize> {
        let ctx = self.render_context();
        let mut sizes = BTreeMap::new();
        for (index, id) in self.content.chapters.iter().enumerate() {
            let Some(chapter) = self.chapters.get(id) else {
                continue;
            };
            let mut size = ctx.render_section(chapter.node).len();
            if index == 0 && self.content.metadata.cover.is_some() {
                size += COVER_OVERHEAD;
            }
            sizes.insert(id.clone(), size);
        }
        sizes
    }
}

impl ParsedBook for Fb2Book {
    fn content(&self) -> &BookContent {
        &self.content
    }

    fn chapter(&self, chapter_id: &str) -> Result<ChapterContent> {
        let chapter = self
            .chapters
            .get(chapter_id)
            .ok_or_else(|| DocumentError::ChapterNotFound(chapter_id.to_string()))?;

        let mut html = String::new();
        let is_first = self.content.chapters.first().map(String::as_str) == Some(chapter_id);
        if let (true, Some(cover)) = (is_first, &self.content.metadata.cover) {
            html.push_str("<div class=\"book-cover\"><img src=\"");
            html.push_str(&encode_double_quoted_attribute(cover));
            html.push_str("\" alt=\"");
            html.push_str(&encode_double_quoted_attribute(&self.content.metadata.title));
            html.push_str("\" /></div>\n");
        }
        html.push_str(&self.render_context().render_section(chapter.node));

        Ok(ChapterContent {
            id: chapter_id.to_string(),
            title: chapter.title.clone(),
            html,
        })
    }

    fn image(&self, image_id: &str) -> Result<ImageData> {
        self.binaries.extract(&self.tree, image_id)
    }
}

fn is_annex(tree: &XmlTree, body: NodeId) -> bool {
    tree.attr(body, "name")
        .map(|name| ANNEX_BODIES.contains(&name.trim()))
        .unwrap_or(false)
}

/// Note id -> section, from the annex bodies
fn index_notes(tree: &XmlTree) -> HashMap<String, NodeId> {
    let mut notes = HashMap::new();
    for body in tree.child_elements(tree.root(), "body") {
        if !is_annex(tree, body) {
            continue;
        }
        for section in tree.child_elements(body, "section") {
            if let Some(id) = tree.attr(section, "id").filter(|id| !id.is_empty()) {
                notes.entry(id.to_string()).or_insert(section);
            }
        }
    }
    notes
}

/// Pre-order walk over the sections of every reading body
fn build_toc(tree: &XmlTree, language: &str) -> (Vec<TocEntry>, HashMap<String, ChapterRef>) {
    let mut toc = Vec::new();
    let mut chapters = HashMap::new();
    let mut used = HashSet::new();
    let mut counter = 0usize;

    for body in tree.child_elements(tree.root(), "body") {
        if is_annex(tree, body) {
            continue;
        }

        let mut pending: Vec<(NodeId, usize)> = tree
            .child_elements(body, "section")
            .map(|section| (section, 0))
            .collect();
        pending.reverse();

        while let Some((section, level)) = pending.pop() {
            counter += 1;

            let declared = tree.attr(section, "id").filter(|id| !id.trim().is_empty());
            let id = assign_id(declared, counter, &mut used);
            let title = tree
                .first_child(section, "title")
                .map(|title| title_text(tree, title))
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| fallback_title(language, counter));

            toc.push(TocEntry {
                id: id.clone(),
                title: title.clone(),
                level,
            });
            chapters.insert(id, ChapterRef { node: section, title });

            let nested: Vec<NodeId> = tree.child_elements(section, "section").collect();
            pending.extend(nested.into_iter().rev().map(|child| (child, level + 1)));
        }
    }

    (toc, chapters)
}

fn assign_id(declared: Option<&str>, counter: usize, used: &mut HashSet<String>) -> String {
    let base = match declared {
        Some(id) => id.to_string(),
        None => format!("ch{}", counter),
    };
    let mut id = base.clone();
    let mut suffix = 2;
    while used.contains(&id) {
        id = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    used.insert(id.clone());
    id
}

/// Label for a section without a usable title
fn fallback_title(language: &str, n: usize) -> String {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    match primary.as_str() {
        "ru" => format!("Глава {}", n),
        _ => format!("Chapter {}", n),
    }
}

fn author_name(tree: &XmlTree, author: NodeId) -> String {
    let part = |name: &str| {
        tree.first_child(author, name)
            .map(|node| tree.text(node).trim().to_string())
            .unwrap_or_default()
    };

    let name = ["first-name", "middle-name", "last-name"]
        .iter()
        .map(|field| part(field))
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        part("nickname")
    } else {
        name
    }
}

fn cover_image_id(tree: &XmlTree, title_info: NodeId) -> Option<String> {
    let coverpage = tree.first_child(title_info, "coverpage")?;
    let image = tree.first_child(coverpage, "image")?;
    let id = tree.attr(image, "href")?.trim_start_matches('#');
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Fb2Book {
        Fb2Book::parse(xml.as_bytes(), "42").unwrap()
    }

    fn book(description: &str, bodies: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info>{description}</title-info></description>
{bodies}
</FictionBook>"#
        )
    }

    #[test]
    fn test_minimal_document() {
        let book = parse(&book(
            "<lang>en</lang>",
            "<body><section><p>Hello world</p></section></body>",
        ));
        let content = book.content();

        assert_eq!(content.total_chapters, 1);
        assert_eq!(content.toc[0].level, 0);
        assert_eq!(content.toc[0].title, "Chapter 1");
        assert_eq!(content.toc[0].id, "ch1");

        let chapter = book.chapter(&content.toc[0].id).unwrap();
        assert!(chapter.html.contains("<p>Hello world</p>"));
        assert!(!chapter.html.contains("<h2"));
        assert_eq!(chapter.title, "Chapter 1");
    }

    #[test]
    fn test_russian_fallback_title() {
        let book = parse(&book(
            "<lang>ru</lang>",
            "<body><section><p>Текст</p></section></body>",
        ));
        assert_eq!(book.content().toc[0].title, "Глава 1");
    }

    #[test]
    fn test_nested_toc_and_counter() {
        let book = parse(&book(
            "",
            r#"<body>
                <section id="part1"><title><p>Part</p><p>One</p></title>
                    <section><title><p>Inner</p></title><p>a</p></section>
                    <section><p>b</p></section>
                </section>
                <section><p>c</p></section>
            </body>"#,
        ));
        let toc = &book.content().toc;

        let ids: Vec<&str> = toc.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["part1", "ch2", "ch3", "ch4"]);
        let levels: Vec<usize> = toc.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![0, 1, 1, 0]);
        assert_eq!(toc[0].title, "Part One");
        assert_eq!(toc[1].title, "Inner");
        assert_eq!(toc[2].title, "Chapter 3");
        assert_eq!(book.content().chapters, ids);
    }

    #[test]
    fn test_duplicate_ids_are_suffixed() {
        let book = parse(&book(
            "",
            r#"<body><section id="a"><p>1</p></section><section id="a"><p>2</p></section><section id="ch3"/><section/></body>"#,
        ));
        let ids: Vec<&str> = book.content().chapters.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "a_2", "ch3", "ch4"]);
    }

    #[test]
    fn test_annex_bodies_excluded() {
        let book = parse(&book(
            "",
            r##"<body><section><p>Text<a l:href="#n1" type="note">1</a></p></section></body>
               <body name="notes"><section id="n1"><p>Note one</p></section></body>
               <body name="comments"><section id="c1"><p>Comment</p></section></body>"##,
        ));
        assert_eq!(book.content().total_chapters, 1);
        assert_eq!(book.notes.len(), 2);

        let html = book.chapter("ch1").unwrap().html;
        assert!(html.contains("<div class=\"footnote-body\" id=\"n1\"><p>Note one</p></div>"));
        assert!(!html.contains("Comment"));
    }

    #[test]
    fn test_metadata() {
        let book = parse(&book(
            r##"<author><first-name>Лев</first-name><middle-name></middle-name><last-name>Толстой</last-name></author>
                <book-title> Война и мир </book-title><lang>ru</lang>"##,
            "<body><section><p>x</p></section></body>",
        ));
        let metadata = &book.content().metadata;
        assert_eq!(metadata.title, "Война и мир");
        assert_eq!(metadata.author, "Лев Толстой");
        assert_eq!(metadata.language, "ru");
        assert_eq!(metadata.format, "fb2");
        assert!(metadata.cover.is_none());
    }

    #[test]
    fn test_author_nickname_fallback() {
        let book = parse(&book(
            "<author><nickname>anon</nickname></author>",
            "<body><section/></body>",
        ));
        assert_eq!(book.content().metadata.author, "anon");
    }

    #[test]
    fn test_cover_and_sizes() {
        let book = parse(&book(
            r##"<book-title>T</book-title><coverpage><image l:href="#cover.jpg"/></coverpage>"##,
            r#"<body><section><p>First</p></section><section><p>Second</p></section></body>
               <binary id="cover.jpg" content-type="image/jpeg">aGk=</binary>"#,
        ));
        let content = book.content();
        assert_eq!(
            content.metadata.cover.as_deref(),
            Some("/api/books/42/image/cover.jpg")
        );

        let raw_first = book.render_context().render_section(book.chapters["ch1"].node).len();
        let raw_second = book.chapter("ch2").unwrap().html.len();
        assert_eq!(content.chapter_sizes["ch1"], raw_first + COVER_OVERHEAD);
        assert!(content.chapter_sizes["ch1"] > raw_first);
        assert_eq!(content.chapter_sizes["ch2"], raw_second);

        let first = book.chapter("ch1").unwrap().html;
        assert!(first.starts_with(
            "<div class=\"book-cover\"><img src=\"/api/books/42/image/cover.jpg\" alt=\"T\" /></div>\n"
        ));

        let image = book.image("cover.jpg").unwrap();
        assert_eq!(image.data, b"hi");
    }

    #[test]
    fn test_unknown_chapter_is_not_found() {
        let book = parse(&book("", "<body><section/></body>"));
        assert!(matches!(
            book.chapter("nope"),
            Err(DocumentError::ChapterNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        for input in ["not xml at all", "", "<FictionBook><body>", "<html><body/></html>"] {
            assert!(
                matches!(
                    Fb2Book::parse(input.as_bytes(), "1"),
                    Err(DocumentError::MalformedDocument(_))
                ),
                "input {input:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_converter_contract() {
        let converter = Fb2Converter::new();
        assert_eq!(converter.format(), BookFormat::Fb2);
        let parsed = converter
            .parse(book("", "<body><section><p>x</p></section></body>").as_bytes(), "7")
            .unwrap();
        assert_eq!(parsed.content().chapters, vec!["ch1".to_string()]);
    }

    #[test]
    fn test_fallback_title_language_variants() {
        assert_eq!(fallback_title("ru-RU", 3), "Глава 3");
        assert_eq!(fallback_title("RU", 1), "Глава 1");
        assert_eq!(fallback_title("en", 2), "Chapter 2");
        assert_eq!(fallback_title("", 2), "Chapter 2");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        struct Section {
            titled: bool,
            children: Vec<Section>,
        }

        fn section_tree() -> impl Strategy<Value = Vec<Section>> {
            let leaf = any::<bool>().prop_map(|titled| Section {
                titled,
                children: Vec::new(),
            });
            let tree = leaf.prop_recursive(6, 48, 4, |inner| {
                (any::<bool>(), prop::collection::vec(inner, 0..4))
                    .prop_map(|(titled, children)| Section { titled, children })
            });
            prop::collection::vec(tree, 1..4)
        }

        fn write(sections: &[Section], out: &mut String, next: &mut usize) {
            for section in sections {
                *next += 1;
                out.push_str("<section>");
                if section.titled {
                    out.push_str(&format!("<title><p>T{}</p></title>", next));
                }
                out.push_str("<p>text</p>");
                write(&section.children, out, next);
                out.push_str("</section>");
            }
        }

        fn expected(sections: &[Section], level: usize, out: &mut Vec<(usize, bool)>) {
            for section in sections {
                out.push((level, section.titled));
                expected(&section.children, level + 1, out);
            }
        }

        proptest! {
            #[test]
            fn toc_matches_structure(sections in section_tree()) {
                let mut body = String::from("<body>");
                write(&sections, &mut body, &mut 0);
                body.push_str("</body>");
                let book = parse(&book("", &body));
                let content = book.content();

                let mut shape = Vec::new();
                expected(&sections, 0, &mut shape);

                prop_assert_eq!(content.toc.len(), shape.len());
                prop_assert_eq!(content.total_chapters, shape.len());
                let toc_ids: Vec<String> = content.toc.iter().map(|e| e.id.clone()).collect();
                prop_assert_eq!(&content.chapters, &toc_ids);
                let unique: HashSet<&String> = toc_ids.iter().collect();
                prop_assert_eq!(unique.len(), toc_ids.len());

                for (n, (entry, (level, titled))) in content.toc.iter().zip(shape).enumerate() {
                    prop_assert_eq!(entry.level, level);
                    if titled {
                        prop_assert_eq!(&entry.title, &format!("T{}", n + 1));
                    } else {
                        prop_assert_eq!(&entry.title, &format!("Chapter {}", n + 1));
                    }
                }
            }
        }
    }
}
