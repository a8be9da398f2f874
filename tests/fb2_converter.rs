//! Converter contract tests over complete FB2 documents

use std::collections::HashSet;

use libros_reader::document::{get_converter, DocumentError, ParsedBook};
use libros_reader::formats::fb2::COVER_OVERHEAD;

const NOVEL: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
  <description>
    <title-info>
      <genre>prose</genre>
      <author>
        <first-name>Anna</first-name>
        <last-name>Writer</last-name>
      </author>
      <book-title>The Long Road</book-title>
      <lang>en</lang>
      <coverpage><image l:href="#cover.jpg"/></coverpage>
    </title-info>
  </description>
  <body>
    <title><p>The Long Road</p></title>
    <section id="part1">
      <title><p>Part One</p></title>
      <epigraph><p>All roads lead somewhere.</p><text-author>Proverb</text-author></epigraph>
      <section>
        <title><p>Departure</p></title>
        <p>She left at dawn<a l:href="#note1" type="note">[1]</a>.</p>
        <image l:href="#map.png"/>
      </section>
      <section>
        <p>An untitled interlude.</p>
        <poem>
          <title><p>Road Song</p></title>
          <stanza><v>Step by step</v><v>mile by mile</v></stanza>
          <text-author>Traveller</text-author>
        </poem>
      </section>
    </section>
    <section>
      <title><p>Arrival</p></title>
      <cite><p>We made it.</p><text-author>Anna</text-author></cite>
      <p>The end<a l:href="#note2" type="note">[2]</a><a l:href="#note1" type="note">[1]</a>.</p>
    </section>
  </body>
  <body name="notes">
    <title><p>Notes</p></title>
    <section id="note1"><title><p>1</p></title><p>Before sunrise.</p></section>
    <section id="note2"><title><p>2</p></title><p>Or the beginning.</p></section>
  </body>
  <binary id="cover.jpg" content-type="image/jpeg">/9j/4AAQ</binary>
  <binary id="map.png" content-type="image/png">iVBORw0K
  Ggo=</binary>
</FictionBook>"##;

fn parse(xml: &str) -> Box<dyn ParsedBook> {
    get_converter("fb2").unwrap().parse(xml.as_bytes(), "77").unwrap()
}

#[test]
fn test_novel_structure() {
    let book = parse(NOVEL);
    let content = book.content();

    assert_eq!(content.metadata.title, "The Long Road");
    assert_eq!(content.metadata.author, "Anna Writer");
    assert_eq!(content.metadata.language, "en");
    assert_eq!(content.metadata.format, "fb2");

    let toc: Vec<(&str, &str, usize)> = content
        .toc
        .iter()
        .map(|e| (e.id.as_str(), e.title.as_str(), e.level))
        .collect();
    assert_eq!(
        toc,
        vec![
            ("part1", "Part One", 0),
            ("ch2", "Departure", 1),
            ("ch3", "Chapter 3", 1),
            ("ch4", "Arrival", 0),
        ]
    );

    assert_eq!(content.total_chapters, 4);
    let toc_ids: Vec<String> = content.toc.iter().map(|e| e.id.clone()).collect();
    assert_eq!(content.chapters, toc_ids);
    assert_eq!(toc_ids.iter().collect::<HashSet<_>>().len(), toc_ids.len());
}

#[test]
fn test_footnotes_only_where_referenced() {
    let book = parse(NOVEL);

    let departure = book.chapter("ch2").unwrap().html;
    assert!(departure.contains("<a class=\"footnote-ref\" data-note-id=\"note1\">[1]</a>"));
    assert!(departure.contains("<div class=\"footnote-body\" id=\"note1\"><p>Before sunrise.</p></div>"));
    assert!(!departure.contains("id=\"note2\""));
    assert!(departure.contains("<img src=\"/api/books/77/image/map.png\" alt=\"\" loading=\"lazy\"/>"));

    let interlude = book.chapter("ch3").unwrap().html;
    assert!(!interlude.contains("footnote-body"));
    assert!(interlude.contains("<p class=\"subtitle\">Road Song</p>"));
    assert!(interlude.contains("<p class=\"poem-author\">Traveller</p>"));

    let arrival = book.chapter("ch4").unwrap().html;
    let note2 = arrival.find("footnote-body\" id=\"note2\"").unwrap();
    let note1 = arrival.find("footnote-body\" id=\"note1\"").unwrap();
    assert!(note2 < note1, "bodies follow first-reference order");
    assert!(arrival.contains("<blockquote class=\"cite\"><p>We made it.</p>\n<p class=\"epigraph-author\">Anna</p></blockquote>"));
}

#[test]
fn test_part_chapter_renders_own_content_only() {
    let book = parse(NOVEL);
    let part = book.chapter("part1").unwrap();

    assert_eq!(part.title, "Part One");
    assert!(part.html.contains("<h2 class=\"chapter-title\">Part One </h2>"));
    assert!(part.html.contains("<blockquote class=\"epigraph\">"));
    assert!(!part.html.contains("She left at dawn"));
}

#[test]
fn test_cover_overhead_on_first_chapter_only() {
    let book = parse(NOVEL);
    let content = book.content();

    assert_eq!(
        content.metadata.cover.as_deref(),
        Some("/api/books/77/image/cover.jpg")
    );

    let first = book.chapter("part1").unwrap().html;
    let cover_prefix =
        "<div class=\"book-cover\"><img src=\"/api/books/77/image/cover.jpg\" alt=\"The Long Road\" /></div>\n";
    assert!(first.starts_with(cover_prefix));
    let raw_first = first.len() - cover_prefix.len();
    assert_eq!(content.chapter_sizes["part1"], raw_first + COVER_OVERHEAD);

    for id in ["ch2", "ch3", "ch4"] {
        assert_eq!(content.chapter_sizes[id], book.chapter(id).unwrap().html.len());
    }
}

#[test]
fn test_images() {
    let book = parse(NOVEL);

    let map = book.image("map.png").unwrap();
    assert_eq!(map.content_type, "image/png");
    assert_eq!(map.data, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

    assert!(matches!(
        book.image("nope.png"),
        Err(DocumentError::ImageNotFound(_))
    ));
}

#[test]
fn test_chapter_not_found_is_not_malformed() {
    let book = parse(NOVEL);
    let err = book.chapter("ch99").unwrap_err();
    assert!(matches!(err, DocumentError::ChapterNotFound(_)));
    assert!(err.is_not_found());
}

#[test]
fn test_rendering_is_deterministic() {
    let first = parse(NOVEL);
    let second = parse(NOVEL);

    assert_eq!(first.content(), second.content());
    for id in &first.content().chapters {
        assert_eq!(first.chapter(id).unwrap(), second.chapter(id).unwrap());
    }
}

#[test]
fn test_windows_1251_book() {
    let body = "<FictionBook><description><title-info><book-title>Повесть</book-title><lang>ru</lang></title-info></description><body><section><p>Привет, мир</p></section></body></FictionBook>";
    let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode(body);
    let mut data = br#"<?xml version="1.0" encoding="windows-1251"?>"#.to_vec();
    data.extend_from_slice(&encoded);

    let book = get_converter("fb2").unwrap().parse(&data, "5").unwrap();
    assert_eq!(book.content().metadata.title, "Повесть");
    assert_eq!(book.content().toc[0].title, "Глава 1");
    assert!(book.chapter("ch1").unwrap().html.contains("<p>Привет, мир</p>"));
}

#[test]
fn test_malformed_document() {
    let converter = get_converter("fb2").unwrap();
    let err = converter
        .parse(b"<FictionBook><body><section></body></FictionBook>", "1")
        .err()
        .unwrap();
    assert!(matches!(err, DocumentError::MalformedDocument(_)));
}

#[test]
fn test_unsupported_format_code() {
    match get_converter("mobi") {
        Err(DocumentError::UnsupportedFormat(code)) => assert_eq!(code, "mobi"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("mobi should not be supported"),
    }
}
