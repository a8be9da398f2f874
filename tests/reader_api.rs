//! HTTP tests for the reader endpoints

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum_test::TestServer;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use libros_reader::config::{Config, ReaderConfig};
use libros_reader::reader::DirectoryBookSource;
use libros_reader::routes;
use libros_reader::state::AppState;

const BOOK: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info><book-title>HTTP Book</book-title><lang>en</lang>
<author><nickname>tester</nickname></author>
<coverpage><image l:href="#cover.png"/></coverpage></title-info></description>
<body><section><p>Hello world</p></section><section><title><p>Two</p></title><p>Second</p></section></body>
<binary id="cover.png" content-type="image/png">iVBORw0KGgo=</binary>
</FictionBook>"##;

fn setup(dir: &TempDir) -> AppState {
    let library = dir.path().join("library");
    std::fs::create_dir_all(&library).unwrap();
    std::fs::write(library.join("10.fb2"), BOOK).unwrap();
    std::fs::write(library.join("11.fb2"), "<FictionBook><body>").unwrap();

    let config = Config {
        reader: ReaderConfig {
            cache_path: dir.path().join("cache"),
            ..ReaderConfig::default()
        },
        ..Config::default()
    };
    AppState::with_source(config, Arc::new(DirectoryBookSource::new(&library)))
}

fn cached(dir: &TempDir, file: &str) -> bool {
    Path::new(&dir.path().join("cache").join("10").join(file)).exists()
}

#[tokio::test]
async fn test_content_endpoint() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::new(routes::app(setup(&dir))).unwrap();

    let response = server.get("/api/books/10/content").await;
    response.assert_status_ok();
    let json: Value = response.json();

    assert_eq!(json["metadata"]["title"], "HTTP Book");
    assert_eq!(json["metadata"]["author"], "tester");
    assert_eq!(json["metadata"]["cover"], "/api/books/10/image/cover.png");
    assert_eq!(json["totalChapters"], 2);
    assert_eq!(json["chapters"], serde_json::json!(["ch1", "ch2"]));
    assert_eq!(json["toc"][0]["title"], "Chapter 1");
    assert_eq!(json["toc"][1]["level"], 0);
    assert!(json["chapterSizes"]["ch1"].as_u64().unwrap() > 2000);

    assert!(cached(&dir, "content.json"));
}

#[tokio::test]
async fn test_chapter_endpoint() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::new(routes::app(setup(&dir))).unwrap();

    let response = server.get("/api/books/10/chapter/ch2").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["id"], "ch2");
    assert_eq!(json["title"], "Two");
    assert_eq!(
        json["html"],
        "<h2 class=\"chapter-title\">Two </h2>\n<p>Second</p>\n"
    );
    assert!(cached(&dir, "ch_ch2.json"));

    // served from cache the second time, byte-identical
    let again: Value = server.get("/api/books/10/chapter/ch2").await.json();
    assert_eq!(again, json);
}

#[tokio::test]
async fn test_image_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = routes::app(setup(&dir));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/books/10/image/cover.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=86400"
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    assert!(cached(&dir, "img_cover.png.meta"));
}

#[tokio::test]
async fn test_error_statuses() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::new(routes::app(setup(&dir))).unwrap();

    let missing_book = server.get("/api/books/99/content").await;
    assert_eq!(missing_book.status_code(), StatusCode::NOT_FOUND);
    let json: Value = missing_book.json();
    assert_eq!(json["error"], "not_found");

    let missing_chapter = server.get("/api/books/10/chapter/ch9").await;
    assert_eq!(missing_chapter.status_code(), StatusCode::NOT_FOUND);

    let missing_image = server.get("/api/books/10/image/none.png").await;
    assert_eq!(missing_image.status_code(), StatusCode::NOT_FOUND);

    let malformed = server.get("/api/books/11/content").await;
    assert_eq!(malformed.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = malformed.json();
    assert_eq!(json["error"], "malformed_document");

    let unknown_route = server.get("/api/unknown").await;
    assert_eq!(unknown_route.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_requests_agree() {
    let dir = TempDir::new().unwrap();
    let state = setup(&dir);

    let requests = (0..6).map(|_| {
        let reader = state.reader().clone();
        async move { reader.get_chapter("10", "ch1").await }
    });
    let results = futures::future::join_all(requests).await;

    let first = results[0].as_ref().unwrap();
    assert!(first.html.contains("<div class=\"book-cover\">"));
    assert!(first.html.contains("<p>Hello world</p>"));
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::new(routes::app(setup(&dir))).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["formats"], serde_json::json!(["fb2"]));
}
