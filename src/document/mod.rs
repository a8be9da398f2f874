//! Unified book abstraction
//!
//! This module provides format-agnostic interfaces for turning book files
//! into reader artifacts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ConverterRegistry                      │
//! │        (format code -> BookConverter, "fb2", ...)       │
//! └─────────────────────────────────────────────────────────┘
//!                            │ parse(bytes, book_id)
//!                            ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │                  ParsedBook                         │
//!   │   content() / chapter(id) / image(id)               │
//!   └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use libros_reader::document::ConverterRegistry;
//!
//! let registry = ConverterRegistry::with_defaults();
//! let book = registry.get("fb2")?.parse(&bytes, "42")?;
//!
//! let content = book.content();
//! let first = book.chapter(&content.chapters[0])?;
//! ```

mod error;
mod registry;
mod traits;
mod types;

pub use error::{DocumentError, DocumentResult, Result};
pub use registry::{get_converter, ConverterRegistry};
pub use traits::{BookConverter, ParsedBook};
pub use types::{BookContent, BookFormat, BookMetadata, ChapterContent, ImageData, TocEntry};
