//! FictionBook 2 format implementation
//!
//! # Architecture
//!
//! - [`Fb2Converter`]: stateless [`BookConverter`](crate::document::BookConverter)
//! - [`Fb2Book`]: parsed document answering content, chapter and image queries
//!
//! The document is parsed once into an owned node arena (`xml`). Chapters
//! and footnotes are indexed by node handle; HTML is produced on demand by
//! the renderer and embedded images are decoded from their `<binary>`
//! elements on request.

mod binary;
mod parser;
mod renderer;
mod xml;

pub use parser::{Fb2Book, Fb2Converter, COVER_OVERHEAD};
