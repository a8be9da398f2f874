//! Converter traits
//!
//! Format-agnostic interfaces for turning raw book bytes into reader
//! artifacts.

use super::error::Result;
use super::types::{BookContent, BookFormat, ChapterContent, ImageData};

/// Format-specific book converter
///
/// A converter is stateless; `parse` consumes raw bytes and returns a
/// [`ParsedBook`] that answers all later queries without re-parsing.
/// Accessors only exist on the parsed value, so they cannot be reached
/// before a successful parse.
pub trait BookConverter: Send + Sync {
    /// Format handled by this converter
    fn format(&self) -> BookFormat;

    /// Parse raw book bytes
    ///
    /// `book_id` is embedded in every generated resource locator.
    fn parse(&self, data: &[u8], book_id: &str) -> Result<Box<dyn ParsedBook>>;
}

/// A successfully parsed book
pub trait ParsedBook: Send + Sync {
    /// Metadata, table of contents and chapter size estimates
    fn content(&self) -> &BookContent;

    /// Render a chapter to HTML
    fn chapter(&self, chapter_id: &str) -> Result<ChapterContent>;

    /// Extract an embedded image
    fn image(&self, image_id: &str) -> Result<ImageData>;
}
