//! Core reader types
//!
//! Format-agnostic artifacts produced by every book converter and
//! persisted by the reader cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported book formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Fb2,
}

impl BookFormat {
    /// Format code as used by the catalog and the converter registry
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fb2 => "fb2",
        }
    }

    /// Parse a format code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "fb2" => Some(Self::Fb2),
            _ => None,
        }
    }

    /// Detect format from a file name, looking through a trailing `.zip`
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let stem = lower.strip_suffix(".zip").unwrap_or(&lower);
        let ext = stem.rsplit_once('.').map(|(_, ext)| ext)?;
        Self::from_code(ext)
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Book metadata derived once per parse
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookMetadata {
    /// Book title
    pub title: String,
    /// Display name of the primary author
    pub author: String,
    /// Cover image locator (an API path, never bytes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Language code as declared by the book
    pub language: String,
    /// Format code
    pub format: String,
}

/// Table of contents entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    /// Chapter id, unique within the book
    pub id: String,
    /// Display title
    pub title: String,
    /// Nesting depth (0 = top level)
    pub level: usize,
}

/// Book summary: metadata plus navigation structure, no chapter text
///
/// `chapters` always mirrors the ids of `toc`, in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookContent {
    pub metadata: BookMetadata,
    pub toc: Vec<TocEntry>,
    pub chapters: Vec<String>,
    pub total_chapters: usize,
    /// Estimated rendered size of each chapter in bytes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chapter_sizes: BTreeMap<String, usize>,
}

/// Rendered HTML of a single chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    pub id: String,
    pub title: String,
    pub html: String,
}

/// Embedded binary resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub id: String,
    /// Declared media type
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}
