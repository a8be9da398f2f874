//! Book sources
//!
//! The reader service never knows where book bytes live. A [`BookSource`]
//! turns a book id into raw bytes plus a format code; the catalog-backed
//! variant asks a [`BookLocator`] which archive holds the book.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use zip::ZipArchive;

use crate::document::{BookFormat, DocumentError, Result};

/// Raw book bytes and the format code they are stored in
#[derive(Debug, Clone)]
pub struct BookFile {
    pub format: String,
    pub data: Vec<u8>,
}

/// Supplies the raw bytes of a book
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Load a book; unknown ids are [`DocumentError::BookNotFound`]
    async fn load(&self, book_id: &str) -> Result<BookFile>;
}

/// Where a book is stored inside the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLocation {
    /// Archive path, relative to the library root or absolute inside it
    pub archive: PathBuf,
    /// Entry name inside the archive
    pub file_in_archive: String,
    /// Format code of the entry; empty when the catalog does not record one
    pub format: String,
}

impl BookLocation {
    /// Recorded format code, or the one implied by the entry name
    pub fn format_code(&self) -> String {
        if !self.format.trim().is_empty() {
            return self.format.clone();
        }
        match BookFormat::from_file_name(&self.file_in_archive) {
            Some(format) => format.code().to_string(),
            None => Path::new(&self.file_in_archive)
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
        }
    }
}

/// Catalog lookup of a book's storage location
#[async_trait]
pub trait BookLocator: Send + Sync {
    async fn locate(&self, book_id: &str) -> Result<BookLocation>;
}

// ============================================================================
// Archive source
// ============================================================================

/// Reads books out of zip archives under a library root
pub struct ArchiveBookSource<L> {
    library_root: PathBuf,
    locator: L,
}

impl<L: BookLocator> ArchiveBookSource<L> {
    pub fn new(library_root: impl Into<PathBuf>, locator: L) -> Self {
        Self {
            library_root: library_root.into(),
            locator,
        }
    }

    /// Canonical archive path, refusing anything outside the library root
    async fn resolve_archive(&self, book_id: &str, archive: &Path) -> Result<PathBuf> {
        let root = tokio::fs::canonicalize(&self.library_root).await?;
        let candidate = root.join(archive);

        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DocumentError::BookNotFound(book_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !resolved.starts_with(&root) {
            tracing::warn!(
                book_id = %book_id,
                archive = %archive.display(),
                "Archive path escapes the library root"
            );
            return Err(DocumentError::BookNotFound(book_id.to_string()));
        }

        Ok(resolved)
    }
}

#[async_trait]
impl<L: BookLocator> BookSource for ArchiveBookSource<L> {
    async fn load(&self, book_id: &str) -> Result<BookFile> {
        let location = self.locator.locate(book_id).await?;
        let archive = self.resolve_archive(book_id, &location.archive).await?;

        let entry = location.file_in_archive.clone();
        let data = tokio::task::spawn_blocking(move || read_zip_entry(&archive, Some(&entry)))
            .await
            .map_err(|e| DocumentError::TaskJoin(e.to_string()))??;

        tracing::debug!(
            book_id = %book_id,
            entry = %location.file_in_archive,
            bytes = data.len(),
            "Loaded book from archive"
        );

        Ok(BookFile {
            format: location.format_code(),
            data,
        })
    }
}

// ============================================================================
// Directory source
// ============================================================================

/// Reads `{id}.fb2` or `{id}.fb2.zip` from a flat directory
#[derive(Debug, Clone)]
pub struct DirectoryBookSource {
    root: PathBuf,
}

impl DirectoryBookSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BookSource for DirectoryBookSource {
    async fn load(&self, book_id: &str) -> Result<BookFile> {
        if !is_plain_file_name(book_id) {
            return Err(DocumentError::BookNotFound(book_id.to_string()));
        }
        let format = BookFormat::Fb2.code();

        let plain = self.root.join(format!("{}.{}", book_id, format));
        match tokio::fs::read(&plain).await {
            Ok(data) => {
                return Ok(BookFile {
                    format: format.to_string(),
                    data,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let zipped = self.root.join(format!("{}.{}.zip", book_id, format));
        if !tokio::fs::try_exists(&zipped).await? {
            return Err(DocumentError::BookNotFound(book_id.to_string()));
        }
        let data = tokio::task::spawn_blocking(move || read_zip_entry(&zipped, None))
            .await
            .map_err(|e| DocumentError::TaskJoin(e.to_string()))??;

        Ok(BookFile {
            format: format.to_string(),
            data,
        })
    }
}

fn is_plain_file_name(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
}

/// Read one entry of a zip archive, or its first entry when `name` is `None`
fn read_zip_entry(path: &Path, name: Option<&str>) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = match name {
        Some(name) => archive.by_name(name)?,
        None => archive.by_index(0)?,
    };

    let mut data = Vec::with_capacity(initial_capacity(entry.size()));
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Largest buffer reserved up front from a zip header's declared size
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

fn initial_capacity(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOC) as usize
}
