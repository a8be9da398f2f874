//! File-backed reader cache
//!
//! One directory per book under the cache root:
//!
//! ```text
//! {root}/{book}/content.json
//!              /ch_{chapter}.json
//!              /img_{image}.bin
//!              /img_{image}.meta      (media type, written after .bin)
//!              /.accessed             (RFC 3339 time of last access)
//! ```
//!
//! Every file is written to a temporary name and renamed into place, so
//! concurrent writers of the same artifact never leave a torn file; the
//! last writer wins. Recency is tracked per book, not per artifact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::document::{BookContent, ChapterContent, DocumentError, ImageData, Result};

const CONTENT_FILE: &str = "content.json";
const ACCESS_STAMP: &str = ".accessed";

/// Persistent per-book artifact store
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of a book
    pub fn book_dir(&self, book_id: &str) -> PathBuf {
        self.root.join(path_component(book_id))
    }

    // ========================================================================
    // Artifacts
    // ========================================================================

    pub async fn read_content(&self, book_id: &str) -> Result<Option<BookContent>> {
        self.read_json(&self.book_dir(book_id).join(CONTENT_FILE)).await
    }

    pub async fn write_content(&self, book_id: &str, content: &BookContent) -> Result<()> {
        self.write_json(book_id, CONTENT_FILE, content).await
    }

    pub async fn read_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Option<ChapterContent>> {
        let path = self.book_dir(book_id).join(chapter_file(chapter_id));
        self.read_json(&path).await
    }

    pub async fn write_chapter(&self, book_id: &str, chapter: &ChapterContent) -> Result<()> {
        self.write_json(book_id, &chapter_file(&chapter.id), chapter).await
    }

    /// Cached image; the `.meta` file marks a complete entry
    pub async fn read_image(&self, book_id: &str, image_id: &str) -> Result<Option<ImageData>> {
        let dir = self.book_dir(book_id);
        let (bin, meta) = image_files(image_id);

        let Some(content_type) = read_optional(&dir.join(meta)).await? else {
            return Ok(None);
        };
        let Some(data) = read_optional(&dir.join(bin)).await? else {
            return Ok(None);
        };

        let content_type = String::from_utf8(content_type)
            .map_err(|e| DocumentError::CacheError(format!("invalid media type: {}", e)))?;

        Ok(Some(ImageData {
            id: image_id.to_string(),
            content_type: content_type.trim().to_string(),
            data,
        }))
    }

    pub async fn write_image(&self, book_id: &str, image: &ImageData) -> Result<()> {
        let dir = self.book_dir(book_id);
        let (bin, meta) = image_files(&image.id);
        write_atomic(&dir, &bin, &image.data).await?;
        write_atomic(&dir, &meta, image.content_type.as_bytes()).await
    }

    // ========================================================================
    // Recency and eviction
    // ========================================================================

    /// Mark a book as accessed now
    pub async fn touch(&self, book_id: &str) -> Result<()> {
        self.touch_at(book_id, Utc::now()).await
    }

    /// Record an explicit access time for a book
    pub async fn touch_at(&self, book_id: &str, at: DateTime<Utc>) -> Result<()> {
        let dir = self.book_dir(book_id);
        write_atomic(&dir, ACCESS_STAMP, at.to_rfc3339().as_bytes()).await
    }

    /// Remove books whose last access is strictly older than `now - ttl`
    ///
    /// Returns the number of books removed. A zero ttl disables eviction.
    pub async fn evict_expired(&self, ttl: Duration) -> Result<usize> {
        if ttl.is_zero() {
            return Ok(0);
        }
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            // ttl reaches before the representable past: nothing can be older
            return Ok(0);
        };

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            let Some(accessed) = last_access_of(&path).await else {
                continue;
            };
            if accessed >= cutoff {
                continue;
            }

            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(
                        path = %path.display(),
                        last_access = %accessed,
                        "Evicted expired cache entry"
                    );
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to evict cache entry");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, "Evicted expired reader cache entries");
        }

        Ok(removed)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let Some(data) = read_optional(path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| DocumentError::CacheError(format!("{}: {}", path.display(), e)))
    }

    async fn write_json<T: Serialize>(&self, book_id: &str, name: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value).map_err(|e| DocumentError::CacheError(e.to_string()))?;
        write_atomic(&self.book_dir(book_id), name, &data).await
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let tmp = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, dir.join(name)).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Access stamp, falling back to the directory's modification time
async fn last_access_of(dir: &Path) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = tokio::fs::read_to_string(dir.join(ACCESS_STAMP)).await {
        if let Ok(at) = DateTime::parse_from_rfc3339(stamp.trim()) {
            return Some(at.with_timezone(&Utc));
        }
    }
    let modified = tokio::fs::metadata(dir).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// File-system safe name for an id
///
/// Percent-encoding never yields a path separator; the dot-only names are
/// encoded as well so an id can never address a parent directory.
fn path_component(id: &str) -> String {
    match id {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(id).into_owned(),
    }
}

fn chapter_file(chapter_id: &str) -> String {
    format!("ch_{}.json", path_component(chapter_id))
}

fn image_files(image_id: &str) -> (String, String) {
    let base = format!("img_{}", path_component(image_id));
    (format!("{}.bin", base), format!("{}.meta", base))
}
