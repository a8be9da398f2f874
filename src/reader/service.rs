//! Reader service
//!
//! Serves book content, chapters and images from the file cache, parsing
//! the book on a miss. Concurrent misses for the same book share one
//! parse; different books never wait on each other.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use super::cache::FileCache;
use super::source::BookSource;
use crate::config::ReaderConfig;
use crate::document::{
    BookContent, ChapterContent, ConverterRegistry, DocumentError, ImageData, ParsedBook, Result,
};

type SharedBook = Arc<dyn ParsedBook>;

/// Cached access to parsed books
#[derive(Clone)]
pub struct ReaderService {
    inner: Arc<ReaderServiceInner>,
}

struct ReaderServiceInner {
    cache: FileCache,
    source: Arc<dyn BookSource>,
    registry: ConverterRegistry,
    cache_ttl: Duration,
    parse_timeout: Duration,

    /// Parses in progress, keyed by book id
    in_flight: Mutex<HashMap<String, Arc<OnceCell<SharedBook>>>>,

    /// Recently parsed books
    recent: Option<Mutex<LruCache<String, SharedBook>>>,
}

impl ReaderService {
    /// Create a service with the default converter registry
    pub fn new(config: &ReaderConfig, source: Arc<dyn BookSource>) -> Self {
        Self::with_registry(config, source, ConverterRegistry::with_defaults())
    }

    pub fn with_registry(
        config: &ReaderConfig,
        source: Arc<dyn BookSource>,
        registry: ConverterRegistry,
    ) -> Self {
        let recent = NonZeroUsize::new(config.memory_books).map(|cap| Mutex::new(LruCache::new(cap)));

        Self {
            inner: Arc::new(ReaderServiceInner {
                cache: FileCache::new(&config.cache_path),
                source,
                registry,
                cache_ttl: config.cache_ttl,
                parse_timeout: config.parse_timeout,
                in_flight: Mutex::new(HashMap::new()),
                recent,
            }),
        }
    }

    /// The underlying file cache
    pub fn cache(&self) -> &FileCache {
        &self.inner.cache
    }

    // ========================================================================
    // Artifacts
    // ========================================================================

    /// Book summary: metadata, table of contents, chapter sizes
    pub async fn get_content(&self, book_id: &str) -> Result<BookContent> {
        check_book_id(book_id)?;
        let cache = &self.inner.cache;

        match cache.read_content(book_id).await {
            Ok(Some(content)) => {
                tracing::debug!(book_id = %book_id, "Content cache hit");
                self.touch(book_id).await;
                return Ok(content);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(book_id = %book_id, error = %e, "Unreadable cached content, re-parsing");
            }
        }

        let book = self.parsed(book_id).await?;
        let content = book.content().clone();

        if let Err(e) = cache.write_content(book_id, &content).await {
            tracing::warn!(book_id = %book_id, error = %e, "Failed to cache content");
        }
        self.touch(book_id).await;

        Ok(content)
    }

    /// Rendered chapter HTML
    pub async fn get_chapter(&self, book_id: &str, chapter_id: &str) -> Result<ChapterContent> {
        check_book_id(book_id)?;
        let cache = &self.inner.cache;

        match cache.read_chapter(book_id, chapter_id).await {
            Ok(Some(chapter)) => {
                tracing::debug!(book_id = %book_id, chapter_id = %chapter_id, "Chapter cache hit");
                self.touch(book_id).await;
                return Ok(chapter);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    book_id = %book_id,
                    chapter_id = %chapter_id,
                    error = %e,
                    "Unreadable cached chapter, re-parsing"
                );
            }
        }

        let book = self.parsed(book_id).await?;
        let chapter = book.chapter(chapter_id)?;

        if let Err(e) = cache.write_chapter(book_id, &chapter).await {
            tracing::warn!(book_id = %book_id, chapter_id = %chapter_id, error = %e, "Failed to cache chapter");
        }
        self.touch(book_id).await;

        Ok(chapter)
    }

    /// Embedded image bytes and media type
    pub async fn get_image(&self, book_id: &str, image_id: &str) -> Result<ImageData> {
        check_book_id(book_id)?;
        let cache = &self.inner.cache;

        match cache.read_image(book_id, image_id).await {
            Ok(Some(image)) => {
                tracing::debug!(book_id = %book_id, image_id = %image_id, "Image cache hit");
                self.touch(book_id).await;
                return Ok(image);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    book_id = %book_id,
                    image_id = %image_id,
                    error = %e,
                    "Unreadable cached image, re-parsing"
                );
            }
        }

        let book = self.parsed(book_id).await?;
        let image = book.image(image_id)?;

        if let Err(e) = cache.write_image(book_id, &image).await {
            tracing::warn!(book_id = %book_id, image_id = %image_id, error = %e, "Failed to cache image");
        }
        self.touch(book_id).await;

        Ok(image)
    }

    /// Evict books not accessed within the configured ttl
    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.inner.cache.evict_expired(self.inner.cache_ttl).await
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    async fn touch(&self, book_id: &str) {
        if let Err(e) = self.inner.cache.touch(book_id).await {
            tracing::warn!(book_id = %book_id, error = %e, "Failed to refresh cache access time");
        }
    }

    /// Parsed book, sharing the work with any concurrent caller
    async fn parsed(&self, book_id: &str) -> Result<SharedBook> {
        if let Some(recent) = &self.inner.recent {
            if let Some(book) = recent.lock().get(book_id) {
                return Ok(book.clone());
            }
        }

        let cell = {
            let mut in_flight = self.inner.in_flight.lock();
            in_flight.entry(book_id.to_string()).or_default().clone()
        };
        // released on completion and when the caller goes away mid-parse
        let _entry = InFlightEntry {
            in_flight: &self.inner.in_flight,
            book_id,
            cell: &cell,
        };

        let result = cell
            .get_or_try_init(|| self.load_and_parse(book_id))
            .await
            .cloned();

        if let (Ok(book), Some(recent)) = (&result, &self.inner.recent) {
            recent.lock().put(book_id.to_string(), book.clone());
        }

        result
    }

    async fn load_and_parse(&self, book_id: &str) -> Result<SharedBook> {
        let file = self.inner.source.load(book_id).await?;
        let converter = self.inner.registry.get(&file.format)?;

        let started = Instant::now();
        let id = book_id.to_string();
        let task = tokio::task::spawn_blocking(move || converter.parse(&file.data, &id));

        let book = timeout(self.inner.parse_timeout, task)
            .await
            .map_err(|_| DocumentError::Timeout(self.inner.parse_timeout.as_secs()))?
            .map_err(|e| DocumentError::TaskJoin(e.to_string()))??;

        tracing::info!(
            book_id = %book_id,
            chapters = book.content().total_chapters,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Parsed book"
        );

        Ok(Arc::from(book))
    }
}

/// Removes a book's in-flight cell from the map when dropped
struct InFlightEntry<'a> {
    in_flight: &'a Mutex<HashMap<String, Arc<OnceCell<SharedBook>>>>,
    book_id: &'a str,
    cell: &'a Arc<OnceCell<SharedBook>>,
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(self.book_id)
            .is_some_and(|current| Arc::ptr_eq(current, self.cell))
        {
            in_flight.remove(self.book_id);
        }
    }
}

fn check_book_id(book_id: &str) -> Result<()> {
    if book_id.is_empty() {
        return Err(DocumentError::BookNotFound(book_id.to_string()));
    }
    Ok(())
}
