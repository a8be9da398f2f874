//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::reader::{BookSource, DirectoryBookSource, ReaderService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    reader: ReaderService,
}

impl AppState {
    /// State serving books from the configured library directory
    pub fn new(config: Config) -> Self {
        let source: Arc<dyn BookSource> = Arc::new(DirectoryBookSource::new(&config.library.path));
        Self::with_source(config, source)
    }

    /// State over an arbitrary book source
    pub fn with_source(config: Config, source: Arc<dyn BookSource>) -> Self {
        let reader = ReaderService::new(&config.reader, source);
        Self {
            inner: Arc::new(AppStateInner { reader }),
        }
    }

    /// Get the reader service
    pub fn reader(&self) -> &ReaderService {
        &self.inner.reader
    }
}
