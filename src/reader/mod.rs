//! Cached book reading
//!
//! [`ReaderService`] answers content, chapter and image requests from the
//! [`FileCache`], falling back to a [`BookSource`] plus the converter
//! registry on a miss. [`CacheSweeper`] evicts books that have not been
//! read within the configured ttl.

mod cache;
mod service;
mod source;
mod sweeper;

pub use cache::FileCache;
pub use service::ReaderService;
pub use source::{
    ArchiveBookSource, BookFile, BookLocation, BookLocator, BookSource, DirectoryBookSource,
};
pub use sweeper::CacheSweeper;
