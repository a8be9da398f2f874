//! Libros Reader Library
//!
//! Turns FB2 books into independently cacheable reader artifacts: a book
//! summary (metadata, table of contents, chapter sizes), per-chapter HTML
//! and embedded images. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `document`: format-agnostic converter contract, registry and types
//! - `formats`: format implementations (FB2)
//! - `reader`: file-backed cache, book sources and the eviction sweeper
//! - `routes`: HTTP endpoints over the reader service

pub mod config;
pub mod document;
pub mod error;
pub mod formats;
pub mod reader;
pub mod routes;
pub mod state;
