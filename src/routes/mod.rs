//! Route modules for the reader server

use axum::Router;

use crate::error::AppError;
use crate::state::AppState;

pub mod health;
pub mod reader;

/// Full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/books", reader::router())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found(uri: axum::http::Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
