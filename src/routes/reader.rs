//! Reader API endpoints
//!
//! - `GET /api/books/:id/content` book summary (metadata, TOC, chapter sizes)
//! - `GET /api/books/:id/chapter/:chapter_id` rendered chapter HTML
//! - `GET /api/books/:id/image/:image_id` embedded image bytes

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};

use crate::document::{BookContent, ChapterContent};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Images never change for a given book id
const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/content", get(get_content))
        .route("/:id/chapter/:chapter_id", get(get_chapter))
        .route("/:id/image/:image_id", get(get_image))
}

async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookContent>> {
    let content = state.reader().get_content(&id).await?;
    Ok(Json(content))
}

async fn get_chapter(
    State(state): State<AppState>,
    Path((id, chapter_id)): Path<(String, String)>,
) -> Result<Json<ChapterContent>> {
    let chapter = state.reader().get_chapter(&id, &chapter_id).await?;
    Ok(Json(chapter))
}

async fn get_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<Response> {
    let image = state.reader().get_image(&id, &image_id).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, image.content_type)
        .header(header::CACHE_CONTROL, IMAGE_CACHE_CONTROL)
        .body(Body::from(image.data))
        .map_err(|e| AppError::Internal(e.to_string()))
}
