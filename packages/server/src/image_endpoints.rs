//! Serves blobs written by the local image store
//!
//! Resolved image URLs look like `/images/{bucket}/{key}?expires={unix}`;
//! links past their expiry are refused.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::http_error::HttpError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    expires: Option<i64>,
}

fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

async fn get_image(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let store = state
        .images
        .as_ref()
        .filter(|store| store.bucket() == bucket)
        .ok_or_else(|| HttpError::new(format!("Image not found: {}", key), "NOT_FOUND"))?;
    let expires = query
        .expires
        .ok_or_else(|| HttpError::invalid_input("Missing expires parameter"))?;

    let bytes = store.read(&key, expires).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&key))], bytes))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/images/:bucket/:key", get(get_image))
        .with_state(state)
}
