//! Single-record product endpoints
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `POST /products` - Create one node (JSON or multipart)
//! - `GET /products/:id` - Get a node by ID
//! - `PUT /products/:id` - Sparse update (JSON or multipart)
//! - `DELETE /products/:id` - Delete a node and its subtree
//! - `PUT /products/:id/fabric-images/:fabric_id` - Set one fabric image override

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::http_error::HttpError;
use crate::payload::{discard_on_error, FormPayload};
use crate::{AppState, Created};
use tailorspace_core::{CatalogNode, DeleteResult, NodeDraft, NodeFabricImage, NodeUpdate};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

/// Response of a subtree delete
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub msg: &'static str,
    #[serde(flatten)]
    pub result: DeleteResult,
}

/// Health check endpoint
///
/// ```bash
/// curl http://localhost:5000/health
/// ```
async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a single node
///
/// Accepts JSON or a multipart form whose optional `image` file part is
/// uploaded and stored as the node's image reference.
///
/// ```bash
/// curl -X POST http://localhost:5000/products \
///   -F name="Suit Jacket" -F price=450 -F image=@jacket.jpg
/// ```
async fn create_product(
    State(state): State<AppState>,
    mut payload: FormPayload,
) -> Result<(StatusCode, Json<Created>), HttpError> {
    let stored = payload.store_image(state.uploader.as_ref()).await?;
    let result = async {
        let draft: NodeDraft = payload.parse_new()?;
        Ok::<_, HttpError>(state.catalog.create_node(draft).await?)
    }
    .await;

    let node = discard_on_error(state.uploader.as_ref(), stored, result).await?;
    Ok((StatusCode::CREATED, Json(Created::new(node.id))))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CatalogNode>, HttpError> {
    Ok(Json(state.catalog.get_node(id).await?))
}

/// Sparse update; `null` clears a nullable column, absent fields are kept
///
/// ```bash
/// curl -X PUT http://localhost:5000/products/12 \
///   -H "Content-Type: application/json" \
///   -d '{"price": 95, "attribute_name": null}'
/// ```
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut payload: FormPayload,
) -> Result<Json<CatalogNode>, HttpError> {
    let stored = payload.store_image(state.uploader.as_ref()).await?;
    let result = async {
        let update: NodeUpdate = payload.parse()?;
        tracing::debug!("Updating node {} with {:?}", id, update);
        Ok::<_, HttpError>(state.catalog.update_node(id, update).await?)
    }
    .await;

    let node = discard_on_error(state.uploader.as_ref(), stored, result).await?;
    Ok(Json(node))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, HttpError> {
    let result = state.catalog.delete_node(id).await?;
    Ok(Json(Deleted {
        msg: "Deleted",
        result,
    }))
}

/// Set the image shown for one product in one fabric
///
/// The body is either `{"image_urls": "..."}` or a form with an `image` file.
async fn set_fabric_image(
    State(state): State<AppState>,
    Path((id, fabric_id)): Path<(i64, i64)>,
    mut payload: FormPayload,
) -> Result<Json<NodeFabricImage>, HttpError> {
    let stored = payload.store_image(state.uploader.as_ref()).await?;
    let result = async {
        let image_urls = match payload.field("image_urls") {
            Some(Value::String(reference)) => reference.clone(),
            Some(Value::Null) | None => String::new(),
            Some(_) => return Err(HttpError::invalid_input("image_urls must be a string")),
        };
        Ok::<_, HttpError>(state
            .catalog
            .set_fabric_image(id, fabric_id, &image_urls)
            .await?)
    }
    .await;

    let override_row = discard_on_error(state.uploader.as_ref(), stored, result).await?;
    Ok(Json(override_row))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/products", post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route(
            "/products/:id/fabric-images/:fabric_id",
            put(set_fabric_image),
        )
        .with_state(state)
}
