//! Whole-tree endpoints
//!
//! Clients read the catalog as nested documents and write edited documents
//! back; every write is one all-or-nothing reconciliation.
//!
//! - `GET /products/tree` - Materialize every root
//! - `GET /products/:id/tree` - Materialize the subtree rooted at `id`
//! - `PUT /products/tree` - Reconcile top-level documents
//! - `PUT /products/:id/tree` - Reconcile documents as children of `id`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::Value;

use crate::http_error::HttpError;
use crate::AppState;
use tailorspace_core::{CatalogError, NodeDocument, ReconcileOutcome, TreeDocument};

/// Request body: one document or an array of them
fn documents_from(
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Vec<NodeDocument>, HttpError> {
    let Json(body) = body.map_err(|e| HttpError::invalid_input(e.body_text()))?;
    NodeDocument::batch_from_value(body)
        .map_err(|e| CatalogError::validation("documents", e).into())
}

async fn get_tree(State(state): State<AppState>) -> Result<Json<Vec<TreeDocument>>, HttpError> {
    Ok(Json(state.tree.materialize_roots().await?))
}

async fn get_subtree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TreeDocument>, HttpError> {
    let mut documents = state.tree.materialize_from(&[id]).await?;
    documents
        .pop()
        .map(Json)
        .ok_or_else(|| CatalogError::not_found("Node", id).into())
}

/// Reconcile a batch of documents
///
/// ```bash
/// curl -X PUT http://localhost:5000/products/tree \
///   -H "Content-Type: application/json" \
///   -d '[{"name": "Suit", "sub_products": [{"name": "Jacket"}]}]'
/// ```
async fn put_tree(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ReconcileOutcome>, HttpError> {
    let documents = documents_from(body)?;
    let outcome = state.tree.reconcile(documents).await?;

    tracing::info!(
        "Reconciled {} roots ({} created, {} updated, {} pruned)",
        outcome.root_ids.len(),
        outcome.created,
        outcome.updated,
        outcome.pruned
    );
    Ok(Json(outcome))
}

async fn put_subtree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ReconcileOutcome>, HttpError> {
    let documents = documents_from(body)?;
    Ok(Json(state.tree.reconcile_under(id, documents).await?))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/products/tree", get(get_tree).put(put_tree))
        .route("/products/:id/tree", get(get_subtree).put(put_subtree))
        .with_state(state)
}
