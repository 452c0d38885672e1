//! Fabric group and fabric swatch endpoints
//!
//! - `GET /fabric-groups` - List groups
//! - `POST /fabric-groups` - Create a group
//! - `DELETE /fabric-groups/:id` - Delete a group with its fabrics
//! - `GET /fabric-groups/:id/fabrics` - A group's fabrics, images resolved
//! - `POST /fabrics` - Create a fabric (JSON or multipart)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;

use crate::http_error::HttpError;
use crate::payload::{discard_on_error, FormPayload};
use crate::{AppState, Created};
use tailorspace_core::{Fabric, FabricGroup, NewFabric, NewFabricGroup};

#[derive(Debug, Serialize)]
pub struct GroupDeleted {
    pub msg: &'static str,
    pub id: i64,
}

async fn list_fabric_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<FabricGroup>>, HttpError> {
    Ok(Json(state.catalog.list_fabric_groups().await?))
}

async fn create_fabric_group(
    State(state): State<AppState>,
    payload: FormPayload,
) -> Result<(StatusCode, Json<Created>), HttpError> {
    let group: NewFabricGroup = payload.parse_new()?;
    let group = state.catalog.create_fabric_group(group).await?;
    Ok((StatusCode::CREATED, Json(Created::new(group.id))))
}

async fn delete_fabric_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GroupDeleted>, HttpError> {
    state.catalog.delete_fabric_group(id).await?;
    Ok(Json(GroupDeleted { msg: "Deleted", id }))
}

async fn list_fabrics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Fabric>>, HttpError> {
    Ok(Json(state.catalog.list_fabrics(id).await?))
}

/// Create a fabric swatch
///
/// ```bash
/// curl -X POST http://localhost:5000/fabrics \
///   -F name="Navy Twill" -F fabric_group_id=1 -F image=@navy.jpg
/// ```
async fn create_fabric(
    State(state): State<AppState>,
    mut payload: FormPayload,
) -> Result<(StatusCode, Json<Created>), HttpError> {
    let stored = payload.store_image(state.uploader.as_ref()).await?;
    let result = async {
        let fabric: NewFabric = payload.parse_new()?;
        Ok::<_, HttpError>(state.catalog.create_fabric(fabric).await?)
    }
    .await;

    let fabric = discard_on_error(state.uploader.as_ref(), stored, result).await?;
    Ok((StatusCode::CREATED, Json(Created::new(fabric.id))))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/fabric-groups",
            get(list_fabric_groups).post(create_fabric_group),
        )
        .route("/fabric-groups/:id", delete(delete_fabric_group))
        .route("/fabric-groups/:id/fabrics", get(list_fabrics))
        .route("/fabrics", post(create_fabric))
        .with_state(state)
}
