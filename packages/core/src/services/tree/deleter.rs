//! Subtree Deleter
//!
//! Collects the target and its descendants in pre-order, then deletes in
//! reverse so every node goes after all of its descendants. Override rows
//! are removed explicitly with their node, which keeps the walk correct even
//! on a connection where foreign key cascades are off.

use crate::db::catalog_store;
use crate::models::DeleteResult;
use crate::services::CatalogError;
use libsql::Connection;

/// Ids of `root` and every descendant, parents before children
pub(crate) async fn collect_subtree(
    conn: &Connection,
    root: i64,
) -> Result<Vec<i64>, CatalogError> {
    let mut order = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        order.push(id);
        let children = catalog_store::child_ids(conn, id).await?;
        stack.extend(children.into_iter().rev());
    }

    Ok(order)
}

/// Delete `root` and its subtree on `conn`
///
/// Runs inside the caller's unit of work; `NotFound` when `root` is absent.
pub(crate) async fn delete_subtree_in(
    conn: &Connection,
    root: i64,
) -> Result<DeleteResult, CatalogError> {
    if catalog_store::get_node(conn, root).await?.is_none() {
        return Err(CatalogError::not_found("Node", root));
    }

    let order = collect_subtree(conn, root).await?;
    let mut result = DeleteResult {
        nodes_removed: 0,
        fabric_images_removed: 0,
    };

    for &id in order.iter().rev() {
        result.fabric_images_removed +=
            catalog_store::delete_fabric_images_for_node(conn, id).await? as usize;
        result.nodes_removed += catalog_store::delete_node(conn, id).await? as usize;
    }

    tracing::debug!(
        "Deleted subtree of node {}: {} nodes, {} fabric images",
        root,
        result.nodes_removed,
        result.fabric_images_removed
    );
    Ok(result)
}
