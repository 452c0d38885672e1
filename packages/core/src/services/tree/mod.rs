//! Tree Synchronization Engine
//!
//! Moves the product tree between its relational form (one `nodes` row per
//! element, linked by `parent_id`) and the nested, attribute-grouped document
//! clients edit:
//!
//! - **Materialize**: read a subtree and nest it, filing attribute options
//!   under their parent's keys ([`TreeService::materialize_roots`])
//! - **Reconcile**: recursive create-or-update from client documents, one
//!   transaction per call ([`TreeService::reconcile`])
//! - **Delete**: remove a node and everything below it
//!   ([`TreeService::delete_subtree`])
//!
//! The service is stateless between calls; each call opens its own unit of
//! work on the shared [`DatabaseService`].

mod arena;
mod deleter;
mod materializer;
mod reconciler;

#[cfg(test)]
mod tree_service_test;

pub use reconciler::ReconcileOutcome;

use crate::db::{catalog_store, DatabaseService};
use crate::images::ImageResolver;
use crate::models::{DeleteResult, NodeDocument, TreeDocument};
use crate::services::CatalogError;
use materializer::{build_documents, load_snapshot};
use reconciler::Reconciler;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// What happens to existing children a reconciliation document leaves out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildPolicy {
    /// Omitted children are kept; documents only create and update
    #[default]
    Additive,
    /// A document that carries `sub_products` describes the node's complete
    /// child set; existing children it does not mention are deleted
    Replace,
}

impl fmt::Display for ChildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildPolicy::Additive => f.write_str("additive"),
            ChildPolicy::Replace => f.write_str("replace"),
        }
    }
}

impl FromStr for ChildPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "additive" => Ok(ChildPolicy::Additive),
            "replace" => Ok(ChildPolicy::Replace),
            other => Err(format!(
                "unknown child policy '{}', expected 'additive' or 'replace'",
                other
            )),
        }
    }
}

/// Materializer, reconciler and subtree deleter over one catalog database
#[derive(Clone)]
pub struct TreeService {
    db: Arc<DatabaseService>,
    resolver: Arc<dyn ImageResolver>,
    policy: ChildPolicy,
}

impl TreeService {
    pub fn new(db: Arc<DatabaseService>, resolver: Arc<dyn ImageResolver>) -> Self {
        Self {
            db,
            resolver,
            policy: ChildPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ChildPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ChildPolicy {
        self.policy
    }

    /// Materialize every root of the catalog, in creation order
    #[instrument(skip(self))]
    pub async fn materialize_roots(&self) -> Result<Vec<TreeDocument>, CatalogError> {
        let conn = self.db.begin_read().await?;
        let loaded = async {
            let nodes = catalog_store::list_nodes(&conn).await?;
            load_snapshot(&conn, nodes).await
        }
        .await;
        let snapshot = DatabaseService::finish(&conn, loaded).await?;

        let roots: Vec<i64> = snapshot.arena.roots().map(|node| node.id).collect();
        let documents = build_documents(&snapshot, &roots, self.resolver.as_ref()).await?;

        tracing::debug!("Materialized {} root trees", documents.len());
        Ok(documents)
    }

    /// Materialize a partial view starting at `roots`
    ///
    /// Each id yields one document; an unknown id is `NotFound`.
    #[instrument(skip(self))]
    pub async fn materialize_from(&self, roots: &[i64]) -> Result<Vec<TreeDocument>, CatalogError> {
        let conn = self.db.begin_read().await?;
        let loaded = async {
            let mut nodes = Vec::new();
            for &root in roots {
                let subtree = catalog_store::list_subtree(&conn, root).await?;
                if subtree.is_empty() {
                    return Err(CatalogError::not_found("Node", root));
                }
                nodes.extend(subtree);
            }
            load_snapshot(&conn, nodes).await
        }
        .await;
        let snapshot = DatabaseService::finish(&conn, loaded).await?;

        build_documents(&snapshot, roots, self.resolver.as_ref()).await
    }

    /// Upsert top-level documents as roots, atomically
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn reconcile(
        &self,
        documents: Vec<NodeDocument>,
    ) -> Result<ReconcileOutcome, CatalogError> {
        let conn = self.db.begin_write().await?;
        let result = Reconciler::new(&conn, self.policy)
            .run(documents, None)
            .await;
        let outcome = DatabaseService::finish(&conn, result).await?;

        tracing::info!(
            "Reconciled {} documents: {} created, {} updated, {} pruned",
            outcome.root_ids.len(),
            outcome.created,
            outcome.updated,
            outcome.pruned
        );
        Ok(outcome)
    }

    /// Upsert documents as children of an existing node, atomically
    ///
    /// The anchor and its ancestors cannot appear in `documents`, which would
    /// place a node below itself.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn reconcile_under(
        &self,
        parent_id: i64,
        documents: Vec<NodeDocument>,
    ) -> Result<ReconcileOutcome, CatalogError> {
        let conn = self.db.begin_write().await?;
        let result = async {
            let ancestors = ancestor_chain(&conn, parent_id).await?;
            Reconciler::new(&conn, self.policy)
                .forbid(ancestors)
                .run(documents, Some(parent_id))
                .await
        }
        .await;
        let outcome = DatabaseService::finish(&conn, result).await?;

        tracing::info!(
            "Reconciled {} documents under node {}: {} created, {} updated, {} pruned",
            outcome.root_ids.len(),
            parent_id,
            outcome.created,
            outcome.updated,
            outcome.pruned
        );
        Ok(outcome)
    }

    /// Delete a node and all of its descendants, atomically
    #[instrument(skip(self))]
    pub async fn delete_subtree(&self, id: i64) -> Result<DeleteResult, CatalogError> {
        let conn = self.db.begin_write().await?;
        let result = deleter::delete_subtree_in(&conn, id)
            .await
            .map_err(|e| e.in_transaction(&format!("deleting node {}", id)));
        let removed = DatabaseService::finish(&conn, result).await?;

        tracing::info!(
            "Deleted node {} with {} nodes and {} fabric images",
            id,
            removed.nodes_removed,
            removed.fabric_images_removed
        );
        Ok(removed)
    }
}

/// `id` followed by its ancestors up to the root
///
/// `NotFound` when `id` itself does not exist.
async fn ancestor_chain(
    conn: &libsql::Connection,
    id: i64,
) -> Result<HashSet<i64>, CatalogError> {
    let mut chain = HashSet::new();
    let mut current = Some(id);

    while let Some(node_id) = current {
        if !chain.insert(node_id) {
            break;
        }
        match catalog_store::get_node(conn, node_id).await? {
            Some(node) => current = node.parent_id,
            None if node_id == id => return Err(CatalogError::not_found("Node", id)),
            None => break,
        }
    }

    Ok(chain)
}
