//! Tree Reconciler
//!
//! Walks the inbound documents depth-first with an explicit stack. Each frame
//! carries the parent id assigned by the frame that pushed it, so a child is
//! only pushed once its parent row has an identity.
//!
//! Every write goes through the one connection the caller opened with
//! `begin_write`; the caller commits or rolls back the whole run.

use super::deleter::delete_subtree_in;
use super::ChildPolicy;
use crate::db::{catalog_store, DbNodeParams};
use crate::models::{is_reserved_key, CatalogNode, MetaType, NodeDocument, ValidationError};
use crate::services::CatalogError;
use libsql::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// What a reconciliation wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Ids of the top-level documents, in input order
    pub root_ids: Vec<i64>,
    pub created: usize,
    pub updated: usize,
    /// Nodes removed under [`ChildPolicy::Replace`]
    pub pruned: usize,
}

struct Frame {
    document: NodeDocument,
    parent: Option<i64>,
    path: String,
    top_level: bool,
}

pub(crate) struct Reconciler<'c> {
    conn: &'c Connection,
    policy: ChildPolicy,
    /// Ids that may not be re-parented in this run (an anchor and its ancestors)
    forbidden: HashSet<i64>,
    written: HashSet<i64>,
    /// parent id → ids written directly under it
    placed: HashMap<i64, HashSet<i64>>,
    replace_scopes: Vec<i64>,
    outcome: ReconcileOutcome,
}

impl<'c> Reconciler<'c> {
    pub fn new(conn: &'c Connection, policy: ChildPolicy) -> Self {
        Self {
            conn,
            policy,
            forbidden: HashSet::new(),
            written: HashSet::new(),
            placed: HashMap::new(),
            replace_scopes: Vec::new(),
            outcome: ReconcileOutcome::default(),
        }
    }

    pub fn forbid(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.forbidden.extend(ids);
        self
    }

    /// Upsert `documents` (and everything nested in them) under `parent`
    pub async fn run(
        mut self,
        documents: Vec<NodeDocument>,
        parent: Option<i64>,
    ) -> Result<ReconcileOutcome, CatalogError> {
        let mut stack: Vec<Frame> = documents
            .into_iter()
            .enumerate()
            .rev()
            .map(|(i, document)| Frame {
                document,
                parent,
                path: format!("documents[{}]", i),
                top_level: true,
            })
            .collect();

        while let Some(frame) = stack.pop() {
            let children = self.write_frame(frame).await?;
            stack.extend(children.into_iter().rev());
        }

        self.prune().await?;
        Ok(self.outcome)
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<Vec<Frame>, CatalogError> {
        let Frame {
            document,
            parent,
            path,
            top_level,
        } = frame;

        let (mut node, exists) = self.resolve_identity(&document, parent, &path).await?;
        apply_document(&mut node, &document);
        // Placement always comes from the recursion, never from the client
        node.parent_id = parent;
        node.validate()
            .map_err(|e| CatalogError::validation(path.as_str(), e))?;

        let id = self.persist(&node, exists, &path).await?;
        self.written.insert(id);
        if top_level {
            self.outcome.root_ids.push(id);
        }
        if let Some(parent_id) = parent {
            self.placed.entry(parent_id).or_default().insert(id);
        }

        self.write_fabric_images(id, &document, &path).await?;

        if self.policy == ChildPolicy::Replace && document.sub_products.is_some() {
            self.replace_scopes.push(id);
        }

        collect_children(document, &node.attributes_list, id, &path)
    }

    /// Load the row a document addresses, or start a fresh one
    async fn resolve_identity(
        &self,
        document: &NodeDocument,
        parent: Option<i64>,
        path: &str,
    ) -> Result<(CatalogNode, bool), CatalogError> {
        let Some(id) = document.id else {
            return Ok((blank_node(), false));
        };

        if self.forbidden.contains(&id) {
            return Err(CatalogError::validation(
                path,
                ValidationError::CircularParent {
                    node_id: id,
                    parent_id: parent.unwrap_or(id),
                },
            ));
        }

        let existing = catalog_store::get_node(self.conn, id)
            .await
            .map_err(|e| CatalogError::from(e).in_transaction(path))?;

        match existing {
            Some(_) if self.written.contains(&id) => Err(CatalogError::validation(
                path,
                ValidationError::InvalidDocument(format!(
                    "node {} appears more than once",
                    id
                )),
            )),
            Some(node) => Ok((node, true)),
            None => {
                tracing::debug!("{}: node {} does not exist, creating", path, id);
                Ok((blank_node(), false))
            }
        }
    }

    async fn persist(
        &mut self,
        node: &CatalogNode,
        exists: bool,
        path: &str,
    ) -> Result<i64, CatalogError> {
        let params = DbNodeParams::from(node);
        if exists {
            catalog_store::update_node(self.conn, node.id, params)
                .await
                .map_err(|e| CatalogError::from(e).in_transaction(path))?;
            self.outcome.updated += 1;
            Ok(node.id)
        } else {
            let id = catalog_store::insert_node(self.conn, params)
                .await
                .map_err(|e| CatalogError::from(e).in_transaction(path))?;
            self.outcome.created += 1;
            Ok(id)
        }
    }

    /// Upsert non-empty overrides; empty values never delete
    async fn write_fabric_images(
        &self,
        node_id: i64,
        document: &NodeDocument,
        path: &str,
    ) -> Result<(), CatalogError> {
        let Some(images) = &document.fabric_images else {
            return Ok(());
        };

        for (key, image) in images {
            let context = format!("{}.fabric_images.{}", path, key);
            let fabric_id: i64 = key.trim().parse().map_err(|_| {
                CatalogError::validation(
                    context.as_str(),
                    ValidationError::InvalidFabricKey(key.clone()),
                )
            })?;

            let Some(image) = image.as_deref().filter(|image| !image.is_empty()) else {
                continue;
            };

            catalog_store::upsert_fabric_image(self.conn, node_id, fabric_id, image)
                .await
                .map_err(|e| CatalogError::from(e).in_transaction(&context))?;
        }

        Ok(())
    }

    /// Delete existing children that this run did not write, per replace scope
    async fn prune(&mut self) -> Result<(), CatalogError> {
        for scope in std::mem::take(&mut self.replace_scopes) {
            let context = format!("pruning children of node {}", scope);
            let existing = catalog_store::child_ids(self.conn, scope)
                .await
                .map_err(|e| CatalogError::from(e).in_transaction(&context))?;

            for child in existing {
                let kept = self
                    .placed
                    .get(&scope)
                    .is_some_and(|placed| placed.contains(&child));
                if kept {
                    continue;
                }

                let removed = delete_subtree_in(self.conn, child)
                    .await
                    .map_err(|e| e.in_transaction(&context))?;
                self.outcome.pruned += removed.nodes_removed;
            }
        }
        Ok(())
    }
}

fn blank_node() -> CatalogNode {
    CatalogNode {
        id: 0,
        name: String::new(),
        description: None,
        price: 0.0,
        image_urls: None,
        parent_id: None,
        meta_type: MetaType::default(),
        attributes_list: Vec::new(),
        fabric_group_id: None,
        attribute_name: None,
    }
}

/// Copy the scalar fields a document carries onto `node`
fn apply_document(node: &mut CatalogNode, document: &NodeDocument) {
    if let Some(name) = &document.name {
        node.name = name.clone();
    }
    if let Some(description) = &document.description {
        node.description = description.clone();
    }
    if let Some(price) = document.price {
        node.price = price;
    }
    if let Some(meta_type) = document.meta_type {
        node.meta_type = meta_type;
    }
    if let Some(attribute_name) = &document.attribute_name {
        node.attribute_name = attribute_name.clone();
    }
    if let Some(fabric_group_id) = document.fabric_group_id {
        node.fabric_group_id = fabric_group_id;
    }
    if let Some(attributes) = document.attributes() {
        node.attributes_list = attributes;
    }
}

/// Child frames of a written node: `sub_products` first, then one array per
/// attribute key of the node, in attribute list order
///
/// A node with no attributes list takes its child arrays from whatever
/// non-reserved array keys the document carries, in key order.
fn collect_children(
    document: NodeDocument,
    attributes: &[String],
    id: i64,
    path: &str,
) -> Result<Vec<Frame>, CatalogError> {
    let NodeDocument {
        sub_products,
        mut extra,
        ..
    } = document;

    let mut children: Vec<Frame> = sub_products
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, child)| Frame {
            document: child,
            parent: Some(id),
            path: format!("{}.sub_products[{}]", path, i),
            top_level: false,
        })
        .collect();

    // Without an attributes list every non-reserved array is a child group
    let keys: Vec<String> = if attributes.is_empty() {
        extra
            .iter()
            .filter(|(key, value)| !is_reserved_key(key) && value.is_array())
            .map(|(key, _)| key.clone())
            .collect()
    } else {
        attributes.to_vec()
    };

    for key in &keys {
        if is_reserved_key(key) {
            continue;
        }
        // Removing the entry also collects a repeated key only once
        let Some(value) = extra.remove(key) else {
            continue;
        };
        let Value::Array(entries) = value else {
            tracing::debug!("{}.{} is not an array, ignoring", path, key);
            continue;
        };

        for (i, entry) in entries.into_iter().enumerate() {
            let child_path = format!("{}.{}[{}]", path, key, i);
            let child: NodeDocument = serde_json::from_value(entry).map_err(|e| {
                CatalogError::validation(
                    child_path.as_str(),
                    ValidationError::InvalidDocument(e.to_string()),
                )
            })?;
            children.push(Frame {
                document: child,
                parent: Some(id),
                path: child_path,
                top_level: false,
            });
        }
    }

    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> NodeDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_collect_children_order_and_paths() {
        let document = doc(json!({
            "name": "Lapel",
            "sub_products": [{"name": "Pocket"}],
            "width": [{"name": "Narrow"}, {"name": "Wide"}],
            "ignored": [{"name": "Not a key"}]
        }));
        let attributes = vec!["width".to_string(), "width".to_string()];

        let frames = collect_children(document, &attributes, 2, "documents[0]").unwrap();
        let paths: Vec<&str> = frames.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "documents[0].sub_products[0]",
                "documents[0].width[0]",
                "documents[0].width[1]"
            ]
        );
        assert!(frames.iter().all(|f| f.parent == Some(2) && !f.top_level));
    }

    #[test]
    fn test_collect_children_without_list_takes_array_keys() {
        let document = doc(json!({
            "name": "Notch",
            "width": [{"name": "Narrow", "attribute_name": "width"}],
            "Buttonhole": [{"name": "Handmade", "attribute_name": "Buttonhole"}],
            "fabrics": [{"id": 7, "name": "Blue Wool"}],
            "note": "not a group"
        }));

        let frames = collect_children(document, &[], 3, "documents[0]").unwrap();
        let paths: Vec<&str> = frames.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["documents[0].Buttonhole[0]", "documents[0].width[0]"]
        );
    }

    #[test]
    fn test_collect_children_rejects_malformed_entry() {
        let document = doc(json!({"name": "Lapel", "width": [{"name": 5}]}));
        let err = collect_children(document, &["width".to_string()], 2, "documents[0]")
            .err()
            .unwrap();
        assert!(err.to_string().contains("documents[0].width[0]"));
    }

    #[test]
    fn test_apply_document_leaves_absent_fields() {
        let mut node = blank_node();
        node.name = "Narrow".to_string();
        node.description = Some("slim".to_string());
        node.attributes_list = vec!["width".to_string()];

        apply_document(
            &mut node,
            &doc(json!({"price": 12.5, "attributes_list": "[broken"})),
        );

        assert_eq!(node.name, "Narrow");
        assert_eq!(node.description.as_deref(), Some("slim"));
        assert_eq!(node.price, 12.5);
        assert!(node.attributes_list.is_empty());
    }
}
