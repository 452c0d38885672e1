//! Catalog Service - single-record operations
//!
//! Direct create/read/update/delete for fabric groups, fabrics, individual
//! nodes and per-fabric image overrides. Whole-tree edits go through
//! [`TreeService`]; deleting a node here delegates to its subtree deleter.

use crate::db::{catalog_store, DatabaseService, DbNodeParams};
use crate::images::ImageResolver;
use crate::models::{
    decode_attributes, CatalogNode, DeleteResult, Fabric, FabricGroup, NewFabric,
    NewFabricGroup, NodeDraft, NodeFabricImage, NodeUpdate, ValidationError,
};
use crate::services::tree::TreeService;
use crate::services::CatalogError;
use std::sync::Arc;

fn require_name(name: &str) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField("name".to_string()).into());
    }
    Ok(())
}

#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseService>,
    resolver: Arc<dyn ImageResolver>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseService>, resolver: Arc<dyn ImageResolver>) -> Self {
        Self { db, resolver }
    }

    //
    // FABRIC GROUPS
    //

    pub async fn create_fabric_group(
        &self,
        group: NewFabricGroup,
    ) -> Result<FabricGroup, CatalogError> {
        require_name(&group.name)?;

        let conn = self.db.connect_with_timeout().await?;
        let id = catalog_store::insert_fabric_group(&conn, &group.name, group.description.as_deref())
            .await?;

        tracing::info!("Created fabric group {} '{}'", id, group.name);
        Ok(FabricGroup {
            id,
            name: group.name,
            description: group.description,
        })
    }

    pub async fn list_fabric_groups(&self) -> Result<Vec<FabricGroup>, CatalogError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(catalog_store::list_fabric_groups(&conn).await?)
    }

    /// Delete a group together with its fabrics and their overrides
    ///
    /// Nodes that referenced the group keep existing with no group attached.
    pub async fn delete_fabric_group(&self, id: i64) -> Result<(), CatalogError> {
        let conn = self.db.connect_with_timeout().await?;
        if catalog_store::delete_fabric_group(&conn, id).await? == 0 {
            return Err(CatalogError::not_found("Fabric group", id));
        }
        tracing::info!("Deleted fabric group {}", id);
        Ok(())
    }

    //
    // FABRICS
    //

    pub async fn create_fabric(&self, fabric: NewFabric) -> Result<Fabric, CatalogError> {
        require_name(&fabric.name)?;

        let conn = self.db.connect_with_timeout().await?;
        if catalog_store::get_fabric_group(&conn, fabric.fabric_group_id)
            .await?
            .is_none()
        {
            return Err(CatalogError::not_found(
                "Fabric group",
                fabric.fabric_group_id,
            ));
        }

        let id = catalog_store::insert_fabric(
            &conn,
            &fabric.name,
            fabric.image_urls.as_deref(),
            fabric.fabric_group_id,
        )
        .await?;

        Ok(Fabric {
            id,
            name: fabric.name,
            image_urls: fabric.image_urls,
            fabric_group_id: fabric.fabric_group_id,
        })
    }

    /// A group's fabrics with image references resolved
    pub async fn list_fabrics(&self, fabric_group_id: i64) -> Result<Vec<Fabric>, CatalogError> {
        let conn = self.db.connect_with_timeout().await?;
        if catalog_store::get_fabric_group(&conn, fabric_group_id)
            .await?
            .is_none()
        {
            return Err(CatalogError::not_found("Fabric group", fabric_group_id));
        }

        let mut fabrics = catalog_store::list_fabrics_in_group(&conn, fabric_group_id).await?;
        for fabric in &mut fabrics {
            fabric.image_urls = self.resolver.resolve_opt(fabric.image_urls.as_deref()).await;
        }
        Ok(fabrics)
    }

    //
    // NODES
    //

    pub async fn create_node(&self, draft: NodeDraft) -> Result<CatalogNode, CatalogError> {
        draft.validate()?;
        let attributes = draft.attributes();

        let conn = self.db.connect_with_timeout().await?;
        if let Some(parent_id) = draft.parent_id {
            if catalog_store::get_node(&conn, parent_id).await?.is_none() {
                return Err(CatalogError::not_found("Parent node", parent_id));
            }
        }

        let mut node = CatalogNode {
            id: 0,
            name: draft.name,
            description: draft.description,
            price: draft.price,
            image_urls: draft.image_urls,
            parent_id: draft.parent_id,
            meta_type: draft.meta_type,
            attributes_list: attributes,
            fabric_group_id: draft.fabric_group_id,
            attribute_name: draft.attribute_name,
        };
        node.id = catalog_store::insert_node(&conn, DbNodeParams::from(&node)).await?;

        tracing::info!("Created node {} '{}'", node.id, node.name);
        Ok(node)
    }

    pub async fn get_node(&self, id: i64) -> Result<CatalogNode, CatalogError> {
        let conn = self.db.connect_with_timeout().await?;
        catalog_store::get_node(&conn, id)
            .await?
            .ok_or_else(|| CatalogError::not_found("Node", id))
    }

    /// Apply a sparse update to one node
    ///
    /// A new parent must exist and must not lie inside the node's own subtree.
    pub async fn update_node(
        &self,
        id: i64,
        update: NodeUpdate,
    ) -> Result<CatalogNode, CatalogError> {
        if let Some(attributes) = &update.attributes_list {
            crate::models::validate_attribute_keys(&decode_attributes(attributes))?;
        }

        let conn = self.db.begin_write().await?;
        let result = async {
            let mut node = catalog_store::get_node(&conn, id)
                .await?
                .ok_or_else(|| CatalogError::not_found("Node", id))?;

            if let Some(Some(parent_id)) = update.parent_id {
                if catalog_store::get_node(&conn, parent_id).await?.is_none() {
                    return Err(CatalogError::not_found("Parent node", parent_id));
                }
                if catalog_store::is_in_subtree(&conn, id, parent_id).await? {
                    return Err(ValidationError::CircularParent {
                        node_id: id,
                        parent_id,
                    }
                    .into());
                }
            }

            node.apply(update);
            node.validate()?;
            catalog_store::update_node(&conn, id, DbNodeParams::from(&node)).await?;
            Ok(node)
        }
        .await;

        DatabaseService::finish(&conn, result).await
    }

    /// Delete a node and its whole subtree
    pub async fn delete_node(&self, id: i64) -> Result<DeleteResult, CatalogError> {
        TreeService::new(self.db.clone(), self.resolver.clone())
            .delete_subtree(id)
            .await
    }

    //
    // PER-FABRIC IMAGE OVERRIDES
    //

    /// Create or replace the image shown for `node_id` in `fabric_id`
    pub async fn set_fabric_image(
        &self,
        node_id: i64,
        fabric_id: i64,
        image_urls: &str,
    ) -> Result<NodeFabricImage, CatalogError> {
        if image_urls.trim().is_empty() {
            return Err(ValidationError::MissingField("image_urls".to_string()).into());
        }

        let conn = self.db.connect_with_timeout().await?;
        if catalog_store::get_node(&conn, node_id).await?.is_none() {
            return Err(CatalogError::not_found("Node", node_id));
        }
        if catalog_store::get_fabric(&conn, fabric_id).await?.is_none() {
            return Err(CatalogError::not_found("Fabric", fabric_id));
        }

        catalog_store::upsert_fabric_image(&conn, node_id, fabric_id, image_urls).await?;
        Ok(NodeFabricImage {
            node_id,
            fabric_id,
            image_urls: image_urls.to_string(),
        })
    }
}
