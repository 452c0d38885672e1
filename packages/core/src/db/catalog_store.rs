//! Catalog Store - repository functions over a libsql connection
//!
//! Every function takes the connection it runs on, so callers decide the unit
//! of work: a function called on a connection returned by
//! [`DatabaseService::begin_write`](crate::db::DatabaseService::begin_write)
//! participates in that transaction.
//!
//! No function here applies business rules beyond what the schema enforces;
//! validation, identity resolution and recursion live in the services.

use crate::db::error::DatabaseError;
use crate::models::{
    decode_attributes, CatalogNode, Fabric, FabricGroup, MetaType, NodeFabricImage,
};
use libsql::{Connection, Row};
use serde_json::Value;

const NODE_COLUMNS: &str = "id, name, description, price, image_urls, parent_id, meta_type, \
                            attributes_list, fabric_group_id, attribute_name";

/// Column values for inserting or rewriting a node row
#[derive(Debug, Clone)]
pub struct DbNodeParams<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub price: f64,
    pub image_urls: Option<&'a str>,
    pub parent_id: Option<i64>,
    pub meta_type: MetaType,
    pub attributes_list: &'a [String],
    pub fabric_group_id: Option<i64>,
    pub attribute_name: Option<&'a str>,
}

impl<'a> From<&'a CatalogNode> for DbNodeParams<'a> {
    fn from(node: &'a CatalogNode) -> Self {
        Self {
            name: &node.name,
            description: node.description.as_deref(),
            price: node.price,
            image_urls: node.image_urls.as_deref(),
            parent_id: node.parent_id,
            meta_type: node.meta_type,
            attributes_list: &node.attributes_list,
            fabric_group_id: node.fabric_group_id,
            attribute_name: node.attribute_name.as_deref(),
        }
    }
}

fn encode_attributes(attributes: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(attributes)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to encode attributes: {}", e)))
}

macro_rules! column {
    ($row:expr, $idx:expr, $name:expr) => {
        $row.get($idx)
            .map_err(|e| DatabaseError::corrupt_row(format!("Failed to get {}: {}", $name, e)))?
    };
}

/// Convert a row selected with `NODE_COLUMNS` into a node
///
/// The stored attributes list is decoded defensively: a malformed value
/// reads back as an empty list rather than failing the whole read.
fn row_to_node(row: &Row) -> Result<CatalogNode, DatabaseError> {
    let meta_type: String = column!(row, 6, "meta_type");
    let attributes_json: String = column!(row, 7, "attributes_list");

    Ok(CatalogNode {
        id: column!(row, 0, "id"),
        name: column!(row, 1, "name"),
        description: column!(row, 2, "description"),
        price: column!(row, 3, "price"),
        image_urls: column!(row, 4, "image_urls"),
        parent_id: column!(row, 5, "parent_id"),
        meta_type: meta_type
            .parse()
            .map_err(|e| DatabaseError::corrupt_row(format!("{}", e)))?,
        attributes_list: decode_attributes(&Value::String(attributes_json)),
        fabric_group_id: column!(row, 8, "fabric_group_id"),
        attribute_name: column!(row, 9, "attribute_name"),
    })
}

async fn collect_nodes(mut rows: libsql::Rows) -> Result<Vec<CatalogNode>, DatabaseError> {
    let mut nodes = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        nodes.push(row_to_node(&row)?);
    }
    Ok(nodes)
}

async fn collect_ids(mut rows: libsql::Rows) -> Result<Vec<i64>, DatabaseError> {
    let mut ids = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        ids.push(column!(&row, 0, "id"));
    }
    Ok(ids)
}

//
// NODES
//

/// Load one node by identity
pub async fn get_node(conn: &Connection, id: i64) -> Result<Option<CatalogNode>, DatabaseError> {
    let rows = conn
        .query(
            &format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS),
            [id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to load node", e))?;

    Ok(collect_nodes(rows).await?.into_iter().next())
}

/// Load every node in creation order
pub async fn list_nodes(conn: &Connection) -> Result<Vec<CatalogNode>, DatabaseError> {
    let rows = conn
        .query(
            &format!("SELECT {} FROM nodes ORDER BY id ASC", NODE_COLUMNS),
            (),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to list nodes", e))?;

    collect_nodes(rows).await
}

/// Load `root_id` and all of its descendants in creation order
pub async fn list_subtree(
    conn: &Connection,
    root_id: i64,
) -> Result<Vec<CatalogNode>, DatabaseError> {
    let rows = conn
        .query(
            &format!(
                "WITH RECURSIVE subtree(id) AS (
                    SELECT id FROM nodes WHERE id = ?
                    UNION
                    SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
                 )
                 SELECT {} FROM nodes WHERE id IN (SELECT id FROM subtree) ORDER BY id ASC",
                NODE_COLUMNS
            ),
            [root_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to load subtree", e))?;

    collect_nodes(rows).await
}

/// Identities of the direct children of `parent_id`, in creation order
pub async fn child_ids(conn: &Connection, parent_id: i64) -> Result<Vec<i64>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id FROM nodes WHERE parent_id = ? ORDER BY id ASC",
            [parent_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to list children", e))?;

    collect_ids(rows).await
}

/// Whether `candidate` is `ancestor` itself or lies below it
pub async fn is_in_subtree(
    conn: &Connection,
    ancestor: i64,
    candidate: i64,
) -> Result<bool, DatabaseError> {
    let rows = conn
        .query(
            "WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION
                SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
             )
             SELECT id FROM subtree WHERE id = ?2",
            (ancestor, candidate),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to walk subtree", e))?;

    Ok(!collect_ids(rows).await?.is_empty())
}

/// Insert a node and return its store-assigned identity
pub async fn insert_node(
    conn: &Connection,
    params: DbNodeParams<'_>,
) -> Result<i64, DatabaseError> {
    let attributes = encode_attributes(params.attributes_list)?;

    conn.execute(
        "INSERT INTO nodes (name, description, price, image_urls, parent_id, meta_type, attributes_list, fabric_group_id, attribute_name)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            params.name,
            params.description,
            params.price,
            params.image_urls,
            params.parent_id,
            params.meta_type.as_str(),
            attributes,
            params.fabric_group_id,
            params.attribute_name,
        ),
    )
    .await
    .map_err(|e| DatabaseError::from_statement(&format!("Failed to insert node '{}'", params.name), e))?;

    Ok(conn.last_insert_rowid())
}

/// Rewrite every column of an existing node
///
/// Returns the number of rows affected (0 = node didn't exist).
pub async fn update_node(
    conn: &Connection,
    id: i64,
    params: DbNodeParams<'_>,
) -> Result<u64, DatabaseError> {
    let attributes = encode_attributes(params.attributes_list)?;

    conn.execute(
        "UPDATE nodes SET name = ?, description = ?, price = ?, image_urls = ?, parent_id = ?,
                          meta_type = ?, attributes_list = ?, fabric_group_id = ?, attribute_name = ?
         WHERE id = ?",
        (
            params.name,
            params.description,
            params.price,
            params.image_urls,
            params.parent_id,
            params.meta_type.as_str(),
            attributes,
            params.fabric_group_id,
            params.attribute_name,
            id,
        ),
    )
    .await
    .map_err(|e| DatabaseError::from_statement(&format!("Failed to update node {}", id), e))
}

/// Delete a single node row
pub async fn delete_node(conn: &Connection, id: i64) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM nodes WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::from_statement(&format!("Failed to delete node {}", id), e))
}

//
// PER-FABRIC IMAGE OVERRIDES
//

/// Create or replace the override for one (node, fabric) pair
pub async fn upsert_fabric_image(
    conn: &Connection,
    node_id: i64,
    fabric_id: i64,
    image_urls: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO node_fabric_images (node_id, fabric_id, image_urls) VALUES (?, ?, ?)
         ON CONFLICT(node_id, fabric_id) DO UPDATE SET image_urls = excluded.image_urls",
        (node_id, fabric_id, image_urls),
    )
    .await
    .map_err(|e| {
        DatabaseError::from_statement(
            &format!("Failed to store image of node {} for fabric {}", node_id, fabric_id),
            e,
        )
    })?;
    Ok(())
}

/// Remove all overrides owned by a node
pub async fn delete_fabric_images_for_node(
    conn: &Connection,
    node_id: i64,
) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM node_fabric_images WHERE node_id = ?", [node_id])
        .await
        .map_err(|e| {
            DatabaseError::from_statement(
                &format!("Failed to delete fabric images of node {}", node_id),
                e,
            )
        })
}

/// Load every override, ordered by node then fabric
pub async fn list_fabric_images(conn: &Connection) -> Result<Vec<NodeFabricImage>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT node_id, fabric_id, image_urls FROM node_fabric_images ORDER BY node_id, fabric_id",
            (),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to list fabric images", e))?;

    let mut images = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        images.push(NodeFabricImage {
            node_id: column!(&row, 0, "node_id"),
            fabric_id: column!(&row, 1, "fabric_id"),
            image_urls: column!(&row, 2, "image_urls"),
        });
    }
    Ok(images)
}

//
// FABRIC GROUPS AND FABRICS
//

pub async fn insert_fabric_group(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO fabric_groups (name, description) VALUES (?, ?)",
        (name, description),
    )
    .await
    .map_err(|e| DatabaseError::from_statement("Failed to insert fabric group", e))?;

    Ok(conn.last_insert_rowid())
}

pub async fn list_fabric_groups(conn: &Connection) -> Result<Vec<FabricGroup>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, name, description FROM fabric_groups ORDER BY id ASC",
            (),
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to list fabric groups", e))?;

    let mut groups = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        groups.push(FabricGroup {
            id: column!(&row, 0, "id"),
            name: column!(&row, 1, "name"),
            description: column!(&row, 2, "description"),
        });
    }
    Ok(groups)
}

pub async fn get_fabric_group(
    conn: &Connection,
    id: i64,
) -> Result<Option<FabricGroup>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, name, description FROM fabric_groups WHERE id = ?",
            [id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to load fabric group", e))?;

    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        Some(row) => Ok(Some(FabricGroup {
            id: column!(row, 0, "id"),
            name: column!(row, 1, "name"),
            description: column!(row, 2, "description"),
        })),
        None => Ok(None),
    }
}

/// Delete a group; its fabrics and their overrides go with it
pub async fn delete_fabric_group(conn: &Connection, id: i64) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM fabric_groups WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to delete fabric group", e))
}

pub async fn insert_fabric(
    conn: &Connection,
    name: &str,
    image_urls: Option<&str>,
    fabric_group_id: i64,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO fabrics (name, image_urls, fabric_group_id) VALUES (?, ?, ?)",
        (name, image_urls, fabric_group_id),
    )
    .await
    .map_err(|e| DatabaseError::from_statement("Failed to insert fabric", e))?;

    Ok(conn.last_insert_rowid())
}

async fn query_fabrics(
    conn: &Connection,
    group: Option<i64>,
) -> Result<Vec<Fabric>, DatabaseError> {
    let mut rows = match group {
        Some(group_id) => conn
            .query(
                "SELECT id, name, image_urls, fabric_group_id FROM fabrics
                 WHERE fabric_group_id = ? ORDER BY id ASC",
                [group_id],
            )
            .await,
        None => conn
            .query(
                "SELECT id, name, image_urls, fabric_group_id FROM fabrics ORDER BY id ASC",
                (),
            )
            .await,
    }
    .map_err(|e| DatabaseError::from_statement("Failed to list fabrics", e))?;

    let mut fabrics = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        fabrics.push(Fabric {
            id: column!(&row, 0, "id"),
            name: column!(&row, 1, "name"),
            image_urls: column!(&row, 2, "image_urls"),
            fabric_group_id: column!(&row, 3, "fabric_group_id"),
        });
    }
    Ok(fabrics)
}

pub async fn get_fabric(conn: &Connection, id: i64) -> Result<Option<Fabric>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, name, image_urls, fabric_group_id FROM fabrics WHERE id = ?",
            [id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("Failed to load fabric", e))?;

    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
    {
        Some(row) => Ok(Some(Fabric {
            id: column!(row, 0, "id"),
            name: column!(row, 1, "name"),
            image_urls: column!(row, 2, "image_urls"),
            fabric_group_id: column!(row, 3, "fabric_group_id"),
        })),
        None => Ok(None),
    }
}

/// Every fabric in creation order
pub async fn list_fabrics(conn: &Connection) -> Result<Vec<Fabric>, DatabaseError> {
    query_fabrics(conn, None).await
}

/// Fabrics of one group in creation order
pub async fn list_fabrics_in_group(
    conn: &Connection,
    fabric_group_id: i64,
) -> Result<Vec<Fabric>, DatabaseError> {
    query_fabrics(conn, Some(fabric_group_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseService;
    use tempfile::TempDir;

    async fn setup() -> (DatabaseService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("store.db"))
            .await
            .unwrap();
        (db, temp_dir)
    }

    fn params<'a>(name: &'a str, parent_id: Option<i64>, attrs: &'a [String]) -> DbNodeParams<'a> {
        DbNodeParams {
            name,
            description: None,
            price: 0.0,
            image_urls: None,
            parent_id,
            meta_type: MetaType::Product,
            attributes_list: attrs,
            fabric_group_id: None,
            attribute_name: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ascending_ids() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let root = insert_node(&conn, params("Suit Jacket", None, &[])).await.unwrap();
        let lapel = insert_node(&conn, params("Lapel", Some(root), &[])).await.unwrap();
        let pockets = insert_node(&conn, params("Pockets", Some(root), &[])).await.unwrap();

        assert!(root < lapel && lapel < pockets);
        assert_eq!(child_ids(&conn, root).await.unwrap(), vec![lapel, pockets]);
    }

    #[tokio::test]
    async fn test_attributes_round_trip_and_corrupt_value() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let attrs = vec!["width".to_string(), "Buttonhole".to_string()];
        let id = insert_node(&conn, params("Lapel", None, &attrs)).await.unwrap();
        let node = get_node(&conn, id).await.unwrap().unwrap();
        assert_eq!(node.attributes_list, attrs);
        assert_eq!(node.meta_type, MetaType::Product);

        conn.execute(
            "UPDATE nodes SET attributes_list = 'not json' WHERE id = ?",
            [id],
        )
        .await
        .unwrap();
        let node = get_node(&conn, id).await.unwrap().unwrap();
        assert!(node.attributes_list.is_empty());
    }

    #[tokio::test]
    async fn test_subtree_queries() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let root = insert_node(&conn, params("Root", None, &[])).await.unwrap();
        let child = insert_node(&conn, params("Child", Some(root), &[])).await.unwrap();
        let grandchild = insert_node(&conn, params("Grandchild", Some(child), &[]))
            .await
            .unwrap();
        let other = insert_node(&conn, params("Other", None, &[])).await.unwrap();

        let ids: Vec<i64> = list_subtree(&conn, root)
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![root, child, grandchild]);

        assert!(is_in_subtree(&conn, root, grandchild).await.unwrap());
        assert!(is_in_subtree(&conn, child, child).await.unwrap());
        assert!(!is_in_subtree(&conn, child, root).await.unwrap());
        assert!(!is_in_subtree(&conn, root, other).await.unwrap());
    }

    #[tokio::test]
    async fn test_fabric_image_upsert_is_unique_per_pair() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let group = insert_fabric_group(&conn, "Suit Fabrics", None).await.unwrap();
        let wool = insert_fabric(&conn, "Blue Wool", Some("wool.jpg"), group)
            .await
            .unwrap();
        let node = insert_node(&conn, params("Notch", None, &[])).await.unwrap();

        upsert_fabric_image(&conn, node, wool, "notch-wool-v1.jpg").await.unwrap();
        upsert_fabric_image(&conn, node, wool, "notch-wool-v2.jpg").await.unwrap();

        let images = list_fabric_images(&conn).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].image_urls, "notch-wool-v2.jpg");
    }

    #[tokio::test]
    async fn test_unknown_fabric_is_constraint_violation() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let node = insert_node(&conn, params("Notch", None, &[])).await.unwrap();
        let err = upsert_fabric_image(&conn, node, 999, "x.jpg").await.unwrap_err();
        assert!(err.is_constraint_violation(), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_get_fabric_group_by_id() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        insert_fabric_group(&conn, "Winter Wools", None).await.unwrap();
        let linens = insert_fabric_group(&conn, "Summer Linens", Some("light")).await.unwrap();

        let group = get_fabric_group(&conn, linens).await.unwrap().unwrap();
        assert_eq!(group.name, "Summer Linens");
        assert_eq!(group.description.as_deref(), Some("light"));
        assert!(get_fabric_group(&conn, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_group_delete_cascades() {
        let (db, _tmp) = setup().await;
        let conn = db.connect_with_timeout().await.unwrap();

        let group = insert_fabric_group(&conn, "Summer Linens", Some("light")).await.unwrap();
        let linen = insert_fabric(&conn, "Grey Linen", None, group).await.unwrap();
        let mut root_params = params("Suit", None, &[]);
        root_params.fabric_group_id = Some(group);
        let root = insert_node(&conn, root_params).await.unwrap();
        upsert_fabric_image(&conn, root, linen, "suit-linen.jpg").await.unwrap();

        assert_eq!(delete_fabric_group(&conn, group).await.unwrap(), 1);

        assert!(list_fabrics(&conn).await.unwrap().is_empty());
        assert!(list_fabric_images(&conn).await.unwrap().is_empty());
        let root = get_node(&conn, root).await.unwrap().unwrap();
        assert_eq!(root.fabric_group_id, None);
    }
}
