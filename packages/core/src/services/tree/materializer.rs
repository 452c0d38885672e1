//! Tree Materializer
//!
//! Materialization runs in two phases:
//!
//! 1. [`load_snapshot`] reads nodes, fabrics and overrides inside one read
//!    unit of work and checks fabric group references.
//! 2. [`build_documents`] resolves image references (outside the unit of
//!    work) and assembles the nested documents bottom-up from the arena.

use super::arena::NodeArena;
use crate::db::catalog_store;
use crate::images::ImageResolver;
use crate::models::{
    is_reserved_key, CatalogNode, Fabric, FabricSwatch, NodeFabricImage, TreeDocument,
};
use crate::services::CatalogError;
use libsql::Connection;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Everything materialization needs, read in one consistent pass
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub arena: NodeArena,
    /// fabric group id → fabrics, for groups referenced by the arena
    pub fabrics: HashMap<i64, Vec<Fabric>>,
    /// node id → overrides owned by that node
    pub overrides: HashMap<i64, Vec<NodeFabricImage>>,
}

/// Read fabrics and overrides belonging to `nodes`
///
/// A node that references a fabric group which does not exist fails the
/// whole load.
pub(crate) async fn load_snapshot(
    conn: &Connection,
    nodes: Vec<CatalogNode>,
) -> Result<Snapshot, CatalogError> {
    let arena = NodeArena::new(nodes);

    let group_ids: HashSet<i64> = catalog_store::list_fabric_groups(conn)
        .await?
        .into_iter()
        .map(|group| group.id)
        .collect();

    let mut fabrics: HashMap<i64, Vec<Fabric>> = HashMap::new();
    for node in arena.iter() {
        let Some(group_id) = node.fabric_group_id else {
            continue;
        };
        if !group_ids.contains(&group_id) {
            return Err(CatalogError::not_found(
                "Fabric group",
                format!("{} (referenced by node {})", group_id, node.id),
            ));
        }
        if !fabrics.contains_key(&group_id) {
            let group_fabrics = catalog_store::list_fabrics_in_group(conn, group_id).await?;
            fabrics.insert(group_id, group_fabrics);
        }
    }

    let mut overrides: HashMap<i64, Vec<NodeFabricImage>> = HashMap::new();
    for image in catalog_store::list_fabric_images(conn).await? {
        if arena.contains(image.node_id) {
            overrides.entry(image.node_id).or_default().push(image);
        }
    }

    Ok(Snapshot {
        arena,
        fabrics,
        overrides,
    })
}

/// Stored reference → resolved URL, one resolver call per distinct reference
#[derive(Debug, Default)]
struct ResolvedImages {
    urls: HashMap<String, String>,
}

impl ResolvedImages {
    async fn collect(snapshot: &Snapshot, resolver: &dyn ImageResolver) -> Self {
        let references = snapshot
            .arena
            .iter()
            .filter_map(|node| node.image_urls.as_deref())
            .chain(
                snapshot
                    .fabrics
                    .values()
                    .flatten()
                    .filter_map(|fabric| fabric.image_urls.as_deref()),
            )
            .chain(
                snapshot
                    .overrides
                    .values()
                    .flatten()
                    .map(|image| image.image_urls.as_str()),
            );

        let mut urls = HashMap::new();
        for reference in references {
            if reference.is_empty() || urls.contains_key(reference) {
                continue;
            }
            let url = resolver.resolve(reference).await;
            urls.insert(reference.to_string(), url);
        }
        Self { urls }
    }

    fn get(&self, reference: &str) -> String {
        self.urls
            .get(reference)
            .cloned()
            .unwrap_or_else(|| reference.to_string())
    }

    fn get_opt(&self, reference: Option<&str>) -> Option<String> {
        reference.map(|r| self.get(r))
    }
}

/// Key a child is filed under on its parent's document, if any
///
/// A parent without an attributes list groups by the child's attribute name
/// alone; a parent with one only groups under keys it lists.
fn grouping_key<'a>(parent: &CatalogNode, child: &'a CatalogNode) -> Option<&'a str> {
    let key = child.attribute_name.as_deref()?;
    if is_reserved_key(key) {
        return None;
    }
    if !parent.attributes_list.is_empty() && !parent.attributes_list.iter().any(|k| k == key) {
        return None;
    }
    Some(key)
}

fn node_document(node: &CatalogNode, snapshot: &Snapshot, images: &ResolvedImages) -> TreeDocument {
    let fabrics = node.fabric_group_id.map(|group_id| {
        snapshot
            .fabrics
            .get(&group_id)
            .map(|fabrics| {
                fabrics
                    .iter()
                    .map(|fabric| FabricSwatch {
                        id: fabric.id,
                        name: fabric.name.clone(),
                        image_urls: images.get_opt(fabric.image_urls.as_deref()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    });

    let fabric_images: BTreeMap<i64, String> = snapshot
        .overrides
        .get(&node.id)
        .map(|overrides| {
            overrides
                .iter()
                .map(|image| (image.fabric_id, images.get(&image.image_urls)))
                .collect()
        })
        .unwrap_or_default();

    TreeDocument {
        id: node.id,
        name: node.name.clone(),
        description: node.description.clone(),
        meta_type: node.meta_type,
        attributes_list: node.attributes_list.clone(),
        attribute_name: node.attribute_name.clone(),
        fabric_group_id: node.fabric_group_id,
        price: node.price,
        image_urls: images.get_opt(node.image_urls.as_deref()),
        fabrics,
        fabric_images,
        sub_products: Vec::new(),
        attribute_groups: Default::default(),
    }
}

/// Assemble the document rooted at `root` from already-built child documents
///
/// Nodes are visited in reverse pre-order, so every child's document exists
/// by the time its parent is assembled.
fn build_one(root: i64, snapshot: &Snapshot, images: &ResolvedImages) -> Option<TreeDocument> {
    let arena = &snapshot.arena;
    let mut built: HashMap<i64, TreeDocument> = HashMap::new();

    for id in arena.preorder(root).into_iter().rev() {
        let node = arena.get(id)?;
        let mut document = node_document(node, snapshot, images);

        for child in arena.children(id) {
            let Some(child_document) = built.remove(&child.id) else {
                continue;
            };
            match grouping_key(node, child) {
                Some(key) => document.attribute_groups.push(key, child_document),
                None => document.sub_products.push(child_document),
            }
        }

        built.insert(id, document);
    }

    built.remove(&root)
}

/// Build one document per root, in the order given
pub(crate) async fn build_documents(
    snapshot: &Snapshot,
    roots: &[i64],
    resolver: &dyn ImageResolver,
) -> Result<Vec<TreeDocument>, CatalogError> {
    let images = ResolvedImages::collect(snapshot, resolver).await;

    roots
        .iter()
        .map(|&root| {
            build_one(root, snapshot, &images).ok_or_else(|| CatalogError::not_found("Node", root))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::PassthroughResolver;
    use crate::models::MetaType;
    use async_trait::async_trait;

    fn node(id: i64, parent_id: Option<i64>, name: &str) -> CatalogNode {
        CatalogNode {
            id,
            name: name.to_string(),
            description: None,
            price: 0.0,
            image_urls: None,
            parent_id,
            meta_type: MetaType::Product,
            attributes_list: Vec::new(),
            fabric_group_id: None,
            attribute_name: None,
        }
    }

    fn snapshot(nodes: Vec<CatalogNode>) -> Snapshot {
        Snapshot {
            arena: NodeArena::new(nodes),
            ..Default::default()
        }
    }

    struct Prefixing;

    #[async_trait]
    impl ImageResolver for Prefixing {
        async fn resolve(&self, stored: &str) -> String {
            format!("signed:{}", stored)
        }
    }

    #[tokio::test]
    async fn test_children_partitioned_by_attribute_name() {
        let mut lapel = node(2, Some(1), "Lapel");
        lapel.attributes_list = vec!["width".to_string()];
        let mut narrow = node(3, Some(2), "Narrow");
        narrow.attribute_name = Some("width".to_string());
        let mut wide = node(5, Some(2), "Wide");
        wide.attribute_name = Some("width".to_string());
        let mut stray = node(4, Some(2), "Stray");
        stray.attribute_name = Some("color".to_string());

        let snapshot = snapshot(vec![node(1, None, "Suit Jacket"), lapel, narrow, stray, wide]);
        let docs = build_documents(&snapshot, &[1], &PassthroughResolver)
            .await
            .unwrap();

        let lapel = &docs[0].sub_products[0];
        assert_eq!(lapel.name, "Lapel");
        let width: Vec<&str> = lapel.group("width").iter().map(|d| d.name.as_str()).collect();
        assert_eq!(width, vec!["Narrow", "Wide"]);
        let subs: Vec<&str> = lapel.sub_products.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(subs, vec!["Stray"]);
    }

    #[tokio::test]
    async fn test_parent_without_list_groups_by_attribute_name() {
        let mut lapel = node(2, Some(1), "Lapel");
        lapel.attributes_list = vec!["width".to_string(), "Buttonhole".to_string()];
        let mut narrow = node(4, Some(3), "Narrow");
        narrow.attribute_name = Some("width".to_string());
        let mut handmade = node(5, Some(3), "Handmade");
        handmade.attribute_name = Some("Buttonhole".to_string());
        let mut odd = node(6, Some(3), "Odd");
        odd.attribute_name = Some("price".to_string());

        let snapshot = snapshot(vec![
            node(1, None, "Suit"),
            lapel,
            node(3, Some(2), "Notch"),
            narrow,
            handmade,
            odd,
        ]);
        let docs = build_documents(&snapshot, &[1], &PassthroughResolver)
            .await
            .unwrap();

        let notch = &docs[0].sub_products[0].sub_products[0];
        assert_eq!(notch.name, "Notch");
        assert_eq!(notch.group("width")[0].name, "Narrow");
        assert_eq!(notch.group("Buttonhole")[0].name, "Handmade");
        let subs: Vec<&str> = notch.sub_products.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(subs, vec!["Odd"]);
    }

    #[tokio::test]
    async fn test_reserved_attribute_name_goes_to_sub_products() {
        let mut parent = node(1, None, "Root");
        parent.attributes_list = vec!["fabrics".to_string()];
        let mut child = node(2, Some(1), "Odd");
        child.attribute_name = Some("fabrics".to_string());

        let docs = build_documents(&snapshot(vec![parent, child]), &[1], &PassthroughResolver)
            .await
            .unwrap();
        assert_eq!(docs[0].sub_products.len(), 1);
        assert!(docs[0].attribute_groups.is_empty());
    }

    #[tokio::test]
    async fn test_images_resolved_and_fabrics_embedded() {
        let mut root = node(1, None, "Suit");
        root.image_urls = Some("suit.jpg".to_string());
        root.fabric_group_id = Some(10);

        let mut snapshot = snapshot(vec![root, node(2, Some(1), "Plain")]);
        snapshot.fabrics.insert(
            10,
            vec![Fabric {
                id: 7,
                name: "Blue Wool".to_string(),
                image_urls: Some("wool.jpg".to_string()),
                fabric_group_id: 10,
            }],
        );
        snapshot.overrides.insert(
            1,
            vec![NodeFabricImage {
                node_id: 1,
                fabric_id: 7,
                image_urls: "suit-wool.jpg".to_string(),
            }],
        );

        let docs = build_documents(&snapshot, &[1], &Prefixing).await.unwrap();
        let root = &docs[0];
        assert_eq!(root.image_urls.as_deref(), Some("signed:suit.jpg"));
        let fabrics = root.fabrics.as_ref().unwrap();
        assert_eq!(fabrics[0].image_urls.as_deref(), Some("signed:wool.jpg"));
        assert_eq!(root.fabric_images.get(&7).unwrap(), "signed:suit-wool.jpg");

        let plain = &root.sub_products[0];
        assert!(plain.fabrics.is_none());
        assert!(plain.fabric_images.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_root_is_not_found() {
        let result = build_documents(&snapshot(vec![node(1, None, "A")]), &[9], &PassthroughResolver).await;
        assert!(matches!(result, Err(CatalogError::NotFound { .. })));
    }
}
