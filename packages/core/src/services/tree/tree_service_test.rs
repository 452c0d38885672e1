//! Tests for reconciliation edge cases
//!
//! Covers placement under an anchor, the replace child policy, and the
//! guards that keep the parent graph acyclic.

use super::*;
use crate::images::PassthroughResolver;
use crate::models::{NodeDraft, ValidationError};
use crate::services::CatalogService;
use anyhow::Result;
use serde_json::{json, Value};
use tempfile::TempDir;

async fn create_test_services(policy: ChildPolicy) -> Result<(TreeService, CatalogService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db = Arc::new(DatabaseService::new(temp_dir.path().join("tree.db")).await?);
    let resolver: Arc<dyn ImageResolver> = Arc::new(PassthroughResolver);

    let tree = TreeService::new(db.clone(), resolver.clone()).with_policy(policy);
    let catalog = CatalogService::new(db, resolver);
    Ok((tree, catalog, temp_dir))
}

fn docs(value: Value) -> Vec<NodeDocument> {
    serde_json::from_value(value).unwrap()
}

async fn child_names(tree: &TreeService, id: i64) -> Result<Vec<String>> {
    let documents = tree.materialize_from(&[id]).await?;
    Ok(documents[0]
        .sub_products
        .iter()
        .map(|d| d.name.clone())
        .collect())
}

#[tokio::test]
async fn test_reconcile_under_places_documents_below_anchor() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    let jacket = catalog.create_node(NodeDraft::new("Suit Jacket")).await?;

    let outcome = tree
        .reconcile_under(jacket.id, docs(json!([{"name": "Lapel"}, {"name": "Pockets"}])))
        .await?;

    assert_eq!(outcome.created, 2);
    for id in &outcome.root_ids {
        assert_eq!(catalog.get_node(*id).await?.parent_id, Some(jacket.id));
    }
    assert_eq!(child_names(&tree, jacket.id).await?, vec!["Lapel", "Pockets"]);
    Ok(())
}

#[tokio::test]
async fn test_reconcile_under_missing_anchor() -> Result<()> {
    let (tree, _catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    let result = tree.reconcile_under(404, docs(json!([{"name": "Lapel"}]))).await;
    assert!(matches!(result, Err(CatalogError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_reconcile_under_rejects_anchor_ancestor() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    let jacket = catalog.create_node(NodeDraft::new("Suit Jacket")).await?;
    let lapel = catalog
        .create_node(NodeDraft::new("Lapel").with_parent(jacket.id))
        .await?;

    let result = tree
        .reconcile_under(lapel.id, docs(json!([{"id": jacket.id}])))
        .await;

    assert!(matches!(
        result,
        Err(CatalogError::ValidationFailed {
            source: ValidationError::CircularParent { .. },
            ..
        })
    ));
    assert_eq!(catalog.get_node(jacket.id).await?.parent_id, None);
    Ok(())
}

#[tokio::test]
async fn test_repeated_identity_is_rejected() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    let jacket = catalog.create_node(NodeDraft::new("Suit Jacket")).await?;

    let result = tree
        .reconcile(docs(json!([{
            "id": jacket.id,
            "sub_products": [{"id": jacket.id}]
        }])))
        .await;

    let err = result.err().unwrap();
    assert!(matches!(err, CatalogError::ValidationFailed { .. }));
    assert!(err.to_string().contains("documents[0].sub_products[0]"));
    assert_eq!(catalog.get_node(jacket.id).await?.parent_id, None);
    Ok(())
}

#[tokio::test]
async fn test_unknown_identity_creates_new_row() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;

    let outcome = tree
        .reconcile(docs(json!([{"id": 777, "name": "Waistcoat"}])))
        .await?;

    assert_eq!(outcome.created, 1);
    assert_ne!(outcome.root_ids[0], 777);
    assert_eq!(catalog.get_node(outcome.root_ids[0]).await?.name, "Waistcoat");
    Ok(())
}

#[tokio::test]
async fn test_client_parent_id_is_ignored() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    let jacket = catalog.create_node(NodeDraft::new("Suit Jacket")).await?;
    let trousers = catalog.create_node(NodeDraft::new("Trousers")).await?;

    let outcome = tree
        .reconcile(docs(json!([{
            "id": jacket.id,
            "sub_products": [{"name": "Lapel", "parent_id": trousers.id}]
        }])))
        .await?;

    let lapel_id = tree.materialize_from(&[jacket.id]).await?[0].sub_products[0].id;
    assert_eq!(catalog.get_node(lapel_id).await?.parent_id, Some(jacket.id));
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.created, 1);
    Ok(())
}

#[tokio::test]
async fn test_invalid_fabric_key_rejected() -> Result<()> {
    let (tree, _catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;

    let result = tree
        .reconcile(docs(json!([{"name": "Suit", "fabric_images": {"navy": "x.jpg"}}])))
        .await;

    assert!(matches!(
        result,
        Err(CatalogError::ValidationFailed {
            source: ValidationError::InvalidFabricKey(_),
            ..
        })
    ));
    assert!(tree.materialize_roots().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reserved_attribute_key_rejected() -> Result<()> {
    let (tree, _catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;

    let result = tree
        .reconcile(docs(json!([{"name": "Suit", "attributes_list": ["price"]}])))
        .await;

    assert!(matches!(
        result,
        Err(CatalogError::ValidationFailed {
            source: ValidationError::ReservedAttributeKey(_),
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn test_additive_policy_keeps_omitted_children() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    let jacket = catalog.create_node(NodeDraft::new("Suit Jacket")).await?;
    catalog
        .create_node(NodeDraft::new("Lapel").with_parent(jacket.id))
        .await?;

    let outcome = tree
        .reconcile(docs(json!([{"id": jacket.id, "sub_products": [{"name": "Vents"}]}])))
        .await?;

    assert_eq!(outcome.pruned, 0);
    assert_eq!(child_names(&tree, jacket.id).await?, vec!["Lapel", "Vents"]);
    Ok(())
}

#[tokio::test]
async fn test_replace_policy_prunes_omitted_children() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Replace).await?;
    let jacket = catalog.create_node(NodeDraft::new("Suit Jacket")).await?;
    let lapel = catalog
        .create_node(
            NodeDraft::new("Lapel")
                .with_parent(jacket.id)
                .with_attributes(vec!["width".to_string()]),
        )
        .await?;
    catalog
        .create_node(
            NodeDraft::new("Narrow")
                .with_parent(lapel.id)
                .with_attribute_name("width"),
        )
        .await?;
    catalog
        .create_node(NodeDraft::new("Pockets").with_parent(jacket.id))
        .await?;

    // Pockets is omitted; Lapel is kept and carries no sub_products key, so
    // its own children are untouched.
    let outcome = tree
        .reconcile(docs(json!([{
            "id": jacket.id,
            "sub_products": [{"id": lapel.id}, {"name": "Vents"}]
        }])))
        .await?;

    assert_eq!(outcome.pruned, 1);
    assert_eq!(child_names(&tree, jacket.id).await?, vec!["Lapel", "Vents"]);
    let lapel_doc = &tree.materialize_from(&[lapel.id]).await?[0];
    assert_eq!(lapel_doc.group("width").len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_replace_policy_keeps_children_written_under_attribute_keys() -> Result<()> {
    let (tree, catalog, _temp) = create_test_services(ChildPolicy::Replace).await?;
    let lapel = catalog
        .create_node(NodeDraft::new("Lapel").with_attributes(vec!["width".to_string()]))
        .await?;
    let narrow = catalog
        .create_node(
            NodeDraft::new("Narrow")
                .with_parent(lapel.id)
                .with_attribute_name("width"),
        )
        .await?;
    catalog
        .create_node(
            NodeDraft::new("Wide")
                .with_parent(lapel.id)
                .with_attribute_name("width"),
        )
        .await?;

    let outcome = tree
        .reconcile(docs(json!([{
            "id": lapel.id,
            "sub_products": [],
            "width": [{"id": narrow.id}]
        }])))
        .await?;

    assert_eq!(outcome.pruned, 1);
    let lapel_doc = &tree.materialize_from(&[lapel.id]).await?[0];
    let width: Vec<&str> = lapel_doc.group("width").iter().map(|d| d.name.as_str()).collect();
    assert_eq!(width, vec!["Narrow"]);
    Ok(())
}

#[tokio::test]
async fn test_options_below_unlisted_parent_group_and_survive_replace() -> Result<()> {
    let (tree, _catalog, _temp) = create_test_services(ChildPolicy::Replace).await?;
    tree.reconcile(docs(json!([{
        "name": "Suit",
        "meta_type": "root",
        "sub_products": [{
            "name": "Lapel",
            "attributes_list": ["width", "Buttonhole"],
            "sub_products": [{
                "name": "Notch",
                "sub_products": [],
                "width": [
                    {"name": "Narrow", "attribute_name": "width"},
                    {"name": "Standard", "attribute_name": "width"}
                ],
                "Buttonhole": [{"name": "Handmade", "attribute_name": "Buttonhole"}]
            }]
        }]
    }])))
    .await?;

    let before = tree.materialize_roots().await?;
    let notch = &before[0].sub_products[0].sub_products[0];
    assert_eq!(notch.name, "Notch");
    assert!(notch.sub_products.is_empty());
    let width: Vec<&str> = notch.group("width").iter().map(|d| d.name.as_str()).collect();
    assert_eq!(width, vec!["Narrow", "Standard"]);
    assert_eq!(notch.group("Buttonhole")[0].name, "Handmade");

    // Writing the materialized tree back keeps the grouped options
    let outcome = tree
        .reconcile(NodeDocument::batch_from_value(serde_json::to_value(&before)?)?)
        .await?;
    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.pruned, 0);
    assert_eq!(tree.materialize_roots().await?, before);
    Ok(())
}

#[tokio::test]
async fn test_delete_unknown_node() -> Result<()> {
    let (tree, _catalog, _temp) = create_test_services(ChildPolicy::Additive).await?;
    assert!(matches!(
        tree.delete_subtree(12).await,
        Err(CatalogError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_child_policy_parsing() {
    assert_eq!("Replace".parse::<ChildPolicy>().unwrap(), ChildPolicy::Replace);
    assert_eq!(" additive ".parse::<ChildPolicy>().unwrap(), ChildPolicy::Additive);
    assert!("merge".parse::<ChildPolicy>().is_err());
    assert_eq!(ChildPolicy::default().to_string(), "additive");
}
