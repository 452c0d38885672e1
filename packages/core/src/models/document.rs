//! Nested tree documents exchanged with clients
//!
//! [`TreeDocument`] is what materialization produces. Children whose
//! `attribute_name` matches one of the parent's attribute keys are filed under
//! that key; every other child sits in `sub_products`:
//!
//! ```json
//! {
//!   "id": 2, "name": "Lapel", "attributes_list": ["width"],
//!   "sub_products": [],
//!   "width": [{ "id": 3, "name": "Narrow", "attribute_name": "width", ... }]
//! }
//! ```
//!
//! [`NodeDocument`] is the inbound, sparse shape accepted by reconciliation.
//! It deserializes anything a `TreeDocument` serializes to, so an unmodified
//! materialized tree can be sent straight back.

use crate::models::fabric::FabricSwatch;
use crate::models::node::{
    decode_attributes, deserialize_optional_field, MetaType, ValidationError,
};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Children grouped by attribute key, keys kept in first-use order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeGroups {
    groups: Vec<(String, Vec<TreeDocument>)>,
}

impl AttributeGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `document` under `key`, creating the key on first use
    pub fn push(&mut self, key: &str, document: TreeDocument) {
        match self.groups.iter_mut().find(|(k, _)| k == key) {
            Some((_, documents)) => documents.push(document),
            None => self.groups.push((key.to_string(), vec![document])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[TreeDocument]> {
        self.groups
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, documents)| documents.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }
}

impl Serialize for AttributeGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (key, documents) in &self.groups {
            map.serialize_entry(key, documents)?;
        }
        map.end()
    }
}

/// One materialized node with its nested children
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeDocument {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub meta_type: MetaType,
    pub attributes_list: Vec<String>,
    pub attribute_name: Option<String>,
    pub fabric_group_id: Option<i64>,
    pub price: f64,
    /// Resolved image reference
    pub image_urls: Option<String>,
    /// The attached group's swatches, present only when a group is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fabrics: Option<Vec<FabricSwatch>>,
    /// Fabric id → resolved override image for this node
    pub fabric_images: BTreeMap<i64, String>,
    pub sub_products: Vec<TreeDocument>,
    #[serde(flatten)]
    pub attribute_groups: AttributeGroups,
}

impl TreeDocument {
    /// Children filed under `key`, empty when the key is unused
    pub fn group(&self, key: &str) -> &[TreeDocument] {
        self.attribute_groups.get(key).unwrap_or(&[])
    }

    /// Total number of nodes in this document, itself included
    pub fn node_count(&self) -> usize {
        1 + self
            .sub_products
            .iter()
            .chain(self.attribute_groups.groups.iter().flat_map(|(_, d)| d.iter()))
            .map(TreeDocument::node_count)
            .sum::<usize>()
    }
}

/// Inbound node document for reconciliation
///
/// Every scalar is optional: absent fields are left unchanged on update and
/// take column defaults on create. Nullable columns use the double-Option
/// pattern so an explicit `null` clears the column.
///
/// Attribute-key child arrays arrive as arbitrary top-level keys and are kept
/// in `extra` until the reconciler knows which keys the node supports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeDocument {
    #[serde(default)]
    pub id: Option<i64>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub description: Option<Option<String>>,

    #[serde(default)]
    pub price: Option<f64>,

    #[serde(default)]
    pub meta_type: Option<MetaType>,

    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub attribute_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub fabric_group_id: Option<Option<i64>>,

    /// Structured or string-encoded attribute keys
    #[serde(default, alias = "attributes")]
    pub attributes_list: Option<Value>,

    /// Fabric id (as a JSON object key) → override image; empty values skipped
    #[serde(default)]
    pub fabric_images: Option<BTreeMap<String, Option<String>>>,

    /// `None` when the key is absent, which matters under the replace policy
    #[serde(default)]
    pub sub_products: Option<Vec<NodeDocument>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeDocument {
    /// A document for a node that does not exist yet
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A document addressing an existing node
    pub fn existing(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Decode a reconcile request body: one document or an array of them
    ///
    /// Shape errors, unknown meta types included, are validation failures.
    pub fn batch_from_value(value: Value) -> Result<Vec<NodeDocument>, ValidationError> {
        let value = match value {
            Value::Object(_) => Value::Array(vec![value]),
            other => other,
        };
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidDocument(e.to_string()))
    }

    /// Decoded attribute keys, if the document carries any
    pub fn attributes(&self) -> Option<Vec<String>> {
        self.attributes_list.as_ref().map(decode_attributes)
    }

    /// Raw value stored under an attribute key
    pub fn attribute_value(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn with_child(mut self, child: NodeDocument) -> Self {
        self.sub_products.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn with_attribute_children(mut self, key: &str, children: Vec<Value>) -> Self {
        self.extra.insert(key.to_string(), Value::Array(children));
        self
    }
}
