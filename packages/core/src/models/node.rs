//! Node Data Structures
//!
//! This module defines the `CatalogNode` row and related types for the
//! product tree.
//!
//! # Architecture
//!
//! - **Single table**: roots, categories, styles and attribute options are all
//!   rows of the `nodes` table, linked by `parent_id`
//! - **Attribute keys**: a child that sets `attribute_name` is an *option*
//!   filed under that key when the tree is materialized; a parent that lists
//!   keys in `attributes_list` only accepts options for those keys
//! - **Meta type**: descriptive only, never drives server-side branching
//!
//! # Examples
//!
//! ```rust
//! use tailorspace_core::models::{MetaType, NodeDraft};
//!
//! let lapel = NodeDraft::new("Lapel")
//!     .with_parent(1)
//!     .with_meta_type(MetaType::Category)
//!     .with_attributes(vec!["width".to_string()]);
//! assert!(lapel.validate().is_ok());
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Document field names an attribute key may not shadow
pub const RESERVED_DOCUMENT_KEYS: &[&str] = &[
    "id",
    "name",
    "description",
    "price",
    "meta_type",
    "attributes_list",
    "attributes",
    "attribute_name",
    "fabric_group_id",
    "image_urls",
    "fabrics",
    "fabric_images",
    "sub_products",
    "parent_id",
];

/// Whether `key` collides with a fixed document field
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_DOCUMENT_KEYS.contains(&key)
}

/// Validation errors for node and fabric input
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid meta type: {0}")]
    InvalidMetaType(String),

    #[error("Attribute key '{0}' collides with a document field")]
    ReservedAttributeKey(String),

    #[error("Invalid fabric reference in fabric_images: {0}")]
    InvalidFabricKey(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Circular reference: node {node_id} cannot be placed under {parent_id}")]
    CircularParent { node_id: i64, parent_id: i64 },
}

/// Role of a node in the product tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaType {
    Root,
    Category,
    #[default]
    Product,
    Attribute,
}

impl MetaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaType::Root => "root",
            MetaType::Category => "category",
            MetaType::Product => "product",
            MetaType::Attribute => "attribute",
        }
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetaType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(MetaType::Root),
            "category" => Ok(MetaType::Category),
            "product" => Ok(MetaType::Product),
            "attribute" => Ok(MetaType::Attribute),
            other => Err(ValidationError::InvalidMetaType(other.to_string())),
        }
    }
}

/// One row of the `nodes` table
///
/// # Fields
///
/// - `id`: store-assigned identity, ascending in creation order
/// - `name`: display label, required
/// - `price`: defaults to zero
/// - `image_urls`: stored image reference (unresolved)
/// - `parent_id`: `None` marks a root
/// - `attributes_list`: grouping keys the node's children may be filed under
/// - `fabric_group_id`: swatch catalog, usually only on roots
/// - `attribute_name`: set when this node is an option of its parent's key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogNode {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image_urls: Option<String>,
    pub parent_id: Option<i64>,
    pub meta_type: MetaType,
    pub attributes_list: Vec<String>,
    pub fabric_group_id: Option<i64>,
    pub attribute_name: Option<String>,
}

impl CatalogNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Apply a sparse update in place
    pub fn apply(&mut self, update: NodeUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(image_urls) = update.image_urls {
            self.image_urls = image_urls;
        }
        if let Some(parent_id) = update.parent_id {
            self.parent_id = parent_id;
        }
        if let Some(meta_type) = update.meta_type {
            self.meta_type = meta_type;
        }
        if let Some(attributes) = update.attributes_list {
            self.attributes_list = decode_attributes(&attributes);
        }
        if let Some(fabric_group_id) = update.fabric_group_id {
            self.fabric_group_id = fabric_group_id;
        }
        if let Some(attribute_name) = update.attribute_name {
            self.attribute_name = attribute_name;
        }
    }

    /// Check the invariants a row must satisfy before it is written
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        validate_attribute_keys(&self.attributes_list)
    }
}

/// Decode an attributes list sent either structured or string-encoded
///
/// - `["width", "Buttonhole"]` → the list
/// - `"[\"width\"]"` → the decoded list
/// - anything malformed (bad JSON, non-string entries, other types) → empty
pub fn decode_attributes(value: &Value) -> Vec<String> {
    match value {
        Value::String(encoded) => serde_json::from_str(encoded).unwrap_or_default(),
        Value::Array(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Reject attribute keys that would shadow a fixed document field
pub fn validate_attribute_keys(keys: &[String]) -> Result<(), ValidationError> {
    match keys.iter().find(|key| is_reserved_key(key)) {
        Some(key) => Err(ValidationError::ReservedAttributeKey(key.clone())),
        None => Ok(()),
    }
}

fn default_attributes() -> Value {
    Value::Array(Vec::new())
}

/// Input for creating a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub meta_type: MetaType,
    /// Structured or string-encoded list, see [`decode_attributes`]
    #[serde(default = "default_attributes")]
    pub attributes_list: Value,
    #[serde(default)]
    pub fabric_group_id: Option<i64>,
    #[serde(default)]
    pub attribute_name: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_urls: Option<String>,
}

impl NodeDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent_id: None,
            meta_type: MetaType::default(),
            attributes_list: default_attributes(),
            fabric_group_id: None,
            attribute_name: None,
            price: 0.0,
            image_urls: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_meta_type(mut self, meta_type: MetaType) -> Self {
        self.meta_type = meta_type;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes_list = Value::from(attributes);
        self
    }

    pub fn with_attribute_name(mut self, attribute_name: impl Into<String>) -> Self {
        self.attribute_name = Some(attribute_name.into());
        self
    }

    pub fn with_fabric_group(mut self, fabric_group_id: i64) -> Self {
        self.fabric_group_id = Some(fabric_group_id);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_image(mut self, image_urls: impl Into<String>) -> Self {
        self.image_urls = Some(image_urls.into());
        self
    }

    /// Decoded attribute keys
    pub fn attributes(&self) -> Vec<String> {
        decode_attributes(&self.attributes_list)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        validate_attribute_keys(&self.attributes())
    }
}

/// Custom deserializer for optional fields that accepts both plain values and null
///
/// Maps three input formats to the double-Option pattern:
/// - Missing field → None (don't update)
/// - null → Some(None) (set to NULL)
/// - value → Some(Some(value)) (set to value)
pub(crate) fn deserialize_optional_field<'de, D, T>(
    deserializer: D,
) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial node update structure for PUT operations
///
/// Nullable columns use a double-`Option`:
///
/// - `None`: Don't change this field
/// - `Some(None)`: Set the field to NULL
/// - `Some(Some(value))`: Set the field to the specified value
///
/// # Examples
///
/// ```rust
/// # use tailorspace_core::models::NodeUpdate;
/// let update = NodeUpdate {
///     name: Some("Peak".to_string()),
///     attribute_name: Some(None),
///     ..Default::default()
/// };
/// assert!(!update.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub description: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub image_urls: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent_id: Option<Option<i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_type: Option<MetaType>,

    /// Structured or string-encoded list, see [`decode_attributes`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_list: Option<Value>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub fabric_group_id: Option<Option<i64>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub attribute_name: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if update contains any changes
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.image_urls.is_none()
            && self.parent_id.is_none()
            && self.meta_type.is_none()
            && self.attributes_list.is_none()
            && self.fabric_group_id.is_none()
            && self.attribute_name.is_none()
    }
}

/// Result of a subtree delete
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    /// Nodes removed, the target included
    pub nodes_removed: usize,
    /// Per-fabric image overrides removed with those nodes
    pub fabric_images_removed: usize,
}
