//! Fabric swatch catalog types

use serde::{Deserialize, Serialize};

/// Named collection of fabrics, e.g. "Premium Wools"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A swatch belonging to exactly one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fabric {
    pub id: i64,
    pub name: String,
    pub image_urls: Option<String>,
    pub fabric_group_id: i64,
}

/// Image override for one (node, fabric) pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFabricImage {
    pub node_id: i64,
    pub fabric_id: i64,
    pub image_urls: String,
}

/// Input for creating a fabric group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFabricGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input for creating a fabric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFabric {
    pub name: String,
    pub fabric_group_id: i64,
    #[serde(default)]
    pub image_urls: Option<String>,
}

/// Fabric entry as served to clients, image already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricSwatch {
    pub id: i64,
    pub name: String,
    pub image_urls: Option<String>,
}
