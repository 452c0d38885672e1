//! Data Models
//!
//! This module contains the core data structures of the catalog:
//!
//! - `CatalogNode` - one row of the self-referential product tree
//! - `FabricGroup` / `Fabric` / `NodeFabricImage` - swatch catalog
//! - `TreeDocument` / `NodeDocument` - nested documents exchanged with clients

mod document;
mod fabric;
mod node;

pub use document::{AttributeGroups, NodeDocument, TreeDocument};
pub use fabric::{Fabric, FabricGroup, FabricSwatch, NewFabric, NewFabricGroup, NodeFabricImage};
pub use node::{
    decode_attributes, is_reserved_key, validate_attribute_keys, CatalogNode, DeleteResult,
    MetaType, NodeDraft, NodeUpdate, ValidationError, RESERVED_DOCUMENT_KEYS,
};
