//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `TreeService` - materialize, reconcile and delete whole product trees
//! - `CatalogService` - single-record CRUD for fabrics, groups and nodes
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and owning the unit-of-work boundaries.

pub mod catalog_service;
pub mod error;
pub mod tree;

pub use catalog_service::CatalogService;
pub use error::CatalogError;
pub use tree::{ChildPolicy, ReconcileOutcome, TreeService};
