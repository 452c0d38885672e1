//! TailorSpace Core Business Logic Layer
//!
//! This crate provides the data model, storage and tree synchronization
//! engine for the TailorSpace product catalog: customizable garments built
//! from categories, styles and selectable attribute options, with fabric
//! swatches attachable per product.
//!
//! # Architecture
//!
//! - **Single node table**: the whole product tree is one self-referential
//!   `nodes` table in an embedded libsql database
//! - **Nested documents on the wire**: clients read and write trees as nested
//!   documents; the [`services::TreeService`] converts in both directions
//! - **All-or-nothing writes**: every reconcile or delete runs in one
//!   transaction
//!
//! # Modules
//!
//! - [`models`] - Data structures (nodes, fabrics, tree documents)
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Tree engine and single-record catalog CRUD
//! - [`images`] - Image resolver and uploader collaborators

pub mod db;
pub mod images;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use db::{DatabaseError, DatabaseService};
pub use images::{ImageError, ImageResolver, ImageUploader};
pub use models::*;
pub use services::*;
