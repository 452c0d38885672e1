//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Schema bootstrap for nodes, fabric groups, fabrics and per-fabric images
//! - Repository functions that run on a caller-supplied connection
//!
//! # Architecture
//!
//! The catalog is one embedded SQLite file. Referential rules (parent
//! cascade, fabric group cascade, override uniqueness) are declared in the
//! schema and enforced by the store; services open a unit of work with
//! [`DatabaseService::begin_write`] and call into [`catalog_store`] on it.

pub mod catalog_store;
mod database;
mod error;

pub use catalog_store::DbNodeParams;
pub use database::DatabaseService;
pub use error::DatabaseError;
