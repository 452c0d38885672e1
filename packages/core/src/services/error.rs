//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for business logic failures.

use crate::db::DatabaseError;
use crate::images::ImageError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
///
/// Store errors arrive as [`DatabaseError`] and are split on the way in:
/// rejected constraints become `ConstraintViolation`, everything else stays
/// `Database`. Inside a reconcile or delete unit of work both are folded into
/// `TransactionFailed` by [`CatalogError::in_transaction`].
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Referenced identity does not resolve
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before anything was written
    #[error("Validation failed at {context}: {source}")]
    ValidationFailed {
        context: String,
        #[source]
        source: ValidationError,
    },

    /// Image upload or lookup failed
    #[error("Image operation failed: {0}")]
    ResolutionFailed(#[from] ImageError),

    /// The store rejected a write
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// A multi-step write failed and was rolled back
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(DatabaseError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConstraintViolation { context } => Self::ConstraintViolation(context),
            other => Self::Database(other),
        }
    }
}

impl From<ValidationError> for CatalogError {
    fn from(source: ValidationError) -> Self {
        Self::ValidationFailed {
            context: "input".to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl CatalogError {
    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a validation error located at `context`
    pub fn validation(context: impl Into<String>, source: ValidationError) -> Self {
        Self::ValidationFailed {
            context: context.into(),
            source,
        }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Fold a failure inside a unit of work into `TransactionFailed`
    ///
    /// `NotFound` and `ValidationFailed` keep their kind so callers can still
    /// tell bad input from a failed write.
    pub fn in_transaction(self, context: &str) -> Self {
        match self {
            Self::NotFound { .. } | Self::ValidationFailed { .. } => self,
            Self::TransactionFailed { .. } => self,
            other => Self::transaction_failed(format!("{}: {}", context, other)),
        }
    }

    /// Machine-readable code used by the HTTP surface
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationFailed { .. } => "VALIDATION_ERROR",
            Self::ResolutionFailed(_) => "RESOLUTION_FAILED",
            Self::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            Self::TransactionFailed { .. } => "TRANSACTION_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "INVALID_INPUT",
        }
    }
}
