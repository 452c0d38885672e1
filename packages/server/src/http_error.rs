//! HTTP error handling
//!
//! Every failure leaves the server as JSON `{message, code, details?}` with a
//! status derived from the code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tailorspace_core::{CatalogError, ImageError};

/// HTTP error response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpError {
    /// User-facing error message
    pub message: String,
    /// Machine-readable error code
    pub code: String,
    /// Optional detailed error information for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HttpError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(
        message: impl Into<String>,
        code: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            details: Some(details.into()),
        }
    }

    /// Malformed request body or parameter
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(message, "INVALID_INPUT")
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "INVALID_INPUT" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "LINK_EXPIRED" => StatusCode::FORBIDDEN,
            "CONSTRAINT_VIOLATION" => StatusCode::CONFLICT,
            "RESOLUTION_FAILED" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<CatalogError> for HttpError {
    fn from(err: CatalogError) -> Self {
        let code = err.code();
        match &err {
            CatalogError::ValidationFailed { context, .. } => {
                HttpError::with_details(err.to_string(), code, format!("at {}", context))
            }
            CatalogError::Database(inner) => {
                tracing::error!("Database failure: {:?}", inner);
                HttpError::with_details(err.to_string(), code, format!("{:?}", inner))
            }
            CatalogError::TransactionFailed { .. } => {
                tracing::error!("{}", err);
                HttpError::new(err.to_string(), code)
            }
            _ => HttpError::new(err.to_string(), code),
        }
    }
}

/// Errors from serving stored blobs directly
impl From<ImageError> for HttpError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::NotFound { .. } => HttpError::new(err.to_string(), "NOT_FOUND"),
            ImageError::Expired { .. } => HttpError::new(err.to_string(), "LINK_EXPIRED"),
            other => CatalogError::from(other).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailorspace_core::ValidationError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CatalogError::not_found("Node", 3), StatusCode::NOT_FOUND),
            (
                CatalogError::validation(
                    "documents[0]",
                    ValidationError::MissingField("name".to_string()),
                ),
                StatusCode::BAD_REQUEST,
            ),
            (
                CatalogError::ConstraintViolation("FOREIGN KEY constraint failed".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                CatalogError::transaction_failed("documents[1]"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CatalogError::Serialization("expected value".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(HttpError::from(err).status(), status);
        }
    }

    #[test]
    fn test_image_errors() {
        let expired = HttpError::from(ImageError::Expired {
            key: "lapel.jpg".to_string(),
        });
        assert_eq!(expired.status(), StatusCode::FORBIDDEN);

        let failed = HttpError::from(ImageError::EmptyUpload);
        assert_eq!(failed.code, "RESOLUTION_FAILED");
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_validation_details_carry_path() {
        let err = HttpError::from(CatalogError::validation(
            "documents[0].sub_products[1]",
            ValidationError::MissingField("name".to_string()),
        ));
        assert_eq!(err.details.as_deref(), Some("at documents[0].sub_products[1]"));
        assert!(serde_json::to_value(&err).unwrap().get("details").is_some());
    }
}
