//! Request bodies accepted as JSON or as multipart form data
//!
//! Form submissions carry every value as text, so the numeric columns are
//! parsed here and blank values become `null` before the body is decoded into
//! the same input types the JSON path uses. A file part named `image` is held
//! back until the handler hands it to the configured uploader.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use tailorspace_core::{CatalogError, ImageUploader};

use crate::http_error::HttpError;

const IMAGE_FIELD: &str = "image";

/// A file part received with a form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Body of a create or update request
#[derive(Debug, Default)]
pub struct FormPayload {
    fields: Map<String, Value>,
    image: Option<UploadedFile>,
}

impl FormPayload {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Upload the attached image, if any, and record its reference as `image_urls`
    ///
    /// Returns the stored reference so a failed write can discard it.
    pub async fn store_image(
        &mut self,
        uploader: &dyn ImageUploader,
    ) -> Result<Option<String>, HttpError> {
        let Some(file) = self.image.take() else {
            return Ok(None);
        };

        let stored = uploader
            .upload(&file.bytes, file.content_type.as_deref(), &file.file_name)
            .await
            .map_err(CatalogError::from)?;

        match &stored {
            Some(reference) => {
                self.fields
                    .insert("image_urls".to_string(), Value::String(reference.clone()));
            }
            None => tracing::warn!(
                "Image storage is not configured, upload '{}' ignored",
                file.file_name
            ),
        }
        Ok(stored)
    }

    /// Decode into an update type, keeping explicit nulls
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        serde_json::from_value(Value::Object(self.fields))
            .map_err(|e| HttpError::invalid_input(e.to_string()))
    }

    /// Decode into a create type; null fields fall back to their defaults
    pub fn parse_new<T: DeserializeOwned>(mut self) -> Result<T, HttpError> {
        self.fields.retain(|_, value| !value.is_null());
        self.parse()
    }
}

/// Remove the image uploaded for a request whose write failed
pub async fn discard_on_error<T>(
    uploader: &dyn ImageUploader,
    stored: Option<String>,
    result: Result<T, HttpError>,
) -> Result<T, HttpError> {
    if let (Err(_), Some(reference)) = (&result, stored) {
        if let Err(e) = uploader.discard(&reference).await {
            tracing::warn!("Failed to remove orphaned image '{}': {}", reference, e);
        }
    }
    result
}

#[async_trait]
impl<S> FromRequest<S> for FormPayload
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| HttpError::invalid_input(e.body_text()))?;
            return read_form(multipart).await;
        }

        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|e| HttpError::invalid_input(e.body_text()))?;
        match body {
            Value::Object(fields) => Ok(Self {
                fields,
                image: None,
            }),
            _ => Err(HttpError::invalid_input("Request body must be a JSON object")),
        }
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormPayload, HttpError> {
    let mut payload = FormPayload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::invalid_input(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| HttpError::invalid_input(e.body_text()))?;

            if name != IMAGE_FIELD {
                tracing::debug!("Ignoring unexpected file part '{}'", name);
            } else if bytes.is_empty() {
                tracing::debug!("Skipping empty image part '{}'", file_name);
            } else {
                payload.image = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| HttpError::invalid_input(e.body_text()))?;
        let value = coerce_text(&name, &text)?;
        payload.fields.insert(name, value);
    }

    Ok(payload)
}

/// Convert one form text value to the JSON the typed inputs expect
fn coerce_text(name: &str, text: &str) -> Result<Value, HttpError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    match name {
        "price" => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| HttpError::invalid_input(format!("price '{}' is not a number", trimmed))),
        "parent_id" | "fabric_group_id" => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| HttpError::invalid_input(format!("{} '{}' is not an id", name, trimmed))),
        _ => Ok(Value::String(text.to_string())),
    }
}
