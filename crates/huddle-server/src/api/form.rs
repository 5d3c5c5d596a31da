use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use bytes::Bytes;
use serde_json::Value;

use crate::error::ServerError;

/// Multipart field carrying an uploaded picture, with or without a filename.
const IMAGE_FIELD: &str = "image";

/// Request body as flat text fields plus an optional image.
///
/// Accepts `multipart/form-data`, a JSON object, or no body at all, so the
/// same handler serves browser forms and API clients.
#[derive(Debug, Default)]
pub struct FormInput {
    fields: HashMap<String, String>,
    pub image: Option<Bytes>,
}

impl FormInput {
    /// The field's value; empty strings count as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).filter(|v| !v.is_empty()).cloned()
    }

    /// Parse a field, rejecting malformed values.
    pub fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>, ServerError> {
        match self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| ServerError::Validation(format!("Invalid {name}: '{raw}'"))),
            None => Ok(None),
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::Validation(format!("Multipart error: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == IMAGE_FIELD {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::Validation(format!("Failed to read image: {}", e)))?;
                if !data.is_empty() {
                    form.image = Some(data);
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::Validation(format!("Failed to read field: {}", e)))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    fn from_json(object: HashMap<String, Value>) -> Self {
        let fields = object
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some((key, text))
            })
            .collect();
        Self {
            fields,
            image: None,
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormInput
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ServerError::Validation(e.body_text()))?;
            Self::from_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(object) = Json::<HashMap<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| ServerError::Validation(e.body_text()))?;
            Ok(Self::from_json(object))
        } else {
            Ok(Self::default())
        }
    }
}
