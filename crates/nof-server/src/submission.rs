//! Request bodies for write routes.
//!
//! Dashboards are driven both by scripts posting JSON and by plain HTML
//! forms. A [`Submission`] accepts either and normalises it to a JSON object.
//! Form fields left blank are dropped so an untouched optional input never
//! overrides a default, and a `return_url` field turns the response into a
//! redirect.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Form, FromRequest, Request};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub fields: Value,
    pub return_url: Option<String>,
}

impl Submission {
    /// Decode the fields into a typed body, reporting failures as 400.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.fields.clone()).map_err(|e| AppError::bad_request(e.to_string()))
    }

    /// Redirect to `return_url` when one was submitted, otherwise return
    /// `body` as JSON.
    pub fn respond(&self, body: Value) -> Response {
        match &self.return_url {
            Some(url) => (StatusCode::FOUND, [(LOCATION, url.clone())]).into_response(),
            None => Json(body).into_response(),
        }
    }

    fn from_object(mut object: Map<String, Value>) -> Self {
        let return_url = match object.remove("return_url") {
            Some(Value::String(url)) if !url.trim().is_empty() => Some(url),
            _ => None,
        };
        Self {
            fields: Value::Object(object),
            return_url,
        }
    }
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

impl<S> FromRequest<S> for Submission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(&req) {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            let object = fields
                .into_iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            return Ok(Self::from_object(object));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::from_object(Map::new()));
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(object)) => Ok(Self::from_object(object)),
            Ok(other) => Err(AppError::bad_request(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(AppError::bad_request(format!("invalid JSON: {e}"))),
        }
    }
}
