use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nof_core::NofError;

/// Sentinel carrying an explicit 404 through the `anyhow::Error` chain.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError: error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// 400 Bad Request.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(NofError::InvalidPayload(msg.into()).into())
    }

    /// 404 Not Found.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }

    pub fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<NotFoundError>().is_some() {
            return StatusCode::NOT_FOUND;
        }
        match self.0.downcast_ref::<NofError>() {
            Some(e) => match e {
                NofError::HostNotFound(_)
                | NofError::TaskTemplateNotFound(_)
                | NofError::TaskNotFound(_) => StatusCode::NOT_FOUND,
                NofError::DuplicateActivity(_) | NofError::EntityExists { .. } => {
                    StatusCode::CONFLICT
                }
                NofError::UnknownAction(_)
                | NofError::MissingField(_)
                | NofError::InvalidField { .. }
                | NofError::InvalidPayload(_)
                | NofError::InvalidTemplateType(_)
                | NofError::Json(_) => StatusCode::BAD_REQUEST,
                NofError::InvalidPattern(_) => StatusCode::UNPROCESSABLE_ENTITY,
                NofError::Storage(_) if !e.is_storage_failure() => StatusCode::CONFLICT,
                NofError::UnregisteredAction(_) | NofError::Storage(_) | NofError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
