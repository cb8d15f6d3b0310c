use std::io;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ffmpeg::{ManifestError, ToolError};
use crate::fetcher::FetchError;
use crate::models::Workflow;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    MissingFields(&'static str),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("{field} is not a valid http(s) URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{workflow} failed: {source}")]
    Tool {
        workflow: Workflow,
        #[source]
        source: ToolError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("scratch file error: {0}")]
    Io(#[from] io::Error),

    #[error("request exceeded its {0:?} deadline")]
    Timeout(Duration),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingFields(_) | AppError::InvalidBody(_) | AppError::InvalidUrl { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Server-side failures collapse to a
    /// generic string; the details only go to the log.
    pub fn client_message(&self) -> String {
        match self {
            AppError::MissingFields(_) | AppError::InvalidBody(_) | AppError::InvalidUrl { .. } => {
                self.to_string()
            }
            AppError::Tool { workflow, .. } => workflow.tool_failure_message().to_string(),
            AppError::Timeout(_) => "Request timed out".to_string(),
            AppError::Fetch(_) | AppError::Manifest(_) | AppError::Io(_) => {
                "Download or processing error".to_string()
            }
        }
    }
}

/// Body deserialization failures (wrong content type, malformed JSON, a
/// field of the wrong type) become a 400 in the usual error shape.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody(rejection.body_text())
    }
}

/// `Json<T>` whose rejection is an [`AppError`].
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for ValidatedJson<T>
where
    Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = AppError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ValidatedJson(value))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "Request failed");
        } else {
            tracing::debug!(error = %self, "Rejected request");
        }

        let body = ErrorResponse {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
