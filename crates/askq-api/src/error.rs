use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use askq_types::api::ErrorBody;

/// Failures of the question lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No (valid) caller identity for an operation that needs one.
    #[error("You are not signed in")]
    Unauthorized,

    /// Signed in, but the question belongs to someone else.
    #[error("Not your question")]
    NotYours,

    #[error("Question not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    /// Storage or event bus failure.
    #[error("upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl QueueError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotYours => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QueueError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Upstream(e) => {
                error!("{:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(ErrorBody { error: message })).into_response()
    }
}
