use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rngesus_engine::EngineError;
use rngesus_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The parent record cannot support the request yet, e.g. rolling a
    /// character before the campaign has classes.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The generation backend failed before anything was produced.
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingParent(what) => ServerError::NotFound(what.to_string()),
            other => ServerError::Store(other),
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::IncompleteCampaign(reason) => ServerError::Conflict(reason),
            EngineError::Backend(e) => ServerError::Generation(e.to_string()),
            EngineError::Unpersisted(what) => {
                ServerError::Internal(format!("{what} has no id"))
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Generation(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            ServerError::Store(e) => {
                tracing::error!(error = %e, "Storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Internal(e) => {
                tracing::error!(error = %e, "Internal failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
