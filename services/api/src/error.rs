//! HTTP error responses for the few failures reported before a WebSocket
//! upgrade.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// The remote live session could not be established.
    Upstream(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Upstream(err) => {
                error!("Live session unavailable: {:?}", err);
                let message = "The live agent session could not be started.".to_string();
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}
