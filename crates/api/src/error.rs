//! Control-plane error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shunt_config::ConfigError;
use shunt_routing::RoutingError;
use thiserror::Error;

/// A failed control-plane request, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body is not a valid rules document
    #[error("failed to decode rules document: {0}")]
    Decode(#[source] ConfigError),

    /// The routing table rejected the update
    #[error("failed to update routing table: {0}")]
    Routing(#[from] RoutingError),

    /// The routing table was updated but persisting the merge failed
    #[error("failed to persist rules: {0}")]
    Persist(#[source] ConfigError),
}

impl ApiError {
    /// Stage tag reported to the client
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Routing(_) => "routing",
            Self::Persist(_) => "persist",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Routing(_) | Self::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body returned for every failed request
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    stage: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            stage: self.stage(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
