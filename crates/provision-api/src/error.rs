//! API errors

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provision_engine::EngineError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// JSON body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for_kind(self.kind())
    }

    fn message(&self) -> String {
        match self {
            Self::Engine(e) => e.message(),
        }
    }
}

/// Status code for an engine error kind
pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "missing_argument" | "input_error" | "invalid_metadata" | "missing_metadata"
        | "unknown_type" | "invalid_policy_template" => StatusCode::BAD_REQUEST,
        "invalid_uuid" | "active_model_invalid" | "no_callback_found" => StatusCode::NOT_FOUND,
        "conflict" => StatusCode::CONFLICT,
        "no_connection" => StatusCode::SERVICE_UNAVAILABLE,
        "command_failed" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", self.kind(), self);
        } else {
            warn!("Request rejected ({}): {}", self.kind(), self.message());
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for_kind("missing_argument"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_kind("invalid_uuid"), StatusCode::NOT_FOUND);
        assert_eq!(status_for_kind("conflict"), StatusCode::CONFLICT);
        assert_eq!(status_for_kind("no_connection"), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for_kind("command_failed"), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for_kind("internal_error"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_engine_error_keeps_its_message() {
        let err = ApiError::from(EngineError::InvalidUuid("Invalid Model UUID [x]".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Invalid Model UUID [x]");
    }
}
