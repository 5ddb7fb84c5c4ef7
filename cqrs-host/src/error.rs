//! Host failures and the JSON error body handlers answer with.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::{
    config::error::ConfigError, container::error::ResolveError,
    cqrs::HandlerError, http::error::HttpError,
};

/// Failure while composing or starting a [`Host`](crate::Host).
#[derive(Debug, Error)]
pub enum HostError {
    /// A configuration source failed to load.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// A container action asked for a backend type the host does not use.
    #[error("container backend is {actual}, not the requested {expected}")]
    ContainerTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// A service needed during the build could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// An HTTP client declaration was invalid.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Failure reported by application composition code.
    #[error("{0}")]
    Composition(String),
    /// The listener failed while serving.
    #[error("failed to serve host: {0}")]
    Serve(#[source] std::io::Error),
}

/// Result type for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned from route handlers; rendered as
/// `{"error": {"message", "status"}}`.
#[derive(Debug)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Rendered as `error.message`.
    pub message: String,
}

impl ApiError {
    /// Error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 500.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 400.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 404.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 502, for failed upstream calls.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<HandlerError> for ApiError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Resolve(err) => err.into(),
            other => {
                tracing::error!(error = %other, "handler failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        tracing::error!(error = %err, "service resolution failed");
        Self::internal(err.to_string())
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        tracing::warn!(error = %err, "downstream request failed");
        let not_found = matches!(
            &err,
            HttpError::Status { status, .. } if *status == StatusCode::NOT_FOUND
        );
        if not_found {
            Self::not_found(err.to_string())
        } else {
            Self::bad_gateway(err.to_string())
        }
    }
}
