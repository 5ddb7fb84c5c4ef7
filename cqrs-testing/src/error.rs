use axum::http::StatusCode;
use cqrs_host::{HostError, ResolveError};
use thiserror::Error;

/// Failures of the harness itself, as opposed to verification failures.
#[derive(Debug, Error)]
pub enum TestingError {
    /// The application was configured after the host was built.
    #[error("the host is already built; configure the application before first use")]
    HostAlreadyBuilt,
    /// The host failed to build earlier; the message is the original error.
    #[error("an earlier attempt to build the host failed: {0}")]
    HostBuildFailed(String),
    /// The host failed to build.
    #[error(transparent)]
    Host(#[from] HostError),
    /// A service lookup on the built host failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A test request could not be assembled.
    #[error("invalid test request: {0}")]
    Request(#[from] axum::http::Error),
    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(#[source] axum::Error),
    /// A request or response body that does not (de)serialize.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A URL pattern that does not compile.
    #[error("invalid URL glob: {0}")]
    Glob(#[from] globset::Error),
    /// A canned response content type that is not a valid header value.
    #[error("invalid content type `{content_type}` for a canned response")]
    InvalidContentType { content_type: String },
    /// A response that was required to succeed did not.
    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
}
