use axum::http::StatusCode;
use thiserror::Error;

/// Outbound request failure.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A base address or request target that does not parse.
    #[error("invalid URL `{target}`: {source}")]
    InvalidUrl {
        target: String,
        #[source]
        source: url::ParseError,
    },
    /// Connection or protocol failure from the underlying client.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    /// The request could not be assembled.
    #[error("invalid HTTP request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
    /// A body that does not (de)serialize.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    /// A non-success response.
    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl HttpError {
    /// Shorthand for [`HttpError::InvalidUrl`].
    pub fn invalid_url(target: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            target: target.into(),
            source,
        }
    }
}
