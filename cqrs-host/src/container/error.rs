use thiserror::Error;

use super::ServiceKey;

/// Failure to produce a service from the container.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Nothing is registered under the key.
    #[error("no service registered for {key}")]
    NotRegistered { key: ServiceKey },
    /// A factory returned something other than the key's type.
    #[error("registration for {key} produced a value of a different type")]
    TypeMismatch { key: ServiceKey },
    /// A factory itself failed.
    #[error("failed to construct {key}: {message}")]
    Factory { key: ServiceKey, message: String },
}

impl ResolveError {
    /// Shorthand for [`ResolveError::Factory`].
    pub fn factory(key: ServiceKey, message: impl Into<String>) -> Self {
        Self::Factory {
            key,
            message: message.into(),
        }
    }
}
