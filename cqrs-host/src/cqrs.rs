//! Command and query handler contracts.
//!
//! Handlers are registered in the container under `dyn CommandHandler<C>` or
//! `dyn QueryHandler<Q>` and resolved per request by the executors.

use std::any::type_name;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::container::{ServiceProvider, error::ResolveError};

/// Why a command or query did not complete.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler could be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A handler that was asked for a result it was never given.
    #[error("no result configured for {handler}")]
    Unconfigured { handler: &'static str },
    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Wraps a failure message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Handles a state-changing command. Commands produce no result.
#[async_trait]
pub trait CommandHandler<C: Send + 'static>: Send + Sync {
    /// Applies `command`.
    async fn handle(&self, command: C) -> Result<(), HandlerError>;
}

/// A read request and the type it produces.
pub trait Query: Send + 'static {
    /// What a handler answers with.
    type Output: Send + 'static;
}

/// Answers a [`Query`].
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    /// Answers `query`.
    async fn handle(&self, query: Q) -> Result<Q::Output, HandlerError>;
}

/// Dispatches commands to the handler registered for their type.
#[derive(Debug, Clone, Copy)]
pub struct CommandExecutor<'a> {
    services: &'a ServiceProvider,
}

impl<'a> CommandExecutor<'a> {
    /// Executor over `services`.
    pub fn new(services: &'a ServiceProvider) -> Self {
        Self { services }
    }

    /// Resolves the handler for `C` and runs it.
    pub async fn execute<C: Send + 'static>(
        &self,
        command: C,
    ) -> Result<(), HandlerError> {
        let handler = self.services.get::<dyn CommandHandler<C>>()?;
        debug!(command = type_name::<C>(), "executing command");
        handler.handle(command).await
    }
}

/// Dispatches queries to the handler registered for their type.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'a> {
    services: &'a ServiceProvider,
}

impl<'a> QueryExecutor<'a> {
    /// Executor over `services`.
    pub fn new(services: &'a ServiceProvider) -> Self {
        Self { services }
    }

    /// Resolves the handler for `Q` and returns its answer.
    pub async fn execute<Q: Query>(
        &self,
        query: Q,
    ) -> Result<Q::Output, HandlerError> {
        let handler = self.services.get::<dyn QueryHandler<Q>>()?;
        debug!(query = type_name::<Q>(), "executing query");
        handler.handle(query).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::container::ServiceCollection;

    struct Double(i64);

    impl Query for Double {
        type Output = i64;
    }

    struct Doubler;

    #[async_trait]
    impl QueryHandler<Double> for Doubler {
        async fn handle(&self, query: Double) -> Result<i64, HandlerError> {
            Ok(query.0 * 2)
        }
    }

    struct Reject;

    #[async_trait]
    impl CommandHandler<String> for Reject {
        async fn handle(&self, command: String) -> Result<(), HandlerError> {
            Err(HandlerError::failed(format!("rejected {command}")))
        }
    }

    #[tokio::test]
    async fn executors_resolve_registered_handlers() {
        let mut services = ServiceCollection::new();
        services
            .add_singleton::<dyn QueryHandler<Double>>(Arc::new(Doubler))
            .add_singleton::<dyn CommandHandler<String>>(Arc::new(Reject));
        let provider = services.build();

        let doubled = QueryExecutor::new(&provider).execute(Double(21)).await;
        assert_eq!(doubled.unwrap(), 42);

        let err = CommandExecutor::new(&provider)
            .execute("order".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "rejected order");
    }

    #[tokio::test]
    async fn missing_handler_is_a_resolve_error() {
        let provider = ServiceCollection::new().build();
        let err = CommandExecutor::new(&provider)
            .execute(7_u32)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Resolve(_)));
    }
}
