use std::{fmt, io, sync::Arc};

use async_trait::async_trait;
use cqrs_host::{CommandHandler, HandlerError, Logger, Query, QueryHandler};
use serde::{Deserialize, Serialize};

/// Records a temperature reading for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureCommand {
    pub city: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureQuery {
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureQueryResult {
    pub value: f64,
}

impl Query for TemperatureQuery {
    type Output = TemperatureQueryResult;
}

/// Where current temperatures come from.
#[cfg_attr(test, mockall::automock)]
pub trait TemperatureSource: Send + Sync {
    fn current(&self, city: &str) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedTemperatureSource(pub f64);

impl Default for FixedTemperatureSource {
    fn default() -> Self {
        Self(22.0)
    }
}

impl TemperatureSource for FixedTemperatureSource {
    fn current(&self, _city: &str) -> f64 {
        self.0
    }
}

/// Writes one log entry per severity for every command it handles.
pub struct TemperatureCommandHandler {
    logger: Arc<dyn Logger<TemperatureCommand>>,
}

impl fmt::Debug for TemperatureCommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemperatureCommandHandler").finish_non_exhaustive()
    }
}

impl TemperatureCommandHandler {
    pub fn new(logger: Arc<dyn Logger<TemperatureCommand>>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl CommandHandler<TemperatureCommand> for TemperatureCommandHandler {
    async fn handle(&self, _command: TemperatureCommand) -> Result<(), HandlerError> {
        let exception = io::Error::other("This is an exception");
        let critical = io::Error::other("This is a critical exception");

        self.logger.debug("This is a debug message");
        self.logger.information("This is an information message");
        self.logger.warning("This is a warning message");
        self.logger.error("This is an error message", Some(&exception));
        self.logger.critical("This is a critical message", Some(&critical));
        Ok(())
    }
}

pub struct TemperatureQueryHandler {
    source: Arc<dyn TemperatureSource>,
}

impl fmt::Debug for TemperatureQueryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemperatureQueryHandler").finish_non_exhaustive()
    }
}

impl TemperatureQueryHandler {
    pub fn new(source: Arc<dyn TemperatureSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl QueryHandler<TemperatureQuery> for TemperatureQueryHandler {
    async fn handle(
        &self,
        query: TemperatureQuery,
    ) -> Result<TemperatureQueryResult, HandlerError> {
        Ok(TemperatureQueryResult {
            value: self.source.current(&query.city),
        })
    }
}

#[cfg(test)]
mod tests {
    use cqrs_host::TracingLogger;

    use super::*;

    #[tokio::test]
    async fn query_handler_reads_the_source() {
        let mut source = MockTemperatureSource::new();
        source.expect_current().times(1).return_const(9.5);

        let handler = TemperatureQueryHandler::new(Arc::new(source));
        let result = handler
            .handle(TemperatureQuery {
                city: "bergen".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.value, 9.5);
    }

    #[tokio::test]
    async fn command_handler_succeeds() {
        let handler = TemperatureCommandHandler::new(Arc::new(
            TracingLogger::<TemperatureCommand>::new(),
        ));
        handler
            .handle(TemperatureCommand {
                city: "oslo".into(),
                value: 10.0,
            })
            .await
            .unwrap();
    }
}
