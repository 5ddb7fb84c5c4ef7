use std::fmt;

use cqrs_host::{HostBuilder, HostError};
use tracing::warn;

type QueuedAction =
    Box<dyn FnOnce(&mut HostBuilder) -> Result<(), HostError> + Send>;

/// Host builder mutations collected before the host exists.
#[derive(Default)]
pub struct ConfigurationQueue {
    actions: Vec<QueuedAction>,
}

impl ConfigurationQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `action`.
    pub fn enqueue<F>(&mut self, action: F)
    where
        F: FnOnce(&mut HostBuilder) -> Result<(), HostError> + Send + 'static,
    {
        self.actions.push(Box::new(action));
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Applies every action in the order it was queued. The first failure
    /// stops the run.
    pub fn apply_all(self, builder: &mut HostBuilder) -> Result<(), HostError> {
        for (index, action) in self.actions.into_iter().enumerate() {
            action(builder).inspect_err(|err| {
                warn!(index, error = %err, "queued host configuration failed");
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConfigurationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationQueue")
            .field("actions", &self.actions.len())
            .finish()
    }
}
