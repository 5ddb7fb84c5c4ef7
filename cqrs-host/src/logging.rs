//! Category-typed logger abstraction.
//!
//! Components depend on `dyn Logger<Self>` so each logger carries the
//! category it reports under. When nothing is registered for a category the
//! host hands out a [`TracingLogger`], which forwards to `tracing`.

use std::{any::type_name, error::Error as StdError, fmt, marker::PhantomData, sync::Arc};

use crate::container::{ServiceProvider, error::ResolveError};

/// Severity, lowest first. `Critical` maps to a `tracing` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Finest-grained diagnostics.
    Trace,
    /// Diagnostics useful during development.
    Debug,
    /// Normal operation.
    Information,
    /// Unexpected but handled.
    Warning,
    /// A failed operation.
    Error,
    /// A failure the application may not recover from.
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Information => "information",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Logger for category `C`.
pub trait Logger<C: ?Sized>: Send + Sync {
    /// Records `message` at `level`, with the error that caused it if any.
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn StdError + 'static)>,
    );

    /// Logs at [`LogLevel::Trace`].
    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message, None);
    }

    /// Logs at [`LogLevel::Debug`].
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    /// Logs at [`LogLevel::Information`].
    fn information(&self, message: &str) {
        self.log(LogLevel::Information, message, None);
    }

    /// Logs at [`LogLevel::Warning`].
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message, None);
    }

    /// Logs at [`LogLevel::Error`].
    fn error(&self, message: &str, error: Option<&(dyn StdError + 'static)>) {
        self.log(LogLevel::Error, message, error);
    }

    /// Logs at [`LogLevel::Critical`].
    fn critical(&self, message: &str, error: Option<&(dyn StdError + 'static)>) {
        self.log(LogLevel::Critical, message, error);
    }
}

/// Forwards to `tracing` events tagged with the category's type name.
pub struct TracingLogger<C: ?Sized> {
    category: &'static str,
    _category: PhantomData<fn(&C)>,
}

impl<C: ?Sized> TracingLogger<C> {
    /// Logger for `C`.
    pub fn new() -> Self {
        Self {
            category: type_name::<C>(),
            _category: PhantomData,
        }
    }

    /// Type name of `C`.
    pub fn category(&self) -> &'static str {
        self.category
    }
}

impl<C: ?Sized> Default for TracingLogger<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> fmt::Debug for TracingLogger<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLogger")
            .field("category", &self.category)
            .finish()
    }
}

impl<C: ?Sized> Logger<C> for TracingLogger<C> {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn StdError + 'static)>,
    ) {
        let category = self.category;
        match (level, error) {
            (LogLevel::Trace, _) => tracing::trace!(category, "{message}"),
            (LogLevel::Debug, _) => tracing::debug!(category, "{message}"),
            (LogLevel::Information, _) => tracing::info!(category, "{message}"),
            (LogLevel::Warning, Some(error)) => {
                tracing::warn!(category, error = %error, "{message}")
            }
            (LogLevel::Warning, None) => tracing::warn!(category, "{message}"),
            (LogLevel::Error, Some(error)) => {
                tracing::error!(category, error = %error, "{message}")
            }
            (LogLevel::Error, None) => tracing::error!(category, "{message}"),
            (LogLevel::Critical, Some(error)) => {
                tracing::error!(category, critical = true, error = %error, "{message}")
            }
            (LogLevel::Critical, None) => {
                tracing::error!(category, critical = true, "{message}")
            }
        }
    }
}

impl ServiceProvider {
    /// Resolves the logger registered for category `C`, falling back to a
    /// [`TracingLogger`].
    pub fn logger<C: ?Sized + 'static>(
        &self,
    ) -> Result<Arc<dyn Logger<C>>, ResolveError> {
        match self.try_get::<dyn Logger<C>>()? {
            Some(logger) => Ok(logger),
            None => Ok(Arc::new(TracingLogger::<C>::new())),
        }
    }
}
