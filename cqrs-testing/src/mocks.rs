//! Recording stand-ins for handlers and loggers.
//!
//! Every mock is a cheap handle over shared state: the copy registered in
//! the container and the copy held by the test observe the same calls.

use std::{
    any::type_name, error::Error as StdError, fmt, marker::PhantomData,
    sync::Arc,
};

use async_trait::async_trait;
use cqrs_host::{
    CommandHandler, HandlerError, LogLevel, Logger, Query, QueryHandler,
};
use parking_lot::Mutex;

use crate::verification::{Times, VerificationFailure, assert_verified};

struct CommandState<C> {
    calls: Mutex<Vec<C>>,
    failure: Mutex<Option<String>>,
}

/// Command handler that records each command and succeeds unless told to
/// fail.
pub struct MockCommandHandler<C> {
    state: Arc<CommandState<C>>,
}

impl<C> Clone for MockCommandHandler<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C> Default for MockCommandHandler<C> {
    fn default() -> Self {
        Self {
            state: Arc::new(CommandState {
                calls: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
            }),
        }
    }
}

impl<C: fmt::Debug> MockCommandHandler<C> {
    /// Mock that records commands and succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call fail with `message`.
    pub fn fails_with(self, message: impl Into<String>) -> Self {
        *self.state.failure.lock() = Some(message.into());
        self
    }

    /// Number of commands received.
    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    /// Commands received so far, oldest first.
    pub fn received(&self) -> Vec<C>
    where
        C: Clone,
    {
        self.state.calls.lock().clone()
    }

    /// Panics unless the number of commands received matches `times`.
    #[track_caller]
    pub fn verify(&self, times: Times) {
        assert_verified(self.check(times));
    }

    /// Panics unless the number of commands satisfying `predicate`
    /// matches `times`.
    #[track_caller]
    pub fn verify_with(&self, times: Times, predicate: impl Fn(&C) -> bool) {
        assert_verified(self.check_with(times, predicate));
    }

    /// Non-panicking [`verify`](Self::verify).
    pub fn check(&self, times: Times) -> Result<(), VerificationFailure> {
        self.check_with(times, |_| true)
    }

    /// Non-panicking [`verify_with`](Self::verify_with).
    pub fn check_with(
        &self,
        times: Times,
        predicate: impl Fn(&C) -> bool,
    ) -> Result<(), VerificationFailure> {
        let calls = self.state.calls.lock();
        let matching = calls.iter().filter(|call| predicate(call)).count();
        VerificationFailure::check(
            format!("MockCommandHandler<{}>", type_name::<C>()),
            times,
            matching,
            || render_calls(calls.as_slice()),
        )
    }
}

impl<C> fmt::Debug for MockCommandHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCommandHandler")
            .field("command", &type_name::<C>())
            .field("calls", &self.state.calls.lock().len())
            .finish()
    }
}

#[async_trait]
impl<C> CommandHandler<C> for MockCommandHandler<C>
where
    C: fmt::Debug + Send + 'static,
{
    async fn handle(&self, command: C) -> Result<(), HandlerError> {
        self.state.calls.lock().push(command);
        match self.state.failure.lock().clone() {
            Some(message) => Err(HandlerError::failed(message)),
            None => Ok(()),
        }
    }
}

type Responder<Q> = Arc<
    dyn Fn(&Q) -> Result<<Q as Query>::Output, HandlerError> + Send + Sync,
>;

struct QueryState<Q: Query> {
    calls: Mutex<Vec<Q>>,
    responder: Mutex<Responder<Q>>,
}

/// Query handler that records each query and answers from a programmable
/// responder.
pub struct MockQueryHandler<Q: Query> {
    state: Arc<QueryState<Q>>,
}

impl<Q: Query> Clone for MockQueryHandler<Q> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<Q: Query + fmt::Debug> MockQueryHandler<Q> {
    /// A mock that fails with [`HandlerError::Unconfigured`] until a result
    /// is programmed.
    pub fn strict() -> Self {
        Self::with_responder(Arc::new(|_: &Q| {
            Err(HandlerError::Unconfigured {
                handler: type_name::<Q>(),
            })
        }))
    }

    /// A mock that answers `Default::default()` until a result is
    /// programmed.
    pub fn with_default() -> Self
    where
        Q::Output: Default,
    {
        Self::with_responder(Arc::new(|_: &Q| Ok(Q::Output::default())))
    }

    fn with_responder(responder: Responder<Q>) -> Self {
        Self {
            state: Arc::new(QueryState {
                calls: Mutex::new(Vec::new()),
                responder: Mutex::new(responder),
            }),
        }
    }

    /// Answers every later call with a clone of `value`.
    pub fn returns(self, value: Q::Output) -> Self
    where
        Q::Output: Clone + Sync,
    {
        self.returns_with(move |_| Ok(value.clone()))
    }

    /// Answers every later call by running `responder` on the query.
    pub fn returns_with<F>(self, responder: F) -> Self
    where
        F: Fn(&Q) -> Result<Q::Output, HandlerError> + Send + Sync + 'static,
    {
        *self.state.responder.lock() = Arc::new(responder);
        self
    }

    /// Makes every later call fail with `message`.
    pub fn fails_with(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.returns_with(move |_| Err(HandlerError::failed(message.clone())))
    }

    /// Number of queries received.
    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    /// Queries received so far, oldest first.
    pub fn received(&self) -> Vec<Q>
    where
        Q: Clone,
    {
        self.state.calls.lock().clone()
    }

    /// Panics unless the number of queries received matches `times`.
    #[track_caller]
    pub fn verify(&self, times: Times) {
        assert_verified(self.check(times));
    }

    /// Panics unless the number of queries satisfying `predicate`
    /// matches `times`.
    #[track_caller]
    pub fn verify_with(&self, times: Times, predicate: impl Fn(&Q) -> bool) {
        assert_verified(self.check_with(times, predicate));
    }

    /// Non-panicking [`verify`](Self::verify).
    pub fn check(&self, times: Times) -> Result<(), VerificationFailure> {
        self.check_with(times, |_| true)
    }

    /// Non-panicking [`verify_with`](Self::verify_with).
    pub fn check_with(
        &self,
        times: Times,
        predicate: impl Fn(&Q) -> bool,
    ) -> Result<(), VerificationFailure> {
        let calls = self.state.calls.lock();
        let matching = calls.iter().filter(|call| predicate(call)).count();
        VerificationFailure::check(
            format!("MockQueryHandler<{}>", type_name::<Q>()),
            times,
            matching,
            || render_calls(calls.as_slice()),
        )
    }
}

impl<Q: Query> fmt::Debug for MockQueryHandler<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockQueryHandler")
            .field("query", &type_name::<Q>())
            .field("calls", &self.state.calls.lock().len())
            .finish()
    }
}

#[async_trait]
impl<Q> QueryHandler<Q> for MockQueryHandler<Q>
where
    Q: Query + fmt::Debug,
{
    async fn handle(&self, query: Q) -> Result<Q::Output, HandlerError> {
        let responder = self.state.responder.lock().clone();
        let result = responder(&query);
        self.state.calls.lock().push(query);
        result
    }
}

/// One captured log call. The error is kept in its rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Level the call was made at.
    pub level: LogLevel,
    /// The message as logged.
    pub message: String,
    /// The error, rendered with `Display`.
    pub error: Option<String>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)?;
        if let Some(error) = &self.error {
            write!(f, " (error: {error})")?;
        }
        Ok(())
    }
}

/// Logger for category `C` that keeps every call for later verification.
pub struct MockLogger<C: ?Sized> {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    _category: PhantomData<fn(&C)>,
}

impl<C: ?Sized> Clone for MockLogger<C> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            _category: PhantomData,
        }
    }
}

impl<C: ?Sized> Default for MockLogger<C> {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            _category: PhantomData,
        }
    }
}

impl<C: ?Sized> MockLogger<C> {
    /// Logger with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured call, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Captured calls at `level`.
    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    /// Panics unless the number of trace calls whose message contains
    /// `contains` matches `times`. `None` counts every call at the level.
    #[track_caller]
    pub fn verify_trace_message(&self, times: Times, contains: Option<&str>) {
        self.verify_level(LogLevel::Trace, times, contains);
    }

    /// Same as [`verify_trace_message`](Self::verify_trace_message) at
    /// debug level.
    #[track_caller]
    pub fn verify_debug_message(&self, times: Times, contains: Option<&str>) {
        self.verify_level(LogLevel::Debug, times, contains);
    }

    /// Information level.
    #[track_caller]
    pub fn verify_information_message(&self, times: Times, contains: Option<&str>) {
        self.verify_level(LogLevel::Information, times, contains);
    }

    /// Warning level.
    #[track_caller]
    pub fn verify_warning_message(&self, times: Times, contains: Option<&str>) {
        self.verify_level(LogLevel::Warning, times, contains);
    }

    /// Error level.
    #[track_caller]
    pub fn verify_error_message(&self, times: Times, contains: Option<&str>) {
        self.verify_level(LogLevel::Error, times, contains);
    }

    /// Critical level.
    #[track_caller]
    pub fn verify_critical_message(&self, times: Times, contains: Option<&str>) {
        self.verify_level(LogLevel::Critical, times, contains);
    }

    /// Counts calls at `level` whose message and rendered error satisfy the
    /// given predicates; a missing predicate matches anything.
    #[track_caller]
    pub fn verify_logger(
        &self,
        level: LogLevel,
        times: Times,
        message: Option<&dyn Fn(&str) -> bool>,
        error: Option<&dyn Fn(Option<&str>) -> bool>,
    ) {
        assert_verified(self.check_logger(level, times, message, error));
    }

    /// Non-panicking [`verify_logger`](Self::verify_logger).
    pub fn check_logger(
        &self,
        level: LogLevel,
        times: Times,
        message: Option<&dyn Fn(&str) -> bool>,
        error: Option<&dyn Fn(Option<&str>) -> bool>,
    ) -> Result<(), VerificationFailure> {
        let entries = self.entries.lock();
        let matching = entries
            .iter()
            .filter(|entry| entry.level == level)
            .filter(|entry| message.is_none_or(|matches| matches(&entry.message)))
            .filter(|entry| error.is_none_or(|matches| matches(entry.error.as_deref())))
            .count();
        VerificationFailure::check(
            format!("MockLogger<{}> at level {level}", type_name::<C>()),
            times,
            matching,
            || entries.iter().map(LogEntry::to_string).collect(),
        )
    }

    #[track_caller]
    fn verify_level(&self, level: LogLevel, times: Times, contains: Option<&str>) {
        let message = contains.map(|needle| move |text: &str| text.contains(needle));
        let message = message.as_ref().map(|f| f as &dyn Fn(&str) -> bool);
        self.verify_logger(level, times, message, None);
    }
}

impl<C: ?Sized> fmt::Debug for MockLogger<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLogger")
            .field("category", &type_name::<C>())
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl<C: ?Sized> Logger<C> for MockLogger<C> {
    fn log(
        &self,
        level: LogLevel,
        message: &str,
        error: Option<&(dyn StdError + 'static)>,
    ) {
        self.entries.lock().push(LogEntry {
            level,
            message: message.to_string(),
            error: error.map(ToString::to_string),
        });
    }
}

fn render_calls<T: fmt::Debug>(calls: &[T]) -> Vec<String> {
    calls.iter().map(|call| format!("{call:?}")).collect()
}
