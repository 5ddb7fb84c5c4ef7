//! In-memory test harness for `cqrs-host` applications.
//!
//! [`TestApplication`] wraps an application's [`EntryPoint`](cqrs_host::EntryPoint)
//! and lets a test, before the host is built:
//!
//! - override configuration keys at host and app level;
//! - register services or reach into the container backend;
//! - replace command handlers, query handlers, loggers and arbitrary
//!   services with recording mocks;
//! - intercept outbound requests of named or typed HTTP clients, letting
//!   unmatched requests through to the real client.
//!
//! Requests are then driven through the router in-process with a
//! [`TestClient`], and the mocks verified with [`Times`] expectations.

pub mod application;
pub mod client;
/// Harness errors.
pub mod error;
pub mod http;
pub mod mocks;
/// Deferred host builder changes.
pub mod queue;
pub mod verification;

pub use application::{TEST_ENVIRONMENT, TestApplication};
pub use client::{TestClient, TestResponse};
pub use error::TestingError;
pub use http::{
    HttpClientFactoryDecorator, MockHttpHandler, MockResponse,
    RecordedRequest, RuleBuilder,
};
pub use mocks::{LogEntry, MockCommandHandler, MockLogger, MockQueryHandler};
pub use queue::ConfigurationQueue;
pub use verification::{Times, VerificationFailure};
