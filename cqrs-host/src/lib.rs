//! Minimal command/query web host.
//!
//! The host assembles an application in phases: host configuration, app
//! configuration, service registration and container configuration. Each
//! phase collects callbacks on a [`HostBuilder`] and runs them in
//! registration order when [`HostBuilder::build`] is called, producing a
//! [`Host`] whose axum router resolves command and query handlers from a
//! type-keyed [`ServiceProvider`].
//!
//! Applications plug in through the [`EntryPoint`] trait so the same
//! composition can be served over TCP or driven in-memory by a test harness.

pub mod config;
pub mod container;
pub mod cqrs;
pub mod error;
pub mod host;
pub mod http;
pub mod logging;

pub use config::{Configuration, ConfigurationBuilder, error::ConfigError};
pub use container::{
    ContainerBackend, DefaultContainer, Lifetime, ServiceCollection,
    ServiceKey, ServiceProvider,
    composition::{CompositionContainer, CompositionRoot},
    error::ResolveError,
};
pub use cqrs::{
    CommandExecutor, CommandHandler, HandlerError, Query, QueryExecutor,
    QueryHandler,
};
pub use error::{ApiError, ApiResult, HostError};
pub use host::{
    ENVIRONMENT_KEY, EntryPoint, Host, HostBuilder, HostBuilderContext,
    HostContext,
};
pub use http::{
    DefaultHttpClientFactory, HttpClient, HttpClientFactory, HttpClientOptions,
    HttpHandler, HttpRequest, HttpResponse, ReqwestHandler, TypedHttpClient,
    ensure_success, error::HttpError,
};
pub use logging::{LogLevel, Logger, TracingLogger};
