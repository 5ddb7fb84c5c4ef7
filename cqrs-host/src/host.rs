//! Phased host composition.
//!
//! Callbacks are collected per phase and run in registration order when the
//! host is built:
//!
//! 1. host configuration
//! 2. app configuration, layered over the host configuration
//! 3. service registration
//! 4. container configuration
//!
//! The built [`Host`] owns the service provider and an axum router whose
//! state is a [`HostContext`].

use std::{any::type_name, fmt, sync::Arc};

use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::{
    config::{Configuration, ConfigurationBuilder},
    container::{
        ContainerBackend, DefaultContainer, ServiceCollection, ServiceProvider,
        error::ResolveError,
    },
    cqrs::{CommandExecutor, QueryExecutor},
    error::HostError,
    http::{DefaultHttpClientFactory, HttpClientFactory},
    logging::Logger,
};

/// Configuration key holding the environment name.
pub const ENVIRONMENT_KEY: &str = "Environment";

const DEFAULT_ENVIRONMENT: &str = "Production";

type HostConfigurationAction = Box<dyn FnOnce(&mut ConfigurationBuilder) + Send>;
type AppConfigurationAction =
    Box<dyn FnOnce(&HostBuilderContext, &mut ConfigurationBuilder) + Send>;
type ServicesAction =
    Box<dyn FnOnce(&HostBuilderContext, &mut ServiceCollection) + Send>;
type ContainerAction =
    Box<dyn FnOnce(&mut dyn ContainerBackend) -> Result<(), HostError> + Send>;

/// What service and app configuration callbacks can see of the host.
#[derive(Debug, Clone)]
pub struct HostBuilderContext {
    /// Host configuration while app configuration runs, the full
    /// app configuration afterwards.
    pub configuration: Arc<Configuration>,
    /// Resolved environment name.
    pub environment: String,
}

impl HostBuilderContext {
    /// Compares the environment name ignoring ASCII case.
    pub fn is_environment(&self, name: &str) -> bool {
        self.environment.eq_ignore_ascii_case(name)
    }

    /// Whether this is the `Development` environment.
    pub fn is_development(&self) -> bool {
        self.is_environment("Development")
    }
}

/// Collects the callbacks of each composition phase and runs them in
/// [`build`](Self::build):
///
/// 1. host configuration, seeded with the environment name;
/// 2. app configuration, layered over the host configuration;
/// 3. service registration;
/// 4. container actions, then the container backend builds the provider.
///
/// Callbacks within a phase run in registration order.
pub struct HostBuilder {
    environment: String,
    host_configuration: Vec<HostConfigurationAction>,
    app_configuration: Vec<AppConfigurationAction>,
    services: Vec<ServicesAction>,
    container: Box<dyn ContainerBackend>,
    container_actions: Vec<ContainerAction>,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            host_configuration: Vec::new(),
            app_configuration: Vec::new(),
            services: Vec::new(),
            container: Box::new(DefaultContainer),
            container_actions: Vec::new(),
        }
    }
}

impl HostBuilder {
    /// Empty builder for the `Production` environment with the default
    /// container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with the entry point's composition already applied.
    pub fn for_entry_point<E: EntryPoint>() -> Result<Self, HostError> {
        let mut builder = Self::new();
        E::configure(&mut builder)?;
        Ok(builder)
    }

    /// Sets the environment name. An `Environment` key in the host
    /// configuration takes precedence.
    pub fn use_environment(&mut self, environment: impl Into<String>) -> &mut Self {
        self.environment = environment.into();
        self
    }

    /// Adds a host configuration callback.
    pub fn configure_host_configuration<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(&mut ConfigurationBuilder) + Send + 'static,
    {
        self.host_configuration.push(Box::new(action));
        self
    }

    /// Adds an app configuration callback. It sees the built host
    /// configuration through the context.
    pub fn configure_app_configuration<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(&HostBuilderContext, &mut ConfigurationBuilder) + Send + 'static,
    {
        self.app_configuration.push(Box::new(action));
        self
    }

    /// Adds a service registration callback.
    pub fn configure_services<F>(&mut self, action: F) -> &mut Self
    where
        F: FnOnce(&HostBuilderContext, &mut ServiceCollection) + Send + 'static,
    {
        self.services.push(Box::new(action));
        self
    }

    /// Replaces the container backend. Container actions registered before
    /// the swap apply to the new backend.
    pub fn use_container<C: ContainerBackend>(&mut self, container: C) -> &mut Self {
        self.container = Box::new(container);
        self
    }

    /// Runs `action` against the container backend, which must be a `C`
    /// when the host is built.
    pub fn configure_container<C, F>(&mut self, action: F) -> &mut Self
    where
        C: ContainerBackend,
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.container_actions.push(Box::new(
            move |backend: &mut dyn ContainerBackend| {
                let actual = backend.type_name();
                let container = backend
                    .as_any_mut()
                    .downcast_mut::<C>()
                    .ok_or(HostError::ContainerTypeMismatch {
                        expected: type_name::<C>(),
                        actual,
                    })?;
                action(container);
                Ok(())
            },
        ));
        self
    }

    /// Type name of the current container backend.
    pub fn container_type_name(&self) -> &'static str {
        self.container.type_name()
    }

    /// Runs every phase and attaches the resulting state to `router`.
    /// The configuration and the HTTP client factory are registered as
    /// fallbacks, so applications may replace them.
    pub fn build(self, router: Router<HostContext>) -> Result<Host, HostError> {
        let HostBuilder {
            environment,
            host_configuration,
            app_configuration,
            services: service_actions,
            mut container,
            container_actions,
        } = self;

        let mut host_builder = ConfigurationBuilder::new();
        host_builder.add_in_memory([(ENVIRONMENT_KEY, environment.as_str())]);
        for action in host_configuration {
            action(&mut host_builder);
        }
        let host_configuration = Arc::new(host_builder.build()?);
        let environment = host_configuration
            .get(ENVIRONMENT_KEY)
            .unwrap_or(DEFAULT_ENVIRONMENT)
            .to_string();

        let mut context = HostBuilderContext {
            configuration: host_configuration.clone(),
            environment,
        };

        let mut app_builder = ConfigurationBuilder::new();
        app_builder.add_configuration(host_configuration);
        for action in app_configuration {
            action(&context, &mut app_builder);
        }
        let configuration = Arc::new(app_builder.build()?);
        context.configuration = configuration.clone();

        let mut services = ServiceCollection::new();
        for action in service_actions {
            action(&context, &mut services);
        }
        services.add_fallback_singleton::<Configuration>(configuration.clone());
        let factory = DefaultHttpClientFactory::new(services.take_http_clients())?;
        services.add_fallback_singleton::<dyn HttpClientFactory>(Arc::new(factory));

        for action in container_actions {
            action(container.as_mut())?;
        }
        let container_name = container.type_name();
        let services = Arc::new(container.build(services)?);

        debug!(
            environment = %context.environment,
            container = container_name,
            configuration_keys = configuration.len(),
            "host built"
        );

        let state = HostContext {
            services: services.clone(),
            configuration: configuration.clone(),
        };
        Ok(Host {
            services,
            configuration,
            environment: context.environment,
            router: router.with_state(state),
        })
    }
}

impl fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuilder")
            .field("environment", &self.environment)
            .field("host_configuration", &self.host_configuration.len())
            .field("app_configuration", &self.app_configuration.len())
            .field("services", &self.services.len())
            .field("container", &self.container.type_name())
            .field("container_actions", &self.container_actions.len())
            .finish()
    }
}

/// Router state: the services and configuration of a built host.
#[derive(Debug, Clone)]
pub struct HostContext {
    services: Arc<ServiceProvider>,
    configuration: Arc<Configuration>,
}

impl HostContext {
    /// The host's services.
    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    /// The app configuration.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Command dispatch over the host's services.
    pub fn commands(&self) -> CommandExecutor<'_> {
        CommandExecutor::new(&self.services)
    }

    /// Query dispatch over the host's services.
    pub fn queries(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.services)
    }

    /// Logger for category `C`.
    pub fn logger<C: ?Sized + 'static>(
        &self,
    ) -> Result<Arc<dyn Logger<C>>, ResolveError> {
        self.services.logger::<C>()
    }
}

/// A composed application.
#[derive(Debug)]
pub struct Host {
    services: Arc<ServiceProvider>,
    configuration: Arc<Configuration>,
    environment: String,
    router: Router,
}

impl Host {
    /// Same as [`HostBuilder::new`].
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// The built service provider.
    pub fn services(&self) -> &Arc<ServiceProvider> {
        &self.services
    }

    /// The app configuration.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// The resolved environment name.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The routes with their state attached, ready to serve or to drive
    /// in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serves the router on `listener` until the server stops.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HostError> {
        if let Ok(address) = listener.local_addr() {
            info!(%address, environment = %self.environment, "serving");
        }
        axum::serve(listener, self.router)
            .await
            .map_err(HostError::Serve)
    }
}

/// An application that can be composed by a [`HostBuilder`].
pub trait EntryPoint: 'static {
    /// Registers the application's configuration, services and container.
    fn configure(builder: &mut HostBuilder) -> Result<(), HostError>;

    /// The application's routes, before host state is attached.
    fn router() -> Router<HostContext>;
}
