//! The [`TestApplication`] harness.

use std::{collections::BTreeMap, fmt, marker::PhantomData, mem, sync::Arc};

use cqrs_host::{
    CommandHandler, Configuration, ContainerBackend, EntryPoint, Host,
    HostBuilder, HostBuilderContext, HostError, HttpClientFactory, Logger,
    Query, QueryHandler, ServiceCollection, ServiceProvider, TypedHttpClient,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    client::TestClient,
    error::TestingError,
    http::{HttpClientFactoryDecorator, MockHttpHandler},
    mocks::{MockCommandHandler, MockLogger, MockQueryHandler},
    queue::ConfigurationQueue,
};

/// Environment the harness builds hosts in unless configuration says
/// otherwise.
pub const TEST_ENVIRONMENT: &str = "Development";

enum State {
    Pending(ConfigurationQueue),
    Built(Arc<Host>),
    Failed(String),
}

/// An in-memory instance of the application behind entry point `E`.
///
/// Configuration and mock helpers queue changes to the host builder. The
/// host is built on first use, that is the first call to
/// [`create_client`](Self::create_client), [`services`](Self::services),
/// [`configuration`](Self::configuration) or [`host`](Self::host): the
/// entry point's own composition runs first, then the queued changes in the
/// order they were made. From then on the configuration helpers fail with
/// [`TestingError::HostAlreadyBuilt`].
pub struct TestApplication<E: EntryPoint> {
    state: Mutex<State>,
    interceptors: Mutex<BTreeMap<String, Arc<MockHttpHandler>>>,
    _entry_point: PhantomData<fn() -> E>,
}

impl<E: EntryPoint> Default for TestApplication<E> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Pending(ConfigurationQueue::new())),
            interceptors: Mutex::new(BTreeMap::new()),
            _entry_point: PhantomData,
        }
    }
}

impl<E: EntryPoint> TestApplication<E> {
    /// Harness for `E` with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw change to the host builder.
    pub fn configure_host_builder<F>(&self, action: F) -> Result<&Self, TestingError>
    where
        F: FnOnce(&mut HostBuilder) -> Result<(), HostError> + Send + 'static,
    {
        match &mut *self.state.lock() {
            State::Pending(queue) => queue.enqueue(action),
            State::Built(_) => return Err(TestingError::HostAlreadyBuilt),
            State::Failed(reason) => {
                return Err(TestingError::HostBuildFailed(reason.clone()));
            }
        }
        Ok(self)
    }

    /// Overrides `key` in both the host and the app configuration, so it
    /// wins over the application's own defaults at either level.
    pub fn with_configuration(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&Self, TestingError> {
        let (key, value) = (key.into(), value.into());
        self.configure_host_builder(move |builder| {
            let host_pair = [(key.clone(), value.clone())];
            builder
                .configure_host_configuration(move |config| {
                    config.add_in_memory(host_pair);
                })
                .configure_app_configuration(move |_, config| {
                    config.add_in_memory([(key, value)]);
                });
            Ok(())
        })
    }

    /// Queues a service registration callback. It runs after the
    /// application's own, so its registrations win.
    pub fn configure_services<F>(&self, action: F) -> Result<&Self, TestingError>
    where
        F: FnOnce(&HostBuilderContext, &mut ServiceCollection) + Send + 'static,
    {
        self.configure_host_builder(move |builder| {
            builder.configure_services(action);
            Ok(())
        })
    }

    /// Runs `action` against the application's container backend, which
    /// must be a `C`.
    pub fn configure_container<C, F>(&self, action: F) -> Result<&Self, TestingError>
    where
        C: ContainerBackend,
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.configure_host_builder(move |builder| {
            builder.configure_container::<C, F>(action);
            Ok(())
        })
    }

    /// Registers `instance` as the singleton for `T` and hands it back.
    pub fn mock_service<T>(&self, instance: Arc<T>) -> Result<Arc<T>, TestingError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let registered = Arc::clone(&instance);
        self.configure_services(move |_, services| {
            services.add_singleton::<T>(registered);
        })?;
        Ok(instance)
    }

    /// Replaces the logger for category `C` with a recording one.
    pub fn mock_logger<C: ?Sized + 'static>(&self) -> Result<MockLogger<C>, TestingError> {
        let logger = MockLogger::<C>::new();
        self.mock_service::<dyn Logger<C>>(Arc::new(logger.clone()))?;
        Ok(logger)
    }

    /// Replaces the handler for `C` with a recording mock that succeeds
    /// unless told otherwise.
    pub fn mock_command_handler<C>(&self) -> Result<MockCommandHandler<C>, TestingError>
    where
        C: fmt::Debug + Send + 'static,
    {
        let handler = MockCommandHandler::<C>::new();
        self.mock_service::<dyn CommandHandler<C>>(Arc::new(handler.clone()))?;
        Ok(handler)
    }

    /// Query handler mock that answers `Default::default()` until programmed
    /// with [`MockQueryHandler::returns`].
    pub fn mock_query_handler<Q>(&self) -> Result<MockQueryHandler<Q>, TestingError>
    where
        Q: Query + fmt::Debug,
        Q::Output: Default,
    {
        self.register_query_handler(MockQueryHandler::<Q>::with_default())
    }

    /// Query handler mock that fails until programmed.
    pub fn mock_query_handler_strict<Q>(&self) -> Result<MockQueryHandler<Q>, TestingError>
    where
        Q: Query + fmt::Debug,
    {
        self.register_query_handler(MockQueryHandler::<Q>::strict())
    }

    fn register_query_handler<Q>(
        &self,
        handler: MockQueryHandler<Q>,
    ) -> Result<MockQueryHandler<Q>, TestingError>
    where
        Q: Query + fmt::Debug,
    {
        self.mock_service::<dyn QueryHandler<Q>>(Arc::new(handler.clone()))?;
        Ok(handler)
    }

    /// Intercepts requests made through the client named `name`. A second
    /// call for the same name replaces the first interceptor.
    pub fn mock_http_client(
        &self,
        name: impl Into<String>,
    ) -> Result<Arc<MockHttpHandler>, TestingError> {
        let state = self.state.lock();
        match &*state {
            State::Pending(_) => {}
            State::Built(_) => return Err(TestingError::HostAlreadyBuilt),
            State::Failed(reason) => {
                return Err(TestingError::HostBuildFailed(reason.clone()));
            }
        }

        let handler = Arc::new(MockHttpHandler::new());
        self.interceptors
            .lock()
            .insert(name.into(), Arc::clone(&handler));
        Ok(handler)
    }

    /// Intercepts the client backing the typed client `T`.
    pub fn mock_http_client_for<T: TypedHttpClient>(
        &self,
    ) -> Result<Arc<MockHttpHandler>, TestingError> {
        self.mock_http_client(T::client_name())
    }

    /// Client driving the host's router in-process.
    pub fn create_client(&self) -> Result<TestClient, TestingError> {
        Ok(TestClient::new(self.host()?.router()))
    }

    /// The built host's service provider.
    pub fn services(&self) -> Result<Arc<ServiceProvider>, TestingError> {
        Ok(Arc::clone(self.host()?.services()))
    }

    /// The built host's app configuration.
    pub fn configuration(&self) -> Result<Arc<Configuration>, TestingError> {
        Ok(Arc::clone(self.host()?.configuration()))
    }

    /// Resolves `T` from the built host.
    pub fn service<T>(&self) -> Result<Arc<T>, TestingError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Ok(self.host()?.services().get::<T>()?)
    }

    /// Whether the host has been built.
    pub fn is_built(&self) -> bool {
        matches!(*self.state.lock(), State::Built(_))
    }

    /// The built host, building it on first call.
    pub fn host(&self) -> Result<Arc<Host>, TestingError> {
        let mut state = self.state.lock();
        let queue = match &mut *state {
            State::Built(host) => return Ok(Arc::clone(host)),
            State::Failed(reason) => {
                return Err(TestingError::HostBuildFailed(reason.clone()));
            }
            State::Pending(queue) => mem::take(queue),
        };

        match self.build_host(queue) {
            Ok(host) => {
                let host = Arc::new(host);
                *state = State::Built(Arc::clone(&host));
                Ok(host)
            }
            Err(err) => {
                *state = State::Failed(err.to_string());
                Err(err.into())
            }
        }
    }

    fn build_host(&self, queue: ConfigurationQueue) -> Result<Host, HostError> {
        let mut builder = HostBuilder::for_entry_point::<E>()?;
        builder.use_environment(TEST_ENVIRONMENT);

        debug!(queued = queue.len(), "applying test configuration");
        queue.apply_all(&mut builder)?;

        let interceptors = self.interceptors.lock().clone();
        if !interceptors.is_empty() {
            debug!(clients = ?interceptors.keys().collect::<Vec<_>>(), "intercepting http clients");
            builder.configure_services(move |_, services| {
                services.decorate::<dyn HttpClientFactory, _>(
                    move |inner: Arc<dyn HttpClientFactory>,
                          _: &ServiceProvider|
                          -> Arc<dyn HttpClientFactory> {
                        Arc::new(HttpClientFactoryDecorator::new(
                            inner,
                            interceptors.clone(),
                        ))
                    },
                );
            });
        }

        let host = builder.build(E::router())?;
        info!(
            entry_point = std::any::type_name::<E>(),
            environment = host.environment(),
            "test host built"
        );
        Ok(host)
    }
}

impl<E: EntryPoint> fmt::Debug for TestApplication<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            State::Pending(queue) => format!("pending ({} queued)", queue.len()),
            State::Built(_) => "built".to_string(),
            State::Failed(reason) => format!("failed: {reason}"),
        };
        f.debug_struct("TestApplication")
            .field("entry_point", &std::any::type_name::<E>())
            .field("state", &state)
            .field("intercepted_clients", &self.interceptors.lock().keys())
            .finish()
    }
}
