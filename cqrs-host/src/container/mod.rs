//! Type-keyed service container.
//!
//! Services are registered on a [`ServiceCollection`] under the `TypeId` of
//! their abstract interface (usually a `dyn Trait`) plus an optional name.
//! Several registrations may share a key; resolution always uses the last
//! one, so a later registration overrides an earlier one without removing
//! it. Decorators registered for a key wrap every instance produced for it.

/// Alternate backend.
pub mod composition;
/// Resolution errors.
pub mod error;

use std::{
    any::{Any, TypeId, type_name},
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use once_cell::sync::OnceCell;

use crate::{
    error::HostError,
    http::{HttpClientFactory, HttpClientOptions, TypedHttpClient},
};
use error::ResolveError;

type AnyService = Box<dyn Any + Send + Sync>;
type FactoryFn = Arc<
    dyn Fn(&ServiceProvider) -> Result<AnyService, ResolveError> + Send + Sync,
>;
type DecoratorFn = Arc<
    dyn Fn(AnyService, &ServiceProvider) -> Result<AnyService, ResolveError>
        + Send
        + Sync,
>;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance per provider, created on first resolution.
    Singleton,
    /// A new instance per resolution.
    Transient,
}

/// Identity of a registration: the service type plus an optional name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<String>,
}

impl ServiceKey {
    /// Unnamed key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
        }
    }

    /// Key for `T` registered under `name`.
    pub fn keyed<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of::<T>()
        }
    }

    /// Name of the service type, for messages.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The registration name, if keyed.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} (\"{name}\")", self.type_name),
            None => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({self})")
    }
}

struct Registration {
    lifetime: Lifetime,
    factory: FactoryFn,
    instance: OnceCell<AnyService>,
}

impl Registration {
    fn new(lifetime: Lifetime, factory: FactoryFn) -> Self {
        Self {
            lifetime,
            factory,
            instance: OnceCell::new(),
        }
    }
}

/// Mutable list of registrations collected while the host is being
/// composed.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: Vec<(ServiceKey, Registration)>,
    decorators: Vec<(ServiceKey, DecoratorFn)>,
    http_clients: BTreeMap<String, HttpClientOptions>,
}

impl ServiceCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing instance as the singleton for `T`.
    pub fn add_singleton<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.push(ServiceKey::of::<T>(), Lifetime::Singleton, instance_factory(instance))
    }

    /// Registers an instance under `name`; resolved with
    /// [`ServiceProvider::get_keyed`].
    pub fn add_keyed_singleton<T>(
        &mut self,
        name: impl Into<String>,
        instance: Arc<T>,
    ) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.push(
            ServiceKey::keyed::<T>(name),
            Lifetime::Singleton,
            instance_factory(instance),
        )
    }

    /// Registers a singleton built lazily from other services.
    pub fn add_singleton_with<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.push(ServiceKey::of::<T>(), Lifetime::Singleton, erase_factory(factory))
    }

    /// Registers a factory that runs on every resolution of `T`.
    pub fn add_transient_with<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.push(ServiceKey::of::<T>(), Lifetime::Transient, erase_factory(factory))
    }

    /// Registers `instance` underneath every existing registration for `T`,
    /// so it is only used when nothing else is registered.
    pub fn add_fallback_singleton<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let registration =
            Registration::new(Lifetime::Singleton, instance_factory(instance));
        self.registrations
            .insert(0, (ServiceKey::of::<T>(), registration));
        self
    }

    /// Wraps every instance resolved for `T`. Decorators apply in
    /// registration order, each receiving the previous result.
    pub fn decorate<T, F>(&mut self, decorator: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>, &ServiceProvider) -> Arc<T> + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        let erased_key = key.clone();
        let decorator: DecoratorFn = Arc::new(
            move |service: AnyService, provider: &ServiceProvider| {
                let inner = service.downcast::<Arc<T>>().map_err(|_| {
                    ResolveError::TypeMismatch {
                        key: erased_key.clone(),
                    }
                })?;
                Ok(Box::new(decorator(*inner, provider)) as AnyService)
            },
        );
        self.decorators.push((key, decorator));
        self
    }

    /// Declares a named HTTP client served by the default
    /// [`HttpClientFactory`]. Declaring the same name again replaces the
    /// options.
    pub fn add_http_client(
        &mut self,
        name: impl Into<String>,
        options: HttpClientOptions,
    ) -> &mut Self {
        self.http_clients.insert(name.into(), options);
        self
    }

    /// Declares the named client backing `T` and registers `T` itself,
    /// built from the factory's client on every resolution.
    pub fn add_typed_client<T: TypedHttpClient>(
        &mut self,
        options: HttpClientOptions,
    ) -> &mut Self {
        self.add_http_client(T::client_name(), options);
        self.add_transient_with::<T, _>(|provider| {
            let factory = provider.get::<dyn HttpClientFactory>()?;
            Ok(Arc::new(T::from_client(factory.create_client(T::client_name()))))
        })
    }

    /// Whether an unnamed registration for `T` exists.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(&ServiceKey::of::<T>())
    }

    /// Whether any registration uses `key`.
    pub fn contains_key(&self, key: &ServiceKey) -> bool {
        self.registrations.iter().any(|(existing, _)| existing == key)
    }

    /// Keys in registration order, repeated for overridden registrations.
    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.registrations.iter().map(|(key, _)| key)
    }

    /// Number of registrations, overridden ones included.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Moves every registration of `other` after the ones already present,
    /// so they take precedence on resolution.
    pub fn append(&mut self, other: ServiceCollection) -> &mut Self {
        self.registrations.extend(other.registrations);
        self.decorators.extend(other.decorators);
        self.http_clients.extend(other.http_clients);
        self
    }

    pub(crate) fn take_http_clients(
        &mut self,
    ) -> BTreeMap<String, HttpClientOptions> {
        std::mem::take(&mut self.http_clients)
    }

    /// Freezes the collection. Singletons are still created lazily.
    pub fn build(self) -> ServiceProvider {
        let mut services: HashMap<ServiceKey, Vec<Registration>> =
            HashMap::new();
        for (key, registration) in self.registrations {
            services.entry(key).or_default().push(registration);
        }

        let mut decorators: HashMap<ServiceKey, Vec<DecoratorFn>> =
            HashMap::new();
        for (key, decorator) in self.decorators {
            decorators.entry(key).or_default().push(decorator);
        }

        ServiceProvider {
            services,
            decorators,
        }
    }

    fn push(
        &mut self,
        key: ServiceKey,
        lifetime: Lifetime,
        factory: FactoryFn,
    ) -> &mut Self {
        self.registrations
            .push((key, Registration::new(lifetime, factory)));
        self
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("registrations", &self.keys().collect::<Vec<_>>())
            .field("decorators", &self.decorators.len())
            .field("http_clients", &self.http_clients.keys())
            .finish()
    }
}

fn instance_factory<T>(instance: Arc<T>) -> FactoryFn
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(move |_: &ServiceProvider| {
        Ok(Box::new(Arc::clone(&instance)) as AnyService)
    })
}

fn erase_factory<T, F>(factory: F) -> FactoryFn
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&ServiceProvider) -> Result<Arc<T>, ResolveError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(move |provider: &ServiceProvider| {
        factory(provider).map(|service| Box::new(service) as AnyService)
    })
}

/// Read-only container produced by [`ServiceCollection::build`].
pub struct ServiceProvider {
    services: HashMap<ServiceKey, Vec<Registration>>,
    decorators: HashMap<ServiceKey, Vec<DecoratorFn>>,
}

impl ServiceProvider {
    /// Resolves the last registration for `T`.
    pub fn get<T>(&self) -> Result<Arc<T>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        self.resolve::<T>(&key)?
            .ok_or(ResolveError::NotRegistered { key })
    }

    /// Like [`get`](Self::get) but `Ok(None)` when `T` is not registered.
    pub fn try_get<T>(&self) -> Result<Option<Arc<T>>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>(&ServiceKey::of::<T>())
    }

    /// Resolves the last registration of `T` under `name`.
    pub fn get_keyed<T>(&self, name: &str) -> Result<Arc<T>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::keyed::<T>(name);
        self.resolve::<T>(&key)?
            .ok_or(ResolveError::NotRegistered { key })
    }

    /// Like [`get_keyed`](Self::get_keyed) but `Ok(None)` when nothing is
    /// registered under `name`.
    pub fn try_get_keyed<T>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<T>>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve::<T>(&ServiceKey::keyed::<T>(name))
    }

    /// Resolves every registration for `T`, oldest first.
    pub fn get_all<T>(&self) -> Result<Vec<Arc<T>>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        self.services
            .get(&key)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|registration| self.instantiate::<T>(&key, registration))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Whether an unnamed registration for `T` exists.
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.services.contains_key(&ServiceKey::of::<T>())
    }

    /// Every registered key, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.services.keys()
    }

    fn resolve<T>(
        &self,
        key: &ServiceKey,
    ) -> Result<Option<Arc<T>>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let Some(registration) =
            self.services.get(key).and_then(|list| list.last())
        else {
            return Ok(None);
        };
        self.instantiate::<T>(key, registration).map(Some)
    }

    fn instantiate<T>(
        &self,
        key: &ServiceKey,
        registration: &Registration,
    ) -> Result<Arc<T>, ResolveError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mismatch = || ResolveError::TypeMismatch { key: key.clone() };

        match registration.lifetime {
            Lifetime::Singleton => {
                let service = registration
                    .instance
                    .get_or_try_init(|| self.create(key, registration))?;
                service
                    .downcast_ref::<Arc<T>>()
                    .cloned()
                    .ok_or_else(mismatch)
            }
            Lifetime::Transient => self
                .create(key, registration)?
                .downcast::<Arc<T>>()
                .map(|service| *service)
                .map_err(|_| mismatch()),
        }
    }

    fn create(
        &self,
        key: &ServiceKey,
        registration: &Registration,
    ) -> Result<AnyService, ResolveError> {
        let mut service = (registration.factory)(self)?;
        if let Some(decorators) = self.decorators.get(key) {
            for decorator in decorators {
                service = decorator(service, self)?;
            }
        }
        Ok(service)
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.services.len())
            .field("decorated", &self.decorators.len())
            .finish_non_exhaustive()
    }
}

/// Container implementation used by the host to turn the collected
/// [`ServiceCollection`] into a [`ServiceProvider`].
///
/// Applications may swap in a richer backend with
/// [`HostBuilder::use_container`](crate::HostBuilder::use_container) and
/// reach it from tests through
/// [`HostBuilder::configure_container`](crate::HostBuilder::configure_container).
pub trait ContainerBackend: Any + Send {
    /// Turns the collected registrations into a provider.
    fn build(
        self: Box<Self>,
        services: ServiceCollection,
    ) -> Result<ServiceProvider, HostError>;

    /// Downcasting hook for container actions.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Name of the concrete backend.
    fn type_name(&self) -> &'static str {
        type_name::<Self>()
    }
}

/// Backend that builds the collection as-is.
#[derive(Debug, Default)]
pub struct DefaultContainer;

impl ContainerBackend for DefaultContainer {
    fn build(
        self: Box<Self>,
        services: ServiceCollection,
    ) -> Result<ServiceProvider, HostError> {
        Ok(services.build())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
