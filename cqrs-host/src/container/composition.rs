//! Alternate container backend driven by composition roots.

use std::{
    any::{Any, type_name},
    fmt,
    sync::Arc,
};

use tracing::debug;

use super::{
    ContainerBackend, ServiceCollection, ServiceKey, ServiceProvider,
    error::ResolveError,
};
use crate::error::HostError;

/// A unit of registrations applied to a [`CompositionContainer`].
pub trait CompositionRoot {
    /// Adds this root's registrations to `container`.
    fn compose(&self, container: &mut CompositionContainer);
}

/// Container backend that owns its own registrations in addition to the
/// host's [`ServiceCollection`].
///
/// Registrations made through the host's service phase are layered after
/// the container's own, so they win on resolution.
#[derive(Default)]
pub struct CompositionContainer {
    registry: ServiceCollection,
    roots: Vec<&'static str>,
}

impl CompositionContainer {
    /// An empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `root` once; composing the same root type again is a no-op.
    pub fn register_from<R: CompositionRoot>(&mut self, root: &R) -> &mut Self {
        let name = type_name::<R>();
        if self.roots.contains(&name) {
            debug!(root = name, "composition root already applied");
            return self;
        }
        self.roots.push(name);
        root.compose(self);
        self
    }

    /// Registers a concrete type constructed with `Default` on every
    /// resolution.
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Default + Send + Sync + 'static,
    {
        self.registry
            .add_transient_with::<T, _>(|_| Ok(Arc::new(T::default())));
        self
    }

    /// Registers a ready instance as the singleton for `T`.
    pub fn register_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registry.add_singleton(instance);
        self
    }

    /// Registers a lazily built singleton.
    pub fn register_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.add_singleton_with(factory);
        self
    }

    /// Registers a factory run on every resolution.
    pub fn register_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.add_transient_with(factory);
        self
    }

    /// Whether the container itself registered `T`. Host registrations
    /// are not visible here.
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.registry.contains::<T>()
    }

    /// Keys of the container's own registrations.
    pub fn registrations(&self) -> impl Iterator<Item = &ServiceKey> {
        self.registry.keys()
    }

    /// Type names of the applied roots, in order.
    pub fn composition_roots(&self) -> &[&'static str] {
        &self.roots
    }
}

impl fmt::Debug for CompositionContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionContainer")
            .field("registrations", &self.registry.len())
            .field("roots", &self.roots)
            .finish()
    }
}

impl ContainerBackend for CompositionContainer {
    fn build(
        self: Box<Self>,
        services: ServiceCollection,
    ) -> Result<ServiceProvider, HostError> {
        let CompositionContainer { mut registry, roots } = *self;
        debug!(
            roots = roots.len(),
            container = registry.len(),
            services = services.len(),
            "building composition container"
        );
        registry.append(services);
        Ok(registry.build())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Clock;

    struct Roots;

    impl CompositionRoot for Roots {
        fn compose(&self, container: &mut CompositionContainer) {
            container.register::<Clock>();
        }
    }

    #[test]
    fn composition_root_is_applied_once() {
        let mut container = CompositionContainer::new();
        container.register_from(&Roots).register_from(&Roots);

        assert_eq!(container.registrations().count(), 1);
        assert_eq!(container.composition_roots().len(), 1);
        assert!(container.is_registered::<Clock>());
    }

    #[test]
    fn service_collection_overrides_container_registrations() {
        let mut container = CompositionContainer::new();
        container.register_instance::<String>(Arc::new("container".into()));

        let mut services = ServiceCollection::new();
        services.add_singleton::<String>(Arc::new("services".into()));

        let provider = Box::new(container).build(services).unwrap();
        assert_eq!(provider.get::<String>().unwrap().as_str(), "services");
        assert_eq!(provider.get_all::<String>().unwrap().len(), 2);
    }
}
