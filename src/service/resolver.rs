//! Registry-backed dependency resolver.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::service::{DependencyResolver, ResolveError, ServiceInstance, ServiceType};

type Factory = Arc<dyn Fn(&dyn DependencyResolver) -> anyhow::Result<ServiceInstance> + Send + Sync>;

/// Resolves services from registered factories.
///
/// Factories receive the resolver, so a service can pull its own
/// dependencies with [`resolve`].
#[derive(Default, Clone)]
pub struct SimpleResolver {
    factories: HashMap<TypeId, (&'static str, Factory)>,
}

impl SimpleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `S`. Replaces any earlier registration.
    pub fn register<S, F>(&mut self, factory: F) -> &mut Self
    where
        S: Send + Sync + 'static,
        F: Fn(&dyn DependencyResolver) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let service = ServiceType::of::<S>();
        let erased: Factory = Arc::new(move |resolver: &dyn DependencyResolver| {
            let instance: ServiceInstance = Arc::new(factory(resolver)?);
            Ok(instance)
        });
        self.factories.insert(service.id(), (service.name(), erased));
        self
    }

    /// Register an existing instance; every resolution returns it.
    pub fn register_instance<S: Send + Sync + 'static>(&mut self, instance: Arc<S>) -> &mut Self {
        let service = ServiceType::of::<S>();
        let erased: Factory = Arc::new(move |_: &dyn DependencyResolver| {
            let instance: ServiceInstance = Arc::clone(&instance) as Arc<dyn Any + Send + Sync>;
            Ok(instance)
        });
        self.factories.insert(service.id(), (service.name(), erased));
        self
    }

    pub fn is_registered(&self, service: &ServiceType) -> bool {
        self.factories.contains_key(&service.id())
    }
}

impl DependencyResolver for SimpleResolver {
    fn get_instance(&self, service: &ServiceType) -> Result<ServiceInstance, ResolveError> {
        let (name, factory) = self
            .factories
            .get(&service.id())
            .ok_or(ResolveError::NotRegistered(service.name()))?;
        factory(self as &dyn DependencyResolver).map_err(|reason| ResolveError::Construction {
            service: *name,
            reason,
        })
    }
}

/// Typed resolution of `T` through any resolver.
pub fn resolve<T: Send + Sync + 'static>(resolver: &dyn DependencyResolver) -> Result<Arc<T>, ResolveError> {
    let service = ServiceType::of::<T>();
    resolver
        .get_instance(&service)?
        .downcast::<T>()
        .map_err(|_| ResolveError::WrongType(service.name()))
}
