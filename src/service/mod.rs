//! Service types, instance lifetimes and dependency resolution.
//!
//! # Responsibilities
//! - Identify service types at runtime
//! - Decide per registration whether instances are shared or per request
//! - Obtain instances through a pluggable resolver
//!
//! # Design Decisions
//! - Instances are type-erased `Arc<dyn Any>`; typed wrappers downcast
//! - A singleton is constructed at most once, even under concurrent first use
//! - Strict singletons are built at registration, so failures surface at startup

pub mod builder;
pub mod resolver;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

pub use builder::{ExposedService, ServiceBuilder};
pub use resolver::{resolve, SimpleResolver};

/// A type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Runtime identity of a service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceType {
    id: TypeId,
    name: &'static str,
}

impl ServiceType {
    pub fn of<S: Any>() -> Self {
        Self {
            id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Lifetime of a service's instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstanceMode {
    /// A fresh instance for every request.
    #[default]
    PerRequest,
    /// One shared instance, created on first use.
    SingletonLazy,
    /// One shared instance, created when the service is registered.
    SingletonStrict,
}

/// Error type for instance resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No registration for service {0}")]
    NotRegistered(&'static str),

    #[error("Failed to construct service {service}: {reason:#}")]
    Construction {
        service: &'static str,
        reason: anyhow::Error,
    },

    #[error("Resolver returned an instance of the wrong type for {0}")]
    WrongType(&'static str),
}

/// Produces service instances on demand.
pub trait DependencyResolver: Send + Sync {
    fn get_instance(&self, service: &ServiceType) -> Result<ServiceInstance, ResolveError>;

    fn get_instances(&self, services: &[ServiceType]) -> Result<Vec<ServiceInstance>, ResolveError> {
        services.iter().map(|s| self.get_instance(s)).collect()
    }
}

/// A failure a handler raises to choose the response status itself.
///
/// Found anywhere in a handler error's chain, it replaces the default 500.
#[derive(Debug, Clone, Error)]
#[error("{status} {reason}: {message}")]
pub struct ServiceCallError {
    pub status: u16,
    pub reason: String,
    pub message: String,
}

impl ServiceCallError {
    pub fn new(status: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Locate a service call error in an error chain.
    pub fn find(error: &anyhow::Error) -> Option<&ServiceCallError> {
        error.chain().find_map(|e| e.downcast_ref::<ServiceCallError>())
    }
}

/// Where a registered service's instances come from.
pub struct ServiceSlot {
    service: ServiceType,
    mode: InstanceMode,
    singleton: OnceLock<ServiceInstance>,
}

impl ServiceSlot {
    pub fn new(service: ServiceType, mode: InstanceMode) -> Self {
        Self {
            service,
            mode,
            singleton: OnceLock::new(),
        }
    }

    pub fn service(&self) -> &ServiceType {
        &self.service
    }

    pub fn mode(&self) -> InstanceMode {
        self.mode
    }

    /// Whether the shared instance exists yet.
    pub fn is_initialized(&self) -> bool {
        self.singleton.get().is_some()
    }

    /// Instance for one invocation, honoring the instance mode.
    pub fn instance(&self, resolver: &dyn DependencyResolver) -> Result<ServiceInstance, ResolveError> {
        match self.mode {
            InstanceMode::PerRequest => resolver.get_instance(&self.service),
            InstanceMode::SingletonLazy | InstanceMode::SingletonStrict => {
                if let Some(instance) = self.singleton.get() {
                    return Ok(Arc::clone(instance));
                }
                let created = resolver.get_instance(&self.service)?;
                // Losers of a first-use race discard their instance.
                Ok(Arc::clone(self.singleton.get_or_init(|| created)))
            }
        }
    }
}

impl fmt::Debug for ServiceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSlot")
            .field("service", &self.service.name)
            .field("mode", &self.mode)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter;

    struct CountingResolver {
        created: AtomicUsize,
    }

    impl DependencyResolver for CountingResolver {
        fn get_instance(&self, service: &ServiceType) -> Result<ServiceInstance, ResolveError> {
            if service.id() != TypeId::of::<Counter>() {
                return Err(ResolveError::NotRegistered(service.name()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Counter))
        }
    }

    fn resolver() -> CountingResolver {
        CountingResolver {
            created: AtomicUsize::new(0),
        }
    }

    #[test]
    fn per_request_creates_every_time() {
        let r = resolver();
        let slot = ServiceSlot::new(ServiceType::of::<Counter>(), InstanceMode::PerRequest);
        slot.instance(&r).unwrap();
        slot.instance(&r).unwrap();
        assert_eq!(r.created.load(Ordering::SeqCst), 2);
        assert!(!slot.is_initialized());
    }

    #[test]
    fn singleton_is_shared() {
        let r = resolver();
        let slot = ServiceSlot::new(ServiceType::of::<Counter>(), InstanceMode::SingletonLazy);
        assert!(!slot.is_initialized());
        let a = slot.instance(&r).unwrap();
        let b = slot.instance(&r).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(r.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_yields_one_instance() {
        let r = Arc::new(resolver());
        let slot = Arc::new(ServiceSlot::new(
            ServiceType::of::<Counter>(),
            InstanceMode::SingletonLazy,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = Arc::clone(&r);
                let slot = Arc::clone(&slot);
                std::thread::spawn(move || slot.instance(r.as_ref()).unwrap())
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn resolver_failure_propagates() {
        let r = resolver();
        let slot = ServiceSlot::new(ServiceType::of::<String>(), InstanceMode::PerRequest);
        assert!(matches!(slot.instance(&r), Err(ResolveError::NotRegistered(_))));
    }

    #[test]
    fn service_call_error_found_in_chain() {
        let err = anyhow::Error::new(ServiceCallError::new(409, "Conflict", "already exists"))
            .context("while creating item");
        let found = ServiceCallError::find(&err).unwrap();
        assert_eq!(found.status, 409);
        assert_eq!(found.reason, "Conflict");

        assert!(ServiceCallError::find(&anyhow::anyhow!("plain")).is_none());
    }
}
