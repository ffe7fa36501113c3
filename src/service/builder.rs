//! Declaring a service's exposed routes.

use std::sync::Arc;

use crate::routing::action::{parse_methods, Action, ExposedAction, DEFAULT_METHODS};
use crate::routing::template::{RouteError, RouteTemplate};
use crate::service::{InstanceMode, ServiceSlot, ServiceType};

struct Declared<S> {
    template: String,
    methods: String,
    action: Action<S>,
}

/// Collects route declarations for service type `S`.
///
/// Nothing is validated until [`build`](ServiceBuilder::build).
pub struct ServiceBuilder<S> {
    mode: InstanceMode,
    declared: Vec<Declared<S>>,
}

impl<S: Send + Sync + 'static> Default for ServiceBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync + 'static> ServiceBuilder<S> {
    pub fn new() -> Self {
        Self {
            mode: InstanceMode::PerRequest,
            declared: Vec::new(),
        }
    }

    pub fn instance_mode(mut self, mode: InstanceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Expose an action accepting the default verbs.
    pub fn route(self, template: &str, action: Action<S>) -> Self {
        self.route_with_methods(template, DEFAULT_METHODS, action)
    }

    /// Expose an action accepting a comma-separated verb list.
    pub fn route_with_methods(mut self, template: &str, methods: &str, action: Action<S>) -> Self {
        self.declared.push(Declared {
            template: template.to_string(),
            methods: methods.to_string(),
            action,
        });
        self
    }

    /// Compile every declared route.
    pub fn build(self) -> Result<ExposedService, RouteError> {
        let slot = Arc::new(ServiceSlot::new(ServiceType::of::<S>(), self.mode));

        let actions = self
            .declared
            .into_iter()
            .map(|declared| {
                let Declared {
                    template,
                    methods,
                    action,
                } = declared;

                let input = action
                    .input
                    .as_ref()
                    .map(|d| (d.type_name, d.properties));
                let compiled = RouteTemplate::compile(&template, input)?;

                let methods = parse_methods(&methods);
                if methods.is_empty() {
                    return Err(RouteError::NoMethods(compiled.route().to_string()));
                }

                Ok(ExposedAction::new(
                    Arc::clone(&slot),
                    compiled,
                    methods,
                    action.input,
                    action.execution,
                ))
            })
            .collect::<Result<Vec<_>, RouteError>>()?;

        Ok(ExposedService { slot, actions })
    }
}

/// A service with its compiled actions, ready for registration.
#[derive(Debug)]
pub struct ExposedService {
    slot: Arc<ServiceSlot>,
    actions: Vec<ExposedAction>,
}

impl ExposedService {
    pub fn service(&self) -> &ServiceType {
        self.slot.service()
    }

    pub fn slot(&self) -> &ServiceSlot {
        &self.slot
    }

    pub fn actions(&self) -> &[ExposedAction] {
        &self.actions
    }

    pub(crate) fn into_actions(self) -> Vec<ExposedAction> {
        self.actions
    }
}
