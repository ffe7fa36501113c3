//! Exposed actions: a compiled route bound to a type-erased handler call.
//!
//! # Responsibilities
//! - Describe an action's input (none, raw body, JSON type, JSON type + raw body)
//! - Pick the execution strategy once, from the declared handler signature
//! - Erase service and input types so the dispatcher stays type-agnostic
//!
//! # Design Decisions
//! - Strategy is a closed enum (`Execution`), never re-derived per request
//! - Typed wrappers do the downcast and the final JSON decode/encode
//! - Handlers return `anyhow::Result`; errors carry through untouched

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::http::Request;
use crate::routing::dispatcher::DispatchError;
use crate::routing::template::{Property, RouteTemplate};
use crate::service::{ResolveError, ServiceInstance, ServiceSlot};

/// Accepted verbs when a route declares none.
pub const DEFAULT_METHODS: &str = "POST,GET,PUT";

/// Arguments bound from the request before invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    /// Decoded JSON body with path parameters applied.
    pub json: Value,
    /// Raw body text.
    pub body: String,
}

/// How an input type is built from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The raw body text, no decoding.
    RawBody,
    /// JSON-decoded body with path parameters applied.
    Json,
    /// Both of the above, as two arguments.
    JsonAndBody,
}

/// Declared input of an action.
#[derive(Debug, Clone)]
pub struct InputDescriptor {
    pub type_name: &'static str,
    pub kind: InputKind,
    /// Writable scalar properties path parameters may bind to.
    pub properties: &'static [Property],
    default_value: fn() -> Result<Value, serde_json::Error>,
}

impl InputDescriptor {
    /// JSON form of the input type's default, used when the body is empty.
    pub fn default_value(&self) -> Result<Value, serde_json::Error> {
        (self.default_value)()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn default_json<T: Serialize + Default>() -> Result<Value, serde_json::Error> {
    serde_json::to_value(T::default())
}

fn null_json() -> Result<Value, serde_json::Error> {
    Ok(Value::Null)
}

/// Writable scalar properties of a JSON input type.
///
/// Names must be the serialized field names.
pub trait RouteParams {
    const PROPERTIES: &'static [Property] = &[];
}

/// JSON-decoded handler input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

/// A handler argument that can be built from bound request data.
pub trait RouteInput: Sized + Send + 'static {
    fn descriptor() -> InputDescriptor;

    fn from_args(args: ActionArgs) -> Result<Self, serde_json::Error>;
}

impl RouteInput for String {
    fn descriptor() -> InputDescriptor {
        InputDescriptor {
            type_name: "String",
            kind: InputKind::RawBody,
            properties: &[],
            default_value: null_json,
        }
    }

    fn from_args(args: ActionArgs) -> Result<Self, serde_json::Error> {
        Ok(args.body)
    }
}

impl<T> RouteInput for Json<T>
where
    T: RouteParams + DeserializeOwned + Serialize + Default + Send + 'static,
{
    fn descriptor() -> InputDescriptor {
        InputDescriptor {
            type_name: short_type_name::<T>(),
            kind: InputKind::Json,
            properties: T::PROPERTIES,
            default_value: default_json::<T>,
        }
    }

    fn from_args(args: ActionArgs) -> Result<Self, serde_json::Error> {
        serde_json::from_value(args.json).map(Json)
    }
}

impl<T> RouteInput for (Json<T>, String)
where
    T: RouteParams + DeserializeOwned + Serialize + Default + Send + 'static,
{
    fn descriptor() -> InputDescriptor {
        InputDescriptor {
            kind: InputKind::JsonAndBody,
            ..Json::<T>::descriptor()
        }
    }

    fn from_args(args: ActionArgs) -> Result<Self, serde_json::Error> {
        let value = serde_json::from_value(args.json)?;
        Ok((Json(value), args.body))
    }
}

type VoidInvoke =
    dyn Fn(ServiceInstance, Arc<Request>, Option<ActionArgs>) -> Result<(), DispatchError> + Send + Sync;
type ValueInvoke =
    dyn Fn(ServiceInstance, Arc<Request>, Option<ActionArgs>) -> Result<Value, DispatchError> + Send + Sync;
type DeferredInvoke = dyn Fn(ServiceInstance, Arc<Request>, Option<ActionArgs>) -> BoxFuture<'static, Result<Value, DispatchError>>
    + Send
    + Sync;

/// Execution strategy, chosen when the action is declared.
#[derive(Clone)]
pub enum Execution {
    /// Invoke, discard the return.
    Void(Arc<VoidInvoke>),
    /// Invoke, report the returned value.
    Value(Arc<ValueInvoke>),
    /// Invoke, await the future, report its value.
    Deferred(Arc<DeferredInvoke>),
}

/// Shape of an action's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Void,
    Value,
    Deferred,
}

impl Execution {
    pub fn shape(&self) -> OutputShape {
        match self {
            Execution::Void(_) => OutputShape::Void,
            Execution::Value(_) => OutputShape::Value,
            Execution::Deferred(_) => OutputShape::Deferred,
        }
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Execution::{:?}", self.shape())
    }
}

fn downcast<S: Send + Sync + 'static>(instance: ServiceInstance) -> Result<Arc<S>, DispatchError> {
    let any: Arc<dyn Any + Send + Sync> = instance;
    any.downcast::<S>()
        .map_err(|_| DispatchError::Resolve(ResolveError::WrongType(short_type_name::<S>())))
}

fn bind<I: RouteInput>(args: Option<ActionArgs>) -> Result<I, DispatchError> {
    let args = args.unwrap_or_default();
    I::from_args(args).map_err(|e| DispatchError::BadRequest(e.to_string()))
}

fn encode<R: Serialize>(result: R) -> Result<Value, DispatchError> {
    serde_json::to_value(result).map_err(DispatchError::Encode)
}

/// A handler declaration for service type `S`, not yet bound to a route.
pub struct Action<S> {
    pub(crate) input: Option<InputDescriptor>,
    pub(crate) execution: Execution,
    _service: PhantomData<fn(&S)>,
}

impl<S: Send + Sync + 'static> Action<S> {
    fn new(input: Option<InputDescriptor>, execution: Execution) -> Self {
        Self {
            input,
            execution,
            _service: PhantomData,
        }
    }

    /// No input, no result.
    pub fn void<F>(handler: F) -> Self
    where
        F: Fn(&S, &Request) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let invoke = move |instance: ServiceInstance, request: Arc<Request>, _: Option<ActionArgs>| {
            let service = downcast::<S>(instance)?;
            handler(&*service, &*request).map_err(DispatchError::Handler)
        };
        Self::new(None, Execution::Void(Arc::new(invoke)))
    }

    /// Input, no result.
    pub fn void_with<I, F>(handler: F) -> Self
    where
        I: RouteInput,
        F: Fn(&S, &Request, I) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let invoke = move |instance: ServiceInstance, request: Arc<Request>, args: Option<ActionArgs>| {
            let input = bind::<I>(args)?;
            let service = downcast::<S>(instance)?;
            handler(&*service, &*request, input).map_err(DispatchError::Handler)
        };
        Self::new(Some(I::descriptor()), Execution::Void(Arc::new(invoke)))
    }

    /// No input, synchronous result.
    pub fn value<R, F>(handler: F) -> Self
    where
        R: Serialize,
        F: Fn(&S, &Request) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let invoke = move |instance: ServiceInstance, request: Arc<Request>, _: Option<ActionArgs>| {
            let service = downcast::<S>(instance)?;
            let result = handler(&*service, &*request).map_err(DispatchError::Handler)?;
            encode(result)
        };
        Self::new(None, Execution::Value(Arc::new(invoke)))
    }

    /// Input, synchronous result.
    pub fn value_with<I, R, F>(handler: F) -> Self
    where
        I: RouteInput,
        R: Serialize,
        F: Fn(&S, &Request, I) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let invoke = move |instance: ServiceInstance, request: Arc<Request>, args: Option<ActionArgs>| {
            let input = bind::<I>(args)?;
            let service = downcast::<S>(instance)?;
            let result = handler(&*service, &*request, input).map_err(DispatchError::Handler)?;
            encode(result)
        };
        Self::new(Some(I::descriptor()), Execution::Value(Arc::new(invoke)))
    }

    /// No input, deferred result. A `()` result reports nothing.
    pub fn deferred<R, Fut, F>(handler: F) -> Self
    where
        R: Serialize,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        F: Fn(Arc<S>, Arc<Request>) -> Fut + Send + Sync + 'static,
    {
        let invoke = move |instance: ServiceInstance, request: Arc<Request>, _: Option<ActionArgs>| {
            let service = match downcast::<S>(instance) {
                Ok(service) => service,
                Err(e) => return futures_util::future::ready(Err(e)).boxed(),
            };
            handler(service, request)
                .map(|result| result.map_err(DispatchError::Handler).and_then(encode))
                .boxed()
        };
        Self::new(None, Execution::Deferred(Arc::new(invoke)))
    }

    /// Input, deferred result.
    pub fn deferred_with<I, R, Fut, F>(handler: F) -> Self
    where
        I: RouteInput,
        R: Serialize,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        F: Fn(Arc<S>, Arc<Request>, I) -> Fut + Send + Sync + 'static,
    {
        let invoke = move |instance: ServiceInstance, request: Arc<Request>, args: Option<ActionArgs>| {
            let prepared = bind::<I>(args).and_then(|input| Ok((downcast::<S>(instance)?, input)));
            match prepared {
                Ok((service, input)) => handler(service, request, input)
                    .map(|result| result.map_err(DispatchError::Handler).and_then(encode))
                    .boxed(),
                Err(e) => futures_util::future::ready(Err(e)).boxed(),
            }
        };
        Self::new(Some(I::descriptor()), Execution::Deferred(Arc::new(invoke)))
    }

    pub fn output_shape(&self) -> OutputShape {
        self.execution.shape()
    }
}

/// Parse a comma-separated verb list into upper-case verbs.
pub fn parse_methods(methods: &str) -> Vec<String> {
    methods
        .split(',')
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty())
        .collect()
}

/// A compiled action registered under one route.
#[derive(Debug)]
pub struct ExposedAction {
    slot: Arc<ServiceSlot>,
    template: RouteTemplate,
    methods: Vec<String>,
    input: Option<InputDescriptor>,
    execution: Execution,
}

impl ExposedAction {
    pub(crate) fn new(
        slot: Arc<ServiceSlot>,
        template: RouteTemplate,
        methods: Vec<String>,
        input: Option<InputDescriptor>,
        execution: Execution,
    ) -> Self {
        Self {
            slot,
            template,
            methods,
            input,
            execution,
        }
    }

    /// Normalized route string.
    pub fn route(&self) -> &str {
        self.template.route()
    }

    pub fn template(&self) -> &RouteTemplate {
        &self.template
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Whether the verb is accepted (case-insensitive).
    pub fn accepts(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn input(&self) -> Option<&InputDescriptor> {
        self.input.as_ref()
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn output_shape(&self) -> OutputShape {
        self.execution.shape()
    }

    pub fn slot(&self) -> &ServiceSlot {
        &self.slot
    }
}
