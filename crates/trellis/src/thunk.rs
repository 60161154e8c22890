//! Uniform invocation layer
//!
//! An [`InvocationThunk`] wraps one underlying callable (a constructor, a
//! method, or a synthesized shape) behind a single contract: ordered
//! parameter metadata plus `invoke(instance, args)`. Binding to the concrete
//! callable is lazy and cached per thunk on first invocation, so repeated
//! resolutions of the same recipe pay the wiring cost once.
//!
//! Constructors produce a [`Constructed`] draft rather than a finished value:
//! the container injects members into the draft and only then seals it into a
//! shared, optionally disposal-capable [`Produced`]. A draft that fails
//! member injection is dropped without ever being exposed.
//!
//! Callable synthesis ([`FactoryShape`]) builds a callable matching a
//! registered shape whose body packs its arguments into a name-to-value
//! [`ShapeArgs`] map and forwards it to the container's one generic handler:
//! one handler serves arbitrarily many shapes, at the cost of one map
//! allocation per invocation.

use crate::error::{Error, Result};
use crate::key::{ServiceInstance, ServiceKey};
use crate::lifecycle::Dispose;
use crate::params::{ArgBag, MemberDescriptor, ParameterDescriptor};
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// What the wrapped callable is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkKind {
    /// Builds a fresh value; supplying an instance is an error
    Constructor,
    /// Runs against an existing instance; omitting it is an error
    Method,
}

/// A finished, sealed product: the shared payload plus its disposer, if the
/// underlying type exposes disposal capability
pub struct Produced {
    pub(crate) value: ServiceInstance,
    pub(crate) disposer: Option<Arc<dyn Dispose>>,
}

impl Produced {
    /// Seal a value with no disposal capability
    pub fn plain<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            disposer: None,
        }
    }

    /// Seal a disposal-capable value; the same allocation serves as payload
    /// and disposer
    pub fn managed<T: Dispose + 'static>(value: T) -> Self {
        let shared = Arc::new(value);
        Self {
            value: Arc::clone(&shared) as ServiceInstance,
            disposer: Some(shared),
        }
    }

    /// Wrap an existing payload as-is
    pub fn from_instance(value: ServiceInstance) -> Self {
        Self {
            value,
            disposer: None,
        }
    }

    /// The shared payload
    pub fn value(&self) -> &ServiceInstance {
        &self.value
    }
}

type SealFn = Box<dyn Fn(Box<dyn Any + Send + Sync>) -> Result<Produced> + Send + Sync>;

/// An unsealed construction draft
///
/// Members are injected against the draft; `seal` then converts it into the
/// shared [`Produced`]. Dropping an unsealed draft discards the value.
pub struct Constructed {
    draft: Box<dyn Any + Send + Sync>,
    seal: SealFn,
}

impl std::fmt::Debug for Constructed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constructed").finish_non_exhaustive()
    }
}

impl Constructed {
    /// Mutable access for member injection
    pub(crate) fn draft_mut(&mut self) -> &mut (dyn Any + Send + Sync) {
        self.draft.as_mut()
    }

    /// Seal the draft into its shared form
    pub(crate) fn seal(self) -> Result<Produced> {
        (self.seal)(self.draft)
    }
}

/// The lazily-bound callable behind a thunk
pub type BoundFn = Arc<
    dyn Fn(Option<ServiceInstance>, ArgBag) -> BoxFuture<'static, Result<Constructed>>
        + Send
        + Sync,
>;

type Binder = Box<dyn Fn() -> BoundFn + Send + Sync>;

/// Cached, lazily-bound invocation wrapper unifying constructors, methods,
/// and synthesized callables
pub struct InvocationThunk {
    kind: ThunkKind,
    target: ServiceKey,
    parameters: Vec<ParameterDescriptor>,
    members: Vec<MemberDescriptor>,
    binder: Binder,
    bound: OnceLock<BoundFn>,
}

impl InvocationThunk {
    /// Start describing a constructor for `T`
    pub fn constructor<T: Send + Sync + 'static>() -> ThunkBuilder<T> {
        ThunkBuilder::new(ThunkKind::Constructor)
    }

    /// Start describing a method producing `T`
    pub fn method<T: Send + Sync + 'static>() -> ThunkBuilder<T> {
        ThunkBuilder::new(ThunkKind::Method)
    }

    /// Whether this thunk wraps a constructor or a method
    pub fn kind(&self) -> ThunkKind {
        self.kind
    }

    /// Type the thunk produces
    pub fn target(&self) -> ServiceKey {
        self.target
    }

    /// Ordered parameter metadata, consumed by the parameter resolver
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Injectable members applied after construction
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// True once the underlying callable has been bound
    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    /// Invoke the wrapped callable
    ///
    /// For a constructor, `instance` must be absent; for a method it must be
    /// present. The first invocation binds the underlying callable and caches
    /// the binding for the thunk's lifetime.
    pub async fn invoke(
        &self,
        instance: Option<ServiceInstance>,
        args: ArgBag,
    ) -> Result<Constructed> {
        match (self.kind, instance.is_some()) {
            (ThunkKind::Constructor, true) => {
                return Err(Error::invalid_invocation(format!(
                    "constructor thunk for `{}` was supplied an instance",
                    self.target
                )));
            }
            (ThunkKind::Method, false) => {
                return Err(Error::invalid_invocation(format!(
                    "method thunk for `{}` requires an instance",
                    self.target
                )));
            }
            _ => {}
        }
        let bound = self.bound.get_or_init(|| (self.binder)());
        bound(instance, args).await
    }
}

impl std::fmt::Debug for InvocationThunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationThunk")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("parameters", &self.parameters.len())
            .field("members", &self.members.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Builder for an [`InvocationThunk`] producing `T`
pub struct ThunkBuilder<T> {
    kind: ThunkKind,
    parameters: Vec<ParameterDescriptor>,
    members: Vec<MemberDescriptor>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ThunkBuilder<T> {
    fn new(kind: ThunkKind) -> Self {
        Self {
            kind,
            parameters: Vec::new(),
            members: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Append one parameter descriptor
    pub fn param(mut self, descriptor: ParameterDescriptor) -> Self {
        self.parameters.push(descriptor);
        self
    }

    /// Append one injectable member
    pub fn member(mut self, descriptor: MemberDescriptor) -> Self {
        self.members.push(descriptor);
        self
    }

    /// Finish with a body producing a plain (not disposal-capable) value
    pub fn build<F, Fut>(self, body: F) -> Arc<InvocationThunk>
    where
        F: Fn(ArgBag) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.finish(move |_instance, args| body(args), |value: T| {
            Produced::plain(value)
        })
    }

    /// Finish with a body producing a disposal-capable value
    pub fn build_managed<F, Fut>(self, body: F) -> Arc<InvocationThunk>
    where
        T: Dispose,
        F: Fn(ArgBag) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.finish(move |_instance, args| body(args), |value: T| {
            Produced::managed(value)
        })
    }

    /// Finish a method thunk with a body that runs against the supplied
    /// instance
    ///
    /// `invoke` enforces that the instance is present; the body receives it
    /// type-erased and downcasts to the type it operates on.
    pub fn build_method<F, Fut>(self, body: F) -> Arc<InvocationThunk>
    where
        F: Fn(ServiceInstance, ArgBag) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let target = ServiceKey::of::<T>();
        self.finish(
            move |instance, args| {
                let body = body.clone();
                async move {
                    let instance = instance.ok_or_else(|| {
                        Error::invalid_invocation(format!(
                            "method thunk for `{target}` requires an instance"
                        ))
                    })?;
                    body(instance, args).await
                }
            },
            |value: T| Produced::plain(value),
        )
    }

    fn finish<F, Fut>(self, body: F, seal_value: fn(T) -> Produced) -> Arc<InvocationThunk>
    where
        F: Fn(Option<ServiceInstance>, ArgBag) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let target = ServiceKey::of::<T>();
        let binder: Binder = Box::new(move || {
            let body = body.clone();
            Arc::new(move |instance, args| {
                let body = body.clone();
                Box::pin(async move {
                    let value = body(instance, args).await?;
                    let seal: SealFn = Box::new(move |draft| {
                        let draft = draft.downcast::<T>().map_err(|_| {
                            Error::invalid_invocation(format!(
                                "draft for `{target}` has the wrong type"
                            ))
                        })?;
                        Ok(seal_value(*draft))
                    });
                    Ok(Constructed {
                        draft: Box::new(value),
                        seal,
                    })
                })
            })
        });
        Arc::new(InvocationThunk {
            kind: self.kind,
            target,
            parameters: self.parameters,
            members: self.members,
            binder,
            bound: OnceLock::new(),
        })
    }
}

/// Name-to-value map packed by a synthesized callable on each invocation
pub struct ShapeArgs {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl ShapeArgs {
    /// Empty map
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Pack one named argument
    pub fn insert<V: Send + Sync + 'static>(&mut self, name: &'static str, value: V) {
        self.values.insert(name, Box::new(value));
    }

    /// Take a named argument out of the map
    pub fn take<V: Send + Sync + 'static>(&mut self, name: &'static str) -> Result<V> {
        let boxed = self.values.remove(name).ok_or_else(|| {
            Error::invalid_invocation(format!("shape argument `{name}` was not packed"))
        })?;
        boxed.downcast::<V>().map(|b| *b).map_err(|_| {
            Error::invalid_invocation(format!(
                "shape argument `{name}` is not a `{}`",
                std::any::type_name::<V>()
            ))
        })
    }

    /// Number of packed arguments
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was packed
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for ShapeArgs {
    fn default() -> Self {
        Self::new()
    }
}

/// The one generic implementation all synthesized callables forward to
pub type GenericHandler =
    Arc<dyn Fn(ShapeArgs) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

type Synthesize = Arc<dyn Fn(GenericHandler) -> Produced + Send + Sync>;

/// A registered callable shape paired with its declared result type
///
/// Shapes are finite and registered during configuration; the factory-shape
/// strategy synthesizes the matching callable on demand by pairing the shape
/// with the container's generic handler.
pub struct FactoryShape {
    shape: ServiceKey,
    result: ServiceKey,
    parameters: Vec<ParameterDescriptor>,
    synthesize: Synthesize,
}

impl FactoryShape {
    /// Register shape type `S` producing logical results of type `R`
    ///
    /// `synthesize` receives the generic handler and must return the callable
    /// instance conforming to `S`.
    pub fn new<S, R, F>(parameters: Vec<ParameterDescriptor>, synthesize: F) -> Arc<Self>
    where
        S: Send + Sync + 'static,
        R: 'static,
        F: Fn(GenericHandler) -> Produced + Send + Sync + 'static,
    {
        Arc::new(Self {
            shape: ServiceKey::of::<S>(),
            result: ServiceKey::of::<R>(),
            parameters,
            synthesize: Arc::new(synthesize),
        })
    }

    /// Key of the callable-shape type
    pub fn shape_key(&self) -> ServiceKey {
        self.shape
    }

    /// Declared logical result type of the shape
    pub fn result_key(&self) -> ServiceKey {
        self.result
    }

    /// Parameter metadata of the shape
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Build the callable instance against the given handler
    pub fn synthesize(&self, handler: GenericHandler) -> Produced {
        (self.synthesize)(handler)
    }
}

impl std::fmt::Debug for FactoryShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryShape")
            .field("shape", &self.shape)
            .field("result", &self.result)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}
