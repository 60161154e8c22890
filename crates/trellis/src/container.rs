//! Container and lifecycle state machine
//!
//! [`ContainerBuilder`] is the configuring state: a single-writer, owned
//! chaining surface that records bindings, tags, markers, constructors,
//! shapes, and stubs. `start` freezes the registry, resolves the entry object
//! depth-first, and yields a started [`Container`]; any startup failure tears
//! down everything constructed so far before propagating, so no live objects
//! escape a failed start.
//!
//! The container then moves Started → ShuttingDown → Disposed. `run` invokes
//! the entry exactly once. `shutdown` cancels owned scopes and disposes
//! sibling branches concurrently, aggregating per-branch failures; it is
//! idempotent. `signal_shutdown`/`wait_for_shutdown` expose the host shutdown
//! signal for embedding in process entry points.

use crate::config::HostSettings;
use crate::error::{Error, Result};
use crate::key::{downcast, ServiceInstance, ServiceKey};
use crate::lifecycle::{CancellationScope, DisposalSet, Dispose, Owned};
use crate::params::{ArgBag, InjectionOverride, MemberDescriptor, ParameterDescriptor};
use crate::recipe::{Recipe, RecipeKind, Sharing};
use crate::registry::{Registry, RegistryReport};
use crate::strategy::StrategyChain;
use crate::tag::{Tag, TagRegistration, TypeMarker};
use crate::thunk::{Constructed, FactoryShape, GenericHandler, InvocationThunk};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The object the container exists to produce and drive
#[async_trait]
pub trait Entrypoint: Send + Sync {
    /// The host program's main body, run exactly once
    async fn run(&self) -> Result<()>;
}

/// Post-configuration states of the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Entry resolved, resolution available
    Started,
    /// Teardown sweep in progress
    ShuttingDown,
    /// Teardown complete, container inert
    Disposed,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Started => "started",
            Self::ShuttingDown => "shutting-down",
            Self::Disposed => "disposed",
        })
    }
}

const STATE_STARTED: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_DISPOSED: u8 = 2;

/// Configuring-state surface: records configuration, then starts the container
///
/// Owned chaining; the builder is the single writer and is consumed by
/// `start`.
#[derive(Default)]
pub struct ContainerBuilder {
    registry: Registry,
}

impl ContainerBuilder {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fixed, host-owned instance to its own type
    ///
    /// Instance values are returned as-is on every request and are never
    /// disposed by the container.
    pub fn bind_instance<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        let key = ServiceKey::of::<T>();
        debug!(key = %key.short_name(), "binding instance");
        self.registry.insert_binding(key, Recipe::instance(value));
        self
    }

    /// Bind an explicit recipe to key `K`
    pub fn bind_recipe<K: ?Sized + 'static>(mut self, recipe: Recipe) -> Self {
        let key = ServiceKey::of::<K>();
        debug!(key = %key.short_name(), "binding recipe");
        self.registry.insert_binding(key, recipe);
        self
    }

    /// Pin concrete `C` as the implementation of abstraction `A`
    ///
    /// `coerce` turns the constructed `Arc<C>` into the `Arc<A>` handle the
    /// requester receives. `C` still needs a registered constructor.
    pub fn bind_implementation<A, C>(self, coerce: fn(Arc<C>) -> Arc<A>) -> Self
    where
        A: ?Sized + 'static,
        C: Send + Sync + 'static,
        Arc<A>: Send + Sync,
    {
        self.bind_recipe::<A>(Recipe::implementation::<A, C>(coerce))
    }

    /// Register tag `T`, activated through `Default` when its key is requested
    pub fn register_tag<T: Tag + Default>(mut self) -> Self {
        let registration = TagRegistration::of::<T>();
        debug!(key = %registration.key().short_name(), "registering tag");
        self.registry.insert_tag(registration);
        self
    }

    /// Bind tag `T` directly to a host-supplied value, bypassing activation
    pub fn bind_tag_value<T: Tag, V: Send + Sync + 'static>(mut self, value: V) -> Self {
        let registration = TagRegistration::with_recipe::<T>(Recipe::instance(value));
        debug!(key = %registration.key().short_name(), "binding tag value");
        self.registry.insert_tag(registration);
        self
    }

    /// Bind tag `T` to a named host setting, read once at configuration time
    pub fn bind_tag_setting<T: Tag>(self, settings: &HostSettings, name: &str) -> Result<Self> {
        let value = settings.string(name)?;
        Ok(self.bind_tag_value::<T, String>(value))
    }

    /// Register the default constructor for the thunk's target type
    pub fn register_constructor(mut self, thunk: Arc<InvocationThunk>) -> Self {
        let key = thunk.target();
        debug!(key = %key.short_name(), "registering constructor");
        self.registry.constructors_mut(key).set_default(thunk);
        self
    }

    /// Register a named constructor alternate for the thunk's target type
    pub fn register_constructor_named(
        mut self,
        name: &'static str,
        thunk: Arc<InvocationThunk>,
    ) -> Self {
        let key = thunk.target();
        debug!(key = %key.short_name(), ctor = name, "registering named constructor");
        self.registry.constructors_mut(key).set_named(name, thunk);
        self
    }

    /// Record a type-level marker for key `K`
    pub fn register_marker<K: ?Sized + 'static>(mut self, marker: TypeMarker) -> Self {
        self.registry.insert_marker(ServiceKey::of::<K>(), marker);
        self
    }

    /// Register a callable shape, synthesized when its shape type is requested
    pub fn register_factory_shape(mut self, shape: Arc<FactoryShape>) -> Self {
        debug!(shape = %shape.shape_key().short_name(), "registering factory shape");
        self.registry.insert_shape(shape);
        self
    }

    /// Install the one generic handler all synthesized callables forward to
    pub fn set_factory_handler(mut self, handler: GenericHandler) -> Self {
        self.registry.set_factory_handler(handler);
        self
    }

    /// Declare key `K` deliberately unsupported in this host
    ///
    /// Requests for a stubbed key fail immediately with the given reason,
    /// before any fallback strategy can fire.
    pub fn stub<K: ?Sized + 'static>(mut self, reason: &str) -> Self {
        let key = ServiceKey::of::<K>();
        debug!(key = %key.short_name(), "stubbing key");
        self.registry.insert_stub(key, reason.to_string());
        self
    }

    /// Freeze the configuration, resolve the entry, and start the container
    ///
    /// Any failure while resolving the entry graph disposes everything
    /// constructed so far and propagates the original error.
    pub async fn start<E>(self) -> Result<Arc<Container>>
    where
        E: Entrypoint + Send + Sync + 'static,
    {
        let container = Container {
            registry: self.registry,
            chain: StrategyChain::standard(),
            shared: DashMap::new(),
            owned: DisposalSet::new(),
            scope: Arc::new(CancellationScope::new()),
            state: AtomicU8::new(STATE_STARTED),
            entry: std::sync::OnceLock::new(),
            ran: AtomicBool::new(false),
        };

        let entry_key = ServiceKey::of::<E>();
        info!(entry = %entry_key.short_name(), "starting container");
        let mut path = Vec::new();
        let entry = match container.resolve_key(entry_key, &mut path).await {
            Ok(instance) => downcast::<E>(instance, entry_key)?,
            Err(e) => {
                warn!(entry = %entry_key.short_name(), error = %e, "startup failed, unwinding");
                if let Err(teardown) = container.owned.dispose_all().await {
                    warn!(error = %teardown, "teardown during startup unwind reported failures");
                }
                return Err(e);
            }
        };
        let entry: Arc<dyn Entrypoint> = entry;
        // Freshly constructed, nothing can have set it yet.
        let _ = container.entry.set(entry);
        info!(owned = container.owned.len(), "container started");
        Ok(Arc::new(container))
    }
}

impl std::fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Started container: resolution surface plus the object graph it owns
pub struct Container {
    registry: Registry,
    chain: StrategyChain,
    shared: DashMap<ServiceKey, ServiceInstance>,
    owned: DisposalSet,
    scope: Arc<CancellationScope>,
    state: AtomicU8,
    entry: std::sync::OnceLock<Arc<dyn Entrypoint>>,
    ran: AtomicBool,
}

impl Container {
    /// Current lifecycle state
    pub fn state(&self) -> ContainerState {
        match self.state.load(Ordering::SeqCst) {
            STATE_STARTED => ContainerState::Started,
            STATE_SHUTTING_DOWN => ContainerState::ShuttingDown,
            _ => ContainerState::Disposed,
        }
    }

    /// Resolve a concrete type
    pub async fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = ServiceKey::of::<T>();
        let instance = self.resolve_instance(key).await?;
        downcast::<T>(instance, key)
    }

    /// Resolve an abstraction key whose payload is a coerced `Arc<dyn Trait>`
    pub async fn resolve_dyn<A: ?Sized + 'static>(&self) -> Result<Arc<A>>
    where
        Arc<A>: Send + Sync,
    {
        let key = ServiceKey::of::<A>();
        let instance = self.resolve_instance(key).await?;
        instance.downcast_ref::<Arc<A>>().cloned().ok_or_else(|| {
            Error::invalid_invocation(format!("payload for `{key}` is not an abstraction handle"))
        })
    }

    /// Resolve an arbitrary key whose payload is a `T`
    ///
    /// Used for alias and tag keys, where the key type and the produced type
    /// differ.
    pub async fn resolve_keyed<T: Send + Sync + 'static>(&self, key: ServiceKey) -> Result<Arc<T>> {
        let instance = self.resolve_instance(key).await?;
        downcast::<T>(instance, key)
    }

    async fn resolve_instance(&self, key: ServiceKey) -> Result<ServiceInstance> {
        if self.state() != ContainerState::Started {
            return Err(Error::lifecycle(format!(
                "cannot resolve `{key}` while {}",
                self.state()
            )));
        }
        let mut path = Vec::new();
        self.resolve_key(key, &mut path).await
    }

    /// Run the entry object's main body, exactly once
    pub async fn run(&self) -> Result<()> {
        if self.state() != ContainerState::Started {
            return Err(Error::lifecycle(format!(
                "cannot run the entry while {}",
                self.state()
            )));
        }
        if self.ran.swap(true, Ordering::SeqCst) {
            return Err(Error::lifecycle("the entry has already run"));
        }
        let entry = self
            .entry
            .get()
            .ok_or_else(|| Error::lifecycle("no entry object was resolved"))?;
        info!("running entry");
        entry.run().await
    }

    /// Fire the host shutdown signal without starting teardown
    pub fn signal_shutdown(&self) -> bool {
        self.scope.cancel()
    }

    /// Whether the shutdown signal has fired
    pub fn is_shutting_down(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Wait for the host shutdown signal
    pub async fn wait_for_shutdown(&self) {
        self.scope.cancelled().await;
    }

    /// Tear down the owned object graph
    ///
    /// Cancels each owned scope, then disposes sibling branches concurrently;
    /// per-branch failures are aggregated and reported after the sweep.
    /// Idempotent: later calls are no-ops.
    pub async fn shutdown(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                STATE_STARTED,
                STATE_SHUTTING_DOWN,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Ok(());
        }
        info!(owned = self.owned.len(), "shutting down container");
        self.scope.cancel();
        let outcome = self.owned.dispose_all().await;
        self.state.store(STATE_DISPOSED, Ordering::SeqCst);
        info!("container disposed");
        outcome
    }

    /// Number of disposal-capable objects currently owned and live
    pub fn live_count(&self) -> usize {
        self.owned.live_count()
    }

    /// Serializable diagnostic summary of the container
    pub fn report(&self) -> ContainerReport {
        ContainerReport {
            state: self.state().to_string(),
            owned: self.owned.len(),
            live: self.owned.live_count(),
            shared_instances: self.shared.len(),
            registry: self.registry.report(),
        }
    }

    /// Core resolver: cache, cycle guard, strategy chain, recipe execution
    fn resolve_key<'a>(
        &'a self,
        key: ServiceKey,
        path: &'a mut Vec<ServiceKey>,
    ) -> BoxFuture<'a, Result<ServiceInstance>> {
        Box::pin(async move {
            if let Some(hit) = self.shared.get(&key) {
                return Ok(Arc::clone(hit.value()));
            }
            if path.contains(&key) {
                return Err(Error::route_cycle(path, key));
            }
            path.push(key);
            let outcome = match self.chain.decide(key, &self.registry) {
                Ok(recipe) => self.execute_recipe(key, &recipe, &mut *path).await,
                Err(e) => Err(e),
            };
            path.pop();
            outcome
        })
    }

    async fn execute_recipe(
        &self,
        key: ServiceKey,
        recipe: &Recipe,
        path: &mut Vec<ServiceKey>,
    ) -> Result<ServiceInstance> {
        match recipe.kind() {
            // Host-owned; returned as-is, never cached or disposed here.
            RecipeKind::Instance { value } => Ok(Arc::clone(value)),

            // Sharing and identity belong to the final non-route target, so
            // route levels never cache.
            RecipeKind::Route { target } => self.resolve_key(*target, &mut *path).await,

            RecipeKind::Constructor { target, ctor } => {
                let thunk = self.constructor_thunk(*target, *ctor)?;
                let value = self.construct_fresh(&thunk, &mut *path).await?;
                Ok(self.cache_if_shared(key, recipe.sharing(), value))
            }

            RecipeKind::Implementation { concrete, coerce } => {
                let value = if *concrete == key {
                    let thunk = self.constructor_thunk(*concrete, None)?;
                    self.construct_fresh(&thunk, &mut *path).await?
                } else {
                    self.resolve_key(*concrete, &mut *path).await?
                };
                let value = match coerce {
                    Some(coerce) => coerce(value)?,
                    None => value,
                };
                Ok(self.cache_if_shared(key, recipe.sharing(), value))
            }

            RecipeKind::Factory { shape } => {
                let handler = self.registry.factory_handler().ok_or_else(|| {
                    Error::configuration(format!(
                        "shape `{}` requested but no generic factory handler is installed",
                        shape.shape_key()
                    ))
                })?;
                let produced = shape.synthesize(Arc::clone(handler));
                let value = self.adopt_produced(shape.shape_key(), produced);
                Ok(self.cache_if_shared(key, recipe.sharing(), value))
            }
        }
    }

    fn cache_if_shared(
        &self,
        key: ServiceKey,
        sharing: Sharing,
        value: ServiceInstance,
    ) -> ServiceInstance {
        match sharing {
            Sharing::Shared => Arc::clone(
                self.shared
                    .entry(key)
                    .or_insert(value)
                    .value(),
            ),
            Sharing::Transient => value,
        }
    }

    fn constructor_thunk(
        &self,
        target: ServiceKey,
        ctor: Option<&'static str>,
    ) -> Result<Arc<InvocationThunk>> {
        let set = self
            .registry
            .constructors(target)
            .ok_or_else(|| Error::unresolvable(target))?;
        let thunk = match ctor {
            Some(name) => set.named(name).ok_or_else(|| {
                Error::configuration(format!("`{target}` has no constructor named `{name}`"))
            })?,
            None => set.default_thunk().ok_or_else(|| Error::unresolvable(target))?,
        };
        Ok(Arc::clone(thunk))
    }

    /// Build a fresh instance: resolve parameters, invoke, inject members,
    /// seal, adopt the disposer
    ///
    /// Member injection runs against the unsealed draft; a required-member
    /// failure drops the draft before anything is exposed.
    fn construct_fresh<'a>(
        &'a self,
        thunk: &'a Arc<InvocationThunk>,
        path: &'a mut Vec<ServiceKey>,
    ) -> BoxFuture<'a, Result<ServiceInstance>> {
        Box::pin(async move {
            let target = thunk.target();
            debug!(key = %target.short_name(), "constructing");

            let scope = Arc::new(CancellationScope::new());
            let mut values = std::collections::HashMap::new();
            for parameter in thunk.parameters() {
                let value = self.resolve_parameter(target, parameter, &mut *path).await?;
                values.insert(parameter.name(), value);
            }
            let bag = ArgBag::new(values, Arc::clone(&scope));

            let mut constructed = match thunk.invoke(None, bag).await {
                Ok(constructed) => constructed,
                Err(e) => {
                    // The body may have handed the scope to background work
                    // before failing.
                    scope.cancel();
                    return Err(Error::construction(target, e));
                }
            };

            if let Err(e) = self
                .inject_members(thunk, target, &mut constructed, &mut *path)
                .await
            {
                self.discard_draft(target, constructed, &scope).await;
                return Err(e);
            }

            let produced = match constructed.seal() {
                Ok(produced) => produced,
                Err(e) => {
                    scope.cancel();
                    return Err(e);
                }
            };
            Ok(self.adopt_produced_with_scope(target, produced, scope))
        })
    }

    async fn inject_members(
        &self,
        thunk: &InvocationThunk,
        target: ServiceKey,
        constructed: &mut Constructed,
        path: &mut Vec<ServiceKey>,
    ) -> Result<()> {
        for member in thunk.members() {
            match self.resolve_member(target, member, &mut *path).await {
                Ok(value) => member.apply(constructed.draft_mut(), value)?,
                Err(e) if member.is_required() => return Err(e),
                Err(e) => {
                    debug!(key = %target.short_name(), member = member.name(), error = %e,
                        "optional member left unset");
                }
            }
        }
        Ok(())
    }

    /// Tear down a draft abandoned after construction
    ///
    /// The draft already ran its constructor, so its scope must be cancelled
    /// and any disposal capability exercised before the value is dropped;
    /// otherwise background work started with the scope would wait forever.
    async fn discard_draft(
        &self,
        target: ServiceKey,
        constructed: Constructed,
        scope: &CancellationScope,
    ) {
        scope.cancel();
        match constructed.seal() {
            Ok(produced) => {
                if let Some(disposer) = produced.disposer {
                    if let Err(e) = disposer.dispose().await {
                        warn!(key = %target.short_name(), error = %e,
                            "disposal of an abandoned draft failed");
                    }
                }
            }
            Err(e) => {
                warn!(key = %target.short_name(), error = %e,
                    "could not seal an abandoned draft for disposal");
            }
        }
    }

    async fn resolve_parameter(
        &self,
        owner: ServiceKey,
        parameter: &ParameterDescriptor,
        path: &mut Vec<ServiceKey>,
    ) -> Result<ServiceInstance> {
        let resolved = self
            .resolve_injection(parameter.override_marker(), parameter.key(), &mut *path)
            .await;
        match resolved {
            Ok(value) => Ok(value),
            Err(e) => match parameter.default_value() {
                Some(default) => {
                    debug!(key = %owner.short_name(), parameter = parameter.name(),
                        "using declared default");
                    Ok(Arc::clone(default))
                }
                None => Err(Error::missing_injection(parameter.name(), owner, e)),
            },
        }
    }

    async fn resolve_member(
        &self,
        owner: ServiceKey,
        member: &MemberDescriptor,
        path: &mut Vec<ServiceKey>,
    ) -> Result<ServiceInstance> {
        self.resolve_injection(member.override_marker(), member.key(), &mut *path)
            .await
            .map_err(|e| Error::missing_injection(member.name(), owner, e))
    }

    /// Per-injection-point order: pin, redirect, then the declared key
    /// through the chain
    async fn resolve_injection(
        &self,
        override_marker: Option<&InjectionOverride>,
        declared: ServiceKey,
        path: &mut Vec<ServiceKey>,
    ) -> Result<ServiceInstance> {
        match override_marker {
            Some(InjectionOverride::Pin(thunk)) => {
                // Pinned injections are always built fresh, outside the
                // shared cache.
                self.construct_fresh(thunk, &mut *path).await
            }
            Some(InjectionOverride::Redirect(target)) => {
                self.resolve_key(*target, &mut *path).await
            }
            None => self.resolve_key(declared, &mut *path).await,
        }
    }

    fn adopt_produced(&self, key: ServiceKey, produced: crate::thunk::Produced) -> ServiceInstance {
        self.adopt_produced_with_scope(key, produced, Arc::new(CancellationScope::new()))
    }

    fn adopt_produced_with_scope(
        &self,
        key: ServiceKey,
        produced: crate::thunk::Produced,
        scope: Arc<CancellationScope>,
    ) -> ServiceInstance {
        let value = Arc::clone(produced.value());
        if let Some(disposer) = produced.disposer {
            self.owned.adopt(Arc::new(Owned::new(key, scope, disposer)));
        }
        value
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("state", &self.state())
            .field("owned", &self.owned.len())
            .field("shared", &self.shared.len())
            .finish()
    }
}

/// Serializable diagnostic snapshot of a container
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    /// Lifecycle state at snapshot time
    pub state: String,
    /// Disposal-capable objects the root set owns
    pub owned: usize,
    /// Owned objects not yet disposed
    pub live: usize,
    /// Entries in the shared-instance cache
    pub shared_instances: usize,
    /// Registered configuration, by table
    pub registry: RegistryReport,
}
