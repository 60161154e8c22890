//! Trellis
//!
//! A generic dependency-resolution and object-lifecycle container. Given a
//! requested [`ServiceKey`], the container decides how to produce a concrete
//! instance: construct it, route to another key, synthesize a callable, or
//! return a pre-registered value. It then recursively resolves that
//! instance's own dependencies and owns the resulting object graph so it can
//! be torn down safely and cooperatively.
//!
//! ## Resolution
//!
//! Requests flow through an ordered strategy chain (explicit binding, stub,
//! tag identity, type marker, callable shape, default constructor); the first
//! strategy with an opinion supplies the [`Recipe`]. Recipes form a closed
//! set, and route chains are cycle-checked per resolution attempt.
//!
//! ## Lifecycle
//!
//! Configuration happens on [`ContainerBuilder`] (single writer, owned
//! chaining); `start` freezes the registry, resolves the entry object
//! depth-first, and takes ownership of every disposal-capable product. The
//! started container moves Started → ShuttingDown → Disposed; teardown
//! cancels each owned [`CancellationScope`], disposes sibling branches
//! concurrently, and aggregates failures instead of dropping them.
//!
//! ```no_run
//! use trellis::{ContainerBuilder, Entrypoint, InvocationThunk, Result};
//!
//! struct App;
//!
//! #[async_trait::async_trait]
//! impl Entrypoint for App {
//!     async fn run(&self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> Result<()> {
//! let container = ContainerBuilder::new()
//!     .register_constructor(InvocationThunk::constructor::<App>().build(|_| async { Ok(App) }))
//!     .start::<App>()
//!     .await?;
//! container.run().await?;
//! container.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod key;
pub mod lifecycle;
pub mod params;
pub mod recipe;
pub mod registry;
pub mod strategy;
pub mod tag;
pub mod thunk;

pub use config::HostSettings;
pub use container::{Container, ContainerBuilder, ContainerReport, ContainerState, Entrypoint};
pub use error::{Error, Result, TeardownFailure};
pub use key::{ServiceInstance, ServiceKey};
pub use lifecycle::{CancellationScope, DisposalSet, Dispose, Owned};
pub use params::{ArgBag, InjectionOverride, MemberDescriptor, ParameterDescriptor};
pub use recipe::{Recipe, RecipeKind, Sharing};
pub use registry::{ConstructorSet, Registry, RegistryReport};
pub use strategy::{Opinion, ResolutionStrategy, StrategyChain};
pub use tag::{Tag, TagRegistration, TypeMarker};
pub use thunk::{
    FactoryShape, GenericHandler, InvocationThunk, Produced, ShapeArgs, ThunkBuilder, ThunkKind,
};
