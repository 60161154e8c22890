//! Service recipes
//!
//! A [`Recipe`] describes how to obtain a value for one key: build it through
//! a constructor, pin a concrete implementation for an abstraction, synthesize
//! a callable shape, forward to another key, or return a pre-supplied value.
//! The variant set is closed; the compiler checks exhaustiveness everywhere a
//! recipe is executed.
//!
//! Recipes carry a sharing mode: a shared recipe caches exactly one instance
//! for the container's lifetime, a transient recipe produces a fresh instance
//! with a fresh cancellation scope on every request. When routes are involved,
//! sharing and identity are governed by the final non-route target recipe.

use crate::key::{downcast, ServiceInstance, ServiceKey};
use crate::thunk::FactoryShape;
use std::sync::Arc;

/// Sharing mode governing instance caching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    /// One instance per container lifetime
    Shared,
    /// Fresh instance per request
    Transient,
}

/// Coerces a produced concrete payload into the abstraction payload stored
/// under the requested key
pub type Coercion =
    Arc<dyn Fn(ServiceInstance) -> crate::error::Result<ServiceInstance> + Send + Sync>;

/// How to produce a value for one key (closed variant set)
#[derive(Clone)]
pub enum RecipeKind {
    /// Build via one constructor of `target`; `ctor` selects a named
    /// alternate among registered overloads
    Constructor {
        /// Type whose constructor runs
        target: ServiceKey,
        /// Named constructor override, if any
        ctor: Option<&'static str>,
    },
    /// Build the pinned concrete type, bypassing default-implementation
    /// lookup for an abstract key
    Implementation {
        /// The pinned concrete type
        concrete: ServiceKey,
        /// Coercion into the abstraction payload, when the requested key is
        /// not the concrete type itself
        coerce: Option<Coercion>,
    },
    /// Synthesize the registered callable shape against the container's
    /// generic handler
    Factory {
        /// The registered shape
        shape: Arc<FactoryShape>,
    },
    /// Forward resolution to another key's own recipe
    Route {
        /// Key to forward to
        target: ServiceKey,
    },
    /// Pre-supplied value returned as-is; host-owned, never disposed by the
    /// container
    Instance {
        /// The configuration-supplied payload
        value: ServiceInstance,
    },
}

impl std::fmt::Debug for RecipeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constructor { target, ctor } => f
                .debug_struct("Constructor")
                .field("target", target)
                .field("ctor", ctor)
                .finish(),
            Self::Implementation { concrete, .. } => f
                .debug_struct("Implementation")
                .field("concrete", concrete)
                .finish(),
            Self::Factory { shape } => f.debug_struct("Factory").field("shape", shape).finish(),
            Self::Route { target } => f.debug_struct("Route").field("target", target).finish(),
            Self::Instance { .. } => f.write_str("Instance"),
        }
    }
}

/// One key's production rule plus its sharing mode
#[derive(Debug, Clone)]
pub struct Recipe {
    kind: RecipeKind,
    sharing: Sharing,
}

impl Recipe {
    /// Recipe with explicit sharing
    pub fn new(kind: RecipeKind, sharing: Sharing) -> Self {
        Self { kind, sharing }
    }

    /// Shared constructor recipe for `T`'s default constructor
    pub fn constructor<T: 'static>() -> Self {
        Self::new(
            RecipeKind::Constructor {
                target: ServiceKey::of::<T>(),
                ctor: None,
            },
            Sharing::Shared,
        )
    }

    /// Shared constructor recipe selecting a named constructor overload
    pub fn constructor_named<T: 'static>(ctor: &'static str) -> Self {
        Self::new(
            RecipeKind::Constructor {
                target: ServiceKey::of::<T>(),
                ctor: Some(ctor),
            },
            Sharing::Shared,
        )
    }

    /// Shared implementation recipe pinning concrete `C` for abstraction `A`
    ///
    /// `coerce` turns the produced `Arc<C>` into the abstraction handle the
    /// requester receives, typically `Arc<dyn Trait>`.
    pub fn implementation<A, C>(coerce: fn(Arc<C>) -> Arc<A>) -> Self
    where
        A: ?Sized + 'static,
        C: Send + Sync + 'static,
        Arc<A>: Send + Sync,
    {
        let concrete = ServiceKey::of::<C>();
        let coercion: Coercion = Arc::new(move |instance| {
            let concrete_arc = downcast::<C>(instance, concrete)?;
            let abstraction: Arc<A> = coerce(concrete_arc);
            Ok(Arc::new(abstraction) as ServiceInstance)
        });
        Self::new(
            RecipeKind::Implementation {
                concrete,
                coerce: Some(coercion),
            },
            Sharing::Shared,
        )
    }

    /// Shared implementation recipe where the requested key is the concrete
    /// type itself (no coercion)
    pub fn self_implementation<C: 'static>() -> Self {
        Self::new(
            RecipeKind::Implementation {
                concrete: ServiceKey::of::<C>(),
                coerce: None,
            },
            Sharing::Shared,
        )
    }

    /// Factory recipe for a registered shape
    pub fn factory(shape: Arc<FactoryShape>) -> Self {
        Self::new(RecipeKind::Factory { shape }, Sharing::Transient)
    }

    /// Route recipe forwarding to `K`
    pub fn route<K: ?Sized + 'static>() -> Self {
        Self::new(
            RecipeKind::Route {
                target: ServiceKey::of::<K>(),
            },
            Sharing::Shared,
        )
    }

    /// Instance recipe wrapping a pre-supplied value
    pub fn instance<V: Send + Sync + 'static>(value: V) -> Self {
        Self::new(
            RecipeKind::Instance {
                value: Arc::new(value),
            },
            Sharing::Shared,
        )
    }

    /// Flip to shared
    pub fn shared(mut self) -> Self {
        self.sharing = Sharing::Shared;
        self
    }

    /// Flip to transient
    pub fn transient(mut self) -> Self {
        self.sharing = Sharing::Transient;
        self
    }

    /// The production rule
    pub fn kind(&self) -> &RecipeKind {
        &self.kind
    }

    /// The sharing mode
    pub fn sharing(&self) -> Sharing {
        self.sharing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine;

    trait Port: Send + Sync {
        fn id(&self) -> u8;
    }

    struct PortImpl;
    impl Port for PortImpl {
        fn id(&self) -> u8 {
            9
        }
    }

    #[test]
    fn default_sharing_per_variant() {
        assert_eq!(Recipe::constructor::<Engine>().sharing(), Sharing::Shared);
        assert_eq!(
            Recipe::constructor::<Engine>().transient().sharing(),
            Sharing::Transient
        );
        assert_eq!(Recipe::instance(5_u8).sharing(), Sharing::Shared);
    }

    #[test]
    fn implementation_coercion_produces_abstraction_payload() {
        let recipe = Recipe::implementation::<dyn Port, PortImpl>(|c| c);
        let RecipeKind::Implementation {
            coerce: Some(coerce),
            ..
        } = recipe.kind().clone()
        else {
            panic!("expected implementation recipe");
        };
        let payload: ServiceInstance = Arc::new(PortImpl);
        let coerced = coerce(payload).unwrap();
        let port = coerced.downcast_ref::<Arc<dyn Port>>().unwrap();
        assert_eq!(port.id(), 9);
    }

    #[test]
    fn route_targets_the_requested_key() {
        let recipe = Recipe::route::<Engine>();
        match recipe.kind() {
            RecipeKind::Route { target } => assert_eq!(*target, ServiceKey::of::<Engine>()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
