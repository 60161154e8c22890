//! Resolution strategy chain
//!
//! When a key is requested without an applicable override, the container asks
//! an ordered chain of strategies for an opinion. Each strategy either yields
//! a [`Recipe`], declines so the next strategy is consulted, or declares the
//! key explicitly unsupported, which fails resolution immediately with the
//! recorded diagnostic. A chain that reaches the end with nothing but declines
//! fails with `UnresolvableService`.
//!
//! The default chain order is: explicit binding, stub, tag identity, type
//! marker, callable shape, default constructor.

use crate::error::{Error, Result};
use crate::key::ServiceKey;
use crate::recipe::{Recipe, RecipeKind, Sharing};
use crate::registry::Registry;
use std::sync::Arc;
use tracing::trace;

/// One strategy's verdict for a key
#[derive(Debug, Clone)]
pub enum Opinion {
    /// This strategy knows how to produce the key
    Recipe(Recipe),
    /// Not this strategy's concern; ask the next one
    Decline,
    /// The key is deliberately unsupported; fail with this diagnostic
    Unsupported(String),
}

/// A link in the resolution chain
pub trait ResolutionStrategy: Send + Sync {
    /// Strategy name, used in resolution traces
    fn name(&self) -> &'static str;

    /// Opinion on how to produce `key`, given the frozen registry
    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion;
}

/// The ordered chain, first recipe wins
pub struct StrategyChain {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl StrategyChain {
    /// The standard chain in its fixed order
    pub fn standard() -> Self {
        Self {
            strategies: vec![
                Box::new(BindingStrategy),
                Box::new(StubStrategy),
                Box::new(TagIdentityStrategy),
                Box::new(MarkerStrategy),
                Box::new(ShapeStrategy),
                Box::new(DefaultConstructorStrategy),
            ],
        }
    }

    /// Walk the chain for `key` until a strategy produces a recipe
    pub fn decide(&self, key: ServiceKey, registry: &Registry) -> Result<Recipe> {
        for strategy in &self.strategies {
            match strategy.opine(key, registry) {
                Opinion::Recipe(recipe) => {
                    trace!(key = %key.short_name(), strategy = strategy.name(), "recipe selected");
                    return Ok(recipe);
                }
                Opinion::Decline => continue,
                Opinion::Unsupported(reason) => {
                    trace!(key = %key.short_name(), strategy = strategy.name(), "key unsupported");
                    return Err(Error::unsupported(key, reason));
                }
            }
        }
        Err(Error::unresolvable(key))
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_tuple("StrategyChain").field(&names).finish()
    }
}

/// Honors explicit bindings recorded during configuration
struct BindingStrategy;

impl ResolutionStrategy for BindingStrategy {
    fn name(&self) -> &'static str {
        "binding"
    }

    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion {
        match registry.binding(key) {
            Some(recipe) => Opinion::Recipe(recipe.clone()),
            None => Opinion::Decline,
        }
    }
}

/// Fails stubbed keys immediately, before any fallback can fire
struct StubStrategy;

impl ResolutionStrategy for StubStrategy {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion {
        match registry.stub(key) {
            Some(reason) => Opinion::Unsupported(reason.to_string()),
            None => Opinion::Decline,
        }
    }
}

/// Activates a tag whose own type is the requested key
struct TagIdentityStrategy;

impl ResolutionStrategy for TagIdentityStrategy {
    fn name(&self) -> &'static str {
        "tag-identity"
    }

    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion {
        match registry.tag(key) {
            Some(registration) => Opinion::Recipe(registration.activate()),
            None => Opinion::Decline,
        }
    }
}

/// Consults the type-marker table
struct MarkerStrategy;

impl ResolutionStrategy for MarkerStrategy {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion {
        match registry.marker(key) {
            Some(marker) => Opinion::Recipe(marker.recipe()),
            None => Opinion::Decline,
        }
    }
}

/// Synthesizes a registered callable shape when the shape type itself is
/// requested
struct ShapeStrategy;

impl ResolutionStrategy for ShapeStrategy {
    fn name(&self) -> &'static str {
        "factory-shape"
    }

    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion {
        match registry.shape(key) {
            Some(shape) => Opinion::Recipe(Recipe::factory(Arc::clone(shape))),
            None => Opinion::Decline,
        }
    }
}

/// Last resort: the type's own registered default constructor
struct DefaultConstructorStrategy;

impl ResolutionStrategy for DefaultConstructorStrategy {
    fn name(&self) -> &'static str {
        "default-constructor"
    }

    fn opine(&self, key: ServiceKey, registry: &Registry) -> Opinion {
        let has_default = registry
            .constructors(key)
            .and_then(|set| set.default_thunk())
            .is_some();
        if has_default {
            Opinion::Recipe(Recipe::new(
                RecipeKind::Constructor {
                    target: key,
                    ctor: None,
                },
                Sharing::Shared,
            ))
        } else {
            Opinion::Decline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Tag, TagRegistration};
    use crate::thunk::InvocationThunk;

    struct Engine;

    #[derive(Default)]
    struct EngineTag;
    impl Tag for EngineTag {
        fn recipe(&self) -> Recipe {
            Recipe::route::<Engine>()
        }
    }

    fn registry_with_constructor() -> Registry {
        let mut registry = Registry::default();
        let thunk = InvocationThunk::constructor::<Engine>().build(|_| async { Ok(Engine) });
        registry
            .constructors_mut(ServiceKey::of::<Engine>())
            .set_default(thunk);
        registry
    }

    #[test]
    fn binding_beats_default_constructor() {
        let mut registry = registry_with_constructor();
        registry.insert_binding(ServiceKey::of::<Engine>(), Recipe::instance(7_u8));
        let recipe = StrategyChain::standard()
            .decide(ServiceKey::of::<Engine>(), &registry)
            .unwrap();
        assert!(matches!(recipe.kind(), RecipeKind::Instance { .. }));
    }

    #[test]
    fn stub_fails_before_any_fallback() {
        let mut registry = registry_with_constructor();
        registry.insert_stub(ServiceKey::of::<Engine>(), "disabled in this host".to_string());
        let err = StrategyChain::standard()
            .decide(ServiceKey::of::<Engine>(), &registry)
            .unwrap_err();
        match err {
            Error::Unsupported { reason, .. } => assert_eq!(reason, "disabled in this host"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tag_identity_activates_the_tag() {
        let mut registry = Registry::default();
        registry.insert_tag(TagRegistration::of::<EngineTag>());
        let recipe = StrategyChain::standard()
            .decide(ServiceKey::of::<EngineTag>(), &registry)
            .unwrap();
        match recipe.kind() {
            RecipeKind::Route { target } => assert_eq!(*target, ServiceKey::of::<Engine>()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn default_constructor_is_the_last_resort() {
        let registry = registry_with_constructor();
        let recipe = StrategyChain::standard()
            .decide(ServiceKey::of::<Engine>(), &registry)
            .unwrap();
        assert!(matches!(recipe.kind(), RecipeKind::Constructor { .. }));
    }

    #[test]
    fn all_declines_is_unresolvable() {
        let registry = Registry::default();
        let err = StrategyChain::standard()
            .decide(ServiceKey::of::<Engine>(), &registry)
            .unwrap_err();
        assert!(err.is_unresolvable());
    }
}
