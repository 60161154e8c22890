//! Tags and type-level markers
//!
//! A [`Tag`] is a marker type that stands between a requester and an
//! implementation: injection points name the tag instead of a concrete type,
//! and the tag supplies the recipe that actually produces the value. Swapping
//! what a tag means is a configuration change, not a code change at the
//! injection point.
//!
//! Tags are registered as activators. The tag-identity strategy instantiates
//! the tag, asks it for its [`Recipe`], and discards the tag instance; only
//! the recipe survives. Hosts can also bind a tag directly to a value, which
//! records an instance recipe under the tag's key.
//!
//! [`TypeMarker`] is the type-level counterpart consulted by the marker
//! strategy: a table entry declaring, for one key, its default implementation,
//! an alias routed through a tag, or a registered callable shape.

use crate::key::ServiceKey;
use crate::recipe::Recipe;
use crate::thunk::FactoryShape;
use std::sync::Arc;

/// A resolution marker that supplies the recipe for its own key
///
/// Implementors are cheap, stateless types. The container instantiates a tag
/// only long enough to obtain its recipe.
pub trait Tag: Send + Sync + 'static {
    /// The recipe produced when this tag's key is requested
    fn recipe(&self) -> Recipe;
}

/// Deferred tag instantiation, captured at registration time
pub type TagActivator = Arc<dyn Fn() -> Recipe + Send + Sync>;

/// One registered tag: its key plus the activator that yields its recipe
#[derive(Clone)]
pub struct TagRegistration {
    key: ServiceKey,
    activator: TagActivator,
}

impl TagRegistration {
    /// Register tag type `T`, activated through `Default`
    pub fn of<T: Tag + Default>() -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            activator: Arc::new(|| T::default().recipe()),
        }
    }

    /// Register tag type `T` with a fixed recipe, bypassing activation
    ///
    /// Used when the host binds a tag to a value or a setting.
    pub fn with_recipe<T: Tag>(recipe: Recipe) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            activator: Arc::new(move || recipe.clone()),
        }
    }

    /// The tag's key
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Activate the tag and obtain its recipe
    pub fn activate(&self) -> Recipe {
        (self.activator)()
    }
}

impl std::fmt::Debug for TagRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TagRegistration").field(&self.key).finish()
    }
}

/// Type-level marker consulted when neither a binding nor a tag matched
#[derive(Clone)]
pub enum TypeMarker {
    /// The marked key resolves through this recipe, typically pinning the
    /// default implementation of an abstraction
    DefaultImplementation(Recipe),
    /// The marked key is an alias routed through a tag's key
    TagAlias(ServiceKey),
    /// The marked key is a callable shape synthesized on demand
    FactoryShape(Arc<FactoryShape>),
}

impl TypeMarker {
    /// Recipe this marker yields for its key
    pub fn recipe(&self) -> Recipe {
        match self {
            Self::DefaultImplementation(recipe) => recipe.clone(),
            Self::TagAlias(target) => {
                Recipe::new(crate::recipe::RecipeKind::Route { target: *target }, crate::recipe::Sharing::Shared)
            }
            Self::FactoryShape(shape) => Recipe::factory(Arc::clone(shape)),
        }
    }
}

impl std::fmt::Debug for TypeMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultImplementation(recipe) => f
                .debug_tuple("DefaultImplementation")
                .field(recipe)
                .finish(),
            Self::TagAlias(key) => f.debug_tuple("TagAlias").field(key).finish(),
            Self::FactoryShape(shape) => f.debug_tuple("FactoryShape").field(shape).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::RecipeKind;

    struct Clockwork;

    #[derive(Default)]
    struct ClockTag;
    impl Tag for ClockTag {
        fn recipe(&self) -> Recipe {
            Recipe::constructor::<Clockwork>()
        }
    }

    #[test]
    fn activation_yields_the_tags_recipe() {
        let registration = TagRegistration::of::<ClockTag>();
        assert_eq!(registration.key(), ServiceKey::of::<ClockTag>());
        match registration.activate().kind() {
            RecipeKind::Constructor { target, .. } => {
                assert_eq!(*target, ServiceKey::of::<Clockwork>());
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn bound_tag_skips_activation() {
        let registration =
            TagRegistration::with_recipe::<ClockTag>(Recipe::instance("fixed".to_string()));
        assert!(matches!(
            registration.activate().kind(),
            RecipeKind::Instance { .. }
        ));
    }

    #[test]
    fn tag_alias_marker_routes_to_the_tag() {
        let marker = TypeMarker::TagAlias(ServiceKey::of::<ClockTag>());
        match marker.recipe().kind() {
            RecipeKind::Route { target } => assert_eq!(*target, ServiceKey::of::<ClockTag>()),
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}
