//! Service identity
//!
//! A [`ServiceKey`] is the lookup handle for resolution: the requested
//! abstraction or concrete type, identified by its `TypeId`. Equality and
//! hashing are identity-based; the captured type name exists only for
//! diagnostics. Uniqueness of key-to-recipe mappings is a configuration
//! convention, not something the key enforces.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type identity used as the lookup key for resolution
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Key for a concrete or trait-object type
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Identity of the keyed type
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Diagnostic name of the keyed type
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Short name with module path segments stripped, for log fields
    pub fn short_name(&self) -> &'static str {
        self.name
            .rsplit("::")
            .next()
            .unwrap_or(self.name)
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl std::hash::Hash for ServiceKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased payload produced by resolution
///
/// Concrete services store `Arc<T>` directly. Abstraction keys store the
/// coerced `Arc<dyn Trait>` as the `Any` payload, retrieved with
/// `Container::resolve_dyn`.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Downcast a resolved payload to its concrete type
pub(crate) fn downcast<T: Send + Sync + 'static>(
    instance: ServiceInstance,
    key: ServiceKey,
) -> crate::error::Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        crate::error::Error::invalid_invocation(format!(
            "resolved payload for `{key}` is not a `{}`",
            std::any::type_name::<T>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    trait Port: Send + Sync {}

    #[test]
    fn equality_is_identity_based() {
        assert_eq!(ServiceKey::of::<Alpha>(), ServiceKey::of::<Alpha>());
        assert_ne!(ServiceKey::of::<Alpha>(), ServiceKey::of::<Beta>());
    }

    #[test]
    fn trait_object_keys_are_distinct_from_concrete_keys() {
        assert_ne!(ServiceKey::of::<dyn Port>(), ServiceKey::of::<Alpha>());
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(ServiceKey::of::<Alpha>().short_name(), "Alpha");
    }

    #[test]
    fn downcast_round_trip() {
        let instance: ServiceInstance = Arc::new(41_u32);
        let value = downcast::<u32>(instance, ServiceKey::of::<u32>()).unwrap();
        assert_eq!(*value, 41);
    }

    #[test]
    fn downcast_mismatch_is_an_error() {
        let instance: ServiceInstance = Arc::new(41_u32);
        assert!(downcast::<String>(instance, ServiceKey::of::<u32>()).is_err());
    }
}
