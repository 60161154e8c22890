//! Injection-point metadata and argument transport
//!
//! Every parameter of an [`InvocationThunk`](crate::thunk::InvocationThunk)
//! and every injectable member is described by a descriptor: name, declared
//! key, optional default, optional override marker. The parameter resolver in
//! the container walks these descriptors in order:
//!
//! 1. explicit pin override (fresh construction via the pinned thunk,
//!    bypassing the strategy chain),
//! 2. explicit redirect override (resolve an alternate key, commonly a Tag),
//! 3. the declared key through the strategy chain,
//! 4. the declared default, if any; otherwise `MissingRequiredInjection`.
//!
//! Resolved arguments travel to constructor bodies as an [`ArgBag`], a
//! name-to-value map that also carries the new instance's
//! [`CancellationScope`](crate::lifecycle::CancellationScope).

use crate::error::{Error, Result};
use crate::key::{downcast, ServiceInstance, ServiceKey};
use crate::lifecycle::CancellationScope;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-injection-point override marker
#[derive(Clone)]
pub enum InjectionOverride {
    /// Pin an explicit implementation: construct fresh via this thunk,
    /// bypassing the strategy chain entirely
    Pin(Arc<crate::thunk::InvocationThunk>),
    /// Redirect resolution to an alternate key instead of the declared type
    Redirect(ServiceKey),
}

impl std::fmt::Debug for InjectionOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pin(_) => f.write_str("Pin"),
            Self::Redirect(key) => f.debug_tuple("Redirect").field(key).finish(),
        }
    }
}

/// Metadata for one constructor or factory parameter
#[derive(Clone)]
pub struct ParameterDescriptor {
    name: &'static str,
    key: ServiceKey,
    default: Option<ServiceInstance>,
    override_marker: Option<InjectionOverride>,
}

impl ParameterDescriptor {
    /// Describe a parameter of declared type `T`
    pub fn of<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            key: ServiceKey::of::<T>(),
            default: None,
            override_marker: None,
        }
    }

    /// Attach a default value used when resolution fails
    pub fn with_default<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    /// Redirect this parameter to an alternate key (commonly a Tag)
    pub fn redirect_to<K: ?Sized + 'static>(mut self) -> Self {
        self.override_marker = Some(InjectionOverride::Redirect(ServiceKey::of::<K>()));
        self
    }

    /// Pin an explicit implementation thunk for this parameter
    pub fn pin(mut self, thunk: Arc<crate::thunk::InvocationThunk>) -> Self {
        self.override_marker = Some(InjectionOverride::Pin(thunk));
        self
    }

    /// Parameter name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared key
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Declared default, if any
    pub fn default_value(&self) -> Option<&ServiceInstance> {
        self.default.as_ref()
    }

    /// Override marker, if any
    pub fn override_marker(&self) -> Option<&InjectionOverride> {
        self.override_marker.as_ref()
    }
}

impl std::fmt::Debug for ParameterDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("has_default", &self.default.is_some())
            .field("override", &self.override_marker)
            .finish()
    }
}

pub(crate) type MemberApply =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), ServiceInstance) -> Result<()> + Send + Sync>;

/// Metadata for one property-style injectable member
///
/// Members are injected after construction, against the still-unshared draft
/// value. All required members must resolve or the whole construction aborts
/// before the object is exposed.
#[derive(Clone)]
pub struct MemberDescriptor {
    name: &'static str,
    key: ServiceKey,
    required: bool,
    override_marker: Option<InjectionOverride>,
    apply: MemberApply,
}

impl MemberDescriptor {
    /// Describe a member of type `V` on draft type `T`, applied via `setter`
    pub fn of<T, V>(name: &'static str, setter: fn(&mut T, Arc<V>)) -> Self
    where
        T: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let apply: MemberApply = Arc::new(move |draft, value| {
            let value = downcast::<V>(value, ServiceKey::of::<V>())?;
            let draft = draft.downcast_mut::<T>().ok_or_else(|| {
                Error::invalid_invocation(format!(
                    "member `{name}` applied to a draft that is not a `{}`",
                    std::any::type_name::<T>()
                ))
            })?;
            setter(draft, value);
            Ok(())
        });
        Self {
            name,
            key: ServiceKey::of::<V>(),
            required: true,
            override_marker: None,
            apply,
        }
    }

    /// Mark the member optional: a resolution failure leaves it unset
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Redirect this member to an alternate key
    pub fn redirect_to<K: ?Sized + 'static>(mut self) -> Self {
        self.override_marker = Some(InjectionOverride::Redirect(ServiceKey::of::<K>()));
        self
    }

    /// Pin an explicit implementation thunk for this member
    pub fn pin(mut self, thunk: Arc<crate::thunk::InvocationThunk>) -> Self {
        self.override_marker = Some(InjectionOverride::Pin(thunk));
        self
    }

    /// Member name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared key
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Whether construction must abort when this member cannot resolve
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Override marker, if any
    pub fn override_marker(&self) -> Option<&InjectionOverride> {
        self.override_marker.as_ref()
    }

    pub(crate) fn apply(&self, draft: &mut (dyn Any + Send + Sync), value: ServiceInstance) -> Result<()> {
        (self.apply)(draft, value)
    }
}

/// Name-to-value argument map handed to a bound callable
///
/// Also carries the fresh [`CancellationScope`] of the instance under
/// construction, so constructors can hand it to background work they start.
pub struct ArgBag {
    values: HashMap<&'static str, ServiceInstance>,
    scope: Arc<CancellationScope>,
}

impl ArgBag {
    /// Build a bag from resolved arguments and the instance scope
    pub fn new(
        values: HashMap<&'static str, ServiceInstance>,
        scope: Arc<CancellationScope>,
    ) -> Self {
        Self { values, scope }
    }

    /// Shared handle to a resolved argument
    pub fn get<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        let instance = self.values.get(name).cloned().ok_or_else(|| {
            Error::invalid_invocation(format!("no argument named `{name}` in the bag"))
        })?;
        downcast::<T>(instance, ServiceKey::of::<T>())
    }

    /// Owned copy of a resolved argument
    pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &'static str) -> Result<T> {
        Ok(self.get::<T>(name)?.as_ref().clone())
    }

    /// Coerced trait-object argument, stored as `Arc<dyn Trait>` payload
    pub fn get_dyn<A: ?Sized + 'static>(&self, name: &'static str) -> Result<Arc<A>>
    where
        Arc<A>: Send + Sync,
    {
        let instance = self.values.get(name).ok_or_else(|| {
            Error::invalid_invocation(format!("no argument named `{name}` in the bag"))
        })?;
        instance
            .downcast_ref::<Arc<A>>()
            .cloned()
            .ok_or_else(|| {
                Error::invalid_invocation(format!(
                    "argument `{name}` is not an abstraction payload for `{}`",
                    std::any::type_name::<A>()
                ))
            })
    }

    /// Cancellation scope of the instance under construction
    pub fn scope(&self) -> Arc<CancellationScope> {
        Arc::clone(&self.scope)
    }

    /// Number of arguments in the bag
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no arguments were resolved
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bag_returns_typed_arguments() {
        let mut values: HashMap<&'static str, ServiceInstance> = HashMap::new();
        values.insert("message", Arc::new("hello".to_string()));
        values.insert("count", Arc::new(3_u32));
        let bag = ArgBag::new(values, Arc::new(CancellationScope::new()));

        assert_eq!(bag.value::<String>("message").unwrap(), "hello");
        assert_eq!(*bag.get::<u32>("count").unwrap(), 3);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn bag_rejects_unknown_names_and_wrong_types() {
        let bag = ArgBag::new(HashMap::new(), Arc::new(CancellationScope::new()));
        assert!(bag.get::<u32>("missing").is_err());

        let mut values: HashMap<&'static str, ServiceInstance> = HashMap::new();
        values.insert("count", Arc::new(3_u32));
        let bag = ArgBag::new(values, Arc::new(CancellationScope::new()));
        assert!(bag.get::<String>("count").is_err());
    }

    #[test]
    fn member_applier_sets_the_field() {
        struct Draft {
            label: Option<Arc<String>>,
        }
        let member = MemberDescriptor::of::<Draft, String>("label", |d, v| d.label = Some(v));
        assert!(member.is_required());

        let mut boxed: Box<dyn Any + Send + Sync> = Box::new(Draft { label: None });
        member
            .apply(boxed.as_mut(), Arc::new("tagged".to_string()))
            .unwrap();
        let draft = boxed.downcast_ref::<Draft>().unwrap();
        assert_eq!(draft.label.as_deref().map(String::as_str), Some("tagged"));
    }

    #[test]
    fn descriptor_overrides_are_recorded() {
        struct Marker;
        let p = ParameterDescriptor::of::<String>("message")
            .redirect_to::<Marker>()
            .with_default("fallback".to_string());
        assert_eq!(p.name(), "message");
        assert!(p.default_value().is_some());
        match p.override_marker() {
            Some(InjectionOverride::Redirect(key)) => {
                assert_eq!(*key, ServiceKey::of::<Marker>());
            }
            other => panic!("unexpected override: {other:?}"),
        }
    }
}
