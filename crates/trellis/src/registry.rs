//! Immutable configuration registry
//!
//! Everything the builder records during configuration lands here, frozen, at
//! startup: explicit bindings, stubbed keys, constructor sets, tag
//! registrations, type markers, callable shapes, and the single generic
//! factory handler. The strategy chain reads these tables; nothing writes them
//! after the container starts.

use crate::key::ServiceKey;
use crate::recipe::Recipe;
use crate::tag::{TagRegistration, TypeMarker};
use crate::thunk::{FactoryShape, GenericHandler, InvocationThunk};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A type's registered constructors: the default plus named alternates
#[derive(Default, Clone)]
pub struct ConstructorSet {
    default: Option<Arc<InvocationThunk>>,
    named: HashMap<&'static str, Arc<InvocationThunk>>,
}

impl ConstructorSet {
    /// The default constructor, if one was registered
    pub fn default_thunk(&self) -> Option<&Arc<InvocationThunk>> {
        self.default.as_ref()
    }

    /// A named constructor alternate
    pub fn named(&self, name: &str) -> Option<&Arc<InvocationThunk>> {
        self.named.get(name)
    }

    pub(crate) fn set_default(&mut self, thunk: Arc<InvocationThunk>) {
        self.default = Some(thunk);
    }

    pub(crate) fn set_named(&mut self, name: &'static str, thunk: Arc<InvocationThunk>) {
        self.named.insert(name, thunk);
    }
}

/// Frozen lookup tables consulted by the resolution strategies
#[derive(Default)]
pub struct Registry {
    bindings: HashMap<ServiceKey, Recipe>,
    stubs: HashMap<ServiceKey, String>,
    constructors: HashMap<ServiceKey, ConstructorSet>,
    tags: HashMap<ServiceKey, TagRegistration>,
    markers: HashMap<ServiceKey, TypeMarker>,
    shapes: HashMap<ServiceKey, Arc<FactoryShape>>,
    factory_handler: Option<GenericHandler>,
}

impl Registry {
    /// Explicit binding for a key, head of the strategy chain
    pub fn binding(&self, key: ServiceKey) -> Option<&Recipe> {
        self.bindings.get(&key)
    }

    /// Stub reason for a deliberately unsupported key
    pub fn stub(&self, key: ServiceKey) -> Option<&str> {
        self.stubs.get(&key).map(String::as_str)
    }

    /// Constructor set registered for a type
    pub fn constructors(&self, key: ServiceKey) -> Option<&ConstructorSet> {
        self.constructors.get(&key)
    }

    /// Tag registration whose key matches the requested key
    pub fn tag(&self, key: ServiceKey) -> Option<&TagRegistration> {
        self.tags.get(&key)
    }

    /// Type marker recorded for a key
    pub fn marker(&self, key: ServiceKey) -> Option<&TypeMarker> {
        self.markers.get(&key)
    }

    /// Callable shape whose shape type matches the requested key
    pub fn shape(&self, key: ServiceKey) -> Option<&Arc<FactoryShape>> {
        self.shapes.get(&key)
    }

    /// The one generic handler synthesized callables forward to
    pub fn factory_handler(&self) -> Option<&GenericHandler> {
        self.factory_handler.as_ref()
    }

    pub(crate) fn insert_binding(&mut self, key: ServiceKey, recipe: Recipe) {
        self.bindings.insert(key, recipe);
    }

    pub(crate) fn insert_stub(&mut self, key: ServiceKey, reason: String) {
        self.stubs.insert(key, reason);
    }

    pub(crate) fn constructors_mut(&mut self, key: ServiceKey) -> &mut ConstructorSet {
        self.constructors.entry(key).or_default()
    }

    pub(crate) fn insert_tag(&mut self, registration: TagRegistration) {
        self.tags.insert(registration.key(), registration);
    }

    pub(crate) fn insert_marker(&mut self, key: ServiceKey, marker: TypeMarker) {
        self.markers.insert(key, marker);
    }

    pub(crate) fn insert_shape(&mut self, shape: Arc<FactoryShape>) {
        self.shapes.insert(shape.shape_key(), shape);
    }

    pub(crate) fn set_factory_handler(&mut self, handler: GenericHandler) {
        self.factory_handler = Some(handler);
    }

    /// Serializable summary of everything registered
    pub fn report(&self) -> RegistryReport {
        let mut bindings: Vec<String> = self.bindings.keys().map(|k| k.name().to_string()).collect();
        bindings.sort();
        let mut stubs: Vec<String> = self.stubs.keys().map(|k| k.name().to_string()).collect();
        stubs.sort();
        let mut constructors: Vec<String> = self
            .constructors
            .keys()
            .map(|k| k.name().to_string())
            .collect();
        constructors.sort();
        let mut tags: Vec<String> = self.tags.keys().map(|k| k.name().to_string()).collect();
        tags.sort();
        let mut markers: Vec<String> = self.markers.keys().map(|k| k.name().to_string()).collect();
        markers.sort();
        let mut shapes: Vec<String> = self.shapes.keys().map(|k| k.name().to_string()).collect();
        shapes.sort();
        RegistryReport {
            bindings,
            stubs,
            constructors,
            tags,
            markers,
            shapes,
            has_factory_handler: self.factory_handler.is_some(),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("bindings", &self.bindings.len())
            .field("stubs", &self.stubs.len())
            .field("constructors", &self.constructors.len())
            .field("tags", &self.tags.len())
            .field("markers", &self.markers.len())
            .field("shapes", &self.shapes.len())
            .field("has_factory_handler", &self.factory_handler.is_some())
            .finish()
    }
}

/// Diagnostic listing of registered keys, by table
#[derive(Debug, Clone, Serialize)]
pub struct RegistryReport {
    /// Keys with explicit bindings
    pub bindings: Vec<String>,
    /// Keys stubbed as deliberately unsupported
    pub stubs: Vec<String>,
    /// Types with registered constructor sets
    pub constructors: Vec<String>,
    /// Registered tag keys
    pub tags: Vec<String>,
    /// Keys carrying a type marker
    pub markers: Vec<String>,
    /// Registered callable-shape keys
    pub shapes: Vec<String>,
    /// Whether a generic factory handler is installed
    pub has_factory_handler: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Recipe;

    struct Engine;

    #[test]
    fn tables_round_trip() {
        let mut registry = Registry::default();
        let key = ServiceKey::of::<Engine>();
        registry.insert_binding(key, Recipe::constructor::<Engine>());
        registry.insert_stub(ServiceKey::of::<u8>(), "not wired yet".to_string());

        assert!(registry.binding(key).is_some());
        assert_eq!(registry.stub(ServiceKey::of::<u8>()), Some("not wired yet"));
        assert!(registry.binding(ServiceKey::of::<u16>()).is_none());
    }

    #[test]
    fn constructor_set_keeps_default_and_named() {
        let mut registry = Registry::default();
        let key = ServiceKey::of::<u32>();
        let default = InvocationThunk::constructor::<u32>().build(|_| async { Ok(1_u32) });
        let named = InvocationThunk::constructor::<u32>().build(|_| async { Ok(2_u32) });
        registry.constructors_mut(key).set_default(default);
        registry.constructors_mut(key).set_named("alt", named);

        let set = registry.constructors(key).unwrap();
        assert!(set.default_thunk().is_some());
        assert!(set.named("alt").is_some());
        assert!(set.named("other").is_none());
    }

    #[test]
    fn report_lists_sorted_names() {
        let mut registry = Registry::default();
        registry.insert_binding(ServiceKey::of::<u32>(), Recipe::instance(1_u32));
        registry.insert_binding(ServiceKey::of::<Engine>(), Recipe::constructor::<Engine>());
        let report = registry.report();
        assert_eq!(report.bindings.len(), 2);
        assert!(!report.has_factory_handler);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("bindings"));
    }
}
