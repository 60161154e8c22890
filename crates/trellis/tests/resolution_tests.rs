//! Resolution behavior across the strategy chain, routes, tags, and overrides

use std::sync::Arc;
use trellis::{
    ContainerBuilder, Entrypoint, Error, FactoryShape, GenericHandler, HostSettings,
    InvocationThunk, ParameterDescriptor, Recipe, Result, ServiceKey, ShapeArgs, Tag, TypeMarker,
};

struct App;

#[async_trait::async_trait]
impl Entrypoint for App {
    async fn run(&self) -> Result<()> {
        Ok(())
    }
}

fn app_builder() -> ContainerBuilder {
    ContainerBuilder::new()
        .register_constructor(InvocationThunk::constructor::<App>().build(|_| async { Ok(App) }))
}

#[derive(Debug)]
struct Greeter {
    greeting: String,
}

impl Greeter {
    fn greet(&self) -> &str {
        &self.greeting
    }
}

#[derive(Default)]
struct Greeting;

impl Tag for Greeting {
    fn recipe(&self) -> Recipe {
        Recipe::instance("default greeting".to_string())
    }
}

fn greeter_constructor() -> Arc<InvocationThunk> {
    InvocationThunk::constructor::<Greeter>()
        .param(ParameterDescriptor::of::<String>("message").redirect_to::<Greeting>())
        .build(|args| async move {
            Ok(Greeter {
                greeting: args.value("message")?,
            })
        })
}

#[tokio::test]
async fn redirected_parameter_takes_the_bound_tag_value() {
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .bind_tag_value::<Greeting, String>("hello".to_string())
        .start::<App>()
        .await
        .unwrap();

    let greeter = container.resolve::<Greeter>().await.unwrap();
    assert_eq!(greeter.greet(), "hello");
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn registered_tag_activates_when_not_bound() {
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .register_tag::<Greeting>()
        .start::<App>()
        .await
        .unwrap();

    let greeter = container.resolve::<Greeter>().await.unwrap();
    assert_eq!(greeter.greet(), "default greeting");
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn tag_bound_from_a_host_setting() {
    let settings = HostSettings::from_toml_str("greeting = \"bonjour\"\n");
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .bind_tag_setting::<Greeting>(&settings, "greeting")
        .unwrap()
        .start::<App>()
        .await
        .unwrap();

    let greeter = container.resolve::<Greeter>().await.unwrap();
    assert_eq!(greeter.greet(), "bonjour");
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_greeters_are_distinct_while_shared_are_identical() {
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .bind_tag_value::<Greeting, String>("hello".to_string())
        .start::<App>()
        .await
        .unwrap();

    let a = container.resolve::<Greeter>().await.unwrap();
    let b = container.resolve::<Greeter>().await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    container.shutdown().await.unwrap();

    let container = app_builder()
        .register_constructor(greeter_constructor())
        .bind_tag_value::<Greeting, String>("hello".to_string())
        .bind_recipe::<Greeter>(Recipe::constructor::<Greeter>().transient())
        .start::<App>()
        .await
        .unwrap();

    let a = container.resolve::<Greeter>().await.unwrap();
    let b = container.resolve::<Greeter>().await.unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.greet(), b.greet());
    container.shutdown().await.unwrap();
}

struct AliasA;
struct AliasB;

#[tokio::test]
async fn route_chain_resolves_like_the_direct_key() {
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .bind_tag_value::<Greeting, String>("hello".to_string())
        .bind_recipe::<AliasA>(Recipe::route::<AliasB>())
        .bind_recipe::<AliasB>(Recipe::route::<Greeter>())
        .start::<App>()
        .await
        .unwrap();

    let direct = container.resolve::<Greeter>().await.unwrap();
    let via_alias = container
        .resolve_keyed::<Greeter>(ServiceKey::of::<AliasA>())
        .await
        .unwrap();
    // Identity is governed by the final non-route target.
    assert!(Arc::ptr_eq(&direct, &via_alias));
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn route_cycle_fails_with_the_rendered_path() {
    let container = app_builder()
        .bind_recipe::<AliasA>(Recipe::route::<AliasB>())
        .bind_recipe::<AliasB>(Recipe::route::<AliasA>())
        .start::<App>()
        .await
        .unwrap();

    let err = container
        .resolve_keyed::<Greeter>(ServiceKey::of::<AliasA>())
        .await
        .unwrap_err();
    match err {
        Error::RouteCycle { path } => {
            assert!(path.contains("AliasA"));
            assert!(path.contains("AliasB"));
        }
        other => panic!("unexpected error: {other}"),
    }
    container.shutdown().await.unwrap();
}

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug)]
struct FixedClock {
    at: u64,
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.at
    }
}

fn fixed_clock_constructor() -> Arc<InvocationThunk> {
    InvocationThunk::constructor::<FixedClock>().build(|_| async { Ok(FixedClock { at: 42 }) })
}

#[tokio::test]
async fn implementation_binding_serves_the_abstraction() {
    let container = app_builder()
        .register_constructor(fixed_clock_constructor())
        .bind_implementation::<dyn Clock, FixedClock>(|c| c)
        .start::<App>()
        .await
        .unwrap();

    let clock = container.resolve_dyn::<dyn Clock>().await.unwrap();
    assert_eq!(clock.now(), 42);

    // The concrete instance behind the abstraction is the shared one.
    let concrete = container.resolve::<FixedClock>().await.unwrap();
    assert_eq!(concrete.at, 42);
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn default_implementation_marker_is_consulted_after_bindings() {
    let container = app_builder()
        .register_constructor(fixed_clock_constructor())
        .register_marker::<dyn Clock>(TypeMarker::DefaultImplementation(
            Recipe::implementation::<dyn Clock, FixedClock>(|c| c),
        ))
        .start::<App>()
        .await
        .unwrap();

    let clock = container.resolve_dyn::<dyn Clock>().await.unwrap();
    assert_eq!(clock.now(), 42);
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn stubbed_key_fails_before_fallbacks() {
    let container = app_builder()
        .register_constructor(fixed_clock_constructor())
        .stub::<FixedClock>("clocks are disabled in this host")
        .start::<App>()
        .await
        .unwrap();

    let err = container.resolve::<FixedClock>().await.unwrap_err();
    match err {
        Error::Unsupported { reason, .. } => {
            assert_eq!(reason, "clocks are disabled in this host");
        }
        other => panic!("unexpected error: {other}"),
    }
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn unregistered_key_is_unresolvable() {
    let container = app_builder().start::<App>().await.unwrap();
    let err = container.resolve::<FixedClock>().await.unwrap_err();
    assert!(err.is_unresolvable());
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn named_constructor_alternate_is_selected_by_recipe() {
    let container = app_builder()
        .register_constructor(fixed_clock_constructor())
        .register_constructor_named(
            "epoch",
            InvocationThunk::constructor::<FixedClock>().build(|_| async {
                Ok(FixedClock { at: 0 })
            }),
        )
        .bind_recipe::<FixedClock>(Recipe::constructor_named::<FixedClock>("epoch"))
        .start::<App>()
        .await
        .unwrap();

    let clock = container.resolve::<FixedClock>().await.unwrap();
    assert_eq!(clock.at, 0);
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_required_parameter_reports_the_injection_point() {
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .start::<App>()
        .await
        .unwrap();

    // No Greeting tag registered or bound.
    let err = container.resolve::<Greeter>().await.unwrap_err();
    match err {
        Error::MissingRequiredInjection { member, .. } => assert_eq!(member, "message"),
        other => panic!("unexpected error: {other}"),
    }
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn declared_default_applies_when_resolution_fails() {
    let thunk = InvocationThunk::constructor::<Greeter>()
        .param(
            ParameterDescriptor::of::<String>("message")
                .redirect_to::<Greeting>()
                .with_default("fallback".to_string()),
        )
        .build(|args| async move {
            Ok(Greeter {
                greeting: args.value("message")?,
            })
        });
    let container = app_builder()
        .register_constructor(thunk)
        .start::<App>()
        .await
        .unwrap();

    let greeter = container.resolve::<Greeter>().await.unwrap();
    assert_eq!(greeter.greet(), "fallback");
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn pinned_parameter_bypasses_the_chain_entirely() {
    // The chain would resolve String through this binding.
    let pinned = InvocationThunk::constructor::<String>().build(|_| async {
        Ok("pinned".to_string())
    });
    let thunk = InvocationThunk::constructor::<Greeter>()
        .param(ParameterDescriptor::of::<String>("message").pin(pinned))
        .build(|args| async move {
            Ok(Greeter {
                greeting: args.value("message")?,
            })
        });
    let container = app_builder()
        .register_constructor(thunk)
        .bind_instance("from the chain".to_string())
        .start::<App>()
        .await
        .unwrap();

    let greeter = container.resolve::<Greeter>().await.unwrap();
    assert_eq!(greeter.greet(), "pinned");
    container.shutdown().await.unwrap();
}

struct QueryRunner {
    run: Arc<dyn Fn(String) -> Result<u64> + Send + Sync>,
}

impl std::fmt::Debug for QueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner").finish_non_exhaustive()
    }
}

struct QueryResult;

#[tokio::test]
async fn registered_shape_synthesizes_against_the_generic_handler() {
    let shape = FactoryShape::new::<QueryRunner, QueryResult, _>(
        vec![ParameterDescriptor::of::<String>("query")],
        |handler| {
            trellis::Produced::plain(QueryRunner {
                run: Arc::new(move |query| {
                    let mut packed = ShapeArgs::new();
                    packed.insert("query", query);
                    let boxed = handler(packed)?;
                    boxed
                        .downcast::<u64>()
                        .map(|b| *b)
                        .map_err(|_| Error::invalid_invocation("handler returned a non-u64"))
                }),
            })
        },
    );
    let handler: GenericHandler = Arc::new(|mut args| {
        let query: String = args.take("query")?;
        Ok(Box::new(query.len() as u64))
    });

    let container = app_builder()
        .register_factory_shape(shape)
        .set_factory_handler(handler)
        .start::<App>()
        .await
        .unwrap();

    let runner = container.resolve::<QueryRunner>().await.unwrap();
    assert_eq!((runner.run)("select 1".to_string()).unwrap(), 8);
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn shape_without_a_handler_is_a_configuration_error() {
    let shape = FactoryShape::new::<QueryRunner, QueryResult, _>(Vec::new(), |_| {
        trellis::Produced::plain(QueryRunner {
            run: Arc::new(|_| Ok(0)),
        })
    });
    let container = app_builder()
        .register_factory_shape(shape)
        .start::<App>()
        .await
        .unwrap();

    let err = container.resolve::<QueryRunner>().await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn report_lists_registered_tables() {
    let container = app_builder()
        .register_constructor(greeter_constructor())
        .bind_tag_value::<Greeting, String>("hello".to_string())
        .start::<App>()
        .await
        .unwrap();

    let report = container.report();
    assert_eq!(report.state, "started");
    assert!(report.registry.constructors.iter().any(|n| n.contains("Greeter")));
    assert!(report.registry.tags.iter().any(|n| n.contains("Greeting")));
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"state\":\"started\""));
    container.shutdown().await.unwrap();
}
