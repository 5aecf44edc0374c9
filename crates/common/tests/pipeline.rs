//! Integration tests for transformer selection and ordering

mod harness;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::consent::{Access, Operation};
use common::directory::Capability;
use common::engine::Engine;
use common::error::Error;
use common::schema::JsonSchema;
use common::traits::{
    Phase, Trait, Traits, Transform, TransformState, TransformerRegistry, TransformerSpec,
};
use common::transformers::tags;
use harness::{key, p, setup, setup_with};
use serde_json::json;

/// Adds `"stamped": true` to written objects
struct Stamp(TransformerSpec);

#[async_trait]
impl Transform for Stamp {
    fn spec(&self) -> &TransformerSpec {
        &self.0
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        if let Some(data) = state.data.as_mut().and_then(|d| d.as_object_mut()) {
            data.insert("stamped".to_string(), json!(true));
        }
        Ok(())
    }
}

/// Does nothing, or fails when built with `failing`
struct Probe {
    spec: TransformerSpec,
    fail: bool,
    aborts: Arc<AtomicUsize>,
}

impl Probe {
    fn new(spec: TransformerSpec) -> Self {
        Self {
            spec,
            fail: false,
            aborts: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(spec: TransformerSpec) -> Self {
        Self {
            fail: true,
            ..Self::new(spec)
        }
    }
}

#[async_trait]
impl Transform for Probe {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, _state: &mut TransformState<'_>) -> Result<(), Error> {
        if self.fail {
            return Err(Error::Validation(format!("{} failed", self.spec.tag)));
        }
        Ok(())
    }

    async fn abort(
        &self,
        _t: &Trait,
        _state: &mut TransformState<'_>,
        _failed: &str,
        _error: &Error,
    ) -> Result<(), Error> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn register(schema_key: &str, traits: Traits, transformers: TransformerRegistry) -> Engine {
    let (engine, _storage) = setup_with(&["alice"], transformers);
    engine
        .register_schema(
            &key(schema_key),
            Arc::new(JsonSchema::permissive()),
            traits,
            vec![p("alice")],
        )
        .unwrap();
    engine
}

#[tokio::test]
async fn test_default_pipelines() {
    let (engine, _storage) = setup(&["alice"]);
    let alice = p("alice");

    let put = engine
        .put(&alice, &key("/alice/notes"), &json!({"a": 1}))
        .await
        .unwrap();
    assert_eq!(
        put.executed,
        vec![
            tags::PARSE_DATA,
            tags::MUST_VALIDATE,
            tags::SAVE_TO_STORAGE,
            tags::AUDIT_ACCESS,
            tags::NOTIFY_SUBSCRIBERS,
        ]
    );

    let get = engine
        .execute(
            Access::new(Operation::Get, key("/alice/notes"), alice.clone()),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(get.executed, vec![tags::LOAD_FROM_STORAGE, tags::AUDIT_ACCESS]);
    assert_eq!(get.data, Some(json!({"a": 1})));
}

#[tokio::test]
async fn test_custom_transformer_runs_in_its_phase() {
    let mut transformers = TransformerRegistry::with_builtins();
    transformers.register(Arc::new(Stamp(TransformerSpec::new("Stamp", Phase::PreStore))));
    let engine = register(
        "/alice/stamped",
        Traits::new([Trait::new("Stamp").overwritable()]),
        transformers,
    );
    let alice = p("alice");

    let put = engine
        .put(&alice, &key("/alice/stamped"), &json!({"a": 1}))
        .await
        .unwrap();
    let position = |tag: &str| put.executed.iter().position(|t| t == tag).unwrap();
    assert!(position(tags::MUST_VALIDATE) < position("Stamp"));
    assert!(position("Stamp") < position(tags::SAVE_TO_STORAGE));
    assert_eq!(
        engine.get(&alice, &key("/alice/stamped")).await.unwrap(),
        json!({"a": 1, "stamped": true})
    );

    // a schema further down cancels the inherited trait
    engine
        .register_schema(
            &key("/alice/stamped/plain"),
            Arc::new(JsonSchema::permissive()),
            Traits::new([Trait::cancellation("Stamp")]),
            vec![],
        )
        .unwrap();
    let put = engine
        .put(&alice, &key("/alice/stamped/plain"), &json!({"b": 2}))
        .await
        .unwrap();
    assert!(!put.executed.iter().any(|t| t == "Stamp"));
    assert_eq!(
        engine.get(&alice, &key("/alice/stamped/plain")).await.unwrap(),
        json!({"b": 2})
    );
}

#[tokio::test]
async fn test_after_hint_orders_within_a_phase() {
    let mut transformers = TransformerRegistry::with_builtins();
    transformers.register(Arc::new(Probe::new(
        TransformerSpec::new("Alpha", Phase::First).after("Zeta"),
    )));
    transformers.register(Arc::new(Probe::new(TransformerSpec::new("Zeta", Phase::First))));
    let engine = register(
        "/alice/ordered",
        Traits::new([Trait::new("Alpha"), Trait::new("Zeta")]),
        transformers,
    );

    let put = engine
        .put(&p("alice"), &key("/alice/ordered"), &json!({}))
        .await
        .unwrap();
    assert_eq!(&put.executed[..2], &["Zeta", "Alpha"]);
}

#[tokio::test]
async fn test_ordering_cycle_is_a_config_error() {
    let mut transformers = TransformerRegistry::with_builtins();
    transformers.register(Arc::new(Probe::new(
        TransformerSpec::new("Alpha", Phase::First).after("Zeta"),
    )));
    transformers.register(Arc::new(Probe::new(
        TransformerSpec::new("Zeta", Phase::First).after("Alpha"),
    )));
    let engine = register(
        "/alice/cyclic",
        Traits::new([Trait::new("Alpha"), Trait::new("Zeta")]),
        transformers,
    );

    let result = engine
        .put(&p("alice"), &key("/alice/cyclic"), &json!({}))
        .await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_failure_runs_abort_handlers_and_discards_writes() {
    let watcher = Probe::new(TransformerSpec::new("Watcher", Phase::AbortOnly));
    let aborts = watcher.aborts.clone();

    let mut transformers = TransformerRegistry::with_builtins();
    transformers.register(Arc::new(Probe::failing(TransformerSpec::new(
        "Breaker",
        Phase::Last,
    ))));
    transformers.register(Arc::new(watcher));
    let (engine, storage) = setup_with(&["alice"], transformers);
    engine
        .register_schema(
            &key("/alice/broken"),
            Arc::new(JsonSchema::permissive()),
            Traits::new([Trait::new("Breaker"), Trait::new("Watcher")]),
            vec![],
        )
        .unwrap();

    let result = engine
        .put(&p("alice"), &key("/alice/broken"), &json!({"a": 1}))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(aborts.load(Ordering::SeqCst), 1);
    assert!(storage.is_empty());
    assert!(engine
        .registry()
        .get_node(&key("/alice/broken"), Capability::Data)
        .is_none());
    assert!(engine.services().transactions.is_empty());
}

#[tokio::test]
async fn test_read_loads_before_validation() {
    let mut transformers = TransformerRegistry::new();
    transformers.register(Arc::new(Probe::new(TransformerSpec::new(
        "Check",
        Phase::Validation,
    ))));
    common::transformers::register_builtins(&mut transformers);
    let engine = register(
        "/alice/checked",
        Traits::new([Trait::new("Check")]),
        transformers,
    );
    let alice = p("alice");
    engine
        .put(&alice, &key("/alice/checked"), &json!({"a": 1}))
        .await
        .unwrap();

    let get = engine
        .execute(
            Access::new(Operation::Get, key("/alice/checked/a"), alice),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        get.executed,
        vec![tags::LOAD_FROM_STORAGE, "Check", tags::AUDIT_ACCESS]
    );
    assert_eq!(get.data, Some(json!(1)));
}
