//! Shared setup for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::crypto::SecretKey;
use common::directory::Capability;
use common::engine::{Engine, EngineConfig};
use common::key::DDHKey;
use common::principal::Principal;
use common::schema::JsonSchema;
use common::storage::MemoryStorage;
use common::traits::{TransformerRegistry, Traits};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn p(id: &str) -> Principal {
    Principal::parse(id).unwrap()
}

pub fn key(s: &str) -> DDHKey {
    DDHKey::parse(s).unwrap()
}

/// An engine over memory storage with a permissive schema at the root and
/// a key pair registered for every principal in `ids`
pub fn setup(ids: &[&str]) -> (Engine, MemoryStorage) {
    setup_with(ids, TransformerRegistry::with_builtins())
}

pub fn setup_with(ids: &[&str], transformers: TransformerRegistry) -> (Engine, MemoryStorage) {
    let storage = MemoryStorage::new();
    let engine = Engine::with_transformers(
        EngineConfig::default(),
        Arc::new(storage.clone()),
        transformers,
    );
    for id in ids {
        engine.register_principal(p(id), SecretKey::generate());
    }
    engine
        .register_schema(
            &DDHKey::root(),
            Arc::new(JsonSchema::permissive()),
            Traits::default(),
            vec![],
        )
        .unwrap();
    (engine, storage)
}

/// A person record schema with an identifying name and a quasi-identifying
/// birth date
pub fn person_schema() -> JsonSchema {
    JsonSchema::from_value(json!({
        "version": "1",
        "schema": {
            "type": "object",
            "additionalProperties": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "x-sensitivity": "eid"},
                    "born": {"type": "string", "x-sensitivity": "qid"},
                    "city": {"type": "string"}
                },
                "required": ["name"]
            }
        }
    }))
    .unwrap()
}

pub fn people() -> Value {
    json!({
        "1": {"name": "Ada", "born": "1815-12-10", "city": "London"},
        "2": {"name": "Alan", "born": "1912-06-23", "city": "London"}
    })
}

/// Storage id of the data node registered exactly at `key`
pub fn data_id(engine: &Engine, key: &DDHKey) -> Uuid {
    let (node, split) = engine
        .registry()
        .get_node(key, Capability::Data)
        .expect("no data node");
    assert_eq!(split, key.len(), "data node is above {}", key);
    let node = node.read();
    node.as_data().expect("not a data node").id()
}
