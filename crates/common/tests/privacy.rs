//! Integration tests for pseudonymized and anonymized reads

mod harness;

use std::sync::Arc;

use common::consent::{Access, AccessMode, Consent, Operation};
use common::engine::Engine;
use common::error::Error;
use common::traits::{Trait, Traits};
use common::transformers::tags;
use harness::{key, p, people, person_schema, setup};
use serde_json::{json, Value};

fn with_people() -> (Engine, common::storage::MemoryStorage) {
    let (engine, storage) = setup(&["alice", "bob"]);
    engine
        .register_schema(
            &key("/alice/people"),
            Arc::new(person_schema()),
            Traits::new([Trait::new(tags::PSEUDONYMIZE), Trait::new(tags::ANONYMIZE)]),
            vec![p("alice")],
        )
        .unwrap();
    (engine, storage)
}

async fn read_as(engine: &Engine, modes: &[AccessMode]) -> Result<Value, Error> {
    let access = Access::new(Operation::Get, key("/alice/people"), p("bob"))
        .with_modes(modes.iter().copied());
    let response = engine.execute(access, None, None).await?;
    Ok(response.data.unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_pseudonym_write_is_refused() {
    let (engine, storage) = with_people();
    let access = Access::new(Operation::Put, key("/alice/people"), p("alice"))
        .with_modes([AccessMode::Write, AccessMode::Pseudonym]);
    let body = serde_json::to_vec(&people()).unwrap();

    let result = engine.execute(access, Some(body.into()), None).await;
    assert!(matches!(result, Err(Error::CapabilityMissing(tag)) if tag == tags::PSEUDONYMIZE));
    assert!(storage.is_empty());
    assert!(engine.services().transactions.is_empty());
}

#[tokio::test]
async fn test_invalid_write_leaves_nothing_behind() {
    let (engine, storage) = with_people();
    let result = engine
        .put(&p("alice"), &key("/alice/people"), &json!({"1": {"city": "Paris"}}))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(storage.is_empty());
    assert!(matches!(
        engine.get(&p("alice"), &key("/alice/people")).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_pseudonymized_read() {
    let (engine, _storage) = with_people();
    let alice = p("alice");
    engine.put(&alice, &key("/alice/people"), &people()).await.unwrap();
    engine
        .grant(
            &alice,
            &key("/alice/people"),
            Consent::new(p("bob")).with_modes([AccessMode::Read, AccessMode::Pseudonym]),
        )
        .await
        .unwrap();

    let first = read_as(&engine, &[AccessMode::Read, AccessMode::Pseudonym])
        .await
        .unwrap();
    let name = first["1"]["name"].as_str().unwrap();
    assert!(name.starts_with("pn-"));
    assert_ne!(first["1"]["name"], first["2"]["name"]);
    assert_eq!(first["1"]["city"], json!("London"));
    assert_eq!(first["1"]["born"], json!("1815-12-10"));

    // a new transaction draws a new pseudonym key
    let second = read_as(&engine, &[AccessMode::Read, AccessMode::Pseudonym])
        .await
        .unwrap();
    assert_ne!(first["1"]["name"], second["1"]["name"]);

    // the owner still reads the clear values
    assert_eq!(
        engine.get(&alice, &key("/alice/people/1/name")).await.unwrap(),
        json!("Ada")
    );
}

#[tokio::test]
async fn test_anonymized_read() {
    let (engine, _storage) = with_people();
    let alice = p("alice");
    engine.put(&alice, &key("/alice/people"), &people()).await.unwrap();
    engine
        .grant(
            &alice,
            &key("/alice/people"),
            Consent::new(p("bob")).with_modes([AccessMode::Read, AccessMode::Anonymous]),
        )
        .await
        .unwrap();

    assert!(matches!(
        read_as(&engine, &[AccessMode::Read]).await,
        Err(Error::AccessDenied)
    ));

    let data = read_as(&engine, &[AccessMode::Read, AccessMode::Anonymous])
        .await
        .unwrap();
    let record = &data["1"];
    assert_eq!(record["city"], json!("London"));
    assert_ne!(record["born"], json!("1815-12-10"));
    assert_eq!(record["born"].as_str().unwrap().len(), "1815-12-10".len());
    assert!(record["name"].is_string());
}

#[tokio::test]
async fn test_anonymous_mode_without_trait_is_missing() {
    let (engine, _storage) = setup(&["alice"]);
    let alice = p("alice");
    engine.put(&alice, &key("/alice/notes"), &json!({"a": 1})).await.unwrap();

    let access = Access::new(Operation::Get, key("/alice/notes"), alice)
        .with_modes([AccessMode::Read, AccessMode::Anonymous]);
    assert!(matches!(
        engine.execute(access, None, None).await,
        Err(Error::CapabilityMissing(_))
    ));
}
