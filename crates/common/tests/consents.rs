//! Integration tests for granting and revoking consents

mod harness;

use common::consent::{AccessMode, Consent, Consents};
use common::error::Error;
use common::principal::Principal;
use harness::{data_id, key, p, people, setup};
use serde_json::json;

#[tokio::test]
async fn test_grant_then_revoke_one_of_two() {
    let (engine, _storage) = setup(&["alice", "bob", "carol"]);
    let (alice, bob, carol) = (p("alice"), p("bob"), p("carol"));
    let docs = key("/alice/docs");

    engine
        .put(&alice, &key("/alice/docs/1"), &json!({"title": "a"}))
        .await
        .unwrap();
    assert!(matches!(
        engine.get(&bob, &docs).await,
        Err(Error::AccessDenied)
    ));

    engine.grant(&alice, &docs, Consent::new(bob.clone())).await.unwrap();
    engine.grant(&alice, &docs, Consent::new(carol.clone())).await.unwrap();
    assert_eq!(
        engine.get(&bob, &key("/alice/docs/1/title")).await.unwrap(),
        json!("a")
    );
    assert_eq!(
        engine.get(&carol, &key("/alice/docs/1/title")).await.unwrap(),
        json!("a")
    );

    assert!(engine.revoke(&alice, &docs, &bob).await.unwrap());
    assert!(matches!(
        engine.get(&bob, &docs).await,
        Err(Error::AccessDenied)
    ));
    assert_eq!(
        engine.get(&carol, &key("/alice/docs/1/title")).await.unwrap(),
        json!("a")
    );

    // the revoked principal holds no storage key in any epoch
    let id = data_id(&engine, &docs);
    let holders: Vec<Principal> = engine
        .vault()
        .access_keys(id)
        .into_iter()
        .map(|k| k.principal)
        .collect();
    assert!(!holders.contains(&bob));
    assert!(holders.contains(&carol));
    assert!(holders.contains(&alice));

    assert!(!engine.revoke(&alice, &docs, &bob).await.unwrap());
}

#[tokio::test]
async fn test_consents_are_owner_only() {
    let (engine, _storage) = setup(&["alice", "bob"]);
    let (alice, bob) = (p("alice"), p("bob"));
    let docs = key("/alice/docs");
    engine.put(&alice, &docs, &json!({})).await.unwrap();
    engine.grant(&alice, &docs, Consent::new(bob.clone())).await.unwrap();

    assert!(matches!(
        engine.consents(&bob, &docs).await,
        Err(Error::AccessDenied)
    ));
    let consents = Consents::new(vec![Consent::new(bob.clone())]);
    assert!(matches!(
        engine.set_consents(&bob, &docs, &consents).await,
        Err(Error::AccessDenied)
    ));
    assert_eq!(engine.consents(&alice, &docs).await.unwrap(), consents);
}

#[tokio::test]
async fn test_wildcard_grant() {
    let (engine, _storage) = setup(&["alice", "bob", "carol"]);
    let alice = p("alice");
    let docs = key("/alice/docs");
    engine.put(&alice, &docs, &people()).await.unwrap();
    engine
        .grant(&alice, &docs, Consent::new(Principal::all()))
        .await
        .unwrap();

    for reader in ["bob", "carol"] {
        assert_eq!(
            engine.get(&p(reader), &key("/alice/docs/1/name")).await.unwrap(),
            json!("Ada")
        );
    }
}

#[tokio::test]
async fn test_consented_mode_must_be_requested() {
    use bytes::Bytes;
    use common::consent::{Access, Operation};

    let (engine, _storage) = setup(&["alice", "bob"]);
    let (alice, bob) = (p("alice"), p("bob"));
    let docs = key("/alice/docs");
    engine.put(&alice, &docs, &people()).await.unwrap();
    engine
        .grant(
            &alice,
            &docs,
            Consent::new(bob.clone()).with_modes([AccessMode::Read, AccessMode::Anonymous]),
        )
        .await
        .unwrap();

    // plain reads are refused once the consent asks for anonymous access
    assert!(matches!(
        engine.get(&bob, &docs).await,
        Err(Error::AccessDenied)
    ));

    let mut anonymous = Access::new(Operation::Get, docs.clone(), bob.clone())
        .with_modes([AccessMode::Read, AccessMode::Anonymous]);
    assert!(anonymous.permitted(engine.registry()));

    // writes in the consented fork stay with the owner
    let write = Access::new(Operation::Put, key("/alice/docs/3"), bob.clone());
    let body = Bytes::from_static(br#"{"name": "Grace"}"#);
    assert!(matches!(
        engine.execute(write, Some(body), None).await,
        Err(Error::AccessDenied)
    ));
}

#[tokio::test]
async fn test_consents_on_nested_key_split_the_node() {
    let (engine, _storage) = setup(&["alice", "bob"]);
    let (alice, bob) = (p("alice"), p("bob"));
    engine
        .put(&alice, &key("/alice/docs"), &people())
        .await
        .unwrap();
    let docs_id = data_id(&engine, &key("/alice/docs"));

    engine
        .grant(&alice, &key("/alice/docs/1"), Consent::new(bob.clone()))
        .await
        .unwrap();

    let split_id = data_id(&engine, &key("/alice/docs/1"));
    assert_ne!(split_id, docs_id);
    assert_eq!(
        engine.get(&bob, &key("/alice/docs/1/name")).await.unwrap(),
        json!("Ada")
    );
    assert!(matches!(
        engine.get(&bob, &key("/alice/docs/2")).await,
        Err(Error::AccessDenied)
    ));

    // the moved sub-tree is gone from the node above
    assert_eq!(
        engine.get(&alice, &key("/alice/docs/2/name")).await.unwrap(),
        json!("Alan")
    );
    let above = engine.get(&alice, &key("/alice/docs")).await.unwrap();
    assert!(above.get("1").is_none());
}

#[tokio::test]
async fn test_shared_key_needs_every_owner() {
    let (engine, _storage) = setup(&["alice", "bob", "carol"]);
    let (alice, bob, carol) = (p("alice"), p("bob"), p("carol"));
    let shared = key("/alice,bob/trip");
    engine
        .put(&alice, &shared, &json!({"to": "Lisbon"}))
        .await
        .unwrap();
    assert_eq!(engine.get(&bob, &shared).await.unwrap(), json!({"to": "Lisbon"}));

    engine.grant(&alice, &shared, Consent::new(carol.clone())).await.unwrap();
    assert!(matches!(
        engine.get(&carol, &shared).await,
        Err(Error::AccessDenied)
    ));
    let id = data_id(&engine, &shared);
    assert!(engine
        .vault()
        .access_keys(id)
        .iter()
        .all(|k| k.principal != carol));

    engine.grant(&bob, &shared, Consent::new(carol.clone())).await.unwrap();
    assert_eq!(
        engine.get(&carol, &key("/alice,bob/trip/to")).await.unwrap(),
        json!("Lisbon")
    );

    // each owner reads back only their own record
    assert_eq!(engine.consents(&bob, &shared).await.unwrap().consents().len(), 1);
    assert!(matches!(
        engine.consents(&carol, &shared).await,
        Err(Error::AccessDenied)
    ));

    assert!(engine.revoke(&bob, &shared, &carol).await.unwrap());
    assert!(matches!(
        engine.get(&carol, &shared).await,
        Err(Error::AccessDenied)
    ));
    assert_eq!(engine.get(&alice, &shared).await.unwrap(), json!({"to": "Lisbon"}));
}
