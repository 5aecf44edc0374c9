//! Integration tests for key semantics and directory resolution

mod harness;

use std::collections::HashSet;
use std::sync::Arc;

use common::directory::{Capability, DataNode, Node, NodeKind, NodeRegistry};
use common::key::{DDHKey, Fork};
use harness::{key, p};
use uuid::Uuid;

#[test]
fn test_short_version_prefix_matches() {
    let (one, one_two, one_three) = (
        key("/org/forms:schema::1"),
        key("/org/forms:schema::1.2"),
        key("/org/forms:schema::1.3"),
    );
    assert!(one.matches(&one_two));
    assert!(one_two.matches(&one));
    assert!(one.matches(&one_three));
    assert!(!one_two.matches(&one_three));
    assert!(!key("/org/forms:schema").matches(&key("/org/forms")));
    assert_eq!(key("/org/forms:"), key("/org/forms:data"));
}

#[test]
fn test_keys_with_versions_are_distinct_map_keys() {
    let keys: HashSet<DDHKey> = ["/org/forms:schema::1", "/org/forms:schema::1.2", "/org/forms:schema::1.3"]
        .into_iter()
        .map(key)
        .collect();
    assert_eq!(keys.len(), 3);

    let mut sorted: Vec<DDHKey> = keys.into_iter().collect();
    sorted.sort();
    let shown: Vec<String> = sorted.iter().map(ToString::to_string).collect();
    assert_eq!(
        shown,
        vec![
            "/org/forms:schema::1",
            "/org/forms:schema::1.2",
            "/org/forms:schema::1.3"
        ]
    );
}

#[test]
fn test_split_join_round_trip() {
    for s in ["/alice/docs/1:consents", "/org/forms:schema:compact:1.2", "/a"] {
        let k = key(s);
        for i in 0..=k.len() {
            let (prefix, suffix) = k.split_at(i);
            assert_eq!(prefix.join(&suffix), k, "{} split at {}", s, i);
        }
    }
}

#[test]
fn test_resolution_finds_registered_ancestor() {
    let registry = NodeRegistry::new();
    let docs = key("/alice/docs");
    let node = Node::new(
        docs.clone(),
        vec![p("alice")],
        NodeKind::Data(DataNode::new(Uuid::new_v4())),
    )
    .into_ref();
    registry.register(&docs, node.clone());

    let (found, split) = registry.get_node(&docs, Capability::Data).unwrap();
    assert!(Arc::ptr_eq(&found, &node));
    assert_eq!(split, docs.len());

    let below = key("/alice/docs/1/title");
    let (found, split) = registry.get_node(&below, Capability::Data).unwrap();
    assert!(Arc::ptr_eq(&found, &node));
    let (at, remainder) = below.split_at(split);
    assert_eq!(at.without_facets(), docs);
    assert_eq!(remainder.segments(), ["1", "title"]);

    assert!(registry.get_node(&key("/alice"), Capability::Data).is_none());
    assert!(registry.get_node(&key("/bob/docs"), Capability::Data).is_none());
    assert!(registry.get_node(&below, Capability::Schema).is_none());
}

#[test]
fn test_owner_segment() {
    let k = key("/alice,bob/shared:consents");
    assert_eq!(k.owners(), vec![p("alice"), p("bob")]);
    assert_eq!(k.fork(), Fork::Consents);
    assert!(DDHKey::parse("/alice/docs:nope").is_err());
    assert!(DDHKey::parse("/alice//docs").is_err());
}
