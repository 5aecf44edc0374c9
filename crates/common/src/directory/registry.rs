use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::node::{Capability, NodeRef};
use crate::key::DDHKey;

/// Tree-indexed registry of nodes, keyed by the rooted key path.
///
/// The same path may hold a different node per capability.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<Vec<String>, HashMap<Capability, NodeRef>>>,
}

fn path_of(key: &DDHKey) -> Vec<String> {
    key.ensure_rooted().segments().to_vec()
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `node` under `key` for every capability it supports.
    ///
    /// Registering a node again refreshes its capabilities, so a data node
    /// that gained consents becomes resolvable for [`Capability::Consents`].
    pub fn register(&self, key: &DDHKey, node: NodeRef) {
        let supports = node.read().supports();
        let path = path_of(key);
        tracing::debug!(key = %key, ?supports, "registering node");

        let mut nodes = self.nodes.write();
        let entry = nodes.entry(path).or_default();
        entry.retain(|cap, existing| supports.contains(cap) || !Arc::ptr_eq(existing, &node));
        for capability in supports {
            entry.insert(capability, node.clone());
        }
    }

    pub fn unregister(&self, key: &DDHKey, capability: Capability) -> Option<NodeRef> {
        let path = path_of(key);
        let mut nodes = self.nodes.write();
        let entry = nodes.get_mut(&path)?;
        let removed = entry.remove(&capability);
        if entry.is_empty() {
            nodes.remove(&path);
        }
        removed
    }

    /// Remove `node` from `key` for every capability it was registered under
    pub fn unregister_node(&self, key: &DDHKey, node: &NodeRef) -> bool {
        let path = path_of(key);
        let mut nodes = self.nodes.write();
        let Some(entry) = nodes.get_mut(&path) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|_, existing| !Arc::ptr_eq(existing, node));
        let removed = entry.len() != before;
        if entry.is_empty() {
            nodes.remove(&path);
        }
        removed
    }

    /// Remove every node registered exactly at `key`
    pub fn remove(&self, key: &DDHKey) -> Vec<NodeRef> {
        let mut removed: Vec<NodeRef> = Vec::new();
        if let Some(entry) = self.nodes.write().remove(&path_of(key)) {
            for node in entry.into_values() {
                if !removed.iter().any(|n| Arc::ptr_eq(n, &node)) {
                    removed.push(node);
                }
            }
        }
        removed
    }

    /// Resolve `key` to the nearest node, at the key or above it, that
    /// supports `capability`.
    ///
    /// Returns the node and the number of segments of the matched prefix,
    /// so `key.split_at(split)` separates the node's key from the remainder.
    pub fn get_node(&self, key: &DDHKey, capability: Capability) -> Option<(NodeRef, usize)> {
        let path = path_of(key);
        let nodes = self.nodes.read();
        (1..=path.len()).rev().find_map(|split| {
            nodes
                .get(&path[..split])
                .and_then(|entry| entry.get(&capability))
                .map(|node| (node.clone(), split))
        })
    }

    /// The nearer of the data and executable nodes enclosing `key`
    pub fn get_data_node(&self, key: &DDHKey) -> Option<(NodeRef, usize)> {
        let data = self.get_node(key, Capability::Data);
        let exec = self.get_node(key, Capability::Execute);
        match (data, exec) {
            (Some(d), Some(e)) if e.1 > d.1 => Some(e),
            (Some(d), _) => Some(d),
            (None, e) => e,
        }
    }

    /// Nodes supporting `capability` registered strictly below `key`
    pub fn descendants(&self, key: &DDHKey, capability: Capability) -> Vec<(DDHKey, NodeRef)> {
        let prefix = path_of(key);
        self.nodes
            .read()
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| path.len() > prefix.len())
            .filter_map(|(path, entry)| {
                let node = entry.get(&capability)?;
                let key = DDHKey::from_segments(path.iter().cloned()).ok()?;
                Some((key, node.clone()))
            })
            .collect()
    }

    /// Every node supporting `capability`, in key order
    pub fn nodes(&self, capability: Capability) -> Vec<(DDHKey, NodeRef)> {
        self.nodes
            .read()
            .iter()
            .filter_map(|(path, entry)| {
                let node = entry.get(&capability)?;
                let key = DDHKey::from_segments(path.iter().cloned()).ok()?;
                Some((key, node.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}
