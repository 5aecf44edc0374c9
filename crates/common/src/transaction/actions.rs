use std::sync::Arc;

use async_trait::async_trait;

use super::Action;
use crate::directory::{NodeRef, NodeRegistry};
use crate::error::Error;
use crate::key::DDHKey;
use crate::vault::KeyVault;

fn data_id(node: &NodeRef) -> Option<uuid::Uuid> {
    let node = node.read();
    node.as_data().map(|data| data.id())
}

/// Makes a staged node visible in the directory
#[derive(Debug)]
pub struct RegisterNodeAction {
    registry: Arc<NodeRegistry>,
    vault: Arc<KeyVault>,
    key: DDHKey,
    node: NodeRef,
}

impl RegisterNodeAction {
    pub fn new(registry: Arc<NodeRegistry>, vault: Arc<KeyVault>, key: DDHKey, node: NodeRef) -> Self {
        Self {
            registry,
            vault,
            key,
            node,
        }
    }
}

#[async_trait]
impl Action for RegisterNodeAction {
    async fn commit(&self) -> Result<(), Error> {
        self.registry.register(&self.key, self.node.clone());
        tracing::info!(key = %self.key, "registered node");
        Ok(())
    }

    /// Storage keys are generated when the node is staged; drop them
    async fn rollback(&self) -> Result<(), Error> {
        if let Some(id) = data_id(&self.node) {
            self.vault.remove_node(id);
        }
        Ok(())
    }
}

/// Takes a node out of the directory and forgets its storage keys
#[derive(Debug)]
pub struct RemoveNodeAction {
    registry: Arc<NodeRegistry>,
    vault: Arc<KeyVault>,
    key: DDHKey,
    node: NodeRef,
}

impl RemoveNodeAction {
    pub fn new(registry: Arc<NodeRegistry>, vault: Arc<KeyVault>, key: DDHKey, node: NodeRef) -> Self {
        Self {
            registry,
            vault,
            key,
            node,
        }
    }
}

#[async_trait]
impl Action for RemoveNodeAction {
    async fn commit(&self) -> Result<(), Error> {
        self.registry.unregister_node(&self.key, &self.node);
        if let Some(id) = data_id(&self.node) {
            self.vault.remove_node(id);
        }
        tracing::info!(key = %self.key, "removed node");
        Ok(())
    }
}
