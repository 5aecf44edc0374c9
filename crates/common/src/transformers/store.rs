use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{enlisted_app, tags};
use crate::consent::{AccessMode, Operation};
use crate::directory::{Capability, DataNode, Node, NodeKind};
use crate::error::Error;
use crate::executable::ExecuteRequest;
use crate::key::{DDHKey, Fork};
use crate::payload;
use crate::principal::Principal;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};
use crate::transaction::{RegisterNodeAction, RemoveNodeAction, StorageResource, TransactionError};

/// Segments, root included, of the key a new data node is created at
const OWNER_LEVEL: usize = 3;

/// Writes and deletes payloads: merges the written data into the nearest
/// data node, creating one at the owner level if there is none, and
/// defers the encrypted write to commit
#[derive(Debug)]
pub struct SaveToStorage {
    spec: TransformerSpec,
}

impl Default for SaveToStorage {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::SAVE_TO_STORAGE, Phase::Store)
                .supports([AccessMode::Write])
                .only_forks([Fork::Data]),
        }
    }
}

impl SaveToStorage {
    async fn put(state: &mut TransformState<'_>) -> Result<(), Error> {
        let data = state
            .data
            .clone()
            .ok_or_else(|| Error::Parse("missing payload".to_string()))?;
        let services = state.services;
        let principal = state.access.principal().clone();
        let resource = StorageResource::join(state.trx, &services.storage).await?;

        let (id, remainder) = match state.data_node_id() {
            Some(id) => (id, state.data_remainder()),
            None => Self::create_node(state)?,
        };

        let mut stored = payload::load(
            services.storage.as_ref(),
            Some(resource.as_ref()),
            &services.vault,
            id,
            &principal,
        )
        .await?
        .unwrap_or_else(|| json!({}));
        payload::insert(&mut stored, &remainder, data)?;
        resource.store(id, payload::seal(&services.vault, id, &principal, &stored)?);

        tracing::debug!(node = %id, key = %state.access.key(), "payload staged");
        Ok(())
    }

    /// Stage a data node at the owner level of the access key and wrap a
    /// fresh storage key for its owners and the consentees above it
    fn create_node(state: &mut TransformState<'_>) -> Result<(Uuid, Vec<String>), Error> {
        let services = state.services;
        let key = state.access.key().without_facets().ensure_rooted();
        let split = OWNER_LEVEL.min(key.len());
        let (node_key, _) = key.split_at(split);
        let owners = node_key.owners();
        if owners.is_empty() {
            return Err(Error::NotFound(format!("owner of {}", key)));
        }

        let effective: BTreeSet<Principal> = inherited_consentees(state, &node_key)
            .into_iter()
            .chain(owners.iter().cloned())
            .collect();
        let id = Uuid::new_v4();
        services.vault.set_new_storage_key(
            id,
            state.access.principal(),
            &effective,
            &BTreeSet::new(),
        )?;

        let node = Node::new(node_key.clone(), owners, NodeKind::Data(DataNode::new(id))).into_ref();
        let action = RegisterNodeAction::new(
            services.registry.clone(),
            services.vault.clone(),
            node_key.clone(),
            node.clone(),
        );
        if !state.trx.add(Box::new(action))? {
            services.vault.remove_node(id);
            return Err(TransactionError::Vetoed(format!("registering {}", node_key)).into());
        }

        tracing::info!(node = %id, key = %node_key, "staged new data node");
        state.data_node = Some((node, split));
        Ok((id, state.data_remainder()))
    }

    async fn delete(state: &mut TransformState<'_>) -> Result<(), Error> {
        let services = state.services;
        let (node, split) = state
            .data_node
            .clone()
            .ok_or_else(|| Error::NotFound(state.access.key().to_string()))?;
        let id = state
            .data_node_id()
            .ok_or_else(|| Error::NotFound(state.access.key().to_string()))?;
        let resource = StorageResource::join(state.trx, &services.storage).await?;
        let remainder = state.data_remainder();

        if remainder.is_empty() {
            let node_key = node.read().key().clone();
            resource.delete(id);
            let action = RemoveNodeAction::new(
                services.registry.clone(),
                services.vault.clone(),
                node_key.clone(),
                node,
            );
            if !state.trx.add(Box::new(action))? {
                return Err(TransactionError::Vetoed(format!("removing {}", node_key)).into());
            }
            tracing::info!(node = %id, key = %node_key, split, "node deletion staged");
            return Ok(());
        }

        let principal = state.access.principal().clone();
        let mut stored = payload::load(
            services.storage.as_ref(),
            Some(resource.as_ref()),
            &services.vault,
            id,
            &principal,
        )
        .await?
        .ok_or_else(|| Error::NotFound(state.access.key().to_string()))?;
        payload::take(&mut stored, &remainder)?;
        resource.store(id, payload::seal(&services.vault, id, &principal, &stored)?);
        Ok(())
    }
}

/// Consentees of the nearest consents at or above `key`
fn inherited_consentees(state: &TransformState<'_>, key: &DDHKey) -> BTreeSet<Principal> {
    state
        .services
        .registry
        .get_node(key, Capability::Consents)
        .and_then(|(node, _)| {
            let node = node.read();
            node.consents().map(|c| c.consentees())
        })
        .unwrap_or_default()
}

#[async_trait]
impl Transform for SaveToStorage {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        if let Some(app) = enlisted_app(state).await? {
            let request = ExecuteRequest {
                op: state.access.op(),
                key: state.access.key().clone(),
                remainder: state.data_remainder(),
                principal: state.access.principal().clone(),
                modes: state.access.modes().clone(),
                trx: state.trx.id(),
                payload: state.data.clone(),
            };
            let response: Value = app.execute(request).await?;
            state.meta.insert("response".to_string(), response);
            return Ok(());
        }

        match state.access.op() {
            Operation::Put => Self::put(state).await,
            Operation::Delete => Self::delete(state).await,
            Operation::Get => Ok(()),
        }
    }
}
