use async_trait::async_trait;

use super::{enlisted_app, tags};
use crate::consent::AccessMode;
use crate::error::Error;
use crate::executable::ExecuteRequest;
use crate::key::Fork;
use crate::payload;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};
use crate::transaction::{StorageResource, STORAGE_RESOURCE_ID};

/// Loads the payload of the nearest data node, decrypted as the requester,
/// and selects the part below the node's key. Executable nodes are asked
/// instead.
#[derive(Debug)]
pub struct LoadFromStorage {
    spec: TransformerSpec,
}

impl Default for LoadFromStorage {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::LOAD_FROM_STORAGE, Phase::Load)
                .supports([AccessMode::Read])
                .only_forks([Fork::Data]),
        }
    }
}

#[async_trait]
impl Transform for LoadFromStorage {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        let remainder = state.data_remainder();

        if let Some(app) = enlisted_app(state).await? {
            let request = ExecuteRequest {
                op: state.access.op(),
                key: state.access.key().clone(),
                remainder,
                principal: state.access.principal().clone(),
                modes: state.access.modes().clone(),
                trx: state.trx.id(),
                payload: None,
            };
            state.data = Some(app.execute(request).await?);
            return Ok(());
        }

        let not_found = || Error::NotFound(state.access.key().to_string());
        let id = state.data_node_id().ok_or_else(not_found)?;
        let pending = state.trx.resource_as::<StorageResource>(STORAGE_RESOURCE_ID);
        let services = state.services;
        let stored = payload::load(
            services.storage.as_ref(),
            pending.as_deref(),
            &services.vault,
            id,
            state.access.principal(),
        )
        .await?
        .ok_or_else(not_found)?;

        let selected = payload::select(&stored, &remainder)?.clone();
        tracing::debug!(node = %id, key = %state.access.key(), "loaded payload");
        state.data = Some(selected);
        Ok(())
    }
}
