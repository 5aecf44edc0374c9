use async_trait::async_trait;

use super::tags;
use crate::consent::{AccessMode, Consents, Operation};
use crate::directory::Capability;
use crate::error::Error;
use crate::key::Fork;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};
use crate::transaction::{ApplyConsentsAction, StorageResource, TransactionError};

fn ensure_owner(state: &TransformState<'_>) -> Result<(), Error> {
    let owners = state.access.owners(&state.services.registry);
    if owners.contains(state.access.principal()) {
        Ok(())
    } else {
        Err(Error::AccessDenied)
    }
}

/// Replaces the writer's consents at the key on commit, rotating storage
/// keys of the data they govern. Deleting the consents fork revokes all.
#[derive(Debug)]
pub struct ApplyConsents {
    spec: TransformerSpec,
}

impl Default for ApplyConsents {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::APPLY_CONSENTS, Phase::Store)
                .supports([AccessMode::Write])
                .only_forks([Fork::Consents]),
        }
    }
}

#[async_trait]
impl Transform for ApplyConsents {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        ensure_owner(state)?;
        let consents = match state.access.op() {
            Operation::Put => {
                let data = state
                    .data
                    .clone()
                    .ok_or_else(|| Error::Parse("missing consents".to_string()))?;
                serde_json::from_value::<Consents>(data)?
            }
            Operation::Delete => Consents::default(),
            Operation::Get => return Ok(()),
        };

        let key = state.access.key().without_facets().ensure_rooted();
        let storage = StorageResource::join(state.trx, &state.services.storage).await?;
        let action = ApplyConsentsAction::new(
            state.services.clone(),
            storage,
            key.clone(),
            state.access.principal().clone(),
            consents,
        );
        let retirement = action.retirement();
        if !state.trx.add(Box::new(action))? || !state.trx.add_followup(Box::new(retirement))? {
            return Err(TransactionError::Vetoed(format!("consents for {}", key)).into());
        }
        Ok(())
    }
}

/// Returns the requester's consents record governing the key
#[derive(Debug)]
pub struct LoadConsents {
    spec: TransformerSpec,
}

impl Default for LoadConsents {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::LOAD_CONSENTS, Phase::Load)
                .supports([AccessMode::Read])
                .only_forks([Fork::Consents]),
        }
    }
}

#[async_trait]
impl Transform for LoadConsents {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        ensure_owner(state)?;
        let key = state.access.key().without_facets().ensure_rooted();
        let found = state
            .services
            .registry
            .get_node(&key, Capability::Consents)
            .map(|(node, _)| {
                let node = node.read();
                let consents = node
                    .consents()
                    .and_then(|c| c.for_owner(state.access.principal()))
                    .cloned()
                    .unwrap_or_default();
                (node.key().to_string(), consents)
            });

        let consents = match found {
            Some((at, consents)) => {
                state.meta.insert("consents_key".to_string(), at.into());
                consents
            }
            None => Consents::default(),
        };
        state.data = Some(serde_json::to_value(&consents)?);
        Ok(())
    }
}
