use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::tags;
use crate::consent::AccessMode;
use crate::error::Error;
use crate::key::Fork;
use crate::pubsub::{topic_for, PubSub, UpdateEvent};
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};
use crate::transaction::{Action, TransactionError};

/// Records the verdict of every access that reaches the end of the pipeline
#[derive(Debug)]
pub struct AuditAccess {
    spec: TransformerSpec,
}

impl Default for AuditAccess {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::AUDIT_ACCESS, Phase::Last),
        }
    }
}

#[async_trait]
impl Transform for AuditAccess {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        let access = &state.access;
        tracing::info!(
            target: "ddh::audit",
            trx = %state.trx.id(),
            op = %access.op(),
            key = %access.key(),
            principal = %access.principal(),
            app = access.app().unwrap_or_default(),
            modes = ?access.modes(),
            granted = ?access.granted(),
            explanation = %access.explanation(),
            "access"
        );
        Ok(())
    }
}

/// Publishes an update event for every write once its transaction has
/// committed to storage
#[derive(Debug)]
pub struct NotifySubscribers {
    spec: TransformerSpec,
}

impl Default for NotifySubscribers {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::NOTIFY_SUBSCRIBERS, Phase::Last)
                .only_modes([AccessMode::Write])
                .only_forks([Fork::Data])
                .after(tags::AUDIT_ACCESS),
        }
    }
}

#[derive(Debug)]
struct PublishAction {
    pubsub: Arc<dyn PubSub>,
    event: UpdateEvent,
}

#[async_trait]
impl Action for PublishAction {
    async fn commit(&self) -> Result<(), Error> {
        let reached = self.pubsub.publish(self.event.clone()).await?;
        tracing::debug!(topic = %self.event.topic, reached, "published update");
        Ok(())
    }
}

#[async_trait]
impl Transform for NotifySubscribers {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        let key = state.access.key().without_facets().ensure_rooted();
        let event = UpdateEvent {
            topic: topic_for(&key),
            key,
            op: state.access.op(),
            principal: state.access.principal().clone(),
            trx: state.trx.id(),
            time: Utc::now(),
        };
        let action = PublishAction {
            pubsub: state.services.pubsub.clone(),
            event,
        };
        if !state.trx.add_followup(Box::new(action))? {
            return Err(TransactionError::Vetoed(tags::NOTIFY_SUBSCRIBERS.to_string()).into());
        }
        Ok(())
    }
}
