use async_trait::async_trait;

use super::tags;
use crate::error::Error;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};

/// Aborts the transaction when the pipeline fails
#[derive(Debug)]
pub struct AbortTransaction {
    spec: TransformerSpec,
}

impl Default for AbortTransaction {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::ABORT_TRANSACTION, Phase::AbortOnly),
        }
    }
}

#[async_trait]
impl Transform for AbortTransaction {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, _state: &mut TransformState<'_>) -> Result<(), Error> {
        Ok(())
    }

    async fn abort(
        &self,
        _t: &Trait,
        state: &mut TransformState<'_>,
        failed: &str,
        error: &Error,
    ) -> Result<(), Error> {
        tracing::warn!(
            trx = %state.trx.id(),
            key = %state.access.key(),
            failed = %failed,
            "aborting transaction: {}",
            error
        );
        state.trx.abort().await
    }
}
