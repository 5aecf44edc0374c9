use async_trait::async_trait;

use super::tags;
use crate::consent::{AccessMode, Operation};
use crate::error::Error;
use crate::key::Fork;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};

/// Validates written data against the negotiated schema at the key's
/// position below the schema node
#[derive(Debug)]
pub struct MustValidate {
    spec: TransformerSpec,
}

impl Default for MustValidate {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::MUST_VALIDATE, Phase::Validation)
                .supports([AccessMode::Write])
                .only_forks([Fork::Data]),
        }
    }
}

#[async_trait]
impl Transform for MustValidate {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        if state.access.op() == Operation::Delete {
            return Ok(());
        }
        let schema = state
            .schema
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("schema for {}", state.access.key())))?;
        let data = state
            .data
            .as_ref()
            .ok_or_else(|| Error::Parse("missing payload".to_string()))?;
        schema.validate(&state.schema_remainder(), data)
    }
}
