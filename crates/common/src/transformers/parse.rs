use async_trait::async_trait;

use super::tags;
use crate::consent::{AccessMode, Operation};
use crate::error::Error;
use crate::traits::{Phase, Trait, Transform, TransformState, TransformerSpec};

/// Parses the request body of a write as JSON
#[derive(Debug)]
pub struct ParseData {
    spec: TransformerSpec,
}

impl Default for ParseData {
    fn default() -> Self {
        Self {
            spec: TransformerSpec::new(tags::PARSE_DATA, Phase::Parse).supports([AccessMode::Write]),
        }
    }
}

#[async_trait]
impl Transform for ParseData {
    fn spec(&self) -> &TransformerSpec {
        &self.spec
    }

    async fn apply(&self, _t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error> {
        if state.access.op() == Operation::Delete {
            return Ok(());
        }
        let raw = state
            .raw
            .as_ref()
            .ok_or_else(|| Error::Parse("missing payload".to_string()))?;
        state.data = Some(serde_json::from_slice(raw)?);
        Ok(())
    }
}
