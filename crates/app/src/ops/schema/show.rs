use clap::Args;
use common::key::DDHKey;

use crate::ops::{open, pretty};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Show {
    /// Key to negotiate a schema for; variant and version facets select one
    pub key: DDHKey,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaShowError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] common::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = SchemaShowError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, engine) = open(ctx).await?;
        match engine.schema(&self.key.ensure_rooted())? {
            Some(document) => Ok(pretty(&document)),
            None => Ok(format!("No schema governs {}", self.key)),
        }
    }
}
