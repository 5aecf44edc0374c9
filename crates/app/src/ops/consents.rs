use clap::Args;
use common::key::DDHKey;
use common::principal::Principal;

use crate::ops::{open, pretty};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Consents {
    /// Key whose governing consents to show
    pub key: DDHKey,

    /// Owner of the data
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub owner: Principal,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsentsError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] common::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Consents {
    type Error = ConsentsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, engine) = open(ctx).await?;
        let consents = engine.consents(&self.owner, &self.key).await?;
        Ok(pretty(&serde_json::to_value(&consents)?))
    }
}
