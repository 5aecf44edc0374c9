use clap::Args;
use common::key::DDHKey;
use common::principal::Principal;

use crate::ops::open;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Revoke {
    /// Key the consent was granted at
    pub key: DDHKey,

    /// Owner revoking the consent
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub owner: Principal,

    /// Principal losing access
    #[arg(long)]
    pub from: Principal,
}

#[derive(Debug, thiserror::Error)]
pub enum RevokeError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] common::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Revoke {
    type Error = RevokeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, engine) = open(ctx).await?;
        if !engine.revoke(&self.owner, &self.key, &self.from).await? {
            return Ok(format!("No consent for {} at {}", self.from, self.key));
        }
        state.save(&engine).await?;
        Ok(format!("Revoked consent for {} at {}", self.from, self.key))
    }
}
