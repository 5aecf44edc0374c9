use clap::Args;
use common::consent::Operation;
use common::key::DDHKey;
use common::principal::Principal;

use crate::ops::open;
use crate::ops::put::access;
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Delete {
    /// Key to delete, with everything below it
    pub key: DDHKey,

    /// Principal making the request
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub principal: Principal,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] common::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Delete {
    type Error = DeleteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, engine) = open(ctx).await?;
        let access = access(Operation::Delete, &self.key, &self.principal, &[], None);
        engine.execute(access, None, None).await?;
        state.save(&engine).await?;
        Ok(format!("Deleted {}", self.key))
    }
}
