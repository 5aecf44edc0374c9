use clap::Args;
use common::consent::{AccessMode, Operation};
use common::key::DDHKey;
use common::principal::Principal;
use serde_json::Value;

use crate::ops::put::access;
use crate::ops::{open, pretty};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Get {
    /// Key to read
    pub key: DDHKey,

    /// Principal making the request
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub principal: Principal,

    /// Access modes to request, comma separated (e.g. read,anonymous)
    #[arg(long, value_delimiter = ',')]
    pub mode: Vec<AccessMode>,

    /// Application the request is made through
    #[arg(long)]
    pub app: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] common::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Get {
    type Error = GetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, engine) = open(ctx).await?;
        let access = access(
            Operation::Get,
            &self.key,
            &self.principal,
            &self.mode,
            self.app.as_deref(),
        );
        let response = engine.execute(access, None, None).await?;
        Ok(pretty(&response.data.unwrap_or(Value::Null)))
    }
}
