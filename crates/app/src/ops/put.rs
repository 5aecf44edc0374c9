use std::path::PathBuf;

use bytes::Bytes;
use clap::Args;
use common::consent::{Access, AccessMode, Operation};
use common::key::DDHKey;
use common::principal::Principal;

use crate::ops::{open, read_value, ValueError};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Key to write
    pub key: DDHKey,

    /// JSON value to store (or use --file)
    pub value: Option<String>,

    /// Read the JSON value from a file
    #[arg(long, conflicts_with = "value")]
    pub file: Option<PathBuf>,

    /// Principal making the request
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub principal: Principal,

    /// Access modes to request, comma separated
    #[arg(long, value_delimiter = ',')]
    pub mode: Vec<AccessMode>,

    /// Application the request is made through
    #[arg(long)]
    pub app: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Value(#[from] ValueError),
    #[error("{0}")]
    Engine(#[from] common::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The access a command line request stands for
pub(crate) fn access(
    op: Operation,
    key: &DDHKey,
    principal: &Principal,
    modes: &[AccessMode],
    app: Option<&str>,
) -> Access {
    let mut access = Access::new(op, key.clone(), principal.clone());
    if !modes.is_empty() {
        access = access.with_modes(modes.iter().copied());
    }
    if let Some(app) = app {
        access = access.with_app(app);
    }
    access
}

#[async_trait::async_trait]
impl crate::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let value = read_value(self.value.as_deref(), self.file.as_deref()).await?;
        let body = Bytes::from(serde_json::to_vec(&value)?);

        let (state, engine) = open(ctx).await?;
        let access = access(
            Operation::Put,
            &self.key,
            &self.principal,
            &self.mode,
            self.app.as_deref(),
        );
        let response = engine.execute(access, Some(body), None).await?;
        state.save(&engine).await?;

        tracing::debug!(executed = ?response.executed, "put complete");
        Ok(format!("Stored {}", self.key))
    }
}
