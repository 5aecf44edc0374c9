use clap::Args;
use common::consent::{AccessMode, Consent};
use common::key::DDHKey;
use common::principal::Principal;

use crate::ops::{open, pretty};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Grant {
    /// Key the consent covers, with everything below it
    pub key: DDHKey,

    /// Owner granting the consent
    #[arg(long = "as", value_name = "PRINCIPAL")]
    pub owner: Principal,

    /// Principal receiving the consent; `*` grants everyone
    #[arg(long)]
    pub to: Principal,

    /// Modes consented to, comma separated (defaults to read)
    #[arg(long, value_delimiter = ',')]
    pub mode: Vec<AccessMode>,

    /// Restrict the consent to requests through this application (repeatable)
    #[arg(long)]
    pub app: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Engine(#[from] common::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Grant {
    type Error = GrantError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut consent = Consent::new(self.to.clone()).with_apps(self.app.iter().cloned());
        if !self.mode.is_empty() {
            consent = consent.with_modes(self.mode.iter().copied());
        }

        let (state, engine) = open(ctx).await?;
        let consents = engine.grant(&self.owner, &self.key, consent).await?;
        state.save(&engine).await?;

        tracing::info!(owner = %self.owner, to = %self.to, key = %self.key, "granted consent");
        Ok(pretty(&serde_json::to_value(&consents)?))
    }
}
