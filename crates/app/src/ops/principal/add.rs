use clap::Args;
use common::principal::Principal;

use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Id of the new principal; may not contain key delimiters
    pub id: Principal,
}

#[derive(Debug, thiserror::Error)]
pub enum PrincipalAddError {
    #[error("{0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Add {
    type Error = PrincipalAddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let secret = state.add_principal(&self.id)?;
        tracing::info!(principal = %self.id, "added principal");
        Ok(format!(
            "Added principal {}\n- Public key: {}",
            self.id,
            secret.public().to_hex()
        ))
    }
}
