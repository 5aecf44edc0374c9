use clap::Args;

use crate::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct List;

#[derive(Debug, thiserror::Error)]
pub enum PrincipalListError {
    #[error("{0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for List {
    type Error = PrincipalListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let principals = state.load_principals()?;
        if principals.is_empty() {
            return Ok("No principals".to_string());
        }
        let lines: Vec<String> = principals
            .iter()
            .map(|(principal, secret)| format!("{}  {}", principal, secret.public().to_hex()))
            .collect();
        Ok(lines.join("\n"))
    }
}
