use clap::{Args, Subcommand};

pub mod add;
pub mod list;

use crate::op::Op;

crate::command_enum! {
    (Add, add::Add),
    (List, list::List),
}

pub type PrincipalCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Principal {
    #[command(subcommand)]
    pub command: PrincipalCommand,
}

#[async_trait::async_trait]
impl Op for Principal {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
