use clap::{Args, Subcommand};

pub mod add;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Add, add::Add),
    (Show, show::Show),
}

pub type SchemaCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Schema {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

#[async_trait::async_trait]
impl Op for Schema {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
