use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use common::key::DDHKey;
use common::principal::Principal;
use common::schema::JsonSchema;
use common::traits::{Trait, Traits};

use crate::ops::{open, read_value, ValueError};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Key the schema governs, with everything below it
    pub key: DDHKey,

    /// JSON schema document
    #[arg(long)]
    pub file: PathBuf,

    /// Trait to declare at this key (repeatable)
    #[arg(long = "trait", value_name = "TAG")]
    pub traits: Vec<String>,

    /// Inherited trait to cancel at this key (repeatable)
    #[arg(long, value_name = "TAG")]
    pub cancel: Vec<String>,

    /// Owner of the schema node (repeatable)
    #[arg(long)]
    pub owner: Vec<Principal>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaAddError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Value(#[from] ValueError),
    #[error("{0}")]
    Engine(#[from] common::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Add {
    type Error = SchemaAddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let document = read_value(None, Some(self.file.as_path())).await?;
        let schema = JsonSchema::from_value(document)?;

        let traits: Traits = self
            .traits
            .iter()
            .map(Trait::new)
            .chain(self.cancel.iter().map(Trait::cancellation))
            .collect();

        let (state, engine) = open(ctx).await?;
        engine.register_schema(&self.key, Arc::new(schema), traits, self.owner.clone())?;
        state.save(&engine).await?;

        Ok(format!("Registered schema at {}", self.key.without_facets().ensure_rooted()))
    }
}
