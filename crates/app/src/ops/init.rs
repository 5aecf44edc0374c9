use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use common::engine::EngineConfig;
use common::key::DDHKey;
use common::schema::JsonSchema;
use common::traits::Traits;

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Default log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Also write daily rolling log files to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Seconds before an unfinished transaction expires
    #[arg(long, default_value_t = 300)]
    pub transaction_timeout: u64,

    /// Do not register a schema accepting any data at the root
    #[arg(long)]
    pub no_root_schema: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error("invalid log level: {0}")]
    LogLevel(String),
    #[error("init failed: {0}")]
    Engine(#[from] common::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(InitError::LogLevel(self.log_level.clone()));
        }
        let config = AppConfig {
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            engine: EngineConfig {
                transaction_timeout_secs: self.transaction_timeout,
                ..EngineConfig::default()
            },
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        if !self.no_root_schema {
            let engine = state.open().await?;
            engine.register_schema(
                &DDHKey::root(),
                Arc::new(JsonSchema::permissive()),
                Traits::default(),
                vec![],
            )?;
            state.save(&engine).await?;
        }

        Ok(format!(
            "Initialized ddh directory at: {}\n\
             - Principals: {}\n\
             - Store: {}\n\
             - Catalog: {}\n\
             - Config: {}\n\
             - Transaction timeout: {}s",
            state.ddh_dir.display(),
            state.principals_path.display(),
            state.store_path.display(),
            state.catalog_path.display(),
            state.config_path.display(),
            state.config.engine.transaction_timeout_secs,
        ))
    }
}
