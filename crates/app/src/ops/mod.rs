pub mod consents;
pub mod delete;
pub mod get;
pub mod grant;
pub mod init;
pub mod principal;
pub mod put;
pub mod revoke;
pub mod schema;
pub mod version;

pub use consents::Consents;
pub use delete::Delete;
pub use get::Get;
pub use grant::Grant;
pub use init::Init;
pub use principal::Principal;
pub use put::Put;
pub use revoke::Revoke;
pub use schema::Schema;
pub use version::Version;

use std::path::Path;

use common::engine::Engine;
use serde_json::Value;

use crate::op::OpContext;
use crate::state::{AppState, StateError};

/// Load the state directory and open an engine over it
pub(crate) async fn open(ctx: &OpContext) -> Result<(AppState, Engine), StateError> {
    let state = AppState::load(ctx.config_path.clone())?;
    let engine = state.open().await?;
    Ok((state, engine))
}

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("failed to read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("either a value or --file must be provided")]
    Missing,
}

/// A JSON value given inline or in a file
pub(crate) async fn read_value(inline: Option<&str>, file: Option<&Path>) -> Result<Value, ValueError> {
    match (inline, file) {
        (Some(text), _) => Ok(serde_json::from_str(text)?),
        (None, Some(path)) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ValueError::Read(path.display().to_string(), e))?;
            Ok(serde_json::from_slice(&bytes)?)
        }
        (None, None) => Err(ValueError::Missing),
    }
}

pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use serde_json::json;

    use super::*;
    use crate::args::Args;
    use crate::op::Op;

    async fn run(ctx: &OpContext, line: &[&str]) -> Result<String, crate::OpError> {
        let args = Args::try_parse_from(std::iter::once("ddh").chain(line.iter().copied()))
            .unwrap();
        args.command.execute(ctx).await.map(|out| out.to_string())
    }

    #[tokio::test]
    async fn test_share_through_the_cli() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("ddh")));

        run(&ctx, &["init"]).await.unwrap();
        run(&ctx, &["principal", "add", "alice"]).await.unwrap();
        run(&ctx, &["principal", "add", "bob"]).await.unwrap();
        let listed = run(&ctx, &["principal", "list"]).await.unwrap();
        assert!(listed.contains("alice") && listed.contains("bob"));

        run(&ctx, &["put", "/alice/docs", r#"{"title": "a"}"#, "--as", "alice"])
            .await
            .unwrap();
        assert!(run(&ctx, &["get", "/alice/docs", "--as", "bob"]).await.is_err());

        run(&ctx, &["grant", "/alice/docs", "--as", "alice", "--to", "bob"])
            .await
            .unwrap();
        let out = run(&ctx, &["get", "/alice/docs/title", "--as", "bob"])
            .await
            .unwrap();
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!("a"));

        let out = run(&ctx, &["revoke", "/alice/docs", "--as", "alice", "--from", "bob"])
            .await
            .unwrap();
        assert!(out.starts_with("Revoked"));
        assert!(run(&ctx, &["get", "/alice/docs", "--as", "bob"]).await.is_err());
    }

    #[tokio::test]
    async fn test_commands_need_init() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = OpContext::new(Some(dir.path().join("ddh")));
        let err = run(&ctx, &["get", "/alice", "--as", "alice"]).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[tokio::test]
    async fn test_read_value() {
        assert_eq!(read_value(Some("[1]"), None).await.unwrap(), json!([1]));
        assert!(matches!(read_value(None, None).await, Err(ValueError::Missing)));
        assert!(matches!(read_value(Some("{"), None).await, Err(ValueError::Json(_))));
    }
}
