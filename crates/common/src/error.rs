use crate::key::KeyError;
use crate::storage::StorageError;
use crate::transaction::TransactionError;
use crate::vault::VaultError;

/// Errors surfaced by the engine and its pipeline.
///
/// `AccessDenied` deliberately carries no detail: a denied caller must not
/// learn whether the resource exists. The reason is kept on the
/// [`Access`](crate::consent::Access) record for audit instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("access denied")]
    AccessDenied,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not selectable: {0}")]
    NotSelectable(String),
    #[error("capability missing: {0}")]
    CapabilityMissing(String),
    #[error("version mismatch: {0}")]
    VersionMismatch(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("vault error: {0}")]
    Vault(VaultError),
    #[error(transparent)]
    Default(#[from] anyhow::Error),
}

impl From<VaultError> for Error {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::AccessDenied => Error::AccessDenied,
            other => Error::Vault(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
