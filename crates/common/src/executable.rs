//! The seam to external applications serving keys themselves.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consent::{AccessModes, Operation};
use crate::error::Error;
use crate::key::DDHKey;
use crate::principal::Principal;
use crate::transaction::TrxId;

/// A request forwarded to an application, already authorized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub op: Operation,
    pub key: DDHKey,
    /// Segments below the application's own key
    pub remainder: Vec<String>,
    pub principal: Principal,
    pub modes: AccessModes,
    pub trx: TrxId,
    pub payload: Option<Value>,
}

#[async_trait]
pub trait ExecutableApp: Send + Sync + 'static {
    fn id(&self) -> &str;

    async fn execute(&self, request: ExecuteRequest) -> Result<Value, Error>;

    async fn begin(&self, _trx: TrxId) -> Result<(), Error> {
        Ok(())
    }

    async fn commit(&self, _trx: TrxId) -> Result<(), Error> {
        Ok(())
    }

    async fn abort(&self, _trx: TrxId) -> Result<(), Error> {
        Ok(())
    }
}

impl Debug for dyn ExecutableApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExecutableApp").field(&self.id()).finish()
    }
}
