use std::fmt::Debug;

use async_trait::async_trait;

use super::Transaction;
use crate::error::Error;

/// An in-process effect deferred to transaction commit
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Veto joining `trx`
    fn add_ok(&self, _trx: &Transaction) -> bool {
        true
    }

    async fn commit(&self) -> Result<(), Error>;

    /// Undo whatever was prepared eagerly when the action was created
    async fn rollback(&self) -> Result<(), Error> {
        Ok(())
    }
}
