//! The storage backend seam: an opaque byte store keyed by object id.
//!
//! Backends know nothing about schemas or consents; payloads reach them
//! already encrypted.

mod fs;
mod memory;

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use crate::transaction::TrxId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(Uuid),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Default(#[from] anyhow::Error),
}

#[async_trait]
pub trait StorageProvider: Send + Sync + Debug + 'static {
    async fn load(&self, id: Uuid) -> Result<Bytes, StorageError>;

    async fn store(&self, id: Uuid, data: Bytes) -> Result<(), StorageError>;

    /// Deleting an absent object is not an error
    async fn delete(&self, id: Uuid) -> Result<(), StorageError>;

    /// Called when a transaction first touches this backend
    async fn begin(&self, _trx: TrxId) -> Result<(), StorageError> {
        Ok(())
    }

    async fn commit(&self, _trx: TrxId) -> Result<(), StorageError> {
        Ok(())
    }

    async fn abort(&self, _trx: TrxId) -> Result<(), StorageError> {
        Ok(())
    }
}
