use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Transaction, TransactionError, TrxId};
use crate::error::Error;
use crate::executable::ExecutableApp;
use crate::storage::{StorageError, StorageProvider};

pub const STORAGE_RESOURCE_ID: &str = "storage";

/// A backend taking part in a transaction
#[async_trait]
pub trait Resource: Send + Sync + Debug + 'static {
    /// Resources with the same id are enlisted once per transaction
    fn id(&self) -> String;

    /// Veto joining `trx`
    fn add_ok(&self, _trx: &Transaction) -> bool {
        true
    }

    /// Called once when the resource joins
    async fn added(&self, _trx: TrxId) -> Result<(), Error> {
        Ok(())
    }

    async fn commit(&self, trx: TrxId) -> Result<(), Error>;

    async fn abort(&self, trx: TrxId) -> Result<(), Error>;

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Buffers writes to a [`StorageProvider`] until commit.
///
/// Reads through the resource see the transaction's own pending writes.
#[derive(Debug)]
pub struct StorageResource {
    storage: Arc<dyn StorageProvider>,
    pending: Mutex<Vec<(Uuid, Option<Bytes>)>>,
}

impl StorageResource {
    /// The storage resource enlisted in `trx`, enlisting one if needed
    pub async fn join(
        trx: &mut Transaction,
        storage: &Arc<dyn StorageProvider>,
    ) -> Result<Arc<Self>, Error> {
        if let Some(existing) = trx.resource_as::<Self>(STORAGE_RESOURCE_ID) {
            return Ok(existing);
        }
        let resource = Arc::new(Self {
            storage: storage.clone(),
            pending: Mutex::new(Vec::new()),
        });
        if !trx.add_resource(resource.clone()).await? {
            return Err(TransactionError::Vetoed(STORAGE_RESOURCE_ID.to_string()).into());
        }
        Ok(resource)
    }

    pub fn store(&self, id: Uuid, data: Bytes) {
        self.pending.lock().push((id, Some(data)));
    }

    pub fn delete(&self, id: Uuid) {
        self.pending.lock().push((id, None));
    }

    pub async fn load(&self, id: Uuid) -> Result<Bytes, StorageError> {
        let buffered = self
            .pending
            .lock()
            .iter()
            .rev()
            .find(|(pending, _)| *pending == id)
            .map(|(_, data)| data.clone());
        match buffered {
            Some(Some(data)) => Ok(data),
            Some(None) => Err(StorageError::NotFound(id)),
            None => self.storage.load(id).await,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl Resource for StorageResource {
    fn id(&self) -> String {
        STORAGE_RESOURCE_ID.to_string()
    }

    async fn added(&self, trx: TrxId) -> Result<(), Error> {
        Ok(self.storage.begin(trx).await?)
    }

    async fn commit(&self, trx: TrxId) -> Result<(), Error> {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (id, data) in pending {
            match data {
                Some(data) => self.storage.store(id, data).await?,
                None => self.storage.delete(id).await?,
            }
        }
        Ok(self.storage.commit(trx).await?)
    }

    async fn abort(&self, trx: TrxId) -> Result<(), Error> {
        self.pending.lock().clear();
        Ok(self.storage.abort(trx).await?)
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Forwards transaction boundaries to an external application
#[derive(Debug)]
pub struct AppResource {
    app: Arc<dyn ExecutableApp>,
}

impl AppResource {
    pub fn new(app: Arc<dyn ExecutableApp>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl Resource for AppResource {
    fn id(&self) -> String {
        format!("app:{}", self.app.id())
    }

    async fn added(&self, trx: TrxId) -> Result<(), Error> {
        self.app.begin(trx).await
    }

    async fn commit(&self, trx: TrxId) -> Result<(), Error> {
        self.app.commit(trx).await
    }

    async fn abort(&self, trx: TrxId) -> Result<(), Error> {
        self.app.abort(trx).await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
