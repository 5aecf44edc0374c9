use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Transaction, TransactionError, TrxId};
use crate::principal::Principal;

pub type TrxHandle = Arc<tokio::sync::Mutex<Transaction>>;

/// Open transactions by id
#[derive(Debug)]
pub struct TransactionTable {
    transactions: Mutex<HashMap<TrxId, TrxHandle>>,
    default_timeout: Duration,
}

impl TransactionTable {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn create(&self, owner: &Principal, timeout: Option<Duration>) -> (TrxId, TrxHandle) {
        let id = Uuid::new_v4();
        (id, self.insert(id, owner, timeout))
    }

    fn insert(&self, id: TrxId, owner: &Principal, timeout: Option<Duration>) -> TrxHandle {
        let trx = Transaction::new(
            id,
            owner.clone(),
            timeout.unwrap_or(self.default_timeout),
        );
        let handle = Arc::new(tokio::sync::Mutex::new(trx));
        self.transactions.lock().insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: TrxId) -> Result<TrxHandle, TransactionError> {
        self.transactions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(TransactionError::NotFound(id))
    }

    /// Continue transaction `id` if it exists, otherwise begin it.
    ///
    /// Continuing another principal's transaction is refused, as is
    /// continuing one that has expired.
    pub async fn get_or_create_transaction_with_id(
        &self,
        id: TrxId,
        owner: &Principal,
        timeout: Option<Duration>,
    ) -> Result<TrxHandle, TransactionError> {
        let existing = self.transactions.lock().get(&id).cloned();
        match existing {
            Some(handle) => {
                {
                    let trx = handle.lock().await;
                    if trx.owner() != owner {
                        return Err(TransactionError::OwnerMismatch(id));
                    }
                    trx.check_live()?;
                }
                Ok(handle)
            }
            None => Ok(self.insert(id, owner, timeout)),
        }
    }

    pub fn end(&self, id: TrxId) -> Option<TrxHandle> {
        self.transactions.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.lock().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn principal(id: &str) -> Principal {
        Principal::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_continue_own_transaction() {
        let table = TransactionTable::new(Duration::seconds(60));
        let (id, handle) = table.create(&principal("alice"), None);
        let again = table
            .get_or_create_transaction_with_id(id, &principal("alice"), None)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
        assert_eq!(table.len(), 1);

        assert!(table.end(id).is_some());
        assert!(matches!(table.get(id), Err(TransactionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_refuse_foreign_or_expired_transaction() {
        let table = TransactionTable::new(Duration::seconds(60));
        let (id, _) = table.create(&principal("alice"), None);
        assert!(matches!(
            table
                .get_or_create_transaction_with_id(id, &principal("bob"), None)
                .await,
            Err(TransactionError::OwnerMismatch(_))
        ));

        let (expired, _) = table.create(&principal("alice"), Some(Duration::seconds(-1)));
        assert!(matches!(
            table
                .get_or_create_transaction_with_id(expired, &principal("alice"), None)
                .await,
            Err(TransactionError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_create_with_given_id() {
        let table = TransactionTable::new(Duration::seconds(60));
        let id = Uuid::new_v4();
        let handle = table
            .get_or_create_transaction_with_id(id, &principal("alice"), None)
            .await
            .unwrap();
        assert_eq!(handle.lock().await.id(), id);
        assert!(table.get(id).is_ok());
    }
}
