use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{StorageError, StorageProvider};

/// In-memory storage backend
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<HashMap<Uuid, Bytes>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.inner.read().contains_key(&id)
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn load(&self, id: Uuid) -> Result<Bytes, StorageError> {
        self.inner
            .read()
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn store(&self, id: Uuid, data: Bytes) -> Result<(), StorageError> {
        self.inner.write().insert(id, data);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.write().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_store_load_delete() {
        let storage = MemoryStorage::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            storage.load(id).await,
            Err(StorageError::NotFound(_))
        ));

        storage.store(id, Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(storage.load(id).await.unwrap(), Bytes::from_static(b"abc"));
        assert_eq!(storage.len(), 1);

        storage.delete(id).await.unwrap();
        storage.delete(id).await.unwrap();
        assert!(storage.is_empty());
    }
}
