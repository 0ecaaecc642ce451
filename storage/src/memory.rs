use async_trait::async_trait;
use st_core::traits::StorageBackend;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory blob store. Default backend for tests and ephemeral sessions.
#[derive(Default, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    type Error = std::io::Error;

    async fn store(&self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, Self::Error> {
        Ok(self.data.read().await.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let store = MemoryStore::new();
        store.store("a/b", b"payload").await.unwrap();
        assert_eq!(store.retrieve("a/b").await.unwrap(), Some(b"payload".to_vec()));
        assert!(store.exists("a/b").await.unwrap());
        store.delete("a/b").await.unwrap();
        assert_eq!(store.retrieve("a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = MemoryStore::new();
        store.store("k", b"one").await.unwrap();
        store.store("k", b"two").await.unwrap();
        assert_eq!(store.retrieve("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len().await, 1);
    }
}
