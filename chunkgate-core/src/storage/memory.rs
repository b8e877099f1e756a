use super::ObjectBackend;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process object map. Missing keys read as empty payloads.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put_object(&self, key: &str, payload: Bytes) -> Result<()> {
        self.objects.write().await.insert(key.to_string(), payload);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned().unwrap_or_default())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();

        backend
            .put_object("u1/fp_1_2_3", Bytes::from("payload"))
            .await
            .unwrap();
        assert!(backend.contains("u1/fp_1_2_3").await);
        assert_eq!(
            backend.get_object("u1/fp_1_2_3").await.unwrap(),
            Bytes::from("payload")
        );

        // overwrite keeps a single entry
        backend
            .put_object("u1/fp_1_2_3", Bytes::from("other"))
            .await
            .unwrap();
        assert_eq!(backend.len().await, 1);

        backend.delete_object("u1/fp_1_2_3").await.unwrap();
        assert!(backend.is_empty().await);
        assert!(backend.get_object("u1/fp_1_2_3").await.unwrap().is_empty());
    }
}
