use async_trait::async_trait;
use bytes::Bytes;
use chunkgate_core::{GateError, ObjectBackend, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put(String, Bytes),
    Get(String),
    Delete(String),
}

/// Backend that records every call and answers from an in-memory map.
/// Keys listed in `failing` always error; deletes of absent keys report
/// not-found.
#[derive(Default)]
pub struct ScriptedBackend {
    objects: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashMap<String, String>>,
    latency: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn seed(&self, key: &str, payload: &'static str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from(payload));
    }

    pub fn fail(&self, key: &str, message: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(key.to_string(), message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stored(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    async fn enter(&self, call: Call, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failing.lock().unwrap().get(key) {
            Some(message) => Err(GateError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectBackend for ScriptedBackend {
    async fn put_object(&self, key: &str, payload: Bytes) -> Result<()> {
        self.enter(Call::Put(key.to_string(), payload.clone()), key)
            .await?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), payload);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.enter(Call::Get(key.to_string()), key).await?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.enter(Call::Delete(key.to_string()), key).await?;
        match self.objects.lock().unwrap().remove(key) {
            Some(_) => Ok(()),
            None => Err(GateError::ChunkNotFound(key.to_string())),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
