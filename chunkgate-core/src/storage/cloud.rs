use super::ObjectBackend;
use crate::{GateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// Adapter over any `object_store` implementation; built for S3-compatible
/// buckets by default.
#[derive(Debug, Clone)]
pub struct CloudBackend {
    store: Arc<dyn ObjectStore>,
}

impl CloudBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn s3(options: &S3Options) -> Result<Self> {
        let bucket = options.bucket.trim();
        if bucket.is_empty() {
            return Err(GateError::Config(
                "bucket is required for s3 backend".to_string(),
            ));
        }

        let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);

        if let Some(region) = non_empty(&options.region) {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = non_empty(&options.endpoint) {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key_id) = non_empty(&options.access_key_id) {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = non_empty(&options.secret_access_key) {
            builder = builder.with_secret_access_key(secret_access_key);
        }
        if let Some(token) = non_empty(&options.session_token) {
            builder = builder.with_token(token);
        }

        Ok(Self::new(Arc::new(builder.build()?)))
    }

    fn object_path(key: &str) -> Result<ObjectPath> {
        ObjectPath::parse(key)
            .map_err(|error| GateError::InvalidRequest(format!("invalid object key {key}: {error}")))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl ObjectBackend for CloudBackend {
    async fn put_object(&self, key: &str, payload: Bytes) -> Result<()> {
        let path = Self::object_path(key)?;
        self.store.put(&path, payload.into()).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let path = Self::object_path(key)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => {
                Err(GateError::ChunkNotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = Self::object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(GateError::ChunkNotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.store.list_with_delimiter(None).await?;
        Ok(())
    }
}
