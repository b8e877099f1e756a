use crate::storage::cloud::S3Options;
use crate::storage::{
    CloudBackend, DynBackend, EmptyBackend, FilesystemBackend, HttpBackend, MemoryBackend,
};
use crate::{GateError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Driver name that leaves the service without a backend; every operation
/// then fails as unimplemented.
pub const NO_BACKEND_DRIVER: &str = "none";

/// Raw connection settings handed to a backend factory.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub name: Option<String>,
    pub url: Option<String>,
    pub access: Option<String>,
    pub secret: Option<String>,
    pub token: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

impl BackendSettings {
    fn url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

pub type BackendFactory = fn(&BackendSettings) -> Result<DynBackend>;

#[derive(Debug, Clone, Default)]
pub struct BackendBuilder {
    driver: Option<String>,
    settings: BackendSettings,
    factories: HashMap<String, BackendFactory>,
}

impl BackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = Some(name.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.settings.url = Some(url.into());
        self
    }

    pub fn access(mut self, access: impl Into<String>) -> Self {
        self.settings.access = Some(access.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.settings.secret = Some(secret.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.settings.token = Some(token.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.settings.bucket = Some(bucket.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.settings.region = Some(region.into());
        self
    }

    /// Adds (or replaces) a driver. Registered drivers take precedence over
    /// the built-in ones.
    pub fn register(mut self, driver: impl Into<String>, factory: BackendFactory) -> Self {
        self.factories
            .insert(driver.into().trim().to_ascii_lowercase(), factory);
        self
    }

    fn resolve_driver(&self) -> Result<String> {
        let driver = self
            .driver
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if driver.is_empty() {
            return Err(GateError::Config(
                "store driver cannot be empty".to_string(),
            ));
        }

        Ok(driver)
    }

    fn build_builtin(&self, driver: &str) -> Result<DynBackend> {
        let settings = &self.settings;

        match driver {
            "fs" | "filesystem" => {
                let root = settings
                    .url()
                    .map(PathBuf::from)
                    .unwrap_or_else(std::env::temp_dir);
                Ok(Arc::new(FilesystemBackend::new(root)?))
            }
            "memory" => Ok(Arc::new(MemoryBackend::new())),
            "empty" => Ok(Arc::new(EmptyBackend)),
            "http" => {
                let url = settings.url().ok_or_else(|| {
                    GateError::Config("store url is required for http driver".to_string())
                })?;
                Ok(Arc::new(HttpBackend::new(url)?))
            }
            "s3" => {
                let options = S3Options {
                    bucket: settings.bucket.clone().unwrap_or_default(),
                    region: settings.region.clone(),
                    endpoint: settings.url().map(str::to_string),
                    access_key_id: settings.access.clone(),
                    secret_access_key: settings.secret.clone(),
                    session_token: settings.token.clone(),
                };
                Ok(Arc::new(CloudBackend::s3(&options)?))
            }
            other => Err(GateError::Config(format!(
                "can not support driver '{}'",
                other
            ))),
        }
    }

    /// Builds and pings the configured backend. Returns `None` for the
    /// [`NO_BACKEND_DRIVER`] driver.
    pub async fn build(&self) -> Result<Option<DynBackend>> {
        let driver = self.resolve_driver()?;
        if driver == NO_BACKEND_DRIVER {
            tracing::warn!("store driver '{}' configured; chunk operations are disabled", driver);
            return Ok(None);
        }

        let backend = match self.factories.get(&driver) {
            Some(factory) => factory(&self.settings)?,
            None => self.build_builtin(&driver)?,
        };

        backend.ping().await?;

        tracing::info!(
            driver = %driver,
            name = self.settings.name.as_deref().unwrap_or_default(),
            "store driver ready"
        );

        Ok(Some(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectBackend;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_build_memory_backend() {
        let backend = BackendBuilder::new()
            .driver(" Memory ")
            .build()
            .await
            .unwrap()
            .expect("memory backend");

        backend.put_object("k", Bytes::from("v")).await.unwrap();
        assert_eq!(backend.get_object("k").await.unwrap(), Bytes::from("v"));
    }

    #[tokio::test]
    async fn test_build_filesystem_backend_creates_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("store");

        let backend = BackendBuilder::new()
            .driver("fs")
            .url(root.to_string_lossy())
            .build()
            .await
            .unwrap();

        assert!(backend.is_some());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_none_driver_yields_no_backend() {
        let backend = BackendBuilder::new().driver("none").build().await.unwrap();
        assert!(backend.is_none());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_unknown_drivers() {
        let result = BackendBuilder::new().build().await;
        assert!(matches!(result, Err(GateError::Config(_))));

        let result = BackendBuilder::new().driver("qiniu").build().await;
        assert!(matches!(result, Err(GateError::Config(msg)) if msg.contains("qiniu")));
    }

    #[tokio::test]
    async fn test_http_driver_requires_url() {
        let result = BackendBuilder::new().driver("http").build().await;
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[tokio::test]
    async fn test_registered_driver_takes_precedence() {
        fn factory(settings: &BackendSettings) -> Result<DynBackend> {
            assert_eq!(settings.bucket.as_deref(), Some("custom-bucket"));
            Ok(Arc::new(EmptyBackend))
        }

        let backend = BackendBuilder::new()
            .register("Custom", factory)
            .driver("custom")
            .bucket("custom-bucket")
            .build()
            .await
            .unwrap();
        assert!(backend.is_some());
    }
}
