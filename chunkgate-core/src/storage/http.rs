use super::ObjectBackend;
use crate::key::format_key;
use crate::{GateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url};

pub const USER_AGENT: &str = "storage";

/// Plain HTTP origin: `POST` stores, `GET` fetches, `DELETE` removes.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: Url,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut base_url = base_url.into().trim().to_string();
        if base_url.is_empty() {
            return Err(GateError::Config(
                "http backend requires a base url".to_string(),
            ));
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let base = Url::parse(&base_url)
            .map_err(|e| GateError::Config(format!("invalid http base url '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(GateError::Config(format!(
                "http base url '{}' cannot hold object paths",
                base_url
            )));
        }

        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Appends the stored key to the base url, percent-encoding each segment.
    fn object_url(&self, key: &str) -> Result<Url> {
        let stored_key = format_key(key);
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| GateError::Config(format!("http base url '{}' has no path", self.base)))?
            .pop_if_empty()
            .extend(stored_key.split('/'));
        Ok(url)
    }

    async fn request(&self, method: Method, key: &str, body: Option<Bytes>) -> Result<Bytes> {
        let url = self.object_url(key)?;
        tracing::debug!(path = key, url = %url, method = %method, "request waiting");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.bytes().await?),
            StatusCode::NOT_FOUND => Err(GateError::ChunkNotFound(key.to_string())),
            status => Err(GateError::Backend(format!("http status {}", status.as_u16()))),
        }
    }
}

#[async_trait]
impl ObjectBackend for HttpBackend {
    async fn put_object(&self, key: &str, payload: Bytes) -> Result<()> {
        self.request(Method::POST, key, Some(payload)).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.request(Method::GET, key, None).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.request(Method::DELETE, key, None).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
