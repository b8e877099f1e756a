use chunkgate_core::{
    BackendBuilder, DEFAULT_MIN_PARALLEL_BATCH, ExecutionPolicy, GateError, Result,
    ServiceOptions,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const ENV_PREFIX: &str = "CHUNKGATE";

/// Upper bound accepted for `chunk.parallel`.
pub const MAX_PARALLELISM: i64 = 4096;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub chunk: ChunkConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5783,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Level of the per-batch aggregate log line.
    pub level: String,
    /// A batch must be larger than this to run on workers.
    pub min: i64,
    /// Worker count; must also exceed `min` for workers to be used.
    pub parallel: i64,
    pub validate_keys: bool,
    pub health_interval_secs: u64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            min: DEFAULT_MIN_PARALLEL_BATCH as i64,
            parallel: 0,
            validate_keys: false,
            health_interval_secs: 3600,
        }
    }
}

impl ChunkConfig {
    pub fn policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::new(self.parallel, self.min).with_key_validation(self.validate_keys)
    }

    pub fn log_level(&self) -> Result<Level> {
        parse_level(&self.level)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn service_options(&self) -> Result<ServiceOptions> {
        Ok(ServiceOptions {
            policy: self.policy(),
            log_level: self.log_level()?,
            health_interval: self.health_interval(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub driver: String,
    pub name: Option<String>,
    /// Root directory for `fs`, base url for `http`, endpoint for `s3`.
    pub url: Option<String>,
    pub access: Option<String>,
    pub secret: Option<String>,
    pub token: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: "fs".to_string(),
            name: None,
            url: None,
            access: None,
            secret: None,
            token: None,
            bucket: None,
            region: None,
        }
    }
}

impl StoreConfig {
    pub fn backend_builder(&self) -> BackendBuilder {
        let mut builder = BackendBuilder::new().driver(self.driver.as_str());

        if let Some(name) = &self.name {
            builder = builder.name(name.as_str());
        }
        if let Some(url) = &self.url {
            builder = builder.url(url.as_str());
        }
        if let Some(access) = &self.access {
            builder = builder.access(access.as_str());
        }
        if let Some(secret) = &self.secret {
            builder = builder.secret(secret.as_str());
        }
        if let Some(token) = &self.token {
            builder = builder.token(token.as_str());
        }
        if let Some(bucket) = &self.bucket {
            builder = builder.bucket(bucket.as_str());
        }
        if let Some(region) = &self.region {
            builder = builder.region(region.as_str());
        }

        builder
    }
}

impl Config {
    /// Loads `path` (optional; YAML or TOML by extension) overlaid with
    /// `CHUNKGATE__SECTION__KEY` environment variables.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::from_sources(path, ENV_PREFIX)
    }

    fn from_sources(path: &str, env_prefix: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GateError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| GateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_level(&self.log.level)?;
        self.chunk.log_level()?;

        if self.chunk.parallel > MAX_PARALLELISM {
            return Err(GateError::Config(format!(
                "chunk.parallel {} exceeds the maximum of {}",
                self.chunk.parallel, MAX_PARALLELISM
            )));
        }

        if self.store.driver.trim().is_empty() {
            return Err(GateError::Config("store.driver cannot be empty".to_string()));
        }

        Ok(())
    }
}

pub fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| GateError::Config(format!("invalid log level '{}'", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::from_sources("does-not-exist.yaml", "CHUNKGATE_TEST_DEFAULTS").unwrap();

        assert_eq!(config.server.bind_addr(), "0.0.0.0:5783");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.store.driver, "fs");
        assert_eq!(config.chunk.log_level().unwrap(), Level::DEBUG);
        assert_eq!(config.chunk.health_interval(), Duration::from_secs(3600));

        let policy = config.chunk.policy();
        assert_eq!(policy.parallelism, 0);
        assert_eq!(policy.min_parallel_batch, 12);
        assert!(!policy.validate_keys);
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 9000\nchunk:\n  level: warn\n  parallel: 16\n  min: 4\n  validate_keys: true\nstore:\n  driver: memory\n  name: local"
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = Config::from_sources(&path, "CHUNKGATE_TEST_YAML").unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.chunk.log_level().unwrap(), Level::WARN);
        assert_eq!(config.store.driver, "memory");
        assert_eq!(config.store.name.as_deref(), Some("local"));

        let policy = config.chunk.policy();
        assert_eq!(policy.parallelism, 16);
        assert_eq!(policy.min_parallel_batch, 4);
        assert!(policy.validate_keys);
    }

    #[test]
    fn test_environment_overrides_file() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("CHUNKGATE_TEST_ENV__CHUNK__PARALLEL", "8");
            std::env::set_var("CHUNKGATE_TEST_ENV__STORE__DRIVER", "none");
        }

        let config = Config::from_sources("does-not-exist.yaml", "CHUNKGATE_TEST_ENV").unwrap();
        assert_eq!(config.chunk.parallel, 8);
        assert_eq!(config.store.driver, "none");
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let config = Config {
            chunk: ChunkConfig {
                level: "loud".to_string(),
                ..ChunkConfig::default()
            },
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(GateError::Config(msg)) if msg.contains("loud")));
    }

    #[test]
    fn test_excessive_parallelism_is_config_error() {
        let mut config = Config {
            chunk: ChunkConfig {
                parallel: 2_000_000,
                ..ChunkConfig::default()
            },
            ..Config::default()
        };
        assert!(
            matches!(config.validate(), Err(GateError::Config(msg)) if msg.contains("chunk.parallel"))
        );

        config.chunk.parallel = MAX_PARALLELISM;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_store_config_builds_backend() {
        let store = StoreConfig {
            driver: "memory".to_string(),
            name: Some("scratch".to_string()),
            ..StoreConfig::default()
        };
        assert!(store.backend_builder().build().await.unwrap().is_some());

        let store = StoreConfig {
            driver: "none".to_string(),
            ..StoreConfig::default()
        };
        assert!(store.backend_builder().build().await.unwrap().is_none());
    }
}
