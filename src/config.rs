use serde::Deserialize;
use std::env;
use std::num::NonZeroUsize;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(3).unwrap();
const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_CHUNK_SIZE: usize = 256;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the job gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Storage backend holding the dedup index and outcome cache.
    pub store_backend: StoreBackend,
    /// Postgres connection string, required when `store_backend` is `postgres`.
    pub database_url: Option<String>,
    /// Maximum number of fingerprint mappings kept in the dedup index.
    pub dedup_capacity: NonZeroUsize,
    /// Maximum number of outcomes kept in the result cache.
    pub result_capacity: NonZeroUsize,
    /// Upper bound on jobs executing at the same time.
    pub max_concurrency: usize,
    /// Token budget per chunk produced by the text extractor.
    pub chunk_size: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported storage backends for the bounded stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process maps; state is lost on restart and not shared between instances.
    Memory,
    /// Shared Postgres tables, usable from several cooperating processes.
    Postgres,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = load_env_optional("JOBS_STORE_BACKEND")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("JOBS_STORE_BACKEND".into()))
            })
            .transpose()?
            .unwrap_or(StoreBackend::Memory);
        let database_url = load_env_optional("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVariable("DATABASE_URL".into()));
        }

        Ok(Self {
            store_backend,
            database_url,
            dedup_capacity: parse_optional("JOBS_DEDUP_CAPACITY")?.unwrap_or(DEFAULT_CAPACITY),
            result_capacity: parse_optional("JOBS_RESULT_CAPACITY")?.unwrap_or(DEFAULT_CAPACITY),
            max_concurrency: parse_optional::<NonZeroUsize>("JOBS_MAX_CONCURRENCY")?
                .map_or(DEFAULT_MAX_CONCURRENCY, NonZeroUsize::get),
            chunk_size: parse_optional::<NonZeroUsize>("EXTRACTION_CHUNK_SIZE")?
                .map_or(DEFAULT_CHUNK_SIZE, NonZeroUsize::get),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            dedup_capacity: DEFAULT_CAPACITY,
            result_capacity: DEFAULT_CAPACITY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            server_port: None,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        store_backend = ?config.store_backend,
        dedup_capacity = config.dedup_capacity.get(),
        result_capacity = config.result_capacity.get(),
        max_concurrency = config.max_concurrency,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_known_names() {
        assert_eq!("memory".parse(), Ok(StoreBackend::Memory));
        assert_eq!(" Postgres ".parse(), Ok(StoreBackend::Postgres));
        assert_eq!("postgresql".parse(), Ok(StoreBackend::Postgres));
        assert_eq!("redis".parse::<StoreBackend>(), Err(()));
    }

    #[test]
    fn defaults_match_small_bounded_caches() {
        let config = Config::default();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.dedup_capacity.get(), 3);
        assert_eq!(config.result_capacity.get(), 3);
        assert!(config.max_concurrency > 0);
    }
}
