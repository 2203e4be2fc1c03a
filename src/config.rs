use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub loader: LoaderConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    Sqlite,
    Postgres,
}

impl FromStr for StorageBackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" => Ok(StorageBackendKind::Memory),
            "sqlite" => Ok(StorageBackendKind::Sqlite),
            "postgres" | "postgresql" => Ok(StorageBackendKind::Postgres),
            other => Err(AppError::Configuration(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub url: String,
    pub max_connections: u32,
    pub connection_retries: u32,
    pub connection_delay_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Memory,
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            connection_retries: 5,
            connection_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Batch window settings for the per-request child-comment loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub wait_ms: u64,
    pub max_batch: usize,
}

impl LoaderConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            wait_ms: 2,
            max_batch: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: crate::services::pagination::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse::<StorageBackendKind>()?;

        let url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) if backend == StorageBackendKind::Postgres => {
                return Err(AppError::Configuration(
                    "DATABASE_URL is required for the postgres backend".to_string(),
                ));
            }
            Err(_) => StorageConfig::default().url,
        };

        let defaults = Config::default();
        Ok(Self {
            storage: StorageConfig {
                backend,
                url,
                max_connections: env_or("DB_MAX_CONNECTIONS", defaults.storage.max_connections),
                connection_retries: env_or(
                    "DB_CONNECTION_RETRIES",
                    defaults.storage.connection_retries,
                ),
                connection_delay_secs: env_or(
                    "DB_CONNECTION_DELAY_SECS",
                    defaults.storage.connection_delay_secs,
                ),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env_or("SERVER_PORT", defaults.server.port),
            },
            loader: LoaderConfig {
                wait_ms: env_or("LOADER_WAIT_MS", defaults.loader.wait_ms),
                max_batch: env_or("LOADER_MAX_BATCH", defaults.loader.max_batch),
            },
            pagination: PaginationConfig {
                default_page_size: env_or(
                    "DEFAULT_PAGE_SIZE",
                    defaults.pagination.default_page_size,
                ),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Cannot parse {}={:?}, using default: {}", key, raw, default);
            default
        }
    }
}
