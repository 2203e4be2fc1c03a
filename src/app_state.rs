use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, warn};

use crate::{
    config::{Config, StorageBackendKind, StorageConfig},
    error::{AppError, AppResult},
    infrastructure::{
        InMemoryStorage, PostgresStorage, RequestScope, SqliteStorage, StorageBackend,
    },
    services::{CommentService, PostService},
};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub posts: PostService,
    pub comments: CommentService,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let storage = connect_storage(&config.storage).await?;
        Ok(Self::with_storage(storage, config))
    }

    pub fn with_storage(storage: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            posts: PostService::new(Arc::clone(&storage), config.pagination),
            comments: CommentService::new(Arc::clone(&storage), config.pagination),
            storage,
            config,
        }
    }

    /// A fresh loader and cancellation signal for one incoming request.
    pub fn request_scope(&self) -> RequestScope {
        RequestScope::new(Arc::clone(&self.storage), self.config.loader)
    }
}

/// Build the configured backend. SQL backends retry the initial connection
/// and then create their schema.
pub async fn connect_storage(config: &StorageConfig) -> AppResult<Arc<dyn StorageBackend>> {
    match config.backend {
        StorageBackendKind::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageBackendKind::Sqlite => {
            let options = SqliteConnectOptions::from_str(&config.url)
                .map_err(|e| AppError::Configuration(format!("Invalid SQLite URL: {}", e)))?
                .create_if_missing(true);
            // Every connection to an in-memory database gets its own copy,
            // and the database is gone once its only connection closes.
            let pool_options = if config.url.contains(":memory:") {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(config.max_connections)
            };

            let pool = with_retries(config, "SQLite", || {
                pool_options.clone().connect_with(options.clone())
            })
            .await?;

            let storage = SqliteStorage::new(pool);
            storage.initialize().await?;
            info!("Using SQLite storage");
            Ok(Arc::new(storage))
        }
        StorageBackendKind::Postgres => {
            let pool = with_retries(config, "PostgreSQL", || {
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(8))
                    .connect(&config.url)
            })
            .await?;

            let storage = PostgresStorage::new(pool);
            storage.initialize().await?;
            info!("Using PostgreSQL storage");
            Ok(Arc::new(storage))
        }
    }
}

async fn with_retries<T, F, Fut>(config: &StorageConfig, label: &str, mut connect: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let attempts = config.connection_retries.max(1);
    let delay = Duration::from_secs(config.connection_delay_secs);
    let mut attempt = 1;

    loop {
        match connect().await {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < attempts => {
                warn!(
                    "Failed to connect to {} (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to connect to {} after {} attempts: {}",
                    label, attempts, e
                )));
            }
        }
    }
}
