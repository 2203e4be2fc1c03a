// Infrastructure modules
pub mod cursor;                // Opaque pagination tokens
pub mod storage;               // Storage backend contract
pub mod memory_storage;        // In-memory reference backend
pub mod sqlite_storage;        // SQLite backend
pub mod postgres_storage;      // PostgreSQL backend
pub mod batch_loader;          // Request-scoped child comment batching
pub mod request_scope;         // Per-request loader and cancellation

#[cfg(test)]
pub(crate) mod test_support;

pub use cursor::{CursorPosition, InvalidCursor};
pub use storage::StorageBackend;
pub use memory_storage::InMemoryStorage;
pub use sqlite_storage::SqliteStorage;
pub use postgres_storage::PostgresStorage;
pub use batch_loader::ChildCommentLoader;
pub use request_scope::RequestScope;
