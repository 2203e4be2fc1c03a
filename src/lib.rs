// Comment Threads - posts with threaded comments served through keyset pagination

// Domain types
pub mod models;

// Storage backends, cursor codec, request-scoped batching
pub mod infrastructure;

// Validation and orchestration
pub mod services;

// HTTP surface and bootstrap
pub mod api;
pub mod app_state;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
