// Service layer - validation and orchestration on top of the storage backend
pub mod pagination;
pub mod path_assigner;
pub mod post_service;
pub mod comment_service;

pub use comment_service::CommentService;
pub use pagination::{PageRequest, ScopeId, DEFAULT_PAGE_SIZE};
pub use path_assigner::PathAssigner;
pub use post_service::PostService;
