// Storage Backend - the contract every persistence implementation satisfies
//
// List operations return rows ordered by (created_at DESC, id DESC) and only
// rows strictly after `after` when a position is given. Ids grow
// monotonically per entity type. Missing rows surface as AppError::NotFound.
// Returned values are owned copies; mutating them never touches stored state.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::infrastructure::cursor::CursorPosition;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Verify the backend can serve queries.
    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    // Posts
    async fn create_post(&self, post: NewPost) -> AppResult<Post>;
    async fn get_post(&self, id: PostId) -> AppResult<Post>;
    async fn set_post_comments_allowed(&self, id: PostId, allow: bool) -> AppResult<Post>;
    async fn list_posts(&self, after: Option<&CursorPosition>, limit: usize)
        -> AppResult<Vec<Post>>;
    async fn count_posts(&self) -> AppResult<i64>;

    // Comments
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;
    async fn post_allows_comments(&self, post_id: PostId) -> AppResult<bool>;
    /// Returns the id of the post owning `parent_id`.
    async fn parent_comment_post(&self, parent_id: CommentId) -> AppResult<PostId>;
    async fn get_comment_path(&self, id: CommentId) -> AppResult<String>;
    async fn set_comment_path(&self, id: CommentId, path: &str) -> AppResult<()>;
    async fn list_root_comments(
        &self,
        post_id: PostId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>>;
    async fn list_child_comments(
        &self,
        parent_id: CommentId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>>;
    /// All children of every listed parent, ordered by parent id and then by
    /// (created_at DESC, id DESC) within each parent.
    async fn child_comments_batch(&self, parent_ids: &[CommentId]) -> AppResult<Vec<Comment>>;
    async fn count_comments(&self, post_id: PostId) -> AppResult<i64>;
    async fn count_child_comments(&self, parent_id: CommentId) -> AppResult<i64>;
}
