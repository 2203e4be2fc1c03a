// CommentService - adding comments, root and child listings, nested children
// Nested children go through the request's ChildCommentLoader, which the
// caller passes in explicitly.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::PaginationConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::batch_loader::ChildCommentLoader;
use crate::infrastructure::storage::StorageBackend;
use crate::models::{current_timestamp, AddCommentInput, Comment, CommentId, Connection, NewComment};
use crate::services::pagination::{
    build_connection, parse_scope_id, window_loaded, PageRequest, ScopeId,
};
use crate::services::path_assigner::PathAssigner;

#[derive(Clone)]
pub struct CommentService {
    storage: Arc<dyn StorageBackend>,
    paths: PathAssigner,
    pagination: PaginationConfig,
}

impl CommentService {
    pub fn new(storage: Arc<dyn StorageBackend>, pagination: PaginationConfig) -> Self {
        Self {
            paths: PathAssigner::new(Arc::clone(&storage)),
            storage,
            pagination,
        }
    }

    #[instrument(skip(self, input), fields(post_id = %input.post_id))]
    pub async fn add_comment(&self, input: AddCommentInput) -> AppResult<Comment> {
        let post_id = parse_scope_id(&input.post_id, ScopeId::CommentPost)?;
        if input.author.trim().is_empty() || input.text.trim().is_empty() {
            return Err(AppError::Validation(
                "author and text are required fields".to_string(),
            ));
        }

        if !self.storage.post_allows_comments(post_id).await? {
            return Err(AppError::Conflict(
                "comments not allowed for this post".to_string(),
            ));
        }

        let parent = self
            .paths
            .resolve_parent(post_id, input.parent_id.as_deref())
            .await?;

        let mut comment = self
            .storage
            .create_comment(NewComment {
                post_id,
                parent_id: parent.parent_id(),
                author: input.author,
                text: input.text,
                created_at: current_timestamp(),
            })
            .await?;

        self.paths.assign(&mut comment, &parent).await?;

        info!(comment_id = comment.id, path = %comment.path, "Added comment");
        Ok(comment)
    }

    /// Top-level comments of a post. The total counts every comment of the
    /// post, replies included.
    pub async fn get_root_comments(
        &self,
        post_id: &str,
        first: Option<i64>,
        after: Option<&str>,
    ) -> AppResult<Connection<Comment>> {
        let post_id = parse_scope_id(post_id, ScopeId::CommentPost)?;
        let page = PageRequest::parse(first, after, self.pagination.default_page_size)?;

        let rows = self
            .storage
            .list_root_comments(post_id, page.after.as_ref(), page.fetch_limit())
            .await?;
        let total = self.storage.count_comments(post_id).await?;
        Ok(build_connection(rows, page.limit, total))
    }

    /// Direct replies to a comment, fetched with their own keyset query.
    pub async fn get_child_comments(
        &self,
        parent_id: &str,
        first: Option<i64>,
        after: Option<&str>,
    ) -> AppResult<Connection<Comment>> {
        let parent_id = parse_scope_id(parent_id, ScopeId::Parent)?;
        let page = PageRequest::parse(first, after, self.pagination.default_page_size)?;

        let rows = self
            .storage
            .list_child_comments(parent_id, page.after.as_ref(), page.fetch_limit())
            .await?;
        let total = self.storage.count_child_comments(parent_id).await?;
        Ok(build_connection(rows, page.limit, total))
    }

    /// Direct replies resolved through the request's loader, then windowed
    /// in memory with the same keyset rule.
    pub async fn children(
        &self,
        loader: &ChildCommentLoader,
        parent_id: CommentId,
        first: Option<i64>,
        after: Option<&str>,
    ) -> AppResult<Connection<Comment>> {
        let page = PageRequest::parse(first, after, self.pagination.default_page_size)?;
        let children = loader.load(parent_id).await?;
        debug!(parent_id, loaded = children.len(), "Resolved children");
        Ok(window_loaded(&children, &page))
    }
}
