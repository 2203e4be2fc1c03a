// Path Assigner - materialized ancestry paths for threaded comments
// A root comment's path is its own zero-padded id; a reply's path is its
// parent's path, a dot, and its own zero-padded id.
//
// The comment row is inserted first and the path written second. The two
// writes are separate: a failure in between leaves the row with an empty path.

use std::sync::Arc;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::infrastructure::storage::StorageBackend;
use crate::models::{Comment, CommentId, PostId};
use crate::services::pagination::{parse_scope_id, ScopeId};

pub const PATH_SEGMENT_WIDTH: usize = 10;
pub const PATH_SEPARATOR: char = '.';

pub fn path_segment(id: CommentId) -> String {
    format!("{:0width$}", id, width = PATH_SEGMENT_WIDTH)
}

/// Parent of a comment that is about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentSlot {
    Root,
    Reply { id: CommentId, path: String },
}

impl ParentSlot {
    pub fn parent_id(&self) -> Option<CommentId> {
        match self {
            ParentSlot::Root => None,
            ParentSlot::Reply { id, .. } => Some(*id),
        }
    }

    pub fn path_for(&self, id: CommentId) -> String {
        match self {
            ParentSlot::Root => path_segment(id),
            ParentSlot::Reply { path, .. } => {
                format!("{}{}{}", path, PATH_SEPARATOR, path_segment(id))
            }
        }
    }
}

#[derive(Clone)]
pub struct PathAssigner {
    storage: Arc<dyn StorageBackend>,
}

impl PathAssigner {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Validate the raw parent id and check it belongs to `post_id`.
    /// A missing or empty parent id means a root comment.
    pub async fn resolve_parent(
        &self,
        post_id: PostId,
        raw_parent: Option<&str>,
    ) -> AppResult<ParentSlot> {
        let raw = match raw_parent.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(ParentSlot::Root),
        };

        let parent_id = parse_scope_id(raw, ScopeId::ReplyParent)?;
        let parent_post = self.storage.parent_comment_post(parent_id).await?;
        if parent_post != post_id {
            return Err(AppError::Conflict(
                "parent comment does not belong to this post".to_string(),
            ));
        }

        let path = self.storage.get_comment_path(parent_id).await?;
        if path.is_empty() {
            warn!(parent_id, "parent comment has no materialized path yet");
        }

        Ok(ParentSlot::Reply {
            id: parent_id,
            path,
        })
    }

    /// Second write: attach the computed path to a freshly inserted comment.
    pub async fn assign(&self, comment: &mut Comment, parent: &ParentSlot) -> AppResult<()> {
        let path = parent.path_for(comment.id);
        self.storage.set_comment_path(comment.id, &path).await?;
        comment.path = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_storage::InMemoryStorage;
    use crate::models::{NewComment, NewPost};

    async fn new_post(storage: &dyn StorageBackend) -> PostId {
        storage
            .create_post(NewPost {
                title: "t".to_string(),
                body: "b".to_string(),
                author: "a".to_string(),
                allow_comments: true,
                created_at: "2024-01-01T00:00:00.000000Z".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    async fn insert_with_path(
        storage: &Arc<dyn StorageBackend>,
        assigner: &PathAssigner,
        post_id: PostId,
        parent: Option<&str>,
    ) -> AppResult<Comment> {
        let slot = assigner.resolve_parent(post_id, parent).await?;
        let mut comment = storage
            .create_comment(NewComment {
                post_id,
                parent_id: slot.parent_id(),
                author: "a".to_string(),
                text: "reply".to_string(),
                created_at: "2024-01-01T00:00:00.000000Z".to_string(),
            })
            .await?;
        assigner.assign(&mut comment, &slot).await?;
        Ok(comment)
    }

    #[test]
    fn test_path_segment_is_zero_padded() {
        assert_eq!(path_segment(7), "0000000007");
        assert_eq!(path_segment(1234567890), "1234567890");
        assert!(path_segment(9) < path_segment(10));
    }

    #[tokio::test]
    async fn test_root_path_is_own_segment() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let assigner = PathAssigner::new(storage.clone());
        let post_id = new_post(storage.as_ref()).await;

        let root = insert_with_path(&storage, &assigner, post_id, None).await.unwrap();
        assert_eq!(root.path, path_segment(root.id));
        assert_eq!(storage.get_comment_path(root.id).await.unwrap(), root.path);

        let blank = insert_with_path(&storage, &assigner, post_id, Some(" ")).await.unwrap();
        assert_eq!(blank.parent_id, None);
    }

    #[tokio::test]
    async fn test_five_level_chain() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let assigner = PathAssigner::new(storage.clone());
        let post_id = new_post(storage.as_ref()).await;

        let mut chain: Vec<CommentId> = Vec::new();
        let mut last: Option<Comment> = None;
        for _ in 0..5 {
            let parent = last.as_ref().map(|c| c.id.to_string());
            let comment = insert_with_path(&storage, &assigner, post_id, parent.as_deref())
                .await
                .unwrap();
            chain.push(comment.id);
            last = Some(comment);
        }

        let expected = chain
            .iter()
            .map(|id| path_segment(*id))
            .collect::<Vec<_>>()
            .join(".");
        let deepest = last.unwrap();
        assert_eq!(deepest.path, expected);
        assert_eq!(storage.get_comment_path(deepest.id).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_parent_errors() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::new());
        let assigner = PathAssigner::new(storage.clone());
        let post_a = new_post(storage.as_ref()).await;
        let post_b = new_post(storage.as_ref()).await;

        let on_a = insert_with_path(&storage, &assigner, post_a, None).await.unwrap();

        assert_eq!(
            assigner.resolve_parent(post_b, Some(&on_a.id.to_string())).await,
            Err(AppError::Conflict(
                "parent comment does not belong to this post".to_string()
            ))
        );
        assert_eq!(
            assigner.resolve_parent(post_a, Some("999")).await,
            Err(AppError::NotFound("parent comment not found".to_string()))
        );
        assert_eq!(
            assigner.resolve_parent(post_a, Some("abc")).await,
            Err(AppError::Validation("invalid parentID format".to_string()))
        );
    }
}
