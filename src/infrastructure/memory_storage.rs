// In-memory Storage Backend - reference implementation
// Each entity collection sits behind its own reader/writer lock together with
// its id sequence. Reads scan and sort on every call.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::infrastructure::cursor::CursorPosition;
use crate::infrastructure::storage::StorageBackend;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId, SortKey};

#[derive(Debug, Default)]
struct PostTable {
    rows: HashMap<PostId, Post>,
    seq: PostId,
}

#[derive(Debug, Default)]
struct CommentTable {
    rows: HashMap<CommentId, Comment>,
    by_post: HashMap<PostId, Vec<CommentId>>,
    by_parent: HashMap<CommentId, Vec<CommentId>>,
    seq: CommentId,
}

impl CommentTable {
    fn collect(&self, ids: Option<&Vec<CommentId>>) -> Vec<Comment> {
        ids.map(|ids| ids.iter().filter_map(|id| self.rows.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    posts: RwLock<PostTable>,
    comments: RwLock<CommentTable>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

/// (created_at DESC, id DESC)
fn newest_first<T: SortKey>(a: &T, b: &T) -> Ordering {
    b.created_at()
        .cmp(a.created_at())
        .then_with(|| b.sort_id().cmp(&a.sort_id()))
}

fn page_after<T: SortKey>(
    mut rows: Vec<T>,
    after: Option<&CursorPosition>,
    limit: usize,
) -> Vec<T> {
    rows.sort_by(newest_first);
    rows.into_iter()
        .filter(|row| after.map_or(true, |pos| pos.precedes(row.created_at(), row.sort_id())))
        .take(limit)
        .collect()
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let mut table = self.posts.write().await;
        table.seq += 1;
        let stored = Post {
            id: table.seq,
            title: post.title,
            body: post.body,
            author: post.author,
            allow_comments: post.allow_comments,
            created_at: post.created_at,
        };
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_post(&self, id: PostId) -> AppResult<Post> {
        let table = self.posts.read().await;
        table
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn set_post_comments_allowed(&self, id: PostId, allow: bool) -> AppResult<Post> {
        let mut table = self.posts.write().await;
        let post = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))?;
        post.allow_comments = allow;
        Ok(post.clone())
    }

    async fn list_posts(
        &self,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Post>> {
        let table = self.posts.read().await;
        let rows = table.rows.values().cloned().collect();
        Ok(page_after(rows, after, limit))
    }

    async fn count_posts(&self) -> AppResult<i64> {
        Ok(self.posts.read().await.rows.len() as i64)
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let mut table = self.comments.write().await;
        table.seq += 1;
        let stored = Comment {
            id: table.seq,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            author: comment.author,
            text: comment.text,
            created_at: comment.created_at,
            path: String::new(),
        };
        table.by_post.entry(stored.post_id).or_default().push(stored.id);
        if let Some(parent_id) = stored.parent_id {
            table.by_parent.entry(parent_id).or_default().push(stored.id);
        }
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn post_allows_comments(&self, post_id: PostId) -> AppResult<bool> {
        Ok(self.get_post(post_id).await?.allow_comments)
    }

    async fn parent_comment_post(&self, parent_id: CommentId) -> AppResult<PostId> {
        let table = self.comments.read().await;
        table
            .rows
            .get(&parent_id)
            .map(|parent| parent.post_id)
            .ok_or_else(|| AppError::NotFound("parent comment not found".to_string()))
    }

    async fn get_comment_path(&self, id: CommentId) -> AppResult<String> {
        let table = self.comments.read().await;
        table
            .rows
            .get(&id)
            .map(|comment| comment.path.clone())
            .ok_or_else(|| AppError::NotFound("comment not found".to_string()))
    }

    async fn set_comment_path(&self, id: CommentId, path: &str) -> AppResult<()> {
        let mut table = self.comments.write().await;
        let comment = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("comment not found".to_string()))?;
        comment.path = path.to_string();
        Ok(())
    }

    async fn list_root_comments(
        &self,
        post_id: PostId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>> {
        let table = self.comments.read().await;
        let roots = table
            .collect(table.by_post.get(&post_id))
            .into_iter()
            .filter(|comment| comment.parent_id.is_none())
            .collect();
        Ok(page_after(roots, after, limit))
    }

    async fn list_child_comments(
        &self,
        parent_id: CommentId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>> {
        let table = self.comments.read().await;
        let children = table.collect(table.by_parent.get(&parent_id));
        Ok(page_after(children, after, limit))
    }

    async fn child_comments_batch(&self, parent_ids: &[CommentId]) -> AppResult<Vec<Comment>> {
        let table = self.comments.read().await;
        let wanted: HashSet<CommentId> = parent_ids.iter().copied().collect();
        let mut children: Vec<Comment> = wanted
            .iter()
            .flat_map(|parent_id| table.collect(table.by_parent.get(parent_id)))
            .collect();

        children.sort_by(|a, b| {
            a.parent_id
                .cmp(&b.parent_id)
                .then_with(|| newest_first(a, b))
        });
        Ok(children)
    }

    async fn count_comments(&self, post_id: PostId) -> AppResult<i64> {
        let table = self.comments.read().await;
        Ok(table.by_post.get(&post_id).map_or(0, |ids| ids.len() as i64))
    }

    async fn count_child_comments(&self, parent_id: CommentId) -> AppResult<i64> {
        let table = self.comments.read().await;
        Ok(table.by_parent.get(&parent_id).map_or(0, |ids| ids.len() as i64))
    }
}
