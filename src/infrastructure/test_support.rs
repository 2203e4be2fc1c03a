// Test doubles shared by unit tests

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::infrastructure::cursor::CursorPosition;
use crate::infrastructure::memory_storage::InMemoryStorage;
use crate::infrastructure::storage::StorageBackend;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};

/// In-memory storage that records every batch call and can be told to fail them.
#[derive(Default)]
pub struct RecordingStorage {
    inner: InMemoryStorage,
    batch_calls: Mutex<Vec<Vec<CommentId>>>,
    batch_error: Mutex<Option<AppError>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_calls(&self) -> Vec<Vec<CommentId>> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub fn fail_batches_with(&self, err: AppError) {
        *self.batch_error.lock().unwrap() = Some(err);
    }
}

pub struct SeededThread {
    pub post_id: PostId,
    pub p1: CommentId,
    pub p2: CommentId,
    pub p3: CommentId,
    /// Expected children ids, newest first.
    pub p1_children: Vec<CommentId>,
    pub p2_children: Vec<CommentId>,
}

/// One post with three root comments; p1 has two replies, p2 one, p3 none.
pub async fn seed_thread(storage: &dyn StorageBackend) -> SeededThread {
    let post = storage
        .create_post(NewPost {
            title: "Seed".to_string(),
            body: "Body".to_string(),
            author: "seed".to_string(),
            allow_comments: true,
            created_at: "2024-01-01T00:00:00.000000Z".to_string(),
        })
        .await
        .unwrap();

    let add = |parent_id: Option<CommentId>, created_at: &'static str| {
        storage.create_comment(NewComment {
            post_id: post.id,
            parent_id,
            author: "author".to_string(),
            text: format!("at {}", created_at),
            created_at: created_at.to_string(),
        })
    };

    let p1 = add(None, "2024-01-01T01:00:00.000000Z").await.unwrap().id;
    let p2 = add(None, "2024-01-01T02:00:00.000000Z").await.unwrap().id;
    let p3 = add(None, "2024-01-01T03:00:00.000000Z").await.unwrap().id;
    let older = add(Some(p1), "2024-01-01T04:00:00.000000Z").await.unwrap().id;
    let newer = add(Some(p1), "2024-01-01T05:00:00.000000Z").await.unwrap().id;
    let only = add(Some(p2), "2024-01-01T04:30:00.000000Z").await.unwrap().id;

    SeededThread {
        post_id: post.id,
        p1,
        p2,
        p3,
        p1_children: vec![newer, older],
        p2_children: vec![only],
    }
}

#[async_trait]
impl StorageBackend for RecordingStorage {
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        self.inner.create_post(post).await
    }

    async fn get_post(&self, id: PostId) -> AppResult<Post> {
        self.inner.get_post(id).await
    }

    async fn set_post_comments_allowed(&self, id: PostId, allow: bool) -> AppResult<Post> {
        self.inner.set_post_comments_allowed(id, allow).await
    }

    async fn list_posts(
        &self,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Post>> {
        self.inner.list_posts(after, limit).await
    }

    async fn count_posts(&self) -> AppResult<i64> {
        self.inner.count_posts().await
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        self.inner.create_comment(comment).await
    }

    async fn post_allows_comments(&self, post_id: PostId) -> AppResult<bool> {
        self.inner.post_allows_comments(post_id).await
    }

    async fn parent_comment_post(&self, parent_id: CommentId) -> AppResult<PostId> {
        self.inner.parent_comment_post(parent_id).await
    }

    async fn get_comment_path(&self, id: CommentId) -> AppResult<String> {
        self.inner.get_comment_path(id).await
    }

    async fn set_comment_path(&self, id: CommentId, path: &str) -> AppResult<()> {
        self.inner.set_comment_path(id, path).await
    }

    async fn list_root_comments(
        &self,
        post_id: PostId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>> {
        self.inner.list_root_comments(post_id, after, limit).await
    }

    async fn list_child_comments(
        &self,
        parent_id: CommentId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>> {
        self.inner.list_child_comments(parent_id, after, limit).await
    }

    async fn child_comments_batch(&self, parent_ids: &[CommentId]) -> AppResult<Vec<Comment>> {
        self.batch_calls.lock().unwrap().push(parent_ids.to_vec());
        let failure = self.batch_error.lock().unwrap().clone();
        match failure {
            Some(err) => Err(err),
            None => self.inner.child_comments_batch(parent_ids).await,
        }
    }

    async fn count_comments(&self, post_id: PostId) -> AppResult<i64> {
        self.inner.count_comments(post_id).await
    }

    async fn count_child_comments(&self, parent_id: CommentId) -> AppResult<i64> {
        self.inner.count_child_comments(parent_id).await
    }
}
