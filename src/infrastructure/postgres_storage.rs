// PostgreSQL Storage Backend - production persistence behind the same contract
// created_at is stored as fixed-width RFC 3339 text so keyset comparisons
// behave exactly like the in-memory reference backend.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::error::{AppError, AppResult};
use crate::infrastructure::cursor::CursorPosition;
use crate::infrastructure::storage::StorageBackend;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};

const POST_COLUMNS: &str = "id, title, body, author, allow_comments, created_at";
const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author, body, path, created_at";

/// PostgreSQL implementation of the storage backend
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                author TEXT NOT NULL,
                allow_comments BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create posts table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id BIGSERIAL PRIMARY KEY,
                post_id BIGINT NOT NULL REFERENCES posts(id),
                parent_id BIGINT REFERENCES comments(id),
                author TEXT NOT NULL,
                body TEXT NOT NULL,
                path TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create comments table: {}", e)))?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_comments_post_parent ON comments(post_id, parent_id, created_at DESC, id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id, created_at DESC, id DESC)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create index: {}", e)))?;
        }

        Ok(())
    }

    async fn fetch_comments(&self, mut qb: QueryBuilder<'_, Postgres>) -> AppResult<Vec<Comment>> {
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list comments: {}", e)))?;
        Ok(rows.iter().map(comment_from_row).collect())
    }
}

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        author: row.get("author"),
        allow_comments: row.get("allow_comments"),
        created_at: row.get("created_at"),
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        parent_id: row.get("parent_id"),
        author: row.get("author"),
        text: row.get("body"),
        path: row.get("path"),
        created_at: row.get("created_at"),
    }
}

fn push_keyset_window(
    qb: &mut QueryBuilder<'_, Postgres>,
    after: Option<&CursorPosition>,
    limit: usize,
) {
    if let Some(pos) = after {
        qb.push(" AND (created_at, id) < (");
        qb.push_bind(pos.created_at.clone());
        qb.push(", ");
        qb.push_bind(pos.id);
        qb.push(")");
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
}

#[async_trait]
impl StorageBackend for PostgresStorage {
    /// Health check to verify database connectivity
    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let row = sqlx::query(&format!(
            "INSERT INTO posts (title, body, author, allow_comments, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            POST_COLUMNS
        ))
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.author)
        .bind(post.allow_comments)
        .bind(&post.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create post: {}", e)))?;
        Ok(post_from_row(&row))
    }

    async fn get_post(&self, id: PostId) -> AppResult<Post> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to get post {}: {}", id, e)))?;

        row.as_ref()
            .map(post_from_row)
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn set_post_comments_allowed(&self, id: PostId, allow: bool) -> AppResult<Post> {
        let row = sqlx::query(&format!(
            "UPDATE posts SET allow_comments = $2 WHERE id = $1 RETURNING {}",
            POST_COLUMNS
        ))
        .bind(id)
        .bind(allow)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to update post {}: {}", id, e)))?;

        row.as_ref()
            .map(post_from_row)
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn list_posts(
        &self,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM posts WHERE TRUE",
            POST_COLUMNS
        ));
        push_keyset_window(&mut qb, after, limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list posts: {}", e)))?;
        Ok(rows.iter().map(post_from_row).collect())
    }

    async fn count_posts(&self) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to count posts: {}", e)))
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments (post_id, parent_id, author, body, created_at) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(&comment.author)
        .bind(&comment.text)
        .bind(&comment.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create comment: {}", e)))?;
        Ok(comment_from_row(&row))
    }

    async fn post_allows_comments(&self, post_id: PostId) -> AppResult<bool> {
        let allow: Option<bool> =
            sqlx::query_scalar("SELECT allow_comments FROM posts WHERE id = $1")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Storage(format!("Failed to check post {}: {}", post_id, e))
                })?;
        allow.ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn parent_comment_post(&self, parent_id: CommentId) -> AppResult<PostId> {
        let post_id: Option<i64> = sqlx::query_scalar("SELECT post_id FROM comments WHERE id = $1")
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Failed to check parent comment {}: {}", parent_id, e))
            })?;
        post_id.ok_or_else(|| AppError::NotFound("parent comment not found".to_string()))
    }

    async fn get_comment_path(&self, id: CommentId) -> AppResult<String> {
        let path: Option<String> = sqlx::query_scalar("SELECT path FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to get path of comment {}: {}", id, e)))?;
        path.ok_or_else(|| AppError::NotFound("comment not found".to_string()))
    }

    async fn set_comment_path(&self, id: CommentId, path: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE comments SET path = $2 WHERE id = $1")
            .bind(id)
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to set path of comment {}: {}", id, e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("comment not found".to_string()));
        }
        Ok(())
    }

    async fn list_root_comments(
        &self,
        post_id: PostId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM comments WHERE parent_id IS NULL AND post_id = ",
            COMMENT_COLUMNS
        ));
        qb.push_bind(post_id);
        push_keyset_window(&mut qb, after, limit);
        self.fetch_comments(qb).await
    }

    async fn list_child_comments(
        &self,
        parent_id: CommentId,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Comment>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM comments WHERE parent_id = ",
            COMMENT_COLUMNS
        ));
        qb.push_bind(parent_id);
        push_keyset_window(&mut qb, after, limit);
        self.fetch_comments(qb).await
    }

    async fn child_comments_batch(&self, parent_ids: &[CommentId]) -> AppResult<Vec<Comment>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM comments WHERE parent_id = ANY(",
            COMMENT_COLUMNS
        ));
        qb.push_bind(parent_ids.to_vec());
        qb.push(") ORDER BY parent_id, created_at DESC, id DESC");
        self.fetch_comments(qb).await
    }

    async fn count_comments(&self, post_id: PostId) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to count comments: {}", e)))
    }

    async fn count_child_comments(&self, parent_id: CommentId) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE parent_id = $1")
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to count child comments: {}", e)))
    }
}
