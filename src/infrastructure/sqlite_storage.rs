use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};

use crate::error::{AppError, AppResult};
use crate::infrastructure::cursor::CursorPosition;
use crate::infrastructure::storage::StorageBackend;
use crate::models::{Comment, CommentId, NewComment, NewPost, Post, PostId};

const POST_COLUMNS: &str = "id, title, body, author, allow_comments, created_at";
const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author, body, path, created_at";

/// SQLite implementation of the storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A private in-memory database. One connection, since every
    /// `sqlite::memory:` connection would otherwise open its own database.
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::Storage(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                author TEXT NOT NULL,
                allow_comments INTEGER NOT NULL DEFAULT 1,
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
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id),
                parent_id INTEGER REFERENCES comments(id),
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

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create posts index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post_parent ON comments(post_id, parent_id, created_at DESC, id DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create comments post index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id, created_at DESC, id DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create comments parent index: {}", e)))?;

        Ok(())
    }

    async fn fetch_comments(&self, mut qb: QueryBuilder<'_, Sqlite>) -> AppResult<Vec<Comment>> {
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list comments: {}", e)))?;
        Ok(rows.iter().map(comment_from_row).collect())
    }
}

fn post_from_row(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        author: row.get("author"),
        allow_comments: row.get("allow_comments"),
        created_at: row.get("created_at"),
    }
}

fn comment_from_row(row: &SqliteRow) -> Comment {
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

/// Appends the keyset predicate, ordering and limit shared by all list queries.
fn push_keyset_window(
    qb: &mut QueryBuilder<'_, Sqlite>,
    after: Option<&CursorPosition>,
    limit: usize,
) {
    if let Some(pos) = after {
        qb.push(" AND (created_at < ");
        qb.push_bind(pos.created_at.clone());
        qb.push(" OR (created_at = ");
        qb.push_bind(pos.created_at.clone());
        qb.push(" AND id < ");
        qb.push_bind(pos.id);
        qb.push("))");
    }
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let result = sqlx::query(
            "INSERT INTO posts (title, body, author, allow_comments, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.author)
        .bind(post.allow_comments)
        .bind(&post.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create post: {}", e)))?;

        Ok(Post {
            id: result.last_insert_rowid(),
            title: post.title,
            body: post.body,
            author: post.author,
            allow_comments: post.allow_comments,
            created_at: post.created_at,
        })
    }

    async fn get_post(&self, id: PostId) -> AppResult<Post> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to get post {}: {}", id, e)))?;

        row.as_ref()
            .map(post_from_row)
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn set_post_comments_allowed(&self, id: PostId, allow: bool) -> AppResult<Post> {
        let result = sqlx::query("UPDATE posts SET allow_comments = ? WHERE id = ?")
            .bind(allow)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to update post {}: {}", id, e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("post not found".to_string()));
        }
        self.get_post(id).await
    }

    async fn list_posts(
        &self,
        after: Option<&CursorPosition>,
        limit: usize,
    ) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM posts WHERE 1 = 1",
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
        let result = sqlx::query(
            "INSERT INTO comments (post_id, parent_id, author, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(comment.post_id)
        .bind(comment.parent_id)
        .bind(&comment.author)
        .bind(&comment.text)
        .bind(&comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create comment: {}", e)))?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            author: comment.author,
            text: comment.text,
            created_at: comment.created_at,
            path: String::new(),
        })
    }

    async fn post_allows_comments(&self, post_id: PostId) -> AppResult<bool> {
        let allow: Option<bool> = sqlx::query_scalar("SELECT allow_comments FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to check post {}: {}", post_id, e)))?;
        allow.ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn parent_comment_post(&self, parent_id: CommentId) -> AppResult<PostId> {
        let post_id: Option<i64> = sqlx::query_scalar("SELECT post_id FROM comments WHERE id = ?")
            .bind(parent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Failed to check parent comment {}: {}", parent_id, e))
            })?;
        post_id.ok_or_else(|| AppError::NotFound("parent comment not found".to_string()))
    }

    async fn get_comment_path(&self, id: CommentId) -> AppResult<String> {
        let path: Option<String> = sqlx::query_scalar("SELECT path FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to get path of comment {}: {}", id, e)))?;
        path.ok_or_else(|| AppError::NotFound("comment not found".to_string()))
    }

    async fn set_comment_path(&self, id: CommentId, path: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE comments SET path = ? WHERE id = ?")
            .bind(path)
            .bind(id)
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
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
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
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
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

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM comments WHERE parent_id IN (",
            COMMENT_COLUMNS
        ));
        let mut separated = qb.separated(",");
        for id in parent_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY parent_id, created_at DESC, id DESC");
        self.fetch_comments(qb).await
    }

    async fn count_comments(&self, post_id: PostId) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to count comments: {}", e)))
    }

    async fn count_child_comments(&self, parent_id: CommentId) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE parent_id = ?")
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to count child comments: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_post(storage: &SqliteStorage) -> Post {
        storage
            .create_post(NewPost {
                title: "Hello".to_string(),
                body: "World".to_string(),
                author: "alice".to_string(),
                allow_comments: true,
                created_at: "2024-05-01T10:00:00.000000Z".to_string(),
            })
            .await
            .unwrap()
    }

    fn new_comment(post_id: PostId, parent_id: Option<CommentId>, created_at: &str) -> NewComment {
        NewComment {
            post_id,
            parent_id,
            author: "bob".to_string(),
            text: "hi".to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        storage.health_check().await.unwrap();

        let post = seed_post(&storage).await;
        assert_eq!(post.id, 1);
        assert_eq!(storage.get_post(post.id).await.unwrap(), post);

        let closed = storage.set_post_comments_allowed(post.id, false).await.unwrap();
        assert!(!closed.allow_comments);
        assert!(!storage.post_allows_comments(post.id).await.unwrap());
        assert_eq!(storage.count_posts().await.unwrap(), 1);

        assert!(matches!(storage.get_post(42).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            storage.set_post_comments_allowed(42, true).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_keyset_and_batch() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let post = seed_post(&storage).await;

        let root = storage
            .create_comment(new_comment(post.id, None, "2024-05-01T11:00:00.000000Z"))
            .await
            .unwrap();
        for ts in [
            "2024-05-01T12:00:00.000000Z",
            "2024-05-01T12:00:00.000000Z",
            "2024-05-01T11:30:00.000000Z",
        ] {
            storage
                .create_comment(new_comment(post.id, Some(root.id), ts))
                .await
                .unwrap();
        }

        let first = storage.list_child_comments(root.id, None, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let last = first.last().unwrap();
        let after = CursorPosition::new(last.created_at.clone(), last.id);
        let rest = storage
            .list_child_comments(root.id, Some(&after), 2)
            .await
            .unwrap();
        let ids: Vec<_> = rest.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4]);

        let roots = storage.list_root_comments(post.id, None, 10).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].parent_id, None);

        let batch = storage.child_comments_batch(&[root.id, 99]).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 4]);
        assert!(storage.child_comments_batch(&[]).await.unwrap().is_empty());

        assert_eq!(storage.count_comments(post.id).await.unwrap(), 4);
        assert_eq!(storage.count_child_comments(root.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_path_and_parent_lookup() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let post = seed_post(&storage).await;
        let root = storage
            .create_comment(new_comment(post.id, None, "2024-05-01T11:00:00.000000Z"))
            .await
            .unwrap();

        assert_eq!(storage.get_comment_path(root.id).await.unwrap(), "");
        storage.set_comment_path(root.id, "0000000001").await.unwrap();
        assert_eq!(storage.get_comment_path(root.id).await.unwrap(), "0000000001");
        assert_eq!(storage.parent_comment_post(root.id).await.unwrap(), post.id);

        assert_eq!(
            storage.parent_comment_post(7).await,
            Err(AppError::NotFound("parent comment not found".to_string()))
        );
        assert!(matches!(
            storage.set_comment_path(7, "x").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("threads.db").display());

        {
            let pool = SqlitePool::connect(&url).await.unwrap();
            let storage = SqliteStorage::new(pool);
            storage.initialize().await.unwrap();
            seed_post(&storage).await;
        }

        let pool = SqlitePool::connect(&url).await.unwrap();
        let storage = SqliteStorage::new(pool);
        storage.initialize().await.unwrap();
        assert_eq!(storage.count_posts().await.unwrap(), 1);
        assert_eq!(seed_post(&storage).await.id, 2);
    }
}
