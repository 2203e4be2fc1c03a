// PostService - post creation, lookup, the allow-comments toggle and the post feed

use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::PaginationConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::storage::StorageBackend;
use crate::models::{current_timestamp, Connection, CreatePostInput, NewPost, Post};
use crate::services::pagination::{build_connection, parse_scope_id, PageRequest, ScopeId};

#[derive(Clone)]
pub struct PostService {
    storage: Arc<dyn StorageBackend>,
    pagination: PaginationConfig,
}

impl PostService {
    pub fn new(storage: Arc<dyn StorageBackend>, pagination: PaginationConfig) -> Self {
        Self {
            storage,
            pagination,
        }
    }

    #[instrument(skip(self, input), fields(author = %input.author))]
    pub async fn create_post(&self, input: CreatePostInput) -> AppResult<Post> {
        if input.title.trim().is_empty() || input.author.trim().is_empty() {
            return Err(AppError::Validation(
                "title and author are required fields".to_string(),
            ));
        }

        let post = self
            .storage
            .create_post(NewPost {
                title: input.title,
                body: input.body,
                author: input.author,
                allow_comments: input.allow_comments.unwrap_or(true),
                created_at: current_timestamp(),
            })
            .await?;

        info!(post_id = post.id, "Created post");
        Ok(post)
    }

    pub async fn get_post(&self, id: &str) -> AppResult<Post> {
        let id = parse_scope_id(id, ScopeId::Post)?;
        self.storage.get_post(id).await
    }

    #[instrument(skip(self))]
    pub async fn set_post_comments_allowed(&self, id: &str, allow: bool) -> AppResult<Post> {
        let id = parse_scope_id(id, ScopeId::Post)?;
        let post = self.storage.set_post_comments_allowed(id, allow).await?;
        info!(post_id = post.id, allow, "Updated comment permission");
        Ok(post)
    }

    /// Newest posts first.
    pub async fn get_posts(
        &self,
        first: Option<i64>,
        after: Option<&str>,
    ) -> AppResult<Connection<Post>> {
        let page = PageRequest::parse(first, after, self.pagination.default_page_size)?;
        let rows = self
            .storage
            .list_posts(page.after.as_ref(), page.fetch_limit())
            .await?;
        let total = self.storage.count_posts().await?;
        Ok(build_connection(rows, page.limit, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_storage::InMemoryStorage;

    fn service() -> PostService {
        PostService::new(Arc::new(InMemoryStorage::new()), PaginationConfig::default())
    }

    fn input(title: &str) -> CreatePostInput {
        CreatePostInput {
            title: title.to_string(),
            body: "body".to_string(),
            author: "alice".to_string(),
            allow_comments: None,
        }
    }

    #[tokio::test]
    async fn test_create_post_defaults_allow_comments() {
        let service = service();
        let post = service.create_post(input("Hello")).await.unwrap();

        assert!(post.allow_comments);
        assert!(post.created_at.ends_with('Z'));
        assert_eq!(service.get_post(&post.id.to_string()).await.unwrap(), post);
    }

    #[tokio::test]
    async fn test_create_post_requires_title_and_author() {
        let service = service();
        let blank_title = service.create_post(input("   ")).await;
        assert!(matches!(blank_title, Err(AppError::Validation(_))));

        let mut no_author = input("Hello");
        no_author.author = String::new();
        assert!(matches!(
            service.create_post(no_author).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_post_validation_and_not_found() {
        let service = service();
        assert_eq!(
            service.get_post("").await,
            Err(AppError::Validation("post ID cannot be empty".to_string()))
        );
        assert_eq!(
            service.get_post("0").await,
            Err(AppError::Validation("post ID must be a positive integer".to_string()))
        );
        assert_eq!(
            service.get_post("17").await,
            Err(AppError::NotFound("post not found".to_string()))
        );
    }

    #[tokio::test]
    async fn test_toggle_comments() {
        let service = service();
        let post = service.create_post(input("Hello")).await.unwrap();

        let updated = service
            .set_post_comments_allowed(&post.id.to_string(), false)
            .await
            .unwrap();
        assert!(!updated.allow_comments);
        assert_eq!(
            service.set_post_comments_allowed("99", true).await,
            Err(AppError::NotFound("post not found".to_string()))
        );
    }

    #[tokio::test]
    async fn test_get_posts_pages_through_feed() {
        let service = service();
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(service.create_post(input(&format!("post {}", i))).await.unwrap().id);
        }
        created.reverse();

        let first = service.get_posts(Some(2), None).await.unwrap();
        assert_eq!(first.nodes().map(|p| p.id).collect::<Vec<_>>(), &created[..2]);
        assert!(first.page_info.has_next_page);
        assert_eq!(first.total_count, 5);

        let rest = service
            .get_posts(Some(10), first.page_info.end_cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(rest.nodes().map(|p| p.id).collect::<Vec<_>>(), &created[2..]);
        assert!(!rest.page_info.has_next_page);
    }
}
