// Comment Threads API - REST endpoints for posts and threaded comments
// Ids travel as decimal strings. Listings return the Connection shape.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::{
    app_state::AppState,
    error::AppResult,
    models::{AddCommentInput, Comment, Connection, CreatePostInput, Post},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub allow_comments: bool,
    pub created_at: String,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            id: post.id.to_string(),
            title: post.title,
            body: post.body,
            author: post.author,
            allow_comments: post.allow_comments,
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub text: String,
    pub path: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Connection<CommentView>>,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id.to_string(),
            post_id: comment.post_id.to_string(),
            parent_id: comment.parent_id.map(|id| id.to_string()),
            author: comment.author,
            text: comment.text,
            path: comment.path,
            created_at: comment.created_at,
            children: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub first: Option<i64>,
    pub after: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentsQuery {
    pub first: Option<i64>,
    pub after: Option<String>,
    /// Page size of the `children` connection attached to every node.
    pub children_first: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CommentsAllowedRequest {
    pub allow: bool,
}

/// Missing `author` or `text` decode as empty and are rejected by the
/// service with its own validation message.
#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> AppResult<impl IntoResponse> {
    let post = state.posts.create_post(input).await?;
    Ok((StatusCode::CREATED, Json(PostView::from(post))))
}

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Connection<PostView>>> {
    let posts = state
        .posts
        .get_posts(query.first, query.after.as_deref())
        .await?;
    Ok(Json(posts.map(PostView::from)))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    let post = state.posts.get_post(&id).await?;
    Ok(Json(post.into()))
}

async fn set_comments_allowed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CommentsAllowedRequest>,
) -> AppResult<Json<PostView>> {
    let post = state
        .posts
        .set_post_comments_allowed(&id, request.allow)
        .await?;
    Ok(Json(post.into()))
}

async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(request): Json<AddCommentRequest>,
) -> AppResult<impl IntoResponse> {
    let comment = state
        .comments
        .add_comment(AddCommentInput {
            post_id,
            parent_id: request.parent_id,
            author: request.author,
            text: request.text,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CommentView::from(comment))))
}

/// Root comments of a post. With `children_first`, every node also carries
/// its first replies, all resolved through one loader for this request.
async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Query(query): Query<CommentsQuery>,
) -> AppResult<Json<Connection<CommentView>>> {
    let roots = state
        .comments
        .get_root_comments(&post_id, query.first, query.after.as_deref())
        .await?;

    let Some(children_first) = query.children_first else {
        return Ok(Json(roots.map(CommentView::from)));
    };

    // Dropped with this handler, which cancels any batch still waiting.
    let scope = state.request_scope();
    let loader = scope.loader();
    debug!(request_id = scope.request_id(), nodes = roots.edges.len(), "Resolving children");

    let children = try_join_all(
        roots
            .nodes()
            .map(|comment| state.comments.children(&loader, comment.id, Some(children_first), None)),
    )
    .await?;

    let mut children = children.into_iter();
    Ok(Json(roots.map(|comment| CommentView {
        children: children.next().map(|conn| conn.map(CommentView::from)),
        ..CommentView::from(comment)
    })))
}

async fn list_children(
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Connection<CommentView>>> {
    let children = state
        .comments
        .get_child_comments(&parent_id, query.first, query.after.as_deref())
        .await?;
    Ok(Json(children.map(CommentView::from)))
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post))
        .route("/posts/{id}/comments-allowed", put(set_comments_allowed))
        .route("/posts/{id}/comments", get(list_comments).post(add_comment))
        .route("/comments/{id}/children", get(list_children));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
