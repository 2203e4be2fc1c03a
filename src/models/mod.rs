// Domain models - posts, threaded comments and the paginated connection shape

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub type PostId = i64;
pub type CommentId = i64;

/// Current time as a fixed-width RFC 3339 UTC string.
/// Fixed width keeps lexicographic order equal to chronological order.
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub body: String,
    pub author: String,
    pub allow_comments: bool,
    pub created_at: String,
}

/// Post row before the storage backend allocates its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub author: String,
    pub allow_comments: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub text: String,
    pub created_at: String,
    /// Materialized ancestry path, empty until the second write lands.
    pub path: String,
}

/// Comment row before the storage backend allocates its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreatePostInput {
    pub title: String,
    pub body: String,
    pub author: String,
    pub allow_comments: Option<bool>,
}

/// Identifiers arrive as raw strings and are validated by the service layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddCommentInput {
    pub post_id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub text: String,
}

/// Anything listed in `(created_at DESC, id DESC)` order.
pub trait SortKey {
    fn created_at(&self) -> &str;
    fn sort_id(&self) -> i64;
}

impl SortKey for Post {
    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn sort_id(&self) -> i64 {
        self.id
    }
}

impl SortKey for Comment {
    fn created_at(&self) -> &str {
        &self.created_at
    }

    fn sort_id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    pub total_count: i64,
}

impl<T> Connection<T> {
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|edge| &edge.node)
    }

    /// Convert node types while keeping cursors and page metadata intact.
    pub fn map<U, F>(self, mut f: F) -> Connection<U>
    where
        F: FnMut(T) -> U,
    {
        Connection {
            edges: self
                .edges
                .into_iter()
                .map(|edge| Edge {
                    cursor: edge.cursor,
                    node: f(edge.node),
                })
                .collect(),
            page_info: self.page_info,
            total_count: self.total_count,
        }
    }
}
