// Keyset Pagination - page requests, scope id validation and connection building
// Every list is ordered by (created_at DESC, id DESC) and resumes strictly
// after the decoded cursor position.

use crate::error::{AppError, AppResult};
use crate::infrastructure::cursor::{self, CursorPosition};
use crate::models::{Connection, Edge, PageInfo, SortKey};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Which identifier is being validated. Each one reports its own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeId {
    /// Post id addressed directly (get post, toggle comments).
    Post,
    /// Post id a comment operation is scoped to.
    CommentPost,
    /// Parent id when listing children.
    Parent,
    /// Parent id supplied with a new reply.
    ReplyParent,
}

impl ScopeId {
    fn empty_message(self) -> &'static str {
        match self {
            ScopeId::Post => "post ID cannot be empty",
            _ => self.format_message(),
        }
    }

    fn format_message(self) -> &'static str {
        match self {
            ScopeId::Post => "invalid post ID format",
            ScopeId::CommentPost => "invalid postID format",
            ScopeId::Parent => "invalid parentID",
            ScopeId::ReplyParent => "invalid parentID format",
        }
    }

    fn non_positive_message(self) -> &'static str {
        match self {
            ScopeId::Post => "post ID must be a positive integer",
            ScopeId::CommentPost => "postID must be greater 0",
            ScopeId::Parent | ScopeId::ReplyParent => self.format_message(),
        }
    }
}

/// Parse a decimal identifier that must be a positive integer.
pub fn parse_scope_id(raw: &str, scope: ScopeId) -> AppResult<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation(scope.empty_message().to_string()));
    }

    let id: i64 = raw
        .parse()
        .map_err(|_| AppError::Validation(scope.format_message().to_string()))?;

    if id <= 0 {
        return Err(AppError::Validation(scope.non_positive_message().to_string()));
    }
    Ok(id)
}

/// Largest page size. Leaves room for the extra look-ahead row inside a
/// non-negative SQL `LIMIT`.
pub const MAX_PAGE_SIZE: usize = (i64::MAX - 1) as usize;

/// A validated `first` / `after` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub after: Option<CursorPosition>,
}

impl PageRequest {
    /// `first` that is absent or not positive falls back to `default_limit`.
    /// Larger values are capped at `MAX_PAGE_SIZE`.
    /// An empty `after` means "from the top".
    pub fn parse(first: Option<i64>, after: Option<&str>, default_limit: usize) -> AppResult<Self> {
        let limit = match first {
            Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX).min(MAX_PAGE_SIZE),
            _ => default_limit.max(1),
        };

        let after = match after {
            Some(token) if !token.is_empty() => Some(
                cursor::decode(token)
                    .map_err(|_| AppError::Validation("invalid cursor format".to_string()))?,
            ),
            _ => None,
        };

        Ok(Self { limit, after })
    }

    /// Rows to request from storage: one extra to detect a next page.
    pub fn fetch_limit(&self) -> usize {
        self.limit.saturating_add(1)
    }
}

/// Turn up to `limit + 1` sorted rows into a connection.
pub fn build_connection<T: SortKey>(mut rows: Vec<T>, limit: usize, total_count: i64) -> Connection<T> {
    let has_next_page = rows.len() > limit;
    rows.truncate(limit);

    let edges: Vec<Edge<T>> = rows
        .into_iter()
        .map(|node| Edge {
            cursor: cursor::encode(node.created_at(), node.sort_id()),
            node,
        })
        .collect();

    let end_cursor = edges.last().map(|edge| edge.cursor.clone());

    Connection {
        edges,
        page_info: PageInfo {
            end_cursor,
            has_next_page,
        },
        total_count,
    }
}

/// Page through a list that is already loaded and sorted.
/// The total is the size of the loaded list.
pub fn window_loaded<T: SortKey + Clone>(items: &[T], page: &PageRequest) -> Connection<T> {
    let rows: Vec<T> = items
        .iter()
        .filter(|item| match &page.after {
            Some(pos) => pos.precedes(item.created_at(), item.sort_id()),
            None => true,
        })
        .take(page.fetch_limit())
        .cloned()
        .collect();

    build_connection(rows, page.limit, items.len() as i64)
}
