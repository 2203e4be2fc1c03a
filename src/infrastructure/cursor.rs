// Cursor Codec - opaque pagination tokens over the (created_at, id) sort key
// Token format: base64url(no padding) of "<created_at>|<decimal id>"

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fmt;

const CURSOR_SEPARATOR: char = '|';

/// A decoded resumption point: the sort key of the last item already seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorPosition {
    pub created_at: String,
    pub id: i64,
}

impl CursorPosition {
    pub fn new(created_at: impl Into<String>, id: i64) -> Self {
        Self {
            created_at: created_at.into(),
            id,
        }
    }

    /// True when `(created_at, id)` sorts strictly after this position in
    /// `(created_at DESC, id DESC)` order.
    pub fn precedes(&self, created_at: &str, id: i64) -> bool {
        (created_at, id) < (self.created_at.as_str(), self.id)
    }

    pub fn encode(&self) -> String {
        encode(&self.created_at, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidCursor {
    Encoding,
    MissingSeparator,
    InvalidId,
}

impl fmt::Display for InvalidCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidCursor::Encoding => write!(f, "invalid cursor encoding"),
            InvalidCursor::MissingSeparator => write!(f, "invalid cursor format"),
            InvalidCursor::InvalidId => write!(f, "invalid cursor id"),
        }
    }
}

impl std::error::Error for InvalidCursor {}

pub fn encode(created_at: &str, id: i64) -> String {
    let raw = format!("{}{}{}", created_at, CURSOR_SEPARATOR, id);
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

pub fn decode(token: &str) -> Result<CursorPosition, InvalidCursor> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| InvalidCursor::Encoding)?;
    let raw = String::from_utf8(bytes).map_err(|_| InvalidCursor::Encoding)?;

    // Splits on the last separator rather than the first. The id segment
    // never contains it, so any created_at survives a round trip. Server
    // timestamps have no separator and decode the same either way.
    let (created_at, id) = raw
        .rsplit_once(CURSOR_SEPARATOR)
        .ok_or(InvalidCursor::MissingSeparator)?;
    let id = id.parse::<i64>().map_err(|_| InvalidCursor::InvalidId)?;

    Ok(CursorPosition::new(created_at, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_token() {
        let token = encode("2024-01-01T00:00:00Z", 42);
        assert_eq!(token, "MjAyNC0wMS0wMVQwMDowMDowMFp8NDI");
        assert!(!token.contains('='));

        let pos = decode(&token).unwrap();
        assert_eq!(pos, CursorPosition::new("2024-01-01T00:00:00Z", 42));
    }

    #[test]
    fn test_non_base64_input() {
        assert_eq!(decode("not base64!!"), Err(InvalidCursor::Encoding));
    }

    #[test]
    fn test_missing_separator() {
        let token = URL_SAFE_NO_PAD.encode("2024-01-01T00:00:00Z");
        assert_eq!(decode(&token), Err(InvalidCursor::MissingSeparator));
    }

    #[test]
    fn test_non_numeric_id() {
        let token = URL_SAFE_NO_PAD.encode("2024-01-01T00:00:00Z|abc");
        assert_eq!(decode(&token), Err(InvalidCursor::InvalidId));

        let empty_id = URL_SAFE_NO_PAD.encode("2024-01-01T00:00:00Z|");
        assert_eq!(decode(&empty_id), Err(InvalidCursor::InvalidId));
    }

    #[test]
    fn test_created_at_containing_separator() {
        let token = encode("a|b", 9);
        assert_eq!(decode(&token).unwrap(), CursorPosition::new("a|b", 9));
    }

    #[test]
    fn test_precedes_uses_id_tie_break() {
        let pos = CursorPosition::new("2024-01-01T00:00:00Z", 5);
        assert!(pos.precedes("2024-01-01T00:00:00Z", 4));
        assert!(!pos.precedes("2024-01-01T00:00:00Z", 5));
        assert!(!pos.precedes("2024-01-01T00:00:00Z", 6));
        assert!(pos.precedes("2023-12-31T23:59:59Z", 100));
        assert!(!pos.precedes("2024-01-02T00:00:00Z", 1));
    }

    proptest! {
        #[test]
        fn prop_round_trip(created_at in any::<String>(), id in 0i64..=i64::MAX) {
            let token = encode(&created_at, id);
            let pos = decode(&token).unwrap();
            prop_assert_eq!(pos.created_at, created_at);
            prop_assert_eq!(pos.id, id);
        }

        #[test]
        fn prop_distinct_pairs_distinct_tokens(
            a in "[0-9T:Z-]{0,24}",
            b in "[0-9T:Z-]{0,24}",
            x in 0i64..10_000,
            y in 0i64..10_000,
        ) {
            prop_assume!((a.as_str(), x) != (b.as_str(), y));
            prop_assert_ne!(encode(&a, x), encode(&b, y));
        }
    }
}
