use crate::error::InvalidCursor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An opaque token identifying one entry of a journal stream.
///
/// Tokens are produced by [`JournalReader::capture_cursor`] and consumed by
/// the seek and compare operations. They are only meaningful against the
/// stream that produced them; the reader verifies where a token lands
/// instead of trusting it.
///
/// [`JournalReader::capture_cursor`]: crate::JournalReader::capture_cursor
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor(Box<str>);

impl Cursor {
    /// Validates and wraps a token. Tokens must be non-empty and must not
    /// contain NUL bytes, since they cross a C string boundary.
    pub fn new(token: impl Into<String>) -> Result<Self, InvalidCursor> {
        let token = token.into();

        if token.is_empty() {
            return Err(InvalidCursor::Empty);
        }
        if token.contains('\0') {
            return Err(InvalidCursor::InteriorNul);
        }

        Ok(Cursor(token.into_boxed_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cursor").field(&&*self.0).finish()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cursor {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Cursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cursor::new(s)
    }
}

impl TryFrom<String> for Cursor {
    type Error = InvalidCursor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cursor::new(value)
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.0.into_string()
    }
}
