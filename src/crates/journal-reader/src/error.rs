use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

/// A raw failure code reported by a journal backend.
///
/// libsystemd reports failures as negated `errno` values. The code is kept
/// verbatim so that unrecognized failures can still be diagnosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(i32);

impl ErrorCode {
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// Builds the negated code libsystemd would report for `errno`.
    pub const fn from_errno(errno: Errno) -> Self {
        Self(-(errno as i32))
    }

    pub const fn raw(&self) -> i32 {
        self.0
    }

    pub fn errno(&self) -> Errno {
        Errno::from_raw(self.0.saturating_abs())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errno() {
            Errno::UnknownErrno => write!(f, "unknown error code {}", self.0),
            errno => write!(f, "{} ({})", errno, self.0),
        }
    }
}

/// Why a cursor token was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCursor {
    #[error("cursor is empty")]
    Empty,

    #[error("cursor contains a NUL byte")]
    InteriorNul,

    #[error("cursor rejected by journal: {0}")]
    Rejected(ErrorCode),

    #[error("cursor does not resolve to an entry of this journal")]
    NotFound,
}

/// Errors returned by [`JournalReader`](crate::JournalReader) operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The journal stream could not be opened
    #[error("failed to open journal: {code}")]
    Open { code: ErrorCode },

    /// An operation on an already open stream failed
    #[error("journal {op} failed: {code}")]
    Io { op: &'static str, code: ErrorCode },

    /// The cursor token is malformed or does not resolve
    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] InvalidCursor),

    /// No entry is current (before the first or after the last entry)
    #[error("no current journal entry")]
    NoCurrentEntry,

    /// The reader has already been closed
    #[error("journal reader is closed")]
    Closed,
}

const_assert!(std::mem::size_of::<JournalError>() <= 32);

impl JournalError {
    pub(crate) fn open(code: i32) -> Self {
        JournalError::Open {
            code: ErrorCode::new(code),
        }
    }

    pub(crate) fn io(op: &'static str, code: i32) -> Self {
        JournalError::Io {
            op,
            code: ErrorCode::new(code),
        }
    }

    /// The backend code behind this error, if there is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            JournalError::Open { code } | JournalError::Io { code, .. } => Some(*code),
            JournalError::InvalidCursor(InvalidCursor::Rejected(code)) => Some(*code),
            _ => None,
        }
    }
}

/// A specialized Result type for journal reader operations
pub type Result<T> = std::result::Result<T, JournalError>;
