//! The boundary between [`JournalReader`](crate::JournalReader) and the
//! log storage it reads from.
//!
//! Backends speak in raw libsystemd conventions: failures are negated
//! `errno` values and nothing is interpreted. Translating those codes into
//! [`JournalError`](crate::JournalError) is the reader's job.

use crate::flags::OpenFlags;

/// A negated `errno` value reported by a backend.
pub type RawCode = i32;

/// Largest skip a single `next`/`previous` call accepts. libsystemd
/// rejects larger values with `-ERANGE`.
pub const MAX_SKIP: u64 = i32::MAX as u64;

/// Where an absolute seek repositions the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget<'a> {
    /// Before the first available entry.
    Head,
    /// After the last available entry.
    Tail,
    /// Next to the entry identified by a cursor token. The stream lands on
    /// that entry with the following step in either direction.
    Cursor(&'a str),
}

/// Direction of travel through the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Primitive operations a log storage must provide.
///
/// A handle returned by `open_stream` is owned by exactly one reader and is
/// given back to `close_stream` exactly once. `close_stream` cannot fail;
/// implementations log problems during release instead.
pub trait JournalBackend {
    type Handle;

    fn open_stream(&self, flags: OpenFlags) -> Result<Self::Handle, RawCode>;

    /// Moves forward by up to `skip` entries, with `skip <= MAX_SKIP`.
    /// Returns how many entries the position actually moved; `0` means no
    /// entry follows.
    fn next(&self, handle: &mut Self::Handle, skip: u64) -> Result<u64, RawCode>;

    /// Moves backward by up to `skip` entries, with `skip <= MAX_SKIP`.
    /// Returns how many entries the position actually moved; `0` means no
    /// entry precedes.
    fn previous(&self, handle: &mut Self::Handle, skip: u64) -> Result<u64, RawCode>;

    fn seek(&self, handle: &mut Self::Handle, target: SeekTarget<'_>) -> Result<(), RawCode>;

    /// Returns the cursor token of the current entry.
    fn get_cursor(&self, handle: &mut Self::Handle) -> Result<String, RawCode>;

    /// Checks whether the current entry is the one identified by `cursor`.
    fn test_cursor(&self, handle: &mut Self::Handle, cursor: &str) -> Result<bool, RawCode>;

    fn close_stream(&self, handle: Self::Handle);
}
