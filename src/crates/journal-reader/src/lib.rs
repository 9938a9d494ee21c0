//! Cursor-based reading of the systemd journal.
//!
//! This crate provides:
//! - [`JournalReader`]: an owned journal handle with forward/backward
//!   iteration, seeking to the head, the tail or a [`Cursor`], and cursor
//!   capture and comparison. The handle is released exactly once.
//! - [`JournalBackend`]: the primitive operations a reader needs from the
//!   log storage, implemented by [`SystemdBackend`] for the system journal
//!   and by [`MemoryBackend`] for in-process use.
//! - [`CursorState`]: persistence of a read position across restarts.
//!
//! # Examples
//!
//! ```no_run
//! use journal_reader::{CursorState, JournalReader, OpenFlags, SystemdBackend};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let state = CursorState::new("/var/lib/my-agent/cursor");
//! let mut reader = JournalReader::open(SystemdBackend::load()?, OpenFlags::LOCAL_ONLY)?;
//!
//! reader.resume_from(state.load()?.as_ref())?;
//! while reader.advance()? {
//!     let cursor = reader.capture_cursor()?;
//!     state.save(&cursor)?;
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate static_assertions;

pub mod backend;
pub mod config;
pub mod cursor;
pub mod error;
pub mod flags;
pub mod memory;
pub mod reader;
pub mod state;
pub mod systemd;

pub use backend::{Direction, JournalBackend, MAX_SKIP, RawCode, SeekTarget};
pub use config::{ConfigError, ReaderConfig};
pub use cursor::Cursor;
pub use error::{ErrorCode, InvalidCursor, JournalError, Result};
pub use flags::OpenFlags;
pub use memory::{MemoryBackend, Op};
pub use reader::{JournalReader, Position, ResumePoint};
pub use state::{CursorState, StateError};
pub use systemd::{LIBSYSTEMD, SystemdBackend};
