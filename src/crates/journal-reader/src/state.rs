//! Saving a reader position across restarts.
//!
//! The state file holds one cursor token as text. Writes go to a temporary
//! file in the same directory that is then renamed over the state file, so
//! a crash never leaves a truncated token behind.

use crate::cursor::Cursor;
use crate::error::InvalidCursor;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on cursor state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to replace cursor state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("cursor state file holds an invalid cursor: {0}")]
    InvalidCursor(#[from] InvalidCursor),
}

/// A file holding the last saved cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    path: PathBuf,
}

impl CursorState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved cursor. A missing or blank file means no position
    /// has been saved yet.
    pub fn load(&self) -> Result<Option<Cursor>, StateError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token = contents.trim();
        if token.is_empty() {
            return Ok(None);
        }

        Ok(Some(Cursor::new(token)?))
    }

    /// Atomically replaces the saved cursor.
    pub fn save(&self, cursor: &Cursor) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        writeln!(file, "{cursor}")?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;

        debug!(path = %self.path.display(), %cursor, "saved cursor");
        Ok(())
    }

    /// Forgets the saved cursor.
    pub fn clear(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
