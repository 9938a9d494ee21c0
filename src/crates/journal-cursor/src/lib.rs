//! Walking a journal and printing entry cursors.

use anyhow::{Context, Result};
use journal_reader::{Cursor, JournalBackend, JournalError, JournalReader};
use std::io::Write;
use tracing::info;

/// Where a walk begins and which way it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Start {
    /// Continue forward after the saved cursor, or from the head.
    Resume,
    /// Walk backward from the end of the journal.
    Tail,
    /// Walk backward from the entry before this cursor, one page of older
    /// entries at a time.
    Before(Cursor),
}

#[derive(Debug, Clone)]
pub struct Walk {
    pub start: Start,
    pub count: u64,
}

/// Prints the cursors of up to `count` entries, one per line, and returns
/// the last one printed.
pub fn walk<B: JournalBackend>(
    reader: &mut JournalReader<B>,
    saved: Option<&Cursor>,
    walk: &Walk,
    out: &mut impl Write,
) -> Result<Option<Cursor>> {
    match &walk.start {
        Start::Tail => reader
            .seek_to_tail()
            .context("Failed to seek to the end of the journal")?,
        Start::Before(cursor) => reader
            .seek_to_cursor(cursor)
            .with_context(|| format!("Failed to seek to cursor {cursor}"))?,
        Start::Resume => {
            let point = reader
                .resume_from(saved)
                .context("Failed to restore the saved position")?;
            info!(?point, "resuming");
        }
    }

    let mut last = None;
    for _ in 0..walk.count {
        let moved = match walk.start {
            Start::Resume => reader.advance(),
            Start::Tail | Start::Before(_) => reader.retreat_by(1),
        }
        .context("Failed to step through the journal")?;

        if !moved {
            break;
        }

        let cursor = reader
            .capture_cursor()
            .context("Failed to read the cursor of the current entry")?;
        writeln!(out, "{cursor}")?;
        last = Some(cursor);
    }

    Ok(last)
}

/// Reports whether `cursor` still names an entry of the journal.
pub fn check<B: JournalBackend>(reader: &mut JournalReader<B>, cursor: &Cursor) -> Result<bool> {
    match reader.seek_to_cursor(cursor) {
        Ok(()) => Ok(true),
        Err(JournalError::InvalidCursor(reason)) => {
            info!(%cursor, %reason, "cursor does not resolve");
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to seek to cursor {cursor}")),
    }
}
