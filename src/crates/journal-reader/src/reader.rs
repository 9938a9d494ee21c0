use crate::backend::{Direction, JournalBackend, MAX_SKIP, RawCode, SeekTarget};
use crate::config::ReaderConfig;
use crate::cursor::Cursor;
use crate::error::{InvalidCursor, JournalError, Result};
use crate::flags::OpenFlags;
use tracing::{debug, instrument, trace, warn};

/// Where a reader stands relative to the entries of its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Before the first entry; nothing is current.
    BeforeFirst,
    /// An entry is current.
    AtEntry,
    /// After the last entry; nothing is current.
    AfterLast,
}

/// How [`JournalReader::resume_from`] positioned the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePoint {
    /// No saved cursor; reading starts from the head.
    Head,
    /// The saved cursor resolved and is now the current entry.
    Cursor,
    /// The saved cursor no longer resolves (vacuumed, or from another
    /// journal); reading restarts from the head.
    HeadAfterInvalidCursor(InvalidCursor),
}

/// An open journal stream with an iteration position.
///
/// The reader exclusively owns the backend handle and releases it exactly
/// once, either through [`close`](JournalReader::close) or when dropped.
/// All operations take `&mut self`; a reader is never shared between
/// threads without external synchronization.
pub struct JournalReader<B: JournalBackend> {
    backend: B,
    handle: Option<B::Handle>,
    position: Position,
}

impl<B: JournalBackend> std::fmt::Debug for JournalReader<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReader")
            .field("open", &self.handle.is_some())
            .field("position", &self.position)
            .finish()
    }
}

fn step_error(direction: Direction) -> impl FnOnce(RawCode) -> JournalError {
    move |code| match direction {
        Direction::Forward => JournalError::io("next", code),
        Direction::Backward => JournalError::io("previous", code),
    }
}

fn cursor_error(op: &'static str) -> impl FnOnce(RawCode) -> JournalError {
    move |code| {
        if code == -libc::EINVAL {
            InvalidCursor::Rejected(crate::ErrorCode::new(code)).into()
        } else {
            JournalError::io(op, code)
        }
    }
}

impl<B: JournalBackend> JournalReader<B> {
    /// Opens a stream through `backend`. The new reader is positioned
    /// before the first entry.
    ///
    /// On failure nothing is held and nothing needs to be closed.
    #[instrument(level = "debug", skip(backend))]
    pub fn open(backend: B, flags: OpenFlags) -> Result<Self> {
        let handle = backend.open_stream(flags).map_err(JournalError::open)?;
        debug!("journal opened");

        Ok(JournalReader {
            backend,
            handle: Some(handle),
            position: Position::BeforeFirst,
        })
    }

    /// Opens a stream with the flags of `config`.
    pub fn open_with_config(backend: B, config: &ReaderConfig) -> Result<Self> {
        Self::open(backend, config.flags)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn parts(&mut self) -> Result<(&B, &mut B::Handle)> {
        match self.handle.as_mut() {
            Some(handle) => Ok((&self.backend, handle)),
            None => Err(JournalError::Closed),
        }
    }

    fn step(&mut self, direction: Direction, count: u64) -> Result<bool> {
        let at_entry = self.position == Position::AtEntry;
        self.parts()?;
        if count == 0 {
            return Ok(at_entry);
        }

        // Backends take at most MAX_SKIP entries per call.
        let mut moved = 0;
        while moved < count {
            let chunk = (count - moved).min(MAX_SKIP);
            let (backend, handle) = self.parts()?;
            let stepped = match direction {
                Direction::Forward => backend.next(handle, chunk),
                Direction::Backward => backend.previous(handle, chunk),
            }
            .map_err(step_error(direction))?;

            if stepped > 0 {
                self.position = Position::AtEntry;
            }

            moved += stepped;
            if stepped < chunk {
                break;
            }
        }

        trace!(?direction, count, moved, "step");
        Ok(moved >= count)
    }

    /// Moves one entry forward. Returns `false` when no entry follows; the
    /// position is then unchanged and later calls may succeed once new
    /// entries are written.
    pub fn advance(&mut self) -> Result<bool> {
        self.step(Direction::Forward, 1)
    }

    /// Moves `count` entries forward.
    ///
    /// Returns `true` only if all `count` entries were available. When
    /// fewer were, the reader stops on the last available entry and returns
    /// `false`. A `count` of zero moves nothing and reports whether an entry
    /// is current.
    pub fn advance_by(&mut self, count: u64) -> Result<bool> {
        self.step(Direction::Forward, count)
    }

    /// Moves `count` entries backward.
    ///
    /// Returns `true` only if all `count` entries were available. When
    /// fewer were, the reader stops on the earliest available entry and
    /// returns `false`. A `count` of zero moves nothing and reports whether
    /// an entry is current.
    pub fn retreat_by(&mut self, count: u64) -> Result<bool> {
        self.step(Direction::Backward, count)
    }

    /// Repositions before the first available entry.
    pub fn seek_to_head(&mut self) -> Result<()> {
        let (backend, handle) = self.parts()?;
        backend
            .seek(handle, SeekTarget::Head)
            .map_err(|code| JournalError::io("seek_head", code))?;

        debug!("seeked to head");
        self.position = Position::BeforeFirst;
        Ok(())
    }

    /// Repositions after the last available entry. `advance` then returns
    /// `false` until new entries appear, and `retreat_by(1)` lands on the
    /// last entry.
    pub fn seek_to_tail(&mut self) -> Result<()> {
        let (backend, handle) = self.parts()?;
        backend
            .seek(handle, SeekTarget::Tail)
            .map_err(|code| JournalError::io("seek_tail", code))?;

        debug!("seeked to tail");
        self.position = Position::AfterLast;
        Ok(())
    }

    /// Makes the entry identified by `cursor` current.
    ///
    /// The backend seek only places the stream next to the entry, so the
    /// reader steps onto it and checks that the landing entry is the one
    /// the token names. A token that is rejected, lands nowhere, or lands
    /// on a different entry fails with [`JournalError::InvalidCursor`].
    /// When it lands on a different entry, that entry stays current.
    pub fn seek_to_cursor(&mut self, cursor: &Cursor) -> Result<()> {
        let (backend, handle) = self.parts()?;

        backend
            .seek(handle, SeekTarget::Cursor(cursor.as_str()))
            .map_err(cursor_error("seek_cursor"))?;

        let landed = backend.next(handle, 1);
        let landed = match landed {
            Ok(moved) => moved,
            Err(code) => {
                self.position = Position::BeforeFirst;
                return Err(step_error(Direction::Forward)(code));
            }
        };

        if landed == 0 {
            debug!(%cursor, "cursor seek landed past the last entry");
            self.position = Position::AfterLast;
            return Err(InvalidCursor::NotFound.into());
        }

        self.position = Position::AtEntry;

        let (backend, handle) = self.parts()?;
        if !backend
            .test_cursor(handle, cursor.as_str())
            .map_err(cursor_error("test_cursor"))?
        {
            debug!(%cursor, "cursor seek landed on a different entry");
            return Err(InvalidCursor::NotFound.into());
        }

        debug!(%cursor, "seeked to cursor");
        Ok(())
    }

    /// Checks whether the current entry is the one `cursor` identifies,
    /// without moving. Returns `false` when no entry is current.
    ///
    /// A `false` result for a previously captured token is normal after the
    /// journal has been rotated or vacuumed.
    pub fn current_matches_cursor(&mut self, cursor: &Cursor) -> Result<bool> {
        let at_entry = self.position == Position::AtEntry;
        let (backend, handle) = self.parts()?;
        if !at_entry {
            return Ok(false);
        }

        match backend.test_cursor(handle, cursor.as_str()) {
            Ok(matches) => Ok(matches),
            Err(code) if code == -libc::EADDRNOTAVAIL => Ok(false),
            Err(code) => Err(cursor_error("test_cursor")(code)),
        }
    }

    /// Returns the token of the current entry.
    pub fn capture_cursor(&mut self) -> Result<Cursor> {
        let at_entry = self.position == Position::AtEntry;
        let (backend, handle) = self.parts()?;
        if !at_entry {
            return Err(JournalError::NoCurrentEntry);
        }

        let token = match backend.get_cursor(handle) {
            Ok(token) => token,
            Err(code) if code == -libc::EADDRNOTAVAIL => {
                return Err(JournalError::NoCurrentEntry);
            }
            Err(code) => return Err(JournalError::io("get_cursor", code)),
        };

        // produced by the journal, so a bad token is a stream failure
        Cursor::new(token).map_err(|reason| {
            warn!(%reason, "journal produced an unusable cursor");
            JournalError::io("get_cursor", -libc::EBADMSG)
        })
    }

    /// Positions the reader for resuming from a saved cursor.
    ///
    /// Without a cursor the reader goes to the head. A cursor that no longer
    /// resolves is discarded and the reader goes to the head as well; the
    /// returned [`ResumePoint`] tells the caller which case happened.
    /// A resolved cursor is the current entry, so the next unread entry is
    /// reached with [`advance`](JournalReader::advance).
    pub fn resume_from(&mut self, cursor: Option<&Cursor>) -> Result<ResumePoint> {
        let Some(cursor) = cursor else {
            self.seek_to_head()?;
            return Ok(ResumePoint::Head);
        };

        match self.seek_to_cursor(cursor) {
            Ok(()) => Ok(ResumePoint::Cursor),
            Err(JournalError::InvalidCursor(reason)) => {
                warn!(%cursor, %reason, "discarding saved cursor");
                self.seek_to_head()?;
                Ok(ResumePoint::HeadAfterInvalidCursor(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Releases the stream. Calling this again, or dropping the reader
    /// afterwards, does nothing.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.close_stream(handle);
            debug!("journal closed");
        }
    }
}

impl<B: JournalBackend> Drop for JournalReader<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, Op};

    fn cursor(token: &str) -> Cursor {
        Cursor::new(token).unwrap()
    }

    fn reader_with(tokens: &[&str]) -> JournalReader<MemoryBackend> {
        let backend = MemoryBackend::with_cursors(tokens.iter().copied());
        JournalReader::open(backend, OpenFlags::LOCAL_ONLY).unwrap()
    }

    #[test]
    fn open_starts_before_first_entry() {
        let reader = reader_with(&["c1"]);
        assert!(reader.is_open());
        assert_eq!(reader.position(), Position::BeforeFirst);
        assert_eq!(reader.backend().last_open_flags(), Some(OpenFlags::LOCAL_ONLY));
    }

    #[test]
    fn advance_reports_end_without_moving() {
        let mut reader = reader_with(&["c1", "c2"]);

        assert!(reader.advance().unwrap());
        assert!(reader.advance().unwrap());
        assert!(!reader.advance().unwrap());
        assert!(!reader.advance().unwrap());

        assert_eq!(reader.position(), Position::AtEntry);
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c2"));
    }

    #[test]
    fn advance_on_empty_journal_stays_before_first() {
        let mut reader = reader_with(&[]);
        assert!(!reader.advance().unwrap());
        assert_eq!(reader.position(), Position::BeforeFirst);
        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::NoCurrentEntry)
        ));
    }

    #[test]
    fn retreat_past_history_stops_at_earliest_entry() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);
        reader.seek_to_tail().unwrap();

        assert!(!reader.retreat_by(10).unwrap());
        assert_eq!(reader.position(), Position::AtEntry);
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));

        assert!(!reader.retreat_by(1).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));
    }

    #[test]
    fn retreat_by_exact_count() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);
        reader.seek_to_tail().unwrap();

        assert!(reader.retreat_by(1).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c3"));
        assert!(reader.retreat_by(2).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));
    }

    #[test]
    fn retreat_from_head_stays_before_first() {
        let mut reader = reader_with(&["c1"]);
        assert!(!reader.retreat_by(3).unwrap());
        assert_eq!(reader.position(), Position::BeforeFirst);
    }

    #[test]
    fn zero_steps_report_current_state() {
        let mut reader = reader_with(&["c1"]);
        assert!(!reader.retreat_by(0).unwrap());
        assert!(!reader.advance_by(0).unwrap());

        reader.advance().unwrap();
        assert!(reader.retreat_by(0).unwrap());
        assert!(reader.advance_by(0).unwrap());
        assert_eq!(reader.backend().calls(Op::Previous), 0);
    }

    #[test]
    fn advance_by_partial_stops_at_last_entry() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);
        assert!(reader.advance_by(2).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c2"));

        assert!(!reader.advance_by(5).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c3"));
    }

    #[test]
    fn seek_to_head_restarts_iteration() {
        let mut reader = reader_with(&["c1", "c2"]);
        reader.advance_by(2).unwrap();
        reader.seek_to_head().unwrap();

        assert_eq!(reader.position(), Position::BeforeFirst);
        assert!(reader.advance().unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));
    }

    #[test]
    fn capture_after_tail_has_no_current_entry() {
        let mut reader = reader_with(&["c1"]);
        reader.seek_to_tail().unwrap();
        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::NoCurrentEntry)
        ));
        assert!(!reader.current_matches_cursor(&cursor("c1")).unwrap());
    }

    #[test]
    fn seek_to_unknown_cursor_is_rejected() {
        let mut reader = reader_with(&["c1"]);
        let err = reader.seek_to_cursor(&cursor("nope")).unwrap_err();
        assert!(matches!(
            err,
            JournalError::InvalidCursor(InvalidCursor::Rejected(code)) if code.raw() == -libc::EINVAL
        ));
    }

    #[test]
    fn seek_to_vacuumed_cursor_lands_elsewhere() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);
        reader.backend().vacuum(1);

        let err = reader.seek_to_cursor(&cursor("c1")).unwrap_err();
        assert!(matches!(
            err,
            JournalError::InvalidCursor(InvalidCursor::NotFound)
        ));
        assert_eq!(reader.position(), Position::AtEntry);
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c2"));
    }

    #[test]
    fn seek_to_cursor_past_the_end_is_not_found() {
        let mut reader = reader_with(&["c1", "c2"]);
        reader.backend().vacuum(2);

        let err = reader.seek_to_cursor(&cursor("c2")).unwrap_err();
        assert!(matches!(
            err,
            JournalError::InvalidCursor(InvalidCursor::NotFound)
        ));
        assert_eq!(reader.position(), Position::AfterLast);
    }

    #[test]
    fn failed_step_after_cursor_seek_is_before_first() {
        let mut reader = reader_with(&["c1", "c2"]);
        reader.advance_by(2).unwrap();

        reader.backend().fail_next(Op::Next, -libc::EIO);
        let err = reader.seek_to_cursor(&cursor("c1")).unwrap_err();
        assert!(matches!(err, JournalError::Io { op: "next", code } if code.raw() == -libc::EIO));
        assert_eq!(reader.position(), Position::BeforeFirst);
        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::NoCurrentEntry)
        ));
    }

    #[test]
    fn failed_verify_after_cursor_seek_keeps_landing_entry() {
        let mut reader = reader_with(&["c1", "c2"]);

        reader.backend().fail_next(Op::TestCursor, -libc::EIO);
        let err = reader.seek_to_cursor(&cursor("c2")).unwrap_err();
        assert!(matches!(
            err,
            JournalError::Io { op: "test_cursor", code } if code.raw() == -libc::EIO
        ));
        assert_eq!(reader.position(), Position::AtEntry);
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c2"));
    }

    #[test]
    fn huge_counts_report_partial_moves() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);

        assert!(!reader.advance_by(3_000_000_000).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c3"));

        assert!(!reader.retreat_by(1 << 32).unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));

        assert!(!reader.retreat_by(u64::MAX).unwrap());
        assert_eq!(reader.position(), Position::AtEntry);
    }

    #[test]
    fn steps_above_max_skip_are_split() {
        let mut reader = reader_with(&["c1"]);
        reader.seek_to_tail().unwrap();

        // a short first chunk ends the walk
        assert!(!reader.retreat_by(MAX_SKIP + 5).unwrap());
        assert_eq!(reader.backend().calls(Op::Previous), 1);
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));
    }

    #[test]
    fn unusable_produced_cursor_is_an_io_error() {
        let mut reader = reader_with(&["", "c\0"]);
        reader.advance().unwrap();

        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::Io { op: "get_cursor", code }) if code.raw() == -libc::EBADMSG
        ));

        reader.advance().unwrap();
        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::Io { op: "get_cursor", .. })
        ));
    }

    #[test]
    fn backend_failures_become_io_errors() {
        let mut reader = reader_with(&["c1"]);

        reader.backend().fail_next(Op::Next, -libc::EIO);
        let err = reader.advance().unwrap_err();
        assert!(matches!(err, JournalError::Io { op: "next", code } if code.raw() == -libc::EIO));

        reader.backend().fail_next(Op::Previous, -12345);
        let err = reader.retreat_by(1).unwrap_err();
        assert!(matches!(err, JournalError::Io { op: "previous", code } if code.raw() == -12345));

        reader.backend().fail_next(Op::Seek, -libc::EIO);
        assert!(matches!(
            reader.seek_to_tail(),
            Err(JournalError::Io { op: "seek_tail", .. })
        ));

        // the reader stays usable after a failed call
        assert!(reader.advance().unwrap());
    }

    #[test]
    fn capture_translates_missing_entry_code() {
        let mut reader = reader_with(&["c1"]);
        reader.advance().unwrap();

        reader.backend().fail_next(Op::GetCursor, -libc::EADDRNOTAVAIL);
        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::NoCurrentEntry)
        ));

        reader.backend().fail_next(Op::GetCursor, -libc::ENOMEM);
        assert!(matches!(
            reader.capture_cursor(),
            Err(JournalError::Io { op: "get_cursor", .. })
        ));
    }

    #[test]
    fn compare_translates_codes() {
        let mut reader = reader_with(&["c1"]);
        reader.advance().unwrap();

        assert!(matches!(
            reader.current_matches_cursor(&cursor("zzz")),
            Err(JournalError::InvalidCursor(InvalidCursor::Rejected(_)))
        ));

        reader.backend().fail_next(Op::TestCursor, -libc::EADDRNOTAVAIL);
        assert!(!reader.current_matches_cursor(&cursor("c1")).unwrap());

        reader.backend().fail_next(Op::TestCursor, -libc::EIO);
        assert!(matches!(
            reader.current_matches_cursor(&cursor("c1")),
            Err(JournalError::Io { op: "test_cursor", .. })
        ));
    }

    #[test]
    fn operations_after_close_fail() {
        let mut reader = reader_with(&["c1"]);
        reader.close();

        assert!(!reader.is_open());
        assert!(matches!(reader.advance(), Err(JournalError::Closed)));
        assert!(matches!(reader.retreat_by(0), Err(JournalError::Closed)));
        assert!(matches!(reader.seek_to_tail(), Err(JournalError::Closed)));
        assert!(matches!(
            reader.seek_to_cursor(&cursor("c1")),
            Err(JournalError::Closed)
        ));
        assert!(matches!(
            reader.current_matches_cursor(&cursor("c1")),
            Err(JournalError::Closed)
        ));
        assert!(matches!(reader.capture_cursor(), Err(JournalError::Closed)));
    }

    #[test]
    fn resume_without_cursor_starts_at_head() {
        let mut reader = reader_with(&["c1", "c2"]);
        reader.advance().unwrap();

        assert_eq!(reader.resume_from(None).unwrap(), ResumePoint::Head);
        assert!(reader.advance().unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c1"));
    }

    #[test]
    fn resume_from_saved_cursor() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);
        let saved = cursor("c2");

        assert_eq!(reader.resume_from(Some(&saved)).unwrap(), ResumePoint::Cursor);
        assert!(reader.advance().unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c3"));
    }

    #[test]
    fn resume_from_vacuumed_cursor_restarts() {
        let mut reader = reader_with(&["c1", "c2", "c3"]);
        reader.backend().vacuum(2);

        let point = reader.resume_from(Some(&cursor("c1"))).unwrap();
        assert_eq!(
            point,
            ResumePoint::HeadAfterInvalidCursor(InvalidCursor::NotFound)
        );
        assert!(reader.advance().unwrap());
        assert_eq!(reader.capture_cursor().unwrap(), cursor("c3"));
    }

    #[test]
    fn resume_propagates_io_errors() {
        let mut reader = reader_with(&["c1"]);
        reader.backend().fail_next(Op::Seek, -libc::EIO);

        assert!(matches!(
            reader.resume_from(Some(&cursor("c1"))),
            Err(JournalError::Io { op: "seek_cursor", .. })
        ));
    }
}
