//! An in-process journal backend.
//!
//! [`MemoryBackend`] keeps a list of entries, identified only by their
//! cursor tokens, behind a shared handle. Clones see the same entries, so a
//! test can append or vacuum entries while a reader has the stream open.
//! Failures can be injected per operation and every call is counted,
//! including handle releases.
//!
//! Positioning follows libsystemd: a seek places the stream *next to* an
//! entry, the following step lands on it, and stepping past either end
//! leaves the current entry unchanged. A tail seek resolves when the stream
//! steps: `next` finds entries appended after the seek, `previous` starts
//! from the last entry at the time of the call. Skips above [`MAX_SKIP`]
//! fail with `-ERANGE`.

use crate::backend::{JournalBackend, MAX_SKIP, RawCode, SeekTarget};
use crate::flags::OpenFlags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::trace;

/// Backend operations that can be counted and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Next,
    Previous,
    Seek,
    GetCursor,
    TestCursor,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Head,
    /// After the last entry. Holds the first sequence number not yet
    /// written at seek time.
    Tail(u64),
    /// On the entry with this sequence number.
    Entry(u64),
    /// Next to the entry with this sequence number, after a cursor seek.
    Near(u64),
}

#[derive(Debug, Default)]
struct Store {
    /// Live entries as (seqnum, cursor), ordered by seqnum.
    entries: Vec<(u64, String)>,
    /// Every cursor ever issued, including vacuumed ones.
    seqnums: HashMap<String, u64>,
    next_seqnum: u64,
}

impl Store {
    fn append(&mut self, cursor: String) -> u64 {
        let seqnum = self.next_seqnum;
        self.next_seqnum += 1;
        self.seqnums.insert(cursor.clone(), seqnum);
        self.entries.push((seqnum, cursor));
        seqnum
    }

    fn index_after(&self, seqnum: u64) -> usize {
        self.entries.partition_point(|(s, _)| *s <= seqnum)
    }

    fn index_from(&self, seqnum: u64) -> usize {
        self.entries.partition_point(|(s, _)| *s < seqnum)
    }

    fn cursor_of(&self, seqnum: u64) -> Option<&str> {
        let index = self.index_from(seqnum);
        match self.entries.get(index) {
            Some((s, cursor)) if *s == seqnum => Some(cursor.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    store: Mutex<Store>,
    open_failure: Mutex<Option<RawCode>>,
    pending_failures: Mutex<HashMap<Op, RawCode>>,
    calls: Mutex<HashMap<Op, usize>>,
    last_open_flags: Mutex<Option<OpenFlags>>,
    live_handles: AtomicUsize,
    handle_ids: AtomicU64,
}

/// A journal kept in memory. See the [module documentation](self).
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

/// A stream opened on a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    location: Location,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding one entry per cursor token, in order.
    pub fn with_cursors<I, S>(cursors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        for cursor in cursors {
            backend.append(cursor);
        }
        backend
    }

    /// Appends an entry. Tokens are expected to be unique.
    pub fn append(&self, cursor: impl Into<String>) {
        let seqnum = self.shared.store.lock().append(cursor.into());
        trace!(seqnum, "appended memory journal entry");
    }

    /// Removes the `count` oldest entries, like journal vacuuming does.
    /// Their cursors remain known, so seeking to them lands on the nearest
    /// newer entry.
    pub fn vacuum(&self, count: usize) {
        let mut store = self.shared.store.lock();
        let count = count.min(store.entries.len());
        store.entries.drain(..count);
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every subsequent open fail with `code`, eg. `-EACCES`.
    pub fn fail_open(&self, code: RawCode) {
        *self.shared.open_failure.lock() = Some(code);
    }

    /// Makes the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: Op, code: RawCode) {
        self.shared.pending_failures.lock().insert(op, code);
    }

    /// Number of times `op` was invoked, including failed invocations.
    pub fn calls(&self, op: Op) -> usize {
        self.shared.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Number of handles opened and not yet closed.
    pub fn live_handles(&self) -> usize {
        self.shared.live_handles.load(Ordering::SeqCst)
    }

    pub fn last_open_flags(&self) -> Option<OpenFlags> {
        *self.shared.last_open_flags.lock()
    }

    fn enter(&self, op: Op) -> Result<(), RawCode> {
        *self.shared.calls.lock().entry(op).or_insert(0) += 1;

        match self.shared.pending_failures.lock().remove(&op) {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }
}

impl JournalBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn open_stream(&self, flags: OpenFlags) -> Result<MemoryHandle, RawCode> {
        self.enter(Op::Open)?;
        *self.shared.last_open_flags.lock() = Some(flags);

        if let Some(code) = *self.shared.open_failure.lock() {
            return Err(code);
        }

        self.shared.live_handles.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryHandle {
            id: self.shared.handle_ids.fetch_add(1, Ordering::Relaxed),
            location: Location::Head,
        })
    }

    fn next(&self, handle: &mut MemoryHandle, skip: u64) -> Result<u64, RawCode> {
        self.enter(Op::Next)?;
        if skip > MAX_SKIP {
            return Err(-libc::ERANGE);
        }
        let store = self.shared.store.lock();

        let start = match handle.location {
            Location::Head => 0,
            Location::Tail(seqnum) => store.index_from(seqnum),
            Location::Entry(seqnum) => store.index_after(seqnum),
            Location::Near(seqnum) => store.index_from(seqnum),
        };

        let available = (store.entries.len() - start) as u64;
        let moved = skip.min(available);
        if moved > 0 {
            let seqnum = store.entries[start + moved as usize - 1].0;
            handle.location = Location::Entry(seqnum);
        }

        trace!(handle = handle.id, skip, moved, "memory next");
        Ok(moved)
    }

    fn previous(&self, handle: &mut MemoryHandle, skip: u64) -> Result<u64, RawCode> {
        self.enter(Op::Previous)?;
        if skip > MAX_SKIP {
            return Err(-libc::ERANGE);
        }
        let store = self.shared.store.lock();

        let end = match handle.location {
            Location::Head => 0,
            Location::Tail(_) => store.entries.len(),
            Location::Entry(seqnum) => store.index_from(seqnum),
            Location::Near(seqnum) => store.index_after(seqnum),
        };

        let moved = skip.min(end as u64);
        if moved > 0 {
            let seqnum = store.entries[end - moved as usize].0;
            handle.location = Location::Entry(seqnum);
        }

        trace!(handle = handle.id, skip, moved, "memory previous");
        Ok(moved)
    }

    fn seek(&self, handle: &mut MemoryHandle, target: SeekTarget<'_>) -> Result<(), RawCode> {
        self.enter(Op::Seek)?;

        let store = self.shared.store.lock();
        handle.location = match target {
            SeekTarget::Head => Location::Head,
            SeekTarget::Tail => Location::Tail(store.next_seqnum),
            SeekTarget::Cursor(cursor) => match store.seqnums.get(cursor) {
                Some(seqnum) => Location::Near(*seqnum),
                None => return Err(-libc::EINVAL),
            },
        };

        Ok(())
    }

    fn get_cursor(&self, handle: &mut MemoryHandle) -> Result<String, RawCode> {
        self.enter(Op::GetCursor)?;

        let Location::Entry(seqnum) = handle.location else {
            return Err(-libc::EADDRNOTAVAIL);
        };

        let store = self.shared.store.lock();
        store
            .cursor_of(seqnum)
            .map(str::to_string)
            .ok_or(-libc::EADDRNOTAVAIL)
    }

    fn test_cursor(&self, handle: &mut MemoryHandle, cursor: &str) -> Result<bool, RawCode> {
        self.enter(Op::TestCursor)?;

        let store = self.shared.store.lock();
        let Some(wanted) = store.seqnums.get(cursor) else {
            return Err(-libc::EINVAL);
        };

        match handle.location {
            Location::Entry(seqnum) => Ok(seqnum == *wanted),
            _ => Err(-libc::EADDRNOTAVAIL),
        }
    }

    fn close_stream(&self, handle: MemoryHandle) {
        // Failures injected for close are ignored: releasing cannot fail.
        let _ = self.enter(Op::Close);
        self.shared.live_handles.fetch_sub(1, Ordering::SeqCst);
        trace!(handle = handle.id, "memory stream closed");
    }
}
