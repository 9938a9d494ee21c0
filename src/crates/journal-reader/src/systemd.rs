//! Journal backend bound to libsystemd's `sd_journal` API.
//!
//! The library is loaded at runtime, so binaries build and start on hosts
//! without libsystemd; opening a reader there fails with
//! [`JournalError::Open`].

use crate::backend::{JournalBackend, RawCode, SeekTarget};
use crate::error::{JournalError, Result};
use crate::flags::OpenFlags;
use libloading::Library;
use std::ffi::{CStr, CString, OsStr, c_char, c_int};
use std::ptr::{self, NonNull};
use tracing::{debug, warn};

/// Soname of the library providing `sd_journal_*`.
pub const LIBSYSTEMD: &str = "libsystemd.so.0";

#[repr(C)]
pub struct SdJournal {
    _private: [u8; 0],
}

type OpenFn = unsafe extern "C" fn(*mut *mut SdJournal, c_int) -> c_int;
type SkipFn = unsafe extern "C" fn(*mut SdJournal, u64) -> c_int;
type SeekFn = unsafe extern "C" fn(*mut SdJournal) -> c_int;
type CursorFn = unsafe extern "C" fn(*mut SdJournal, *const c_char) -> c_int;
type GetCursorFn = unsafe extern "C" fn(*mut SdJournal, *mut *mut c_char) -> c_int;
type CloseFn = unsafe extern "C" fn(*mut SdJournal);

struct Api {
    open: OpenFn,
    next_skip: SkipFn,
    previous_skip: SkipFn,
    seek_head: SeekFn,
    seek_tail: SeekFn,
    seek_cursor: CursorFn,
    get_cursor: GetCursorFn,
    test_cursor: CursorFn,
    close: CloseFn,
}

impl Api {
    fn resolve(library: &Library) -> std::result::Result<Self, libloading::Error> {
        // SAFETY: each symbol is read with the signature libsystemd declares
        // for it in <systemd/sd-journal.h>. The copied function pointers are
        // only called while `library` is kept loaded by `SystemdBackend`.
        unsafe {
            Ok(Api {
                open: *library.get::<OpenFn>(b"sd_journal_open\0")?,
                next_skip: *library.get::<SkipFn>(b"sd_journal_next_skip\0")?,
                previous_skip: *library.get::<SkipFn>(b"sd_journal_previous_skip\0")?,
                seek_head: *library.get::<SeekFn>(b"sd_journal_seek_head\0")?,
                seek_tail: *library.get::<SeekFn>(b"sd_journal_seek_tail\0")?,
                seek_cursor: *library.get::<CursorFn>(b"sd_journal_seek_cursor\0")?,
                get_cursor: *library.get::<GetCursorFn>(b"sd_journal_get_cursor\0")?,
                test_cursor: *library.get::<CursorFn>(b"sd_journal_test_cursor\0")?,
                close: *library.get::<CloseFn>(b"sd_journal_close\0")?,
            })
        }
    }
}

/// The system journal, read through libsystemd.
pub struct SystemdBackend {
    api: Api,
    _library: Library,
}

impl std::fmt::Debug for SystemdBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemdBackend").finish_non_exhaustive()
    }
}

/// An open `sd_journal` object.
#[derive(Debug)]
pub struct SystemdHandle(NonNull<SdJournal>);

// SAFETY: an sd_journal object may move between threads as long as it is
// not used from two threads at once. The handle is only reachable through
// `&mut` access, and it is not `Sync`.
unsafe impl Send for SystemdHandle {}

impl SystemdBackend {
    /// Loads [`LIBSYSTEMD`] from the default library search path.
    pub fn load() -> Result<Self> {
        Self::load_from(LIBSYSTEMD)
    }

    /// Loads the `sd_journal` API from a specific library.
    pub fn load_from(path: impl AsRef<OsStr>) -> Result<Self> {
        let path = path.as_ref();

        // SAFETY: loading libsystemd runs no initialization code with
        // preconditions on the calling process.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            warn!(error = %e, path = ?path, "failed to load libsystemd");
            JournalError::open(-libc::ELIBACC)
        })?;

        let api = Api::resolve(&library).map_err(|e| {
            warn!(error = %e, path = ?path, "libsystemd lacks the sd_journal API");
            JournalError::open(-libc::ENOSYS)
        })?;

        debug!(path = ?path, "loaded libsystemd");
        Ok(SystemdBackend {
            api,
            _library: library,
        })
    }
}

fn check(r: c_int) -> std::result::Result<c_int, RawCode> {
    if r < 0 { Err(r) } else { Ok(r) }
}

impl JournalBackend for SystemdBackend {
    type Handle = SystemdHandle;

    fn open_stream(&self, flags: OpenFlags) -> std::result::Result<SystemdHandle, RawCode> {
        let mut journal: *mut SdJournal = ptr::null_mut();

        // SAFETY: `journal` is a valid out pointer for the new object.
        check(unsafe { (self.api.open)(&mut journal, flags.bits()) })?;

        NonNull::new(journal)
            .map(SystemdHandle)
            .ok_or(-libc::EIO)
    }

    fn next(&self, handle: &mut SystemdHandle, skip: u64) -> std::result::Result<u64, RawCode> {
        // SAFETY: the handle holds a live sd_journal object.
        let moved = check(unsafe { (self.api.next_skip)(handle.0.as_ptr(), skip) })?;
        Ok(moved as u64)
    }

    fn previous(
        &self,
        handle: &mut SystemdHandle,
        skip: u64,
    ) -> std::result::Result<u64, RawCode> {
        // SAFETY: the handle holds a live sd_journal object.
        let moved = check(unsafe { (self.api.previous_skip)(handle.0.as_ptr(), skip) })?;
        Ok(moved as u64)
    }

    fn seek(
        &self,
        handle: &mut SystemdHandle,
        target: SeekTarget<'_>,
    ) -> std::result::Result<(), RawCode> {
        let journal = handle.0.as_ptr();

        // SAFETY: the handle holds a live sd_journal object and the cursor
        // string outlives the call.
        let r = match target {
            SeekTarget::Head => unsafe { (self.api.seek_head)(journal) },
            SeekTarget::Tail => unsafe { (self.api.seek_tail)(journal) },
            SeekTarget::Cursor(cursor) => {
                let cursor = CString::new(cursor).map_err(|_| -libc::EINVAL)?;
                unsafe { (self.api.seek_cursor)(journal, cursor.as_ptr()) }
            }
        };

        check(r).map(|_| ())
    }

    fn get_cursor(&self, handle: &mut SystemdHandle) -> std::result::Result<String, RawCode> {
        let mut raw: *mut c_char = ptr::null_mut();

        // SAFETY: the handle holds a live sd_journal object and `raw` is a
        // valid out pointer.
        check(unsafe { (self.api.get_cursor)(handle.0.as_ptr(), &mut raw) })?;
        if raw.is_null() {
            return Err(-libc::EIO);
        }

        // SAFETY: libsystemd returned a NUL terminated string allocated
        // with malloc(3), owned by the caller.
        let cursor = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        unsafe { libc::free(raw.cast()) };

        Ok(cursor)
    }

    fn test_cursor(
        &self,
        handle: &mut SystemdHandle,
        cursor: &str,
    ) -> std::result::Result<bool, RawCode> {
        let cursor = CString::new(cursor).map_err(|_| -libc::EINVAL)?;

        // SAFETY: the handle holds a live sd_journal object and the cursor
        // string outlives the call.
        let r = check(unsafe { (self.api.test_cursor)(handle.0.as_ptr(), cursor.as_ptr()) })?;
        Ok(r > 0)
    }

    fn close_stream(&self, handle: SystemdHandle) {
        // SAFETY: the handle is consumed, so the object is closed once and
        // never used again.
        unsafe { (self.api.close)(handle.0.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JournalReader;

    #[test]
    fn missing_library_is_an_open_error() {
        let err = SystemdBackend::load_from("/nonexistent/libsystemd.so.0").unwrap_err();
        match err {
            JournalError::Open { code } => assert_eq!(code.raw(), -libc::ELIBACC),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn check_passes_non_negative_codes() {
        assert_eq!(check(0), Ok(0));
        assert_eq!(check(3), Ok(3));
        assert_eq!(check(-libc::EINVAL), Err(-libc::EINVAL));
    }

    #[test]
    #[ignore = "reads the host journal"]
    fn system_journal_round_trip_if_available() {
        let Ok(backend) = SystemdBackend::load() else {
            return;
        };
        let Ok(mut reader) = JournalReader::open(backend, OpenFlags::LOCAL_ONLY) else {
            return;
        };

        reader.seek_to_tail().unwrap();
        if !reader.retreat_by(1).unwrap() {
            return;
        }

        let cursor = reader.capture_cursor().unwrap();
        assert!(reader.current_matches_cursor(&cursor).unwrap());
        reader.seek_to_cursor(&cursor).unwrap();
        assert_eq!(reader.capture_cursor().unwrap(), cursor);
    }
}
