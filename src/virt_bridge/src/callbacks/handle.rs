use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque reference to a callback stored in a `CallbackRegistry`.
///
/// The native library only ever sees the integer, smuggled through the
/// opaque user-data pointer of its registration calls. A `HandleId` is
/// issued once and never reused, so a stale value can never alias a newer
/// registration.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

/// The key that identifies no callback at all.
///
/// A null opaque pointer decodes to this key, so it is never issued.
pub(crate) const EMPTY_KEY: u64 = 0;

impl HandleId {
    /// Wrap a raw key.
    pub fn from_raw(key: u64) -> Self {
        Self(key)
    }

    /// The raw key
    pub fn key(&self) -> u64 {
        self.0
    }

    /// Recover the id from an opaque user-data pointer. Returns `None` for
    /// a null pointer.
    pub fn from_opaque(opaque: *mut c_void) -> Option<Self> {
        let key = opaque as usize as u64;
        if key == EMPTY_KEY {
            None
        } else {
            Some(Self(key))
        }
    }

    /// Encode the id as an opaque user-data pointer. The pointer is never
    /// dereferenced by either side.
    pub fn as_opaque(&self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Issues `HandleId`s in increasing order, starting after `EMPTY_KEY`.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(EMPTY_KEY + 1),
        }
    }

    pub(crate) fn next_id(&self) -> HandleId {
        HandleId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
