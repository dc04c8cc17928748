use std::ffi::{c_char, c_int, c_void, CStr};
use std::fmt;

use serde::Serialize;
use tracing::{instrument, warn, Span};

use crate::resolver::SymbolResolver;

/// `VIR_ERR_OK`
pub const VIR_ERR_OK: i32 = 0;
/// `VIR_ERR_INTERNAL_ERROR`
pub const VIR_ERR_INTERNAL_ERROR: i32 = 1;
/// `VIR_ERR_NO_SUPPORT`
pub const VIR_ERR_NO_SUPPORT: i32 = 3;
/// `VIR_FROM_NONE`
pub const VIR_FROM_NONE: i32 = 0;

/// Layout of the native `virError` struct.
// The pointer fields are only carried for layout
#[allow(dead_code)]
#[repr(C)]
#[derive(Debug)]
pub(crate) struct RawError {
    pub(crate) code: c_int,
    pub(crate) domain: c_int,
    pub(crate) message: *mut c_char,
    pub(crate) level: c_int,
    pub(crate) conn: *mut c_void,
    pub(crate) dom: *mut c_void,
    pub(crate) str1: *mut c_char,
    pub(crate) str2: *mut c_char,
    pub(crate) str3: *mut c_char,
    pub(crate) int1: c_int,
    pub(crate) int2: c_int,
    pub(crate) net: *mut c_void,
}

impl RawError {
    pub(crate) fn zeroed() -> Self {
        RawError {
            code: 0,
            domain: 0,
            message: std::ptr::null_mut(),
            level: 0,
            conn: std::ptr::null_mut(),
            dom: std::ptr::null_mut(),
            str1: std::ptr::null_mut(),
            str2: std::ptr::null_mut(),
            str3: std::ptr::null_mut(),
            int1: 0,
            int2: 0,
            net: std::ptr::null_mut(),
        }
    }
}

/// Severity carried by a native error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ErrorLevel {
    /// `VIR_ERR_NONE`
    #[default]
    None,
    /// `VIR_ERR_WARNING`
    Warning,
    /// `VIR_ERR_ERROR`
    Error,
}

impl From<c_int> for ErrorLevel {
    fn from(v: c_int) -> Self {
        match v {
            1 => ErrorLevel::Warning,
            2 => ErrorLevel::Error,
            _ => ErrorLevel::None,
        }
    }
}

/// An owned copy of a native error record.
///
/// Snapshots are taken on the failing thread right after the failing call,
/// so later native calls cannot alter them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NativeError {
    /// The `virErrorNumber` code
    pub code: i32,
    /// The `virErrorDomain` the error originated in
    pub domain: i32,
    /// Human readable message
    pub message: String,
    /// Severity
    pub level: ErrorLevel,
    /// Extra string information
    pub str1: Option<String>,
    /// Extra string information
    pub str2: Option<String>,
    /// Extra string information
    pub str3: Option<String>,
    /// Extra number information
    pub int1: i32,
    /// Extra number information
    pub int2: i32,
}

impl NativeError {
    /// The record used when the native library reported failure but no
    /// error details could be obtained.
    pub fn unknown() -> Self {
        NativeError {
            code: VIR_ERR_INTERNAL_ERROR,
            domain: VIR_FROM_NONE,
            message: "unknown native error".to_string(),
            level: ErrorLevel::Error,
            ..Default::default()
        }
    }

    /// Copy `raw` into an owned record.
    ///
    /// # Safety
    ///
    /// Every non-null string pointer in `raw` must point at a valid
    /// NUL-terminated string for the duration of the call.
    pub(crate) unsafe fn from_raw(raw: &RawError) -> Self {
        // SAFETY: upheld by the caller
        unsafe {
            NativeError {
                code: raw.code,
                domain: raw.domain,
                message: opt_string(raw.message).unwrap_or_default(),
                level: ErrorLevel::from(raw.level),
                str1: opt_string(raw.str1),
                str2: opt_string(raw.str2),
                str3: opt_string(raw.str3),
                int1: raw.int1,
                int2: raw.int2,
            }
        }
    }
}

/// Copy a possibly null C string.
///
/// # Safety
///
/// `ptr` is null or points at a NUL-terminated string.
pub(crate) unsafe fn opt_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null and NUL-terminated per the caller
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "virError(Code={}, Domain={}, Message='{}')",
            self.code, self.domain, self.message
        )
    }
}

/// Something that can produce a snapshot of the calling thread's last
/// native error.
pub trait LastErrorSource: Send + Sync {
    /// Copy the last error recorded on this thread. Never fails; when no
    /// details are available [`NativeError::unknown`] is returned.
    fn copy_last_error(&self) -> NativeError;
}

type CopyLastErrorFn = unsafe extern "C" fn(*mut RawError) -> c_int;
type ResetErrorFn = unsafe extern "C" fn(*mut RawError);

impl LastErrorSource for SymbolResolver {
    #[instrument(skip(self), parent = Span::current(), level = "Trace")]
    fn copy_last_error(&self) -> NativeError {
        // SAFETY: the signatures match the native declarations
        let copy = unsafe { self.resolve::<CopyLastErrorFn>("virCopyLastError") };
        let copy = match copy {
            Ok(f) => f,
            Err(e) => {
                warn!("cannot read the native last error: {}", e);
                return NativeError::unknown();
            }
        };
        // SAFETY: see above
        let reset = unsafe { self.resolve::<ResetErrorFn>("virResetError") }.ok();

        let mut raw = RawError::zeroed();
        // SAFETY: `raw` is a valid, zeroed virError for the library to fill
        let code = unsafe { copy(&mut raw) };
        let snapshot = if code == VIR_ERR_OK {
            NativeError::unknown()
        } else {
            // SAFETY: the library filled `raw` with valid strings or nulls
            unsafe { NativeError::from_raw(&raw) }
        };
        match reset {
            // SAFETY: frees the strings the library duplicated into `raw`
            Some(reset) => unsafe { reset(&mut raw) },
            None => warn!("virResetError unavailable, leaking copied error strings"),
        }
        snapshot
    }
}
