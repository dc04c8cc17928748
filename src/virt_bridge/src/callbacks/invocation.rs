//! Callbacks the native library calls for an answer rather than to report
//! an event: stream data transfer, credential collection and the
//! operations of a custom event loop.

use std::ffi::{c_int, c_void};

use super::events::{CallbackKind, EventHandleType};
use super::trampolines::{FreeCallback, HandleCallback, TimeoutCallback};
use crate::native::params::Credential;
use crate::native::types::StreamPtr;

/// One call from the native library into a call-kind handle. The handler
/// answers with the `int` the native side expects, `-1` meaning failure.
#[derive(Debug)]
pub enum Invocation<'a> {
    /// `virStreamSinkFunc`: `data` was received
    StreamSink {
        /// The stream
        stream: StreamPtr,
        /// The received bytes
        data: &'a [u8],
    },
    /// `virStreamSinkHoleFunc`: a hole of `length` bytes was received
    StreamSinkHole {
        /// The stream
        stream: StreamPtr,
        /// Size of the hole
        length: i64,
    },
    /// `virStreamSourceFunc`: fill `buf`, answer the number of bytes
    /// written, `0` at end of stream
    StreamSource {
        /// The stream
        stream: StreamPtr,
        /// Buffer to fill
        buf: &'a mut [u8],
    },
    /// `virStreamSourceHoleFunc`: report whether the current position is
    /// in data or a hole, and how long that section is
    StreamSourceHole {
        /// The stream
        stream: StreamPtr,
        /// Set to `true` when in data
        in_data: &'a mut bool,
        /// Set to the length of the current section
        length: &'a mut i64,
    },
    /// `virStreamSourceSkipFunc`: skip `length` bytes of a hole
    StreamSourceSkip {
        /// The stream
        stream: StreamPtr,
        /// Bytes to skip
        length: i64,
    },
    /// `virConnectAuthCallbackPtr`: fill in the `result` of each credential
    Auth {
        /// The requested credentials
        creds: &'a mut [Credential],
    },
    /// `virEventAddHandleFunc`, answering the new watch id
    AddHandle {
        /// The file descriptor to watch
        fd: c_int,
        /// Events to watch for
        events: EventHandleType,
        /// What to call when `fd` is ready
        callback: NativeHandleCallback,
    },
    /// `virEventUpdateHandleFunc`
    UpdateHandle {
        /// The watch to change
        watch: c_int,
        /// The new events to watch for
        events: EventHandleType,
    },
    /// `virEventRemoveHandleFunc`
    RemoveHandle {
        /// The watch to remove
        watch: c_int,
    },
    /// `virEventAddTimeoutFunc`, answering the new timer id
    AddTimeout {
        /// Milliseconds between runs, negative for disabled
        frequency_ms: c_int,
        /// What to call when the timer fires
        callback: NativeTimeoutCallback,
    },
    /// `virEventUpdateTimeoutFunc`
    UpdateTimeout {
        /// The timer to change
        timer: c_int,
        /// The new frequency
        frequency_ms: c_int,
    },
    /// `virEventRemoveTimeoutFunc`
    RemoveTimeout {
        /// The timer to remove
        timer: c_int,
    },
}

impl Invocation<'_> {
    /// The kind a handle must be registered with to receive `self`
    pub fn kind(&self) -> CallbackKind {
        match self {
            Invocation::StreamSink { .. } | Invocation::StreamSinkHole { .. } => {
                CallbackKind::StreamSink
            }
            Invocation::StreamSource { .. }
            | Invocation::StreamSourceHole { .. }
            | Invocation::StreamSourceSkip { .. } => CallbackKind::StreamSource,
            Invocation::Auth { .. } => CallbackKind::ConnectAuth,
            Invocation::AddHandle { .. }
            | Invocation::UpdateHandle { .. }
            | Invocation::RemoveHandle { .. }
            | Invocation::AddTimeout { .. }
            | Invocation::UpdateTimeout { .. }
            | Invocation::RemoveTimeout { .. } => CallbackKind::EventLoopImpl,
        }
    }
}

/// A file handle callback the native library handed to a custom event
/// loop. The loop must call [`Self::free`] once the watch is removed.
#[derive(Debug)]
pub struct NativeHandleCallback {
    cb: HandleCallback,
    opaque: usize,
    free: Option<FreeCallback>,
}

impl NativeHandleCallback {
    /// Wrap what `virEventAddHandleFunc` received
    pub fn new(cb: HandleCallback, opaque: *mut c_void, free: Option<FreeCallback>) -> Self {
        Self {
            cb,
            opaque: opaque as usize,
            free,
        }
    }

    /// Report that `fd`, watched as `watch`, is ready for `events`
    pub fn invoke(&self, watch: c_int, fd: c_int, events: EventHandleType) {
        (self.cb)(watch, fd, events.bits(), self.opaque as *mut c_void)
    }

    /// Hand the user data back to the library
    pub fn free(self) {
        if let Some(free) = self.free {
            free(self.opaque as *mut c_void);
        }
    }
}

/// A timer callback the native library handed to a custom event loop. The
/// loop must call [`Self::free`] once the timer is removed.
#[derive(Debug)]
pub struct NativeTimeoutCallback {
    cb: TimeoutCallback,
    opaque: usize,
    free: Option<FreeCallback>,
}

impl NativeTimeoutCallback {
    /// Wrap what `virEventAddTimeoutFunc` received
    pub fn new(cb: TimeoutCallback, opaque: *mut c_void, free: Option<FreeCallback>) -> Self {
        Self {
            cb,
            opaque: opaque as usize,
            free,
        }
    }

    /// Report that `timer` fired
    pub fn invoke(&self, timer: c_int) {
        (self.cb)(timer, self.opaque as *mut c_void)
    }

    /// Hand the user data back to the library
    pub fn free(self) {
        if let Some(free) = self.free {
            free(self.opaque as *mut c_void);
        }
    }
}
