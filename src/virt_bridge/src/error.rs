use std::error::Error;
use std::ffi::NulError;
use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

use crate::callbacks::{CallbackKind, HandleId};
use crate::native::error::{ErrorLevel, NativeError, VIR_ERR_INTERNAL_ERROR, VIR_ERR_NO_SUPPORT, VIR_FROM_NONE};
use crate::resolver::LibraryVersion;

/// The error type for virt-bridge operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VirtBridgeError {
    /// A native call reached a handle registered for a different kind of
    /// callback.
    #[error("Callback handle {handle} is registered for {registered} callbacks but was invoked as {received}")]
    CallbackKindMismatch {
        /// The handle that was invoked
        handle: HandleId,
        /// The kind the handle was registered with
        registered: CallbackKind,
        /// The kind of the invocation
        received: CallbackKind,
    },

    /// CString conversion error
    #[error("Error converting CString {0:?}")]
    CStringConversionError(#[from] NulError),

    /// A handle was released after it had already been released.
    ///
    /// This indicates a lifecycle bug in the binding, not in subscriber code.
    #[error("Callback handle {0} was released more than once")]
    DoubleRelease(HandleId),

    /// A generic error with a message
    #[error("{0}")]
    Error(String),

    /// The raw arguments delivered by a trampoline do not fit the event
    /// kind the handle was registered with.
    #[error("Callback handle {handle} is registered for {kind} events but received {received} raw arguments that do not decode as one")]
    EventKindMismatch {
        /// The handle that was dispatched
        handle: HandleId,
        /// The kind the handle was registered with
        kind: CallbackKind,
        /// How many raw arguments the trampoline supplied
        received: usize,
    },

    /// The native library could not be opened
    #[error("Failed to load the native library: {0}")]
    LibraryNotLoadable(String),

    /// An attempt to get a lock from a Mutex failed.
    #[error("Unable to lock resource")]
    LockAttemptFailed(String),

    /// A native call returned its failure sentinel
    #[error("{0}")]
    NativeCallFailed(NativeError),

    /// The native side invoked a trampoline with a handle that is not live.
    #[error("Callback handle {0} was dispatched but is not registered")]
    StaleHandleDispatched(HandleId),

    /// The loaded library does not export the requested symbol
    #[error("Symbol {0} not found in the native library")]
    SymbolNotFound(String),

    /// The symbol is newer than the library version the resolver was
    /// configured to assume
    #[error("Function {name} not available prior to libvirt version {since}")]
    SymbolUnavailable {
        /// The symbol that was requested
        name: String,
        /// The first library version exporting it
        since: LibraryVersion,
    },

    /// No subscription with the given id is known to this binding
    #[error("No subscription is registered with callback id {0}")]
    UnknownSubscription(i32),
}

impl VirtBridgeError {
    /// Present `self` in the same shape the native library uses for its
    /// own errors, so callers can handle resolution failures and native
    /// call failures through one path.
    pub fn snapshot(&self) -> NativeError {
        match self {
            VirtBridgeError::NativeCallFailed(native) => native.clone(),
            VirtBridgeError::LibraryNotLoadable(_)
            | VirtBridgeError::SymbolNotFound(_)
            | VirtBridgeError::SymbolUnavailable { .. } => NativeError {
                code: VIR_ERR_NO_SUPPORT,
                domain: VIR_FROM_NONE,
                message: self.to_string(),
                level: ErrorLevel::Error,
                ..Default::default()
            },
            _ => NativeError {
                code: VIR_ERR_INTERNAL_ERROR,
                domain: VIR_FROM_NONE,
                message: self.to_string(),
                level: ErrorLevel::Error,
                ..Default::default()
            },
        }
    }

    /// Whether `self` signals a lifecycle bug inside the binding itself
    /// rather than a condition the caller can recover from.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            VirtBridgeError::DoubleRelease(_)
                | VirtBridgeError::CallbackKindMismatch { .. }
                | VirtBridgeError::StaleHandleDispatched(_)
                | VirtBridgeError::EventKindMismatch { .. }
        )
    }
}

impl From<&str> for VirtBridgeError {
    fn from(s: &str) -> Self {
        VirtBridgeError::Error(s.to_string())
    }
}

impl<T> From<PoisonError<MutexGuard<'_, T>>> for VirtBridgeError {
    // Implemented this way rather than passing the error as a source to LockAttemptFailed as that would require
    // Box<dyn Error + Send + Sync> which is not easy to implement for PoisonError<MutexGuard<'_, T>>
    fn from(e: PoisonError<MutexGuard<'_, T>>) -> Self {
        let source = match e.source() {
            Some(s) => s.to_string(),
            None => e.to_string(),
        };
        VirtBridgeError::LockAttemptFailed(source)
    }
}

/// The result type for virt-bridge operations
pub type Result<T> = std::result::Result<T, VirtBridgeError>;

/// Creates a `VirtBridgeError::Error` from a string literal or format string
#[macro_export]
macro_rules! new_error {
    ($msg:literal $(,)?) => {{
        let __args = std::format_args!($msg);
        let __err_msg = match __args.as_str() {
            Some(msg) => String::from(msg),
            None => std::format!($msg),
        };
        $crate::VirtBridgeError::Error(__err_msg)
    }};
    ($fmtstr:expr, $($arg:tt)*) => {{
           let __err_msg = std::format!($fmtstr, $($arg)*);
           $crate::VirtBridgeError::Error(__err_msg)
    }};
}

/// Logs the given error at error level, then returns it from the
/// enclosing function.
#[macro_export]
macro_rules! log_then_return {
    ($msg:literal $(,)?) => {{
        let __err = $crate::new_error!($msg);
        log::error!("{}", __err);
        return Err(__err);
    }};
    ($err:expr $(,)?) => {
        let __err = $err;
        log::error!("{}", __err);
        return Err(__err.into());
    };
    ($fmtstr:expr, $($arg:tt)*) => {
        let __err = $crate::new_error!($fmtstr, $($arg)*);
        log::error!("{}", __err);
        return Err(__err);
    };
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::VirtBridgeError;
    use crate::callbacks::{CallbackKind, HandleId};
    use crate::native::error::{VIR_ERR_INTERNAL_ERROR, VIR_ERR_NO_SUPPORT};

    #[test]
    fn resolution_failures_share_the_native_shape() {
        let err = VirtBridgeError::SymbolNotFound("virConnectOpen".to_string());
        let snapshot = err.snapshot();
        assert_eq!(snapshot.code, VIR_ERR_NO_SUPPORT);
        assert_eq!(
            snapshot.message,
            "Symbol virConnectOpen not found in the native library"
        );
    }

    #[test]
    fn invariant_violations_are_flagged() {
        let stale = VirtBridgeError::StaleHandleDispatched(HandleId::from_raw(7));
        assert!(stale.is_invariant_violation());
        assert_eq!(stale.snapshot().code, VIR_ERR_INTERNAL_ERROR);
        assert!(!VirtBridgeError::LibraryNotLoadable("nope".to_string()).is_invariant_violation());
        let mismatch = VirtBridgeError::CallbackKindMismatch {
            handle: HandleId::from_raw(3),
            registered: CallbackKind::StreamSink,
            received: CallbackKind::ConnectAuth,
        };
        assert!(mismatch.is_invariant_violation());
        assert_eq!(
            mismatch.to_string(),
            "Callback handle Handle(3) is registered for StreamSink callbacks but was invoked as ConnectAuth"
        );
    }

    #[test]
    fn poisoned_lock_converts() {
        let lock = Arc::new(Mutex::new(0));
        let cloned = lock.clone();
        let _ = thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let err: VirtBridgeError = lock.lock().unwrap_err().into();
        assert!(matches!(err, VirtBridgeError::LockAttemptFailed(_)));
    }

    #[test]
    fn new_error_formats() {
        let err = new_error!("symbol {} missing", "virFoo");
        assert_eq!(err, VirtBridgeError::Error("symbol virFoo missing".to_string()));
        let err = new_error!("plain message");
        assert_eq!(err.to_string(), "plain message");
    }
}
