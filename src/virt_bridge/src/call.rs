use std::sync::Arc;

use tracing::{error, info_span, trace};
use uuid::Uuid;

use crate::native::error::LastErrorSource;
use crate::resolver::SymbolResolver;
use crate::{Result, VirtBridgeError};

/// The state every native call goes through: where symbols come from,
/// where the last error is read from, and the correlation id stamped on
/// every span.
#[derive(Clone)]
pub struct Binding {
    resolver: Arc<SymbolResolver>,
    errors: Arc<dyn LastErrorSource>,
    correlation_id: String,
}

impl Binding {
    /// A binding whose last errors are read through `resolver` itself.
    pub fn new(resolver: Arc<SymbolResolver>) -> Self {
        let errors: Arc<dyn LastErrorSource> = resolver.clone();
        Self::with_error_source(resolver, errors)
    }

    /// A binding with a separate source of last-error snapshots.
    pub fn with_error_source(resolver: Arc<SymbolResolver>, errors: Arc<dyn LastErrorSource>) -> Self {
        Self {
            resolver,
            errors,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// A binding over the process-wide resolver
    pub fn global() -> Self {
        Self::new(SymbolResolver::global())
    }

    /// The resolver symbols come from
    pub fn resolver(&self) -> &Arc<SymbolResolver> {
        &self.resolver
    }

    /// The id stamped on every span opened through this binding
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Start a call to the native function `func_name`
    pub fn call<'a>(&'a self, func_name: &'a str) -> NativeCall<'a> {
        NativeCall {
            func_name,
            binding: self,
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("resolver", &self.resolver)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// One call into the native library.
///
/// - Resolves `func_name` through the binding's resolver
/// - Runs the call inside a `native_call` span carrying the function name
///   and the binding's correlation id
/// - Checks the result against the failure sentinel and, on failure, takes
///   the last-error snapshot before anything else can run a native call on
///   this thread
pub struct NativeCall<'a> {
    func_name: &'a str,
    binding: &'a Binding,
}

impl NativeCall<'_> {
    /// Resolve the function as `F`, pass it to `run_fn` and check the
    /// returned value with `failed`.
    ///
    /// # Safety
    ///
    /// `F` must match the native declaration of the function, and `run_fn`
    /// must uphold whatever that function requires of its arguments.
    pub unsafe fn invoke<F, R, RunFn, FailFn>(self, run_fn: RunFn, failed: FailFn) -> Result<R>
    where
        F: Copy,
        RunFn: FnOnce(F) -> R,
        FailFn: FnOnce(&R) -> bool,
    {
        let correlation_id = self.binding.correlation_id.as_str();
        let _span = info_span!(
            "native_call",
            FunctionName = self.func_name,
            CorrelationId = correlation_id
        )
        .entered();

        // SAFETY: upheld by the caller
        let func = match unsafe { self.binding.resolver.resolve::<F>(self.func_name) } {
            Ok(f) => f,
            Err(e) => {
                error!(
                    FunctionName = self.func_name,
                    CorrelationId = correlation_id,
                    Error = e.to_string()
                );
                return Err(e);
            }
        };

        trace!(
            CorrelationId = correlation_id,
            "Calling Function {}",
            self.func_name
        );
        let ret = run_fn(func);
        trace!(
            CorrelationId = correlation_id,
            "Returned from Calling Function {}",
            self.func_name
        );

        if failed(&ret) {
            let snapshot = self.binding.errors.copy_last_error();
            let err = VirtBridgeError::NativeCallFailed(snapshot);
            error!(
                FunctionName = self.func_name,
                CorrelationId = correlation_id,
                Error = err.to_string()
            );
            return Err(err);
        }
        Ok(ret)
    }

    /// [`Self::invoke`] for the common convention of returning a negative
    /// integer on failure.
    ///
    /// # Safety
    ///
    /// Same as [`Self::invoke`].
    pub unsafe fn invoke_int<F, RunFn>(self, run_fn: RunFn) -> Result<i32>
    where
        F: Copy,
        RunFn: FnOnce(F) -> i32,
    {
        // SAFETY: upheld by the caller
        unsafe { self.invoke::<F, i32, _, _>(run_fn, |ret| *ret < 0) }
    }
}
