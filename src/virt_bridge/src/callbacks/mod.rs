/// Typed event records and their decoding from raw trampoline arguments
pub mod events;
/// Opaque handle ids smuggled through the native user-data pointer
pub mod handle;
/// Native calls that expect an answer
pub mod invocation;
/// The handle table and dispatch
pub mod registry;
/// Static access to a registry from inside trampolines
pub mod source;
/// The `extern "C"` functions registered with the native library
pub mod trampolines;

pub use events::{CallbackKind, Event, EventFamily, EventRecord, RawArg, RawEvent};
pub use handle::HandleId;
pub use invocation::{Invocation, NativeHandleCallback, NativeTimeoutCallback};
pub use registry::{CallbackRegistry, CallHandler, EventHandler, ReleaseCause};
pub use source::{GlobalRegistry, RegistrySource};
