//! Runtime plumbing for a Rust binding of the libvirt C API.
//!
//! Native entry points are resolved lazily, by name, from a library opened
//! at run time, so a program built against this crate starts even when the
//! library is missing or older than expected. Native events are routed back
//! to Rust closures through a table of integer handles: the native side only
//! ever sees the handle, smuggled through its user-data pointer.
#![warn(missing_docs)]

/// Calling resolved native functions with tracing and last-error capture
#[deny(dead_code, missing_docs, unused_mut)]
pub mod call;
/// The callback handle table, typed events and the native trampolines
#[deny(dead_code, missing_docs, unused_mut)]
pub mod callbacks;
/// Dealing with errors, including errors reported by the native library
#[deny(dead_code, missing_docs, unused_mut)]
pub(crate) mod error;
/// Native data shapes: opaque pointers, error records and the
/// callback-taking entry points
#[deny(dead_code, missing_docs, unused_mut)]
pub mod native;
/// Opening the native library and resolving symbols from it
#[deny(dead_code, missing_docs, unused_mut)]
pub mod resolver;
/// Registering Rust closures as native event callbacks
#[deny(dead_code, missing_docs, unused_mut)]
pub mod subscription;
/// In-memory stand-ins for the native library
#[cfg(test)]
pub(crate) mod testing;

/// The re-export for the `Binding` type
pub use call::Binding;
/// The re-export for the `NativeCall` type
pub use call::NativeCall;
/// The re-export for the `CallbackRegistry` type
pub use callbacks::CallbackRegistry;
/// The re-export for the `Event` type
pub use callbacks::Event;
/// The re-export for the `HandleId` type
pub use callbacks::HandleId;
/// The re-export for the `Result` type
pub use error::Result;
/// The re-export for the `VirtBridgeError` type
pub use error::VirtBridgeError;
/// The re-export for the `NativeError` type
pub use native::NativeError;
/// The re-export for the `NativeLibrary` type
pub use resolver::NativeLibrary;
/// The re-export for the `LibraryVersion` type
pub use resolver::LibraryVersion;
/// The re-export for the `LoaderConfig` type
pub use resolver::LoaderConfig;
/// The re-export for the `SymbolResolver` type
pub use resolver::SymbolResolver;
/// The re-export for the `EventLoopImpl` trait
pub use subscription::EventLoopImpl;
/// The re-export for the `EventSubscriptions` type
pub use subscription::EventSubscriptions;
/// The re-export for the `SubscriptionId` type
pub use subscription::SubscriptionId;
/// The re-export for the `TimerId` type
pub use subscription::TimerId;
/// The re-export for the `WatchId` type
pub use subscription::WatchId;
