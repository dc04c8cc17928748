use once_cell::sync::Lazy;

use super::registry::CallbackRegistry;

/// Names the registry a set of trampolines dispatches into.
///
/// Trampolines are plain `extern "C"` functions, so the registry cannot be
/// passed to them at runtime. They are instead generic over a
/// `RegistrySource` and reach it statically.
pub trait RegistrySource: 'static {
    /// The registry to dispatch into
    fn registry() -> &'static CallbackRegistry;
}

static GLOBAL_REGISTRY: Lazy<CallbackRegistry> = Lazy::new(CallbackRegistry::new);

/// The process-wide registry used by production bindings
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRegistry;

impl RegistrySource for GlobalRegistry {
    fn registry() -> &'static CallbackRegistry {
        &GLOBAL_REGISTRY
    }
}
