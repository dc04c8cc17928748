#![allow(dead_code)]
use std::ffi::{c_char, c_int};
use std::sync::Arc;

use virt_bridge::{LoaderConfig, SymbolResolver};
use virt_bridge_testing::{host_c_library, MISSING_LIBRARY};

pub type StrlenFn = unsafe extern "C" fn(*const c_char) -> libc::size_t;
pub type AtoiFn = unsafe extern "C" fn(*const c_char) -> c_int;

/// A resolver over the host C runtime
pub fn libc_resolver() -> Arc<SymbolResolver> {
    Arc::new(SymbolResolver::new(&LoaderConfig {
        library_path: Some(host_c_library()),
        candidates: vec![],
        assume_version: None,
        ..LoaderConfig::default()
    }))
}

/// A resolver whose library can never be opened
pub fn missing_resolver() -> Arc<SymbolResolver> {
    Arc::new(SymbolResolver::new(&LoaderConfig {
        library_path: Some(MISSING_LIBRARY.into()),
        candidates: vec![],
        assume_version: None,
        ..LoaderConfig::default()
    }))
}
