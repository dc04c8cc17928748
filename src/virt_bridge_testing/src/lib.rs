// This crate contains testing utilities which need to be shared across the
// crates in this project.
use std::path::PathBuf;

use cfg_if::cfg_if;
use tracing_subscriber::EnvFilter;

/// A `log` logger that keeps every record it is given
pub mod logger;
/// A `tracing` subscriber that keeps every span and event as JSON
pub mod subscriber;

/// A library name no platform loader will find
pub const MISSING_LIBRARY: &str = "libvirt-bridge-missing.so.0";

/// The C runtime of the host, which every test machine has and which
/// exports well known symbols such as `strlen`.
pub fn host_c_library() -> PathBuf {
    cfg_if! {
        if #[cfg(target_os = "macos")] {
            let path = "/usr/lib/libSystem.B.dylib";
        } else if #[cfg(windows)] {
            let path = "msvcrt.dll";
        } else {
            let path = "libc.so.6";
        }
    }
    PathBuf::from(path)
}

/// Install a formatting subscriber filtered by `RUST_LOG`, for benchmarks
/// and manual runs. Does nothing if a global subscriber is already set.
pub fn init_fmt_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
