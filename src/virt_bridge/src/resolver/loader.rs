use std::ffi::{c_void, CStr};
use std::mem::ManuallyDrop;
use std::path::PathBuf;

use libloading::{Library, Symbol};
use tracing::{debug, info, instrument, Span};

/// The address of a resolved native entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddr(usize);

impl SymbolAddr {
    /// Wrap a raw address. Returns `None` for null.
    pub fn new(addr: *const c_void) -> Option<Self> {
        if addr.is_null() {
            None
        } else {
            Some(Self(addr as usize))
        }
    }

    /// The raw address
    pub fn as_ptr(&self) -> *const c_void {
        self.0 as *const c_void
    }
}

/// Opens the native library.
pub trait LibraryLoader: Send + Sync {
    /// Open the library. The error is a human readable reason.
    fn load(&self) -> std::result::Result<Box<dyn LoadedLibrary>, String>;
}

/// An opened native library.
pub trait LoadedLibrary: Send + Sync {
    /// Look up `name`, returning `None` when it is not exported.
    fn lookup(&self, name: &CStr) -> Option<SymbolAddr>;
}

/// Loads the library through the platform dynamic loader, trying each
/// candidate in turn.
#[derive(Debug, Clone)]
pub struct DlopenLoader {
    candidates: Vec<PathBuf>,
}

impl DlopenLoader {
    /// Create a loader that tries `candidates` in order
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }
}

impl LibraryLoader for DlopenLoader {
    #[instrument(skip(self), parent = Span::current(), level = "Trace")]
    fn load(&self) -> std::result::Result<Box<dyn LoadedLibrary>, String> {
        if self.candidates.is_empty() {
            return Err("no library candidates configured".to_string());
        }
        let mut failures = Vec::with_capacity(self.candidates.len());
        for path in &self.candidates {
            // SAFETY: running the library's initialisers is the point of
            // loading it.
            match unsafe { Library::new(path) } {
                Ok(library) => {
                    info!("loaded native library {}", path.display());
                    return Ok(Box::new(DlopenLibrary {
                        path: path.clone(),
                        library: ManuallyDrop::new(library),
                    }));
                }
                Err(e) => {
                    debug!("could not load {}: {}", path.display(), e);
                    failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }
        Err(failures.join("; "))
    }
}

/// A library opened by [`DlopenLoader`]. It is never closed, so resolved
/// addresses stay valid for the life of the process.
pub struct DlopenLibrary {
    path: PathBuf,
    library: ManuallyDrop<Library>,
}

impl std::fmt::Debug for DlopenLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DlopenLibrary")
            .field("path", &self.path)
            .finish()
    }
}

impl LoadedLibrary for DlopenLibrary {
    fn lookup(&self, name: &CStr) -> Option<SymbolAddr> {
        // SAFETY: the symbol is only read as an address here; callers cast it
        // to the expected signature.
        let symbol: Symbol<*const c_void> = match unsafe { self.library.get(name.to_bytes_with_nul()) } {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!("lookup of {:?} in {} failed: {}", name, self.path.display(), e);
                return None;
            }
        };
        SymbolAddr::new(*symbol)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{DlopenLoader, LibraryLoader};

    #[test]
    fn every_failed_candidate_is_reported() {
        let loader = DlopenLoader::new(vec![
            PathBuf::from("/nonexistent/libvirt-a.so"),
            PathBuf::from("/nonexistent/libvirt-b.so"),
        ]);
        let reason = loader.load().err().unwrap_or_default();
        assert!(reason.contains("/nonexistent/libvirt-a.so"));
        assert!(reason.contains("/nonexistent/libvirt-b.so"));
    }

    #[test]
    fn empty_candidate_list_is_refused() {
        let reason = DlopenLoader::new(Vec::new()).load().err().unwrap_or_default();
        assert_eq!(reason, "no library candidates configured");
    }
}
