use std::collections::HashMap;
use std::ffi::CString;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, error, instrument, warn, Span};

use crate::{Result, VirtBridgeError};

/// Which entry points exist in which library version
pub mod availability;
/// Where the native library is looked for
pub mod config;
/// Opening the native library and looking up names in it
pub mod loader;

pub use availability::LibraryVersion;
pub use config::LoaderConfig;
pub use loader::{DlopenLoader, LibraryLoader, LoadedLibrary, SymbolAddr};

type SymbolCell = Arc<OnceCell<Result<SymbolAddr>>>;
type LoadedCell = OnceCell<std::result::Result<Box<dyn LoadedLibrary>, String>>;

/// The native libraries entry points can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeLibrary {
    /// The main library
    Libvirt,
    /// The QEMU specific library
    Qemu,
    /// The administration library
    Admin,
}

impl NativeLibrary {
    /// The library that exports `name`
    pub fn for_symbol(name: &str) -> Self {
        if name.starts_with("virAdm") {
            NativeLibrary::Admin
        } else if name.contains("Qemu") {
            NativeLibrary::Qemu
        } else {
            NativeLibrary::Libvirt
        }
    }
}

impl std::fmt::Display for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NativeLibrary::Libvirt => "libvirt",
            NativeLibrary::Qemu => "libvirt-qemu",
            NativeLibrary::Admin => "libvirt-admin",
        };
        f.write_str(name)
    }
}

struct LibrarySlot {
    loader: Box<dyn LibraryLoader>,
    loaded: LoadedCell,
}

impl LibrarySlot {
    fn new(loader: Box<dyn LibraryLoader>) -> Self {
        Self {
            loader,
            loaded: OnceCell::new(),
        }
    }
}

/// Resolves native entry points by name on first use.
///
/// Each library is opened at most once and every name is looked up at most
/// once; both outcomes, including failures, are cached for the lifetime of
/// the resolver. Concurrent first requests for the same name wait for a
/// single attempt and all observe its result. Names are routed to their
/// library by [`NativeLibrary::for_symbol`].
pub struct SymbolResolver {
    libraries: HashMap<NativeLibrary, LibrarySlot>,
    assume_version: Option<LibraryVersion>,
    symbols: Mutex<HashMap<String, SymbolCell>>,
}

static GLOBAL: Lazy<Arc<SymbolResolver>> = Lazy::new(|| {
    let config = LoaderConfig::from_env().unwrap_or_else(|e| {
        warn!("{}, falling back to the default loader configuration", e);
        LoaderConfig::default()
    });
    Arc::new(SymbolResolver::new(&config))
});

impl SymbolResolver {
    /// A resolver that opens the libraries with the platform loader as
    /// described by `config`.
    pub fn new(config: &LoaderConfig) -> Self {
        Self::with_loader(
            Box::new(DlopenLoader::new(config.search_order())),
            config.assume_version,
        )
        .with_library(
            NativeLibrary::Qemu,
            Box::new(DlopenLoader::new(config.qemu_candidates.clone())),
        )
        .with_library(
            NativeLibrary::Admin,
            Box::new(DlopenLoader::new(config.admin_candidates.clone())),
        )
    }

    /// A resolver over an arbitrary loader for the main library. Names from
    /// the other libraries fail with `LibraryNotLoadable` until a loader is
    /// added for them with [`Self::with_library`].
    pub fn with_loader(loader: Box<dyn LibraryLoader>, assume_version: Option<LibraryVersion>) -> Self {
        let mut libraries = HashMap::new();
        libraries.insert(NativeLibrary::Libvirt, LibrarySlot::new(loader));
        Self {
            libraries,
            assume_version,
            symbols: Mutex::new(HashMap::new()),
        }
    }

    /// Open `library` with `loader`, replacing any loader set for it before.
    pub fn with_library(mut self, library: NativeLibrary, loader: Box<dyn LibraryLoader>) -> Self {
        self.libraries.insert(library, LibrarySlot::new(loader));
        self
    }

    /// The process-wide resolver, configured from the environment on first
    /// use.
    pub fn global() -> Arc<SymbolResolver> {
        GLOBAL.clone()
    }

    /// The version the resolver gates symbols against, if any
    pub fn assume_version(&self) -> Option<LibraryVersion> {
        self.assume_version
    }

    /// Resolve `name` to its address.
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn resolve_addr(&self, name: &str) -> Result<SymbolAddr> {
        let cell = {
            // a poisoned map is still consistent: entries are only ever inserted
            let mut symbols = self.symbols.lock().unwrap_or_else(PoisonError::into_inner);
            symbols.entry(name.to_string()).or_default().clone()
        };
        cell.get_or_init(|| self.resolve_uncached(name)).clone()
    }

    /// Resolve `name` and reinterpret its address as `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type whose signature matches the
    /// native declaration of `name`.
    pub unsafe fn resolve<F: Copy>(&self, name: &str) -> Result<F> {
        let addr = self.resolve_addr(name)?;
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const ()>());
        let ptr = addr.as_ptr();
        // SAFETY: `F` is a pointer sized function pointer per the caller
        Ok(unsafe { std::mem::transmute_copy::<*const std::ffi::c_void, F>(&ptr) })
    }

    /// Whether the main library has been opened successfully. Does not
    /// attempt to open it.
    pub fn is_loaded(&self) -> bool {
        self.is_library_loaded(NativeLibrary::Libvirt)
    }

    /// Whether `library` has been opened successfully
    pub fn is_library_loaded(&self, library: NativeLibrary) -> bool {
        self.libraries
            .get(&library)
            .map_or(false, |slot| matches!(slot.loaded.get(), Some(Ok(_))))
    }

    fn library(&self, library: NativeLibrary) -> Result<&dyn LoadedLibrary> {
        let slot = self.libraries.get(&library).ok_or_else(|| {
            VirtBridgeError::LibraryNotLoadable(format!("no loader configured for {}", library))
        })?;
        let loaded = slot.loaded.get_or_init(|| {
            let res = slot.loader.load();
            if let Err(ref reason) = res {
                error!("native library not loadable: {}", reason);
            }
            res
        });
        match loaded {
            Ok(lib) => Ok(lib.as_ref()),
            Err(reason) => Err(VirtBridgeError::LibraryNotLoadable(reason.clone())),
        }
    }

    fn resolve_uncached(&self, name: &str) -> Result<SymbolAddr> {
        availability::check(name, self.assume_version)?;
        let library = self.library(NativeLibrary::for_symbol(name))?;
        let c_name = CString::new(name)?;
        match library.lookup(&c_name) {
            Some(addr) => {
                debug!("resolved {} at {:p}", name, addr.as_ptr());
                Ok(addr)
            }
            None => {
                debug!("symbol {} not found", name);
                Err(VirtBridgeError::SymbolNotFound(name.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for SymbolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolResolver")
            .field("assume_version", &self.assume_version)
            .field("loaded", &self.is_loaded())
            .field("libraries", &self.libraries.keys().collect::<Vec<_>>())
            .finish()
    }
}
