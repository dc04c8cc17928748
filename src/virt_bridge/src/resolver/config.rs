use std::path::PathBuf;

use cfg_if::cfg_if;
use serde::Deserialize;
use tracing::{instrument, Span};

use super::availability::LibraryVersion;
use crate::{new_error, Result};

/// Where to find the native library and which version to assume of it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LoaderConfig {
    /// An explicit path to the library. When set it is tried before any of
    /// the `candidates`.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    /// Library names or paths to try, in order.
    #[serde(default = "LoaderConfig::default_candidates")]
    pub candidates: Vec<PathBuf>,
    /// Library names or paths to try for the QEMU specific entry points.
    #[serde(default = "LoaderConfig::default_qemu_candidates")]
    pub qemu_candidates: Vec<PathBuf>,
    /// Library names or paths to try for the administration entry points.
    #[serde(default = "LoaderConfig::default_admin_candidates")]
    pub admin_candidates: Vec<PathBuf>,
    /// When set, symbols introduced after this version fail with
    /// `SymbolUnavailable` without consulting the library.
    #[serde(default)]
    pub assume_version: Option<LibraryVersion>,
}

impl LoaderConfig {
    /// The prefix of the environment variables read by [`Self::from_env`]
    pub const ENV_PREFIX: &'static str = "VIRT_BRIDGE_";

    /// Build a configuration from `VIRT_BRIDGE_LIBRARY_PATH`,
    /// `VIRT_BRIDGE_CANDIDATES`, `VIRT_BRIDGE_QEMU_CANDIDATES`,
    /// `VIRT_BRIDGE_ADMIN_CANDIDATES` (all comma separated) and
    /// `VIRT_BRIDGE_ASSUME_VERSION`. Unset variables take their defaults.
    #[instrument(err(Debug), parent = Span::current(), level = "Trace")]
    pub fn from_env() -> Result<Self> {
        envy::prefixed(Self::ENV_PREFIX)
            .from_env::<LoaderConfig>()
            .map_err(|e| new_error!("invalid loader configuration in environment: {}", e))
    }

    /// The names the platform's dynamic loader is most likely to resolve.
    pub fn default_candidates() -> Vec<PathBuf> {
        cfg_if! {
            if #[cfg(target_os = "macos")] {
                let names: &[&str] = &["libvirt.0.dylib", "libvirt.dylib"];
            } else if #[cfg(windows)] {
                let names: &[&str] = &["libvirt-0.dll"];
            } else {
                let names: &[&str] = &["libvirt.so.0", "libvirt.so"];
            }
        }
        names.iter().map(PathBuf::from).collect()
    }

    /// Default names for the QEMU specific library
    pub fn default_qemu_candidates() -> Vec<PathBuf> {
        cfg_if! {
            if #[cfg(target_os = "macos")] {
                let names: &[&str] = &["libvirt-qemu.0.dylib", "libvirt-qemu.dylib"];
            } else if #[cfg(windows)] {
                let names: &[&str] = &["libvirt-qemu-0.dll"];
            } else {
                let names: &[&str] = &["libvirt-qemu.so.0", "libvirt-qemu.so"];
            }
        }
        names.iter().map(PathBuf::from).collect()
    }

    /// Default names for the administration library
    pub fn default_admin_candidates() -> Vec<PathBuf> {
        cfg_if! {
            if #[cfg(target_os = "macos")] {
                let names: &[&str] = &["libvirt-admin.0.dylib", "libvirt-admin.dylib"];
            } else if #[cfg(windows)] {
                let names: &[&str] = &["libvirt-admin-0.dll"];
            } else {
                let names: &[&str] = &["libvirt-admin.so.0", "libvirt-admin.so"];
            }
        }
        names.iter().map(PathBuf::from).collect()
    }

    /// Every path the loader should try, explicit path first.
    pub fn search_order(&self) -> Vec<PathBuf> {
        self.library_path
            .iter()
            .chain(self.candidates.iter())
            .cloned()
            .collect()
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            candidates: Self::default_candidates(),
            qemu_candidates: Self::default_qemu_candidates(),
            admin_candidates: Self::default_admin_candidates(),
            assume_version: None,
        }
    }
}
