use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::{new_error, Result, VirtBridgeError};

/// A native library version, `major.minor.micro`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct LibraryVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Micro version
    pub micro: u32,
}

impl LibraryVersion {
    /// Create a new version
    pub const fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }

    /// The single-integer encoding `virGetVersion` reports,
    /// `major * 1_000_000 + minor * 1000 + micro`.
    pub fn encoded(&self) -> u64 {
        self.major as u64 * 1_000_000 + self.minor as u64 * 1000 + self.micro as u64
    }

    /// Decode the single-integer encoding produced by [`Self::encoded`].
    pub fn from_encoded(v: u64) -> Self {
        Self {
            major: (v / 1_000_000) as u32,
            minor: ((v % 1_000_000) / 1000) as u32,
            micro: (v % 1000) as u32,
        }
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for LibraryVersion {
    type Err = VirtBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.');
        let mut next = |what: &str| -> Result<u32> {
            match parts.next() {
                None => Ok(0),
                Some(p) => p
                    .parse::<u32>()
                    .map_err(|e| new_error!("invalid {} in version {:?}: {}", what, s, e)),
            }
        };
        let version = Self::new(next("major")?, next("minor")?, next("micro")?);
        if parts.next().is_some() {
            return Err(new_error!("too many components in version {:?}", s));
        }
        Ok(version)
    }
}

impl TryFrom<String> for LibraryVersion {
    type Error = VirtBridgeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// The first library version that exports each entry point this crate
/// resolves by name.
static SINCE: &[(&str, LibraryVersion)] = &[
    ("virGetVersion", LibraryVersion::new(0, 0, 3)),
    ("virCopyLastError", LibraryVersion::new(0, 1, 0)),
    ("virResetError", LibraryVersion::new(0, 1, 0)),
    ("virConnectOpenAuth", LibraryVersion::new(0, 4, 0)),
    ("virEventAddHandle", LibraryVersion::new(0, 5, 0)),
    ("virEventRemoveHandle", LibraryVersion::new(0, 5, 0)),
    ("virEventAddTimeout", LibraryVersion::new(0, 5, 0)),
    ("virEventRemoveTimeout", LibraryVersion::new(0, 5, 0)),
    ("virEventRegisterImpl", LibraryVersion::new(0, 5, 0)),
    ("virStreamEventAddCallback", LibraryVersion::new(0, 7, 2)),
    ("virStreamEventUpdateCallback", LibraryVersion::new(0, 7, 2)),
    ("virStreamEventRemoveCallback", LibraryVersion::new(0, 7, 2)),
    ("virStreamRecvAll", LibraryVersion::new(0, 7, 2)),
    ("virStreamSendAll", LibraryVersion::new(0, 7, 2)),
    ("virConnectDomainEventRegisterAny", LibraryVersion::new(0, 8, 0)),
    ("virConnectDomainEventDeregisterAny", LibraryVersion::new(0, 8, 0)),
    ("virEventRegisterDefaultImpl", LibraryVersion::new(0, 9, 0)),
    ("virEventRunDefaultImpl", LibraryVersion::new(0, 9, 0)),
    ("virConnectRegisterCloseCallback", LibraryVersion::new(0, 10, 0)),
    ("virConnectUnregisterCloseCallback", LibraryVersion::new(0, 10, 0)),
    ("virConnectNetworkEventRegisterAny", LibraryVersion::new(1, 2, 1)),
    ("virConnectNetworkEventDeregisterAny", LibraryVersion::new(1, 2, 1)),
    ("virConnectDomainQemuMonitorEventRegister", LibraryVersion::new(1, 2, 3)),
    ("virConnectDomainQemuMonitorEventDeregister", LibraryVersion::new(1, 2, 3)),
    ("virAdmConnectRegisterCloseCallback", LibraryVersion::new(1, 3, 5)),
    ("virAdmConnectUnregisterCloseCallback", LibraryVersion::new(1, 3, 5)),
    ("virConnectStoragePoolEventRegisterAny", LibraryVersion::new(2, 0, 0)),
    ("virConnectStoragePoolEventDeregisterAny", LibraryVersion::new(2, 0, 0)),
    ("virConnectNodeDeviceEventRegisterAny", LibraryVersion::new(2, 2, 0)),
    ("virConnectNodeDeviceEventDeregisterAny", LibraryVersion::new(2, 2, 0)),
    ("virConnectSecretEventRegisterAny", LibraryVersion::new(3, 0, 0)),
    ("virConnectSecretEventDeregisterAny", LibraryVersion::new(3, 0, 0)),
    ("virStreamSparseRecvAll", LibraryVersion::new(3, 4, 0)),
    ("virStreamSparseSendAll", LibraryVersion::new(3, 4, 0)),
];

/// The version that introduced `name`, if it is a known entry point.
pub fn since(name: &str) -> Option<LibraryVersion> {
    SINCE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// Fails with [`VirtBridgeError::SymbolUnavailable`] when `name` was
/// introduced after `assumed`. Unknown names pass.
pub(crate) fn check(name: &str, assumed: Option<LibraryVersion>) -> Result<()> {
    match (assumed, since(name)) {
        (Some(assumed), Some(since)) if since > assumed => Err(VirtBridgeError::SymbolUnavailable {
            name: name.to_string(),
            since,
        }),
        _ => Ok(()),
    }
}
