use std::ffi::c_void;
use std::fmt;

macro_rules! opaque_ptr {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(*mut c_void);

        impl $name {
            /// Wrap a raw pointer handed out by the native library.
            pub fn from_raw(ptr: *mut c_void) -> Self {
                Self(ptr)
            }

            /// A null pointer, as passed to native calls that accept "any".
            pub fn null() -> Self {
                Self(std::ptr::null_mut())
            }

            /// The raw pointer for passing back into native calls.
            pub fn as_raw(&self) -> *mut c_void {
                self.0
            }

            /// Whether the pointer is null
            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }

            /// The pointer's address, usable as a map key.
            pub fn addr(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:p})", stringify!($name), self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }

        // SAFETY: the wrapped pointer is an opaque token owned by the native
        // library, which documents its objects as safe to use from any thread.
        // Nothing on the Rust side dereferences it.
        unsafe impl Send for $name {}
        // SAFETY: see the `Send` impl above.
        unsafe impl Sync for $name {}
    };
}

opaque_ptr!(
    /// A `virConnectPtr`
    ConnectPtr
);
opaque_ptr!(
    /// A `virDomainPtr`
    DomainPtr
);
opaque_ptr!(
    /// A `virNetworkPtr`
    NetworkPtr
);
opaque_ptr!(
    /// A `virStoragePoolPtr`
    StoragePoolPtr
);
opaque_ptr!(
    /// A `virNodeDevicePtr`
    NodeDevicePtr
);
opaque_ptr!(
    /// A `virSecretPtr`
    SecretPtr
);
opaque_ptr!(
    /// A `virStreamPtr`
    StreamPtr
);
opaque_ptr!(
    /// A `virAdmConnectPtr`, a connection opened through the admin library
    AdmConnectPtr
);

/// The object an event is about.
///
/// Connection close, timer and handle-watch events are not about any object
/// and carry `Subject::None`. Stream events carry their stream and admin
/// connection close events carry the admin connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    /// No subject
    None,
    /// A domain
    Domain(DomainPtr),
    /// A virtual network
    Network(NetworkPtr),
    /// A storage pool
    StoragePool(StoragePoolPtr),
    /// A host device
    NodeDevice(NodeDevicePtr),
    /// A secret
    Secret(SecretPtr),
    /// A data stream
    Stream(StreamPtr),
    /// An admin connection
    AdmConnect(AdmConnectPtr),
}

impl Subject {
    /// The raw pointer of the subject, null for `Subject::None`.
    pub fn as_raw(&self) -> *mut c_void {
        match self {
            Subject::None => std::ptr::null_mut(),
            Subject::Domain(p) => p.as_raw(),
            Subject::Network(p) => p.as_raw(),
            Subject::StoragePool(p) => p.as_raw(),
            Subject::NodeDevice(p) => p.as_raw(),
            Subject::Secret(p) => p.as_raw(),
            Subject::Stream(p) => p.as_raw(),
            Subject::AdmConnect(p) => p.as_raw(),
        }
    }
}

/// Conversion from a [`Subject`] into the concrete pointer type a typed
/// subscriber expects.
pub trait FromSubject: Sized + Copy + Send + 'static {
    /// Returns `None` when `subject` is of a different family.
    fn from_subject(subject: Subject) -> Option<Self>;
    /// The raw pointer to pass as the registration filter.
    fn as_filter(&self) -> *mut c_void;
}

macro_rules! impl_from_subject {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl FromSubject for $ty {
                fn from_subject(subject: Subject) -> Option<Self> {
                    match subject {
                        Subject::$variant(p) => Some(p),
                        _ => None,
                    }
                }
                fn as_filter(&self) -> *mut c_void {
                    self.as_raw()
                }
            }
        )*
    };
}

impl_from_subject!(
    Domain => DomainPtr,
    Network => NetworkPtr,
    StoragePool => StoragePoolPtr,
    NodeDevice => NodeDevicePtr,
    Secret => SecretPtr,
    Stream => StreamPtr,
    AdmConnect => AdmConnectPtr,
);
