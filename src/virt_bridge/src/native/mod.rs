/// Native error records and the last-error snapshot
pub mod error;
/// The callback-taking native entry points
pub mod event_api;
/// Typed parameters, graphics event structs and auth credentials
pub mod params;
/// Opaque native object pointers
pub mod types;

pub use error::{ErrorLevel, LastErrorSource, NativeError};
pub use event_api::{LibvirtEventApi, NativeEventApi};
pub use params::{Credential, GraphicsAddress, GraphicsSubjectIdentity, TypedParam, TypedParamValue};
pub use types::{
    AdmConnectPtr, ConnectPtr, DomainPtr, FromSubject, NetworkPtr, NodeDevicePtr, SecretPtr,
    StoragePoolPtr, StreamPtr, Subject,
};
