use std::ffi::{c_char, c_int, c_longlong, c_uint, c_ulonglong, c_void};

use crate::callbacks::events::{CredentialType, GraphicsAddressFamily};
use crate::callbacks::trampolines::AuthCallback;
use crate::native::error::opt_string;

/// `VIR_TYPED_PARAM_FIELD_LENGTH`
pub const TYPED_PARAM_FIELD_LENGTH: usize = 80;
/// `VIR_TYPED_PARAM_INT`
pub const VIR_TYPED_PARAM_INT: c_int = 1;
/// `VIR_TYPED_PARAM_UINT`
pub const VIR_TYPED_PARAM_UINT: c_int = 2;
/// `VIR_TYPED_PARAM_LLONG`
pub const VIR_TYPED_PARAM_LLONG: c_int = 3;
/// `VIR_TYPED_PARAM_ULLONG`
pub const VIR_TYPED_PARAM_ULLONG: c_int = 4;
/// `VIR_TYPED_PARAM_DOUBLE`
pub const VIR_TYPED_PARAM_DOUBLE: c_int = 5;
/// `VIR_TYPED_PARAM_BOOLEAN`
pub const VIR_TYPED_PARAM_BOOLEAN: c_int = 6;
/// `VIR_TYPED_PARAM_STRING`
pub const VIR_TYPED_PARAM_STRING: c_int = 7;

/// The value union of the native `virTypedParameter`
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(missing_docs)]
pub union RawTypedParamValue {
    pub i: c_int,
    pub ui: c_uint,
    pub l: c_longlong,
    pub ul: c_ulonglong,
    pub d: f64,
    pub b: c_char,
    pub s: *mut c_char,
}

/// Layout of the native `virTypedParameter` struct.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawTypedParameter {
    /// NUL-padded parameter name
    pub field: [c_char; TYPED_PARAM_FIELD_LENGTH],
    /// Which member of `value` is set, one of the `VIR_TYPED_PARAM_*` codes
    pub kind: c_int,
    /// The value
    pub value: RawTypedParamValue,
}

impl RawTypedParameter {
    /// Build a parameter named `field`, truncated to fit with its NUL.
    pub fn new(field: &str, kind: c_int, value: RawTypedParamValue) -> Self {
        let mut raw = [0 as c_char; TYPED_PARAM_FIELD_LENGTH];
        for (dst, src) in raw
            .iter_mut()
            .zip(field.bytes().take(TYPED_PARAM_FIELD_LENGTH - 1))
        {
            *dst = src as c_char;
        }
        Self {
            field: raw,
            kind,
            value,
        }
    }
}

/// The value of one typed parameter
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum TypedParamValue {
    Int(i32),
    UInt(u32),
    LLong(i64),
    ULLong(u64),
    Double(f64),
    Boolean(bool),
    String(String),
    /// A type code this crate does not know; the value is not read
    Unknown(i32),
}

/// An owned copy of a native typed parameter
#[derive(Debug, Clone, PartialEq)]
pub struct TypedParam {
    /// The parameter name
    pub field: String,
    /// The parameter value
    pub value: TypedParamValue,
}

impl TypedParam {
    /// Copy `raw` into an owned parameter.
    ///
    /// # Safety
    ///
    /// `raw.kind` must name the member of `raw.value` that is set, and a
    /// string member must be null or NUL-terminated.
    pub unsafe fn from_raw(raw: &RawTypedParameter) -> Self {
        let bytes: Vec<u8> = raw
            .field
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        let field = String::from_utf8_lossy(&bytes).into_owned();
        // SAFETY: `kind` selects the initialised member per the caller
        let value = unsafe {
            match raw.kind {
                VIR_TYPED_PARAM_INT => TypedParamValue::Int(raw.value.i),
                VIR_TYPED_PARAM_UINT => TypedParamValue::UInt(raw.value.ui),
                VIR_TYPED_PARAM_LLONG => TypedParamValue::LLong(raw.value.l),
                VIR_TYPED_PARAM_ULLONG => TypedParamValue::ULLong(raw.value.ul),
                VIR_TYPED_PARAM_DOUBLE => TypedParamValue::Double(raw.value.d),
                VIR_TYPED_PARAM_BOOLEAN => TypedParamValue::Boolean(raw.value.b != 0),
                VIR_TYPED_PARAM_STRING => {
                    TypedParamValue::String(opt_string(raw.value.s).unwrap_or_default())
                }
                other => TypedParamValue::Unknown(other),
            }
        };
        Self { field, value }
    }
}

/// Copy a native typed parameter array. A null array or a non-positive
/// count gives an empty list.
///
/// # Safety
///
/// A non-null `params` points at `count` parameters, each satisfying
/// [`TypedParam::from_raw`].
pub unsafe fn typed_params(params: *const RawTypedParameter, count: c_int) -> Vec<TypedParam> {
    if params.is_null() || count <= 0 {
        return Vec::new();
    }
    // SAFETY: upheld by the caller
    let raw = unsafe { std::slice::from_raw_parts(params, count as usize) };
    raw.iter()
        // SAFETY: upheld by the caller
        .map(|p| unsafe { TypedParam::from_raw(p) })
        .collect()
}

/// Layout of the native `virDomainEventGraphicsAddress` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawGraphicsAddress {
    /// A `virDomainEventGraphicsAddressType` code
    pub family: c_int,
    /// Address of the node
    pub node: *const c_char,
    /// Port or service name
    pub service: *const c_char,
}

/// Layout of the native `virDomainEventGraphicsSubjectIdentity` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawGraphicsSubjectIdentity {
    /// Type of identity
    pub kind: *const c_char,
    /// Identity value
    pub name: *const c_char,
}

/// Layout of the native `virDomainEventGraphicsSubject` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawGraphicsSubject {
    /// Number of identities
    pub nidentity: c_int,
    /// Array of identities
    pub identities: *const RawGraphicsSubjectIdentity,
}

/// One end of a graphics client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsAddress {
    /// Address family
    pub family: GraphicsAddressFamily,
    /// Address of the node, such as an IP
    pub node: String,
    /// Port or service name
    pub service: String,
}

impl GraphicsAddress {
    /// Copy a native address; `None` for null.
    ///
    /// # Safety
    ///
    /// `raw` is null or points at an address whose strings are null or
    /// NUL-terminated.
    pub unsafe fn from_raw(raw: *const RawGraphicsAddress) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        // SAFETY: upheld by the caller
        unsafe {
            let raw = &*raw;
            Some(Self {
                family: raw.family.into(),
                node: opt_string(raw.node).unwrap_or_default(),
                service: opt_string(raw.service).unwrap_or_default(),
            })
        }
    }
}

/// An identity of the graphics client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsSubjectIdentity {
    /// Type of identity, such as `x509dname`
    pub kind: String,
    /// Identity value
    pub name: String,
}

/// Copy the identities of a native graphics subject. A null subject gives
/// an empty list.
///
/// # Safety
///
/// `raw` is null or points at a subject whose array holds `nidentity`
/// entries with null or NUL-terminated strings.
pub unsafe fn graphics_identities(raw: *const RawGraphicsSubject) -> Vec<GraphicsSubjectIdentity> {
    if raw.is_null() {
        return Vec::new();
    }
    // SAFETY: upheld by the caller
    let subject = unsafe { &*raw };
    if subject.identities.is_null() || subject.nidentity <= 0 {
        return Vec::new();
    }
    // SAFETY: upheld by the caller
    let identities =
        unsafe { std::slice::from_raw_parts(subject.identities, subject.nidentity as usize) };
    identities
        .iter()
        .map(|id| GraphicsSubjectIdentity {
            // SAFETY: upheld by the caller
            kind: unsafe { opt_string(id.kind) }.unwrap_or_default(),
            // SAFETY: upheld by the caller
            name: unsafe { opt_string(id.name) }.unwrap_or_default(),
        })
        .collect()
}

/// Layout of the native `virConnectCredential` struct.
#[repr(C)]
#[derive(Debug)]
pub struct RawConnectCredential {
    /// A `virConnectCredentialType` code
    pub kind: c_int,
    /// Prompt to show to the user
    pub prompt: *const c_char,
    /// Additional challenge to show
    pub challenge: *const c_char,
    /// Optional default result
    pub defresult: *const c_char,
    /// Result, allocated with `malloc` and freed by the library
    pub result: *mut c_char,
    /// Length of `result`
    pub resultlen: c_uint,
}

/// Layout of the native `virConnectAuth` struct.
#[repr(C)]
#[derive(Debug)]
pub struct RawConnectAuth {
    /// The credential types the callback supports
    pub credtype: *mut c_int,
    /// Number of entries in `credtype`
    pub ncredtype: c_uint,
    /// The callback collecting credentials
    pub cb: AuthCallback,
    /// User data passed to `cb`
    pub cbdata: *mut c_void,
}

/// One credential the library asks for while opening a connection. The
/// callback fills in `result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// What is being asked for
    pub kind: CredentialType,
    /// Prompt to show to the user
    pub prompt: String,
    /// Additional challenge to show
    pub challenge: Option<String>,
    /// Default result, if any
    pub default_result: Option<String>,
    /// The answer, `None` to leave it unset
    pub result: Option<String>,
}

impl Credential {
    /// Copy a native credential request.
    ///
    /// # Safety
    ///
    /// The string pointers of `raw` are null or NUL-terminated.
    pub unsafe fn from_raw(raw: &RawConnectCredential) -> Self {
        // SAFETY: upheld by the caller
        unsafe {
            Self {
                kind: raw.kind.into(),
                prompt: opt_string(raw.prompt).unwrap_or_default(),
                challenge: opt_string(raw.challenge),
                default_result: opt_string(raw.defresult),
                result: None,
            }
        }
    }

    /// Store `self.result` into `raw` in a `malloc`ed buffer the library
    /// will free. Returns `false` when the allocation fails.
    pub(crate) fn write_result(&self, raw: &mut RawConnectCredential) -> bool {
        let result = match &self.result {
            Some(result) => result.as_bytes(),
            None => return true,
        };
        let len = match c_uint::try_from(result.len()) {
            Ok(len) => len,
            Err(_) => return false,
        };
        // SAFETY: plain allocation, checked for null below
        let buf = unsafe { libc::malloc(result.len() + 1) } as *mut c_char;
        if buf.is_null() {
            return false;
        }
        // SAFETY: `buf` has room for the bytes and the terminator
        unsafe {
            std::ptr::copy_nonoverlapping(result.as_ptr() as *const c_char, buf, result.len());
            *buf.add(result.len()) = 0;
        }
        raw.result = buf;
        raw.resultlen = len;
        true
    }
}
