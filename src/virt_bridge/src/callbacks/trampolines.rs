//! The fixed entry points the native library calls back into.
//!
//! Each trampoline recovers the `HandleId` from the opaque pointer, packs
//! its remaining arguments into `RawArg`s and hands them to the registry
//! named by `P`. Trampolines are grouped by native signature, not by event:
//! the kind stored with the handle decides how the arguments are decoded.
//!
//! Call trampolines answer the native side instead: they build an
//! `Invocation`, hand it to the registry and return the handler's answer.
//! The custom event loop has no user-data pointer and reaches its handle
//! through the registry's event loop slot.

use std::ffi::{c_char, c_int, c_longlong, c_uint, c_ulonglong, c_void, CStr};

use tracing::error;

use super::events::{CallbackKind, EventHandleType, RawArg, RawEvent};
use super::handle::HandleId;
use super::invocation::{Invocation, NativeHandleCallback, NativeTimeoutCallback};
use super::registry::ReleaseCause;
use super::source::RegistrySource;
use crate::native::params::{
    graphics_identities, typed_params, Credential, GraphicsAddress, RawConnectCredential,
    RawGraphicsAddress, RawGraphicsSubject, RawTypedParameter,
};
use crate::native::types::{ConnectPtr, StreamPtr};

/// The erased callback type taken by every `Register*Any` entry point
pub type GenericEventCallback = extern "C" fn(*mut c_void, *mut c_void, *mut c_void);
/// `virFreeCallback`
pub type FreeCallback = extern "C" fn(*mut c_void);
/// `virConnectCloseFunc`
pub type CloseCallback = extern "C" fn(*mut c_void, c_int, *mut c_void);
/// `virEventTimeoutCallback`
pub type TimeoutCallback = extern "C" fn(c_int, *mut c_void);
/// `virEventHandleCallback`
pub type HandleCallback = extern "C" fn(c_int, c_int, c_int, *mut c_void);
/// `virConnectDomainQemuMonitorEventCallback`
pub type QemuMonitorCallback = extern "C" fn(
    *mut c_void,
    *mut c_void,
    *const c_char,
    c_longlong,
    c_uint,
    *const c_char,
    *mut c_void,
);
/// `virStreamEventCallback`
pub type StreamEventCallback = extern "C" fn(*mut c_void, c_int, *mut c_void);
/// `virAdmConnectCloseFunc`
pub type AdmCloseCallback = extern "C" fn(*mut c_void, c_int, *mut c_void);
/// `virStreamSinkFunc`
pub type StreamSinkCallback = extern "C" fn(*mut c_void, *const c_char, usize, *mut c_void) -> c_int;
/// `virStreamSinkHoleFunc`
pub type StreamSinkHoleCallback = extern "C" fn(*mut c_void, c_longlong, *mut c_void) -> c_int;
/// `virStreamSourceFunc`
pub type StreamSourceCallback = extern "C" fn(*mut c_void, *mut c_char, usize, *mut c_void) -> c_int;
/// `virStreamSourceHoleFunc`
pub type StreamSourceHoleCallback =
    extern "C" fn(*mut c_void, *mut c_int, *mut c_longlong, *mut c_void) -> c_int;
/// `virStreamSourceSkipFunc`
pub type StreamSourceSkipCallback = extern "C" fn(*mut c_void, c_longlong, *mut c_void) -> c_int;
/// `virConnectAuthCallbackPtr`
pub type AuthCallback = extern "C" fn(*mut RawConnectCredential, c_uint, *mut c_void) -> c_int;
/// `virEventAddHandleFunc`
pub type AddHandleFunc =
    extern "C" fn(c_int, c_int, HandleCallback, *mut c_void, Option<FreeCallback>) -> c_int;
/// `virEventUpdateHandleFunc`
pub type UpdateHandleFunc = extern "C" fn(c_int, c_int);
/// `virEventRemoveHandleFunc`
pub type RemoveHandleFunc = extern "C" fn(c_int) -> c_int;
/// `virEventAddTimeoutFunc`
pub type AddTimeoutFunc =
    extern "C" fn(c_int, TimeoutCallback, *mut c_void, Option<FreeCallback>) -> c_int;
/// `virEventUpdateTimeoutFunc`
pub type UpdateTimeoutFunc = extern "C" fn(c_int, c_int);
/// `virEventRemoveTimeoutFunc`
pub type RemoveTimeoutFunc = extern "C" fn(c_int) -> c_int;

/// The six functions passed to `virEventRegisterImpl`
#[derive(Debug, Clone, Copy)]
pub struct EventImplCallbacks {
    /// Add a file handle watch
    pub add_handle: AddHandleFunc,
    /// Change the events of a watch
    pub update_handle: UpdateHandleFunc,
    /// Remove a watch
    pub remove_handle: RemoveHandleFunc,
    /// Add a timer
    pub add_timeout: AddTimeoutFunc,
    /// Change the frequency of a timer
    pub update_timeout: UpdateTimeoutFunc,
    /// Remove a timer
    pub remove_timeout: RemoveTimeoutFunc,
}

fn int(v: c_int) -> RawArg<'static> {
    RawArg::Int(v as i64)
}

fn long(v: c_longlong) -> RawArg<'static> {
    RawArg::Int(v as i64)
}

fn uint(v: c_uint) -> RawArg<'static> {
    RawArg::UInt(v as u64)
}

fn ulong(v: c_ulonglong) -> RawArg<'static> {
    RawArg::UInt(v as u64)
}

/// # Safety
///
/// `p` is null or a NUL-terminated string that outlives `'a`.
unsafe fn string<'a>(p: *const c_char) -> RawArg<'a> {
    if p.is_null() {
        RawArg::Str(None)
    } else {
        // SAFETY: upheld by the caller
        RawArg::Str(Some(unsafe { CStr::from_ptr(p) }))
    }
}

/// Never returns. A handle the registry does not know, or arguments that
/// do not fit its kind, mean the table no longer matches what the native
/// library holds, and continuing could run the wrong closure.
fn fatal(msg: &dyn std::fmt::Display) -> ! {
    error!("fatal callback dispatch error: {}", msg);
    std::process::abort()
}

fn dispatch<P: RegistrySource>(conn: ConnectPtr, subject: *mut c_void, args: &[RawArg<'_>], opaque: *mut c_void) {
    let id = match HandleId::from_opaque(opaque) {
        Some(id) => id,
        None => fatal(&"callback invoked with a null opaque pointer"),
    };
    if let Err(e) = P::registry().dispatch(id, &RawEvent::new(conn, subject, args)) {
        fatal(&e);
    }
}

fn invoke<P: RegistrySource>(opaque: *mut c_void, invocation: Invocation<'_>) -> c_int {
    let id = match HandleId::from_opaque(opaque) {
        Some(id) => id,
        None => fatal(&"callback invoked with a null opaque pointer"),
    };
    match P::registry().invoke(id, invocation) {
        Ok(ret) => ret,
        Err(e) => fatal(&e),
    }
}

fn invoke_event_impl<P: RegistrySource>(invocation: Invocation<'_>) -> c_int {
    let id = match P::registry().event_impl() {
        Some(id) => id,
        None => fatal(&"event loop operation with no event loop installed"),
    };
    match P::registry().invoke(id, invocation) {
        Ok(ret) => ret,
        Err(e) => fatal(&e),
    }
}

macro_rules! trampoline {
    ($($name:ident ( $($arg:ident : $ty:ty => $conv:ident),* );)*) => {
        $(
            #[allow(unused_unsafe)]
            extern "C" fn $name<P: RegistrySource>(
                conn: *mut c_void,
                subject: *mut c_void,
                $($arg: $ty,)*
                opaque: *mut c_void,
            ) {
                // SAFETY: string arguments are null or valid for the duration
                // of the callback
                let args = unsafe { [$($conv($arg)),*] };
                dispatch::<P>(ConnectPtr::from_raw(conn), subject, &args, opaque);
            }
        )*
    };
}

extern "C" fn event_generic<P: RegistrySource>(conn: *mut c_void, subject: *mut c_void, opaque: *mut c_void) {
    dispatch::<P>(ConnectPtr::from_raw(conn), subject, &[], opaque);
}

trampoline! {
    event_int(a: c_int => int);
    event_int_int(a: c_int => int, b: c_int => int);
    event_int_int_uint(a: c_int => int, b: c_int => int, c: c_uint => uint);
    event_long(a: c_longlong => long);
    event_ulong(a: c_ulonglong => ulong);
    event_str(a: *const c_char => string);
    event_int_str(a: c_int => int, b: *const c_char => string);
    event_str_int(a: *const c_char => string, b: c_int => int);
    event_str_int_int(a: *const c_char => string, b: c_int => int, c: c_int => int);
    event_str_str_int(a: *const c_char => string, b: *const c_char => string, c: c_int => int);
    event_str_str_int_str(
        a: *const c_char => string,
        b: *const c_char => string,
        c: c_int => int,
        d: *const c_char => string
    );
    event_str_str_str_int(
        a: *const c_char => string,
        b: *const c_char => string,
        c: *const c_char => string,
        d: c_int => int
    );
    event_str_str_ulong_ulong(
        a: *const c_char => string,
        b: *const c_char => string,
        c: c_ulonglong => ulong,
        d: c_ulonglong => ulong
    );
    event_str_long_uint_str(
        a: *const c_char => string,
        b: c_longlong => long,
        c: c_uint => uint,
        d: *const c_char => string
    );
}

#[allow(clippy::too_many_arguments)]
extern "C" fn event_graphics<P: RegistrySource>(
    conn: *mut c_void,
    dom: *mut c_void,
    phase: c_int,
    local: *const RawGraphicsAddress,
    remote: *const RawGraphicsAddress,
    auth_scheme: *const c_char,
    subject: *const RawGraphicsSubject,
    opaque: *mut c_void,
) {
    // SAFETY: the structs and strings are null or valid for the duration of
    // the callback
    let (local, remote, identities, auth_scheme) = unsafe {
        (
            GraphicsAddress::from_raw(local),
            GraphicsAddress::from_raw(remote),
            graphics_identities(subject),
            string(auth_scheme),
        )
    };
    let args = [
        int(phase),
        RawArg::Address(local.as_ref()),
        RawArg::Address(remote.as_ref()),
        auth_scheme,
        RawArg::Identities(&identities),
    ];
    dispatch::<P>(ConnectPtr::from_raw(conn), dom, &args, opaque);
}

extern "C" fn event_params<P: RegistrySource>(
    conn: *mut c_void,
    dom: *mut c_void,
    params: *const RawTypedParameter,
    nparams: c_int,
    opaque: *mut c_void,
) {
    // SAFETY: the array holds `nparams` entries for the duration of the
    // callback
    let params = unsafe { typed_params(params, nparams) };
    dispatch::<P>(ConnectPtr::from_raw(conn), dom, &[RawArg::Params(&params)], opaque);
}

extern "C" fn stream_event<P: RegistrySource>(stream: *mut c_void, events: c_int, opaque: *mut c_void) {
    dispatch::<P>(ConnectPtr::null(), stream, &[int(events)], opaque);
}

extern "C" fn adm_connect_close<P: RegistrySource>(conn: *mut c_void, reason: c_int, opaque: *mut c_void) {
    dispatch::<P>(ConnectPtr::null(), conn, &[int(reason)], opaque);
}

extern "C" fn stream_sink<P: RegistrySource>(
    stream: *mut c_void,
    data: *const c_char,
    nbytes: usize,
    opaque: *mut c_void,
) -> c_int {
    let data: &[u8] = if data.is_null() || nbytes == 0 {
        &[]
    } else {
        // SAFETY: the library passes `nbytes` readable bytes
        unsafe { std::slice::from_raw_parts(data as *const u8, nbytes) }
    };
    let stream = StreamPtr::from_raw(stream);
    invoke::<P>(opaque, Invocation::StreamSink { stream, data })
}

extern "C" fn stream_sink_hole<P: RegistrySource>(
    stream: *mut c_void,
    length: c_longlong,
    opaque: *mut c_void,
) -> c_int {
    let stream = StreamPtr::from_raw(stream);
    invoke::<P>(opaque, Invocation::StreamSinkHole { stream, length })
}

extern "C" fn stream_source<P: RegistrySource>(
    stream: *mut c_void,
    data: *mut c_char,
    nbytes: usize,
    opaque: *mut c_void,
) -> c_int {
    let buf: &mut [u8] = if data.is_null() || nbytes == 0 {
        &mut []
    } else {
        // SAFETY: the library passes a writable buffer of `nbytes` bytes
        unsafe { std::slice::from_raw_parts_mut(data as *mut u8, nbytes) }
    };
    let stream = StreamPtr::from_raw(stream);
    invoke::<P>(opaque, Invocation::StreamSource { stream, buf })
}

extern "C" fn stream_source_hole<P: RegistrySource>(
    stream: *mut c_void,
    in_data_out: *mut c_int,
    length_out: *mut c_longlong,
    opaque: *mut c_void,
) -> c_int {
    let (mut in_data, mut length) = (false, 0i64);
    let ret = invoke::<P>(
        opaque,
        Invocation::StreamSourceHole {
            stream: StreamPtr::from_raw(stream),
            in_data: &mut in_data,
            length: &mut length,
        },
    );
    if ret >= 0 {
        if !in_data_out.is_null() {
            // SAFETY: non-null out pointer supplied by the library
            unsafe { *in_data_out = c_int::from(in_data) };
        }
        if !length_out.is_null() {
            // SAFETY: non-null out pointer supplied by the library
            unsafe { *length_out = length };
        }
    }
    ret
}

extern "C" fn stream_source_skip<P: RegistrySource>(
    stream: *mut c_void,
    length: c_longlong,
    opaque: *mut c_void,
) -> c_int {
    let stream = StreamPtr::from_raw(stream);
    invoke::<P>(opaque, Invocation::StreamSourceSkip { stream, length })
}

extern "C" fn connect_auth<P: RegistrySource>(
    cred: *mut RawConnectCredential,
    ncred: c_uint,
    cbdata: *mut c_void,
) -> c_int {
    let raw: &mut [RawConnectCredential] = if cred.is_null() || ncred == 0 {
        &mut []
    } else {
        // SAFETY: the library passes `ncred` credentials it owns for the
        // duration of the callback
        unsafe { std::slice::from_raw_parts_mut(cred, ncred as usize) }
    };
    let mut creds: Vec<Credential> = raw
        .iter()
        // SAFETY: the credential strings are null or NUL-terminated
        .map(|c| unsafe { Credential::from_raw(c) })
        .collect();
    let ret = invoke::<P>(cbdata, Invocation::Auth { creds: &mut creds });
    if ret < 0 {
        return ret;
    }
    for (cred, raw) in creds.iter().zip(raw.iter_mut()) {
        if !cred.write_result(raw) {
            error!("could not hand the {} credential back to the library", cred.kind);
            return -1;
        }
    }
    ret
}

extern "C" fn impl_add_handle<P: RegistrySource>(
    fd: c_int,
    events: c_int,
    cb: HandleCallback,
    opaque: *mut c_void,
    free: Option<FreeCallback>,
) -> c_int {
    invoke_event_impl::<P>(Invocation::AddHandle {
        fd,
        events: EventHandleType::from_bits_retain(events),
        callback: NativeHandleCallback::new(cb, opaque, free),
    })
}

extern "C" fn impl_update_handle<P: RegistrySource>(watch: c_int, events: c_int) {
    invoke_event_impl::<P>(Invocation::UpdateHandle {
        watch,
        events: EventHandleType::from_bits_retain(events),
    });
}

extern "C" fn impl_remove_handle<P: RegistrySource>(watch: c_int) -> c_int {
    invoke_event_impl::<P>(Invocation::RemoveHandle { watch })
}

extern "C" fn impl_add_timeout<P: RegistrySource>(
    frequency_ms: c_int,
    cb: TimeoutCallback,
    opaque: *mut c_void,
    free: Option<FreeCallback>,
) -> c_int {
    invoke_event_impl::<P>(Invocation::AddTimeout {
        frequency_ms,
        callback: NativeTimeoutCallback::new(cb, opaque, free),
    })
}

extern "C" fn impl_update_timeout<P: RegistrySource>(timer: c_int, frequency_ms: c_int) {
    invoke_event_impl::<P>(Invocation::UpdateTimeout { timer, frequency_ms });
}

extern "C" fn impl_remove_timeout<P: RegistrySource>(timer: c_int) -> c_int {
    invoke_event_impl::<P>(Invocation::RemoveTimeout { timer })
}

extern "C" fn connect_close<P: RegistrySource>(conn: *mut c_void, reason: c_int, opaque: *mut c_void) {
    dispatch::<P>(ConnectPtr::from_raw(conn), std::ptr::null_mut(), &[int(reason)], opaque);
}

extern "C" fn event_timeout<P: RegistrySource>(timer: c_int, opaque: *mut c_void) {
    dispatch::<P>(ConnectPtr::null(), std::ptr::null_mut(), &[int(timer)], opaque);
}

extern "C" fn event_handle<P: RegistrySource>(watch: c_int, fd: c_int, events: c_int, opaque: *mut c_void) {
    dispatch::<P>(
        ConnectPtr::null(),
        std::ptr::null_mut(),
        &[int(watch), int(fd), int(events)],
        opaque,
    );
}

// Unlike dispatch, a surprising free notification is not fatal: the
// registry has already logged it and nothing will run the wrong closure.
extern "C" fn free_opaque<P: RegistrySource>(opaque: *mut c_void) {
    match HandleId::from_opaque(opaque) {
        Some(id) => {
            let _ = P::registry().release(id, ReleaseCause::NativeFreed);
        }
        None => error!("free callback invoked with a null opaque pointer"),
    }
}

macro_rules! erase {
    ($f:expr, $ty:ty) => {{
        let f: $ty = $f;
        // SAFETY: the native library casts registered callbacks back to the
        // signature of the event id they were registered for, which is the
        // signature of `f`. Only the pointer is passed through the erased type.
        unsafe { std::mem::transmute::<$ty, GenericEventCallback>(f) }
    }};
}

/// The trampoline to register for events of `kind`, erased to the
/// callback type the `Register*Any` entry points take. `None` for kinds
/// that are registered through their own entry points.
pub fn event_callback_for<P: RegistrySource>(kind: CallbackKind) -> Option<GenericEventCallback> {
    use CallbackKind as K;

    type Int = extern "C" fn(*mut c_void, *mut c_void, c_int, *mut c_void);
    type IntInt = extern "C" fn(*mut c_void, *mut c_void, c_int, c_int, *mut c_void);
    type IntIntUint = extern "C" fn(*mut c_void, *mut c_void, c_int, c_int, c_uint, *mut c_void);
    type Long = extern "C" fn(*mut c_void, *mut c_void, c_longlong, *mut c_void);
    type Ulong = extern "C" fn(*mut c_void, *mut c_void, c_ulonglong, *mut c_void);
    type Str = extern "C" fn(*mut c_void, *mut c_void, *const c_char, *mut c_void);
    type IntStr = extern "C" fn(*mut c_void, *mut c_void, c_int, *const c_char, *mut c_void);
    type StrInt = extern "C" fn(*mut c_void, *mut c_void, *const c_char, c_int, *mut c_void);
    type StrIntInt = extern "C" fn(*mut c_void, *mut c_void, *const c_char, c_int, c_int, *mut c_void);
    type StrStrInt =
        extern "C" fn(*mut c_void, *mut c_void, *const c_char, *const c_char, c_int, *mut c_void);
    type StrStrIntStr = extern "C" fn(
        *mut c_void,
        *mut c_void,
        *const c_char,
        *const c_char,
        c_int,
        *const c_char,
        *mut c_void,
    );
    type StrStrStrInt = extern "C" fn(
        *mut c_void,
        *mut c_void,
        *const c_char,
        *const c_char,
        *const c_char,
        c_int,
        *mut c_void,
    );
    type Graphics = extern "C" fn(
        *mut c_void,
        *mut c_void,
        c_int,
        *const RawGraphicsAddress,
        *const RawGraphicsAddress,
        *const c_char,
        *const RawGraphicsSubject,
        *mut c_void,
    );
    type Params =
        extern "C" fn(*mut c_void, *mut c_void, *const RawTypedParameter, c_int, *mut c_void);
    type StrStrUlongUlong = extern "C" fn(
        *mut c_void,
        *mut c_void,
        *const c_char,
        *const c_char,
        c_ulonglong,
        c_ulonglong,
        *mut c_void,
    );

    let cb = match kind {
        K::DomainReboot
        | K::DomainControlError
        | K::StoragePoolRefresh
        | K::NodeDeviceUpdate
        | K::SecretValueChanged => event_generic::<P> as GenericEventCallback,
        K::DomainWatchdog
        | K::DomainPmWakeup
        | K::DomainPmSuspend
        | K::DomainPmSuspendDisk
        | K::DomainMigrationIteration => erase!(event_int::<P>, Int),
        K::DomainLifecycle
        | K::DomainAgentLifecycle
        | K::NetworkLifecycle
        | K::StoragePoolLifecycle
        | K::NodeDeviceLifecycle
        | K::SecretLifecycle => erase!(event_int_int::<P>, IntInt),
        K::DomainMemoryFailure => erase!(event_int_int_uint::<P>, IntIntUint),
        K::DomainRtcChange => erase!(event_long::<P>, Long),
        K::DomainBalloonChange => erase!(event_ulong::<P>, Ulong),
        K::DomainDeviceRemoved | K::DomainDeviceAdded | K::DomainDeviceRemovalFailed => {
            erase!(event_str::<P>, Str)
        }
        K::DomainMetadataChange => erase!(event_int_str::<P>, IntStr),
        K::DomainTrayChange => erase!(event_str_int::<P>, StrInt),
        K::DomainBlockJob | K::DomainBlockJob2 => erase!(event_str_int_int::<P>, StrIntInt),
        K::DomainIoError => erase!(event_str_str_int::<P>, StrStrInt),
        K::DomainIoErrorReason => erase!(event_str_str_int_str::<P>, StrStrIntStr),
        K::DomainDiskChange => erase!(event_str_str_str_int::<P>, StrStrStrInt),
        K::DomainBlockThreshold => erase!(event_str_str_ulong_ulong::<P>, StrStrUlongUlong),
        K::DomainGraphics => erase!(event_graphics::<P>, Graphics),
        K::DomainTunable | K::DomainJobCompleted => erase!(event_params::<P>, Params),
        K::ConnectClose
        | K::Timeout
        | K::HandleWatch
        | K::QemuMonitor
        | K::Stream
        | K::AdmConnectClose
        | K::StreamSink
        | K::StreamSource
        | K::ConnectAuth
        | K::EventLoopImpl => return None,
    };
    Some(cb)
}

/// The free callback that releases a handle with `NativeFreed`
pub fn free_callback_for<P: RegistrySource>() -> FreeCallback {
    free_opaque::<P>
}

/// The trampoline for `virConnectRegisterCloseCallback`
pub fn close_callback_for<P: RegistrySource>() -> CloseCallback {
    connect_close::<P>
}

/// The trampoline for `virEventAddTimeout`
pub fn timeout_callback_for<P: RegistrySource>() -> TimeoutCallback {
    event_timeout::<P>
}

/// The trampoline for `virEventAddHandle`
pub fn handle_callback_for<P: RegistrySource>() -> HandleCallback {
    event_handle::<P>
}

/// The trampoline for `virConnectDomainQemuMonitorEventRegister`
pub fn qemu_monitor_callback_for<P: RegistrySource>() -> QemuMonitorCallback {
    event_str_long_uint_str::<P>
}

/// The trampoline for `virStreamEventAddCallback`
pub fn stream_event_callback_for<P: RegistrySource>() -> StreamEventCallback {
    stream_event::<P>
}

/// The trampoline for `virAdmConnectRegisterCloseCallback`
pub fn adm_close_callback_for<P: RegistrySource>() -> AdmCloseCallback {
    adm_connect_close::<P>
}

/// The data trampoline for `virStreamRecvAll` and `virStreamSparseRecvAll`
pub fn stream_sink_callback_for<P: RegistrySource>() -> StreamSinkCallback {
    stream_sink::<P>
}

/// The hole trampoline for `virStreamSparseRecvAll`
pub fn stream_sink_hole_callback_for<P: RegistrySource>() -> StreamSinkHoleCallback {
    stream_sink_hole::<P>
}

/// The data trampoline for `virStreamSendAll` and `virStreamSparseSendAll`
pub fn stream_source_callback_for<P: RegistrySource>() -> StreamSourceCallback {
    stream_source::<P>
}

/// The hole trampoline for `virStreamSparseSendAll`
pub fn stream_source_hole_callback_for<P: RegistrySource>() -> StreamSourceHoleCallback {
    stream_source_hole::<P>
}

/// The skip trampoline for `virStreamSparseSendAll`
pub fn stream_source_skip_callback_for<P: RegistrySource>() -> StreamSourceSkipCallback {
    stream_source_skip::<P>
}

/// The trampoline for the `virConnectAuth` passed to `virConnectOpenAuth`
pub fn auth_callback_for<P: RegistrySource>() -> AuthCallback {
    connect_auth::<P>
}

/// The trampolines for `virEventRegisterImpl`
pub fn event_impl_callbacks_for<P: RegistrySource>() -> EventImplCallbacks {
    EventImplCallbacks {
        add_handle: impl_add_handle::<P>,
        update_handle: impl_update_handle::<P>,
        remove_handle: impl_remove_handle::<P>,
        add_timeout: impl_add_timeout::<P>,
        update_timeout: impl_update_timeout::<P>,
        remove_timeout: impl_remove_timeout::<P>,
    }
}
