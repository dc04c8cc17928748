use std::ffi::{c_char, c_int, c_uint, c_void, CStr};

use tracing::{instrument, Span};

use crate::call::Binding;
use crate::callbacks::events::{EventHandleType, QemuMonitorEventFlags, StreamEventType};
use crate::callbacks::trampolines::{
    AddHandleFunc, AddTimeoutFunc, AdmCloseCallback, CloseCallback, EventImplCallbacks,
    FreeCallback, GenericEventCallback, HandleCallback, QemuMonitorCallback, RemoveHandleFunc,
    RemoveTimeoutFunc, StreamEventCallback, StreamSinkCallback, StreamSinkHoleCallback,
    StreamSourceCallback, StreamSourceHoleCallback, StreamSourceSkipCallback, TimeoutCallback,
    UpdateHandleFunc, UpdateTimeoutFunc,
};
use crate::callbacks::EventFamily;
use crate::native::params::RawConnectAuth;
use crate::native::types::{AdmConnectPtr, ConnectPtr, StreamPtr};
use crate::Result;

/// The native entry points that take callbacks.
///
/// Every method returns the native failure as `NativeCallFailed` with the
/// last-error snapshot already taken.
pub trait NativeEventApi: Send + Sync {
    /// `virConnect<Family>EventRegisterAny`, returning the native callback id
    #[allow(clippy::too_many_arguments)]
    fn register_any(
        &self,
        family: EventFamily,
        conn: ConnectPtr,
        subject: *mut c_void,
        event_id: c_int,
        cb: GenericEventCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int>;

    /// `virConnect<Family>EventDeregisterAny`, or
    /// `virConnectDomainQemuMonitorEventDeregister` for the QEMU family
    fn deregister_any(&self, family: EventFamily, conn: ConnectPtr, callback_id: c_int) -> Result<()>;

    /// `virConnectRegisterCloseCallback`
    fn register_close_callback(
        &self,
        conn: ConnectPtr,
        cb: CloseCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()>;

    /// `virConnectUnregisterCloseCallback`
    fn unregister_close_callback(&self, conn: ConnectPtr, cb: CloseCallback) -> Result<()>;

    /// `virEventAddTimeout`, returning the timer id
    fn add_timeout(
        &self,
        frequency_ms: c_int,
        cb: TimeoutCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int>;

    /// `virEventRemoveTimeout`
    fn remove_timeout(&self, timer: c_int) -> Result<()>;

    /// `virEventAddHandle`, returning the watch id
    fn add_handle(
        &self,
        fd: c_int,
        events: EventHandleType,
        cb: HandleCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int>;

    /// `virEventRemoveHandle`
    fn remove_handle(&self, watch: c_int) -> Result<()>;

    /// `virEventRegisterDefaultImpl`
    fn register_default_impl(&self) -> Result<()>;

    /// `virEventRunDefaultImpl`
    fn run_default_impl(&self) -> Result<()>;

    /// `virEventRegisterImpl`
    fn register_impl(&self, callbacks: EventImplCallbacks) -> Result<()>;

    /// `virConnectDomainQemuMonitorEventRegister`, returning the native
    /// callback id
    #[allow(clippy::too_many_arguments)]
    fn qemu_monitor_event_register(
        &self,
        conn: ConnectPtr,
        dom: *mut c_void,
        event: Option<&CStr>,
        cb: QemuMonitorCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
        flags: QemuMonitorEventFlags,
    ) -> Result<c_int>;

    /// `virStreamEventAddCallback`
    fn stream_event_add_callback(
        &self,
        stream: StreamPtr,
        events: StreamEventType,
        cb: StreamEventCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()>;

    /// `virStreamEventUpdateCallback`
    fn stream_event_update_callback(&self, stream: StreamPtr, events: StreamEventType) -> Result<()>;

    /// `virStreamEventRemoveCallback`
    fn stream_event_remove_callback(&self, stream: StreamPtr) -> Result<()>;

    /// `virStreamRecvAll`
    fn stream_recv_all(&self, stream: StreamPtr, sink: StreamSinkCallback, opaque: *mut c_void) -> Result<()>;

    /// `virStreamSparseRecvAll`
    fn stream_sparse_recv_all(
        &self,
        stream: StreamPtr,
        sink: StreamSinkCallback,
        hole: StreamSinkHoleCallback,
        opaque: *mut c_void,
    ) -> Result<()>;

    /// `virStreamSendAll`
    fn stream_send_all(&self, stream: StreamPtr, source: StreamSourceCallback, opaque: *mut c_void) -> Result<()>;

    /// `virStreamSparseSendAll`
    fn stream_sparse_send_all(
        &self,
        stream: StreamPtr,
        source: StreamSourceCallback,
        hole: StreamSourceHoleCallback,
        skip: StreamSourceSkipCallback,
        opaque: *mut c_void,
    ) -> Result<()>;

    /// `virConnectOpenAuth`. `auth` only has to live for the call.
    fn open_auth(&self, name: Option<&CStr>, auth: &mut RawConnectAuth, flags: c_uint) -> Result<ConnectPtr>;

    /// `virAdmConnectRegisterCloseCallback`, from the admin library
    fn adm_register_close_callback(
        &self,
        conn: AdmConnectPtr,
        cb: AdmCloseCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()>;

    /// `virAdmConnectUnregisterCloseCallback`, from the admin library
    fn adm_unregister_close_callback(&self, conn: AdmConnectPtr, cb: AdmCloseCallback) -> Result<()>;
}

type RegisterAnyFn = unsafe extern "C" fn(
    *mut c_void,
    *mut c_void,
    c_int,
    GenericEventCallback,
    *mut c_void,
    Option<FreeCallback>,
) -> c_int;
type DeregisterAnyFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type RegisterCloseFn =
    unsafe extern "C" fn(*mut c_void, CloseCallback, *mut c_void, Option<FreeCallback>) -> c_int;
type UnregisterCloseFn = unsafe extern "C" fn(*mut c_void, CloseCallback) -> c_int;
type AddTimeoutFn =
    unsafe extern "C" fn(c_int, TimeoutCallback, *mut c_void, Option<FreeCallback>) -> c_int;
type AddHandleFn =
    unsafe extern "C" fn(c_int, c_int, HandleCallback, *mut c_void, Option<FreeCallback>) -> c_int;
type RemoveFn = unsafe extern "C" fn(c_int) -> c_int;
type VoidFn = unsafe extern "C" fn() -> c_int;
type RegisterImplFn = unsafe extern "C" fn(
    AddHandleFunc,
    UpdateHandleFunc,
    RemoveHandleFunc,
    AddTimeoutFunc,
    UpdateTimeoutFunc,
    RemoveTimeoutFunc,
);
type QemuMonitorRegisterFn = unsafe extern "C" fn(
    *mut c_void,
    *mut c_void,
    *const c_char,
    QemuMonitorCallback,
    *mut c_void,
    Option<FreeCallback>,
    c_uint,
) -> c_int;
type StreamEventAddFn = unsafe extern "C" fn(
    *mut c_void,
    c_int,
    StreamEventCallback,
    *mut c_void,
    Option<FreeCallback>,
) -> c_int;
type StreamEventUpdateFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;
type StreamEventRemoveFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type RecvAllFn = unsafe extern "C" fn(*mut c_void, StreamSinkCallback, *mut c_void) -> c_int;
type SparseRecvAllFn =
    unsafe extern "C" fn(*mut c_void, StreamSinkCallback, StreamSinkHoleCallback, *mut c_void) -> c_int;
type SendAllFn = unsafe extern "C" fn(*mut c_void, StreamSourceCallback, *mut c_void) -> c_int;
type SparseSendAllFn = unsafe extern "C" fn(
    *mut c_void,
    StreamSourceCallback,
    StreamSourceHoleCallback,
    StreamSourceSkipCallback,
    *mut c_void,
) -> c_int;
type OpenAuthFn = unsafe extern "C" fn(*const c_char, *mut RawConnectAuth, c_uint) -> *mut c_void;
type AdmRegisterCloseFn =
    unsafe extern "C" fn(*mut c_void, AdmCloseCallback, *mut c_void, Option<FreeCallback>) -> c_int;
type AdmUnregisterCloseFn = unsafe extern "C" fn(*mut c_void, AdmCloseCallback) -> c_int;

/// [`NativeEventApi`] over the real library, resolving every entry point
/// through the binding's resolver.
#[derive(Debug, Clone)]
pub struct LibvirtEventApi {
    binding: Binding,
}

impl LibvirtEventApi {
    /// Create the API over `binding`
    pub fn new(binding: Binding) -> Self {
        Self { binding }
    }

    /// The binding calls go through
    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

fn opt_ptr(s: Option<&CStr>) -> *const c_char {
    s.map(CStr::as_ptr).unwrap_or(std::ptr::null())
}

impl NativeEventApi for LibvirtEventApi {
    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn register_any(
        &self,
        family: EventFamily,
        conn: ConnectPtr,
        subject: *mut c_void,
        event_id: c_int,
        cb: GenericEventCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int> {
        // SAFETY: RegisterAnyFn is the shared shape of every family's
        // register entry point; `opaque` is an encoded handle id the library
        // never dereferences
        unsafe {
            self.binding
                .call(family.register_symbol())
                .invoke_int::<RegisterAnyFn, _>(|f| {
                    f(conn.as_raw(), subject, event_id, cb, opaque, free)
                })
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn deregister_any(&self, family: EventFamily, conn: ConnectPtr, callback_id: c_int) -> Result<()> {
        // SAFETY: every family deregisters with (virConnectPtr, int)
        unsafe {
            self.binding
                .call(family.deregister_symbol())
                .invoke_int::<DeregisterAnyFn, _>(|f| f(conn.as_raw(), callback_id))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn register_close_callback(
        &self,
        conn: ConnectPtr,
        cb: CloseCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()> {
        // SAFETY: RegisterCloseFn matches virConnectRegisterCloseCallback
        unsafe {
            self.binding
                .call("virConnectRegisterCloseCallback")
                .invoke_int::<RegisterCloseFn, _>(|f| f(conn.as_raw(), cb, opaque, free))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, cb), parent = Span::current(), level = "Trace")]
    fn unregister_close_callback(&self, conn: ConnectPtr, cb: CloseCallback) -> Result<()> {
        // SAFETY: UnregisterCloseFn matches virConnectUnregisterCloseCallback
        unsafe {
            self.binding
                .call("virConnectUnregisterCloseCallback")
                .invoke_int::<UnregisterCloseFn, _>(|f| f(conn.as_raw(), cb))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn add_timeout(
        &self,
        frequency_ms: c_int,
        cb: TimeoutCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int> {
        // SAFETY: AddTimeoutFn matches virEventAddTimeout
        unsafe {
            self.binding
                .call("virEventAddTimeout")
                .invoke_int::<AddTimeoutFn, _>(|f| f(frequency_ms, cb, opaque, free))
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn remove_timeout(&self, timer: c_int) -> Result<()> {
        // SAFETY: RemoveFn matches virEventRemoveTimeout
        unsafe {
            self.binding
                .call("virEventRemoveTimeout")
                .invoke_int::<RemoveFn, _>(|f| f(timer))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn add_handle(
        &self,
        fd: c_int,
        events: EventHandleType,
        cb: HandleCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int> {
        // SAFETY: AddHandleFn matches virEventAddHandle
        unsafe {
            self.binding
                .call("virEventAddHandle")
                .invoke_int::<AddHandleFn, _>(|f| f(fd, events.bits(), cb, opaque, free))
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn remove_handle(&self, watch: c_int) -> Result<()> {
        // SAFETY: RemoveFn matches virEventRemoveHandle
        unsafe {
            self.binding
                .call("virEventRemoveHandle")
                .invoke_int::<RemoveFn, _>(|f| f(watch))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn register_default_impl(&self) -> Result<()> {
        // SAFETY: takes no arguments and returns int
        unsafe {
            self.binding
                .call("virEventRegisterDefaultImpl")
                .invoke_int::<VoidFn, _>(|f| f())
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn run_default_impl(&self) -> Result<()> {
        // SAFETY: takes no arguments and returns int
        unsafe {
            self.binding
                .call("virEventRunDefaultImpl")
                .invoke_int::<VoidFn, _>(|f| f())
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, callbacks), parent = Span::current(), level = "Trace")]
    fn register_impl(&self, callbacks: EventImplCallbacks) -> Result<()> {
        // SAFETY: RegisterImplFn matches virEventRegisterImpl, which returns
        // nothing and cannot fail
        unsafe {
            self.binding.call("virEventRegisterImpl").invoke::<RegisterImplFn, (), _, _>(
                |f| {
                    f(
                        callbacks.add_handle,
                        callbacks.update_handle,
                        callbacks.remove_handle,
                        callbacks.add_timeout,
                        callbacks.update_timeout,
                        callbacks.remove_timeout,
                    )
                },
                |_| false,
            )
        }
    }

    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn qemu_monitor_event_register(
        &self,
        conn: ConnectPtr,
        dom: *mut c_void,
        event: Option<&CStr>,
        cb: QemuMonitorCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
        flags: QemuMonitorEventFlags,
    ) -> Result<c_int> {
        let event = opt_ptr(event);
        // SAFETY: QemuMonitorRegisterFn matches the QEMU library's register
        // entry point; `event` is null or borrowed for the call
        unsafe {
            self.binding
                .call(EventFamily::QemuMonitor.register_symbol())
                .invoke_int::<QemuMonitorRegisterFn, _>(|f| {
                    f(conn.as_raw(), dom, event, cb, opaque, free, flags.bits())
                })
        }
    }

    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn stream_event_add_callback(
        &self,
        stream: StreamPtr,
        events: StreamEventType,
        cb: StreamEventCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()> {
        // SAFETY: StreamEventAddFn matches virStreamEventAddCallback
        unsafe {
            self.binding
                .call("virStreamEventAddCallback")
                .invoke_int::<StreamEventAddFn, _>(|f| {
                    f(stream.as_raw(), events.bits(), cb, opaque, free)
                })
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn stream_event_update_callback(&self, stream: StreamPtr, events: StreamEventType) -> Result<()> {
        // SAFETY: StreamEventUpdateFn matches virStreamEventUpdateCallback
        unsafe {
            self.binding
                .call("virStreamEventUpdateCallback")
                .invoke_int::<StreamEventUpdateFn, _>(|f| f(stream.as_raw(), events.bits()))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    fn stream_event_remove_callback(&self, stream: StreamPtr) -> Result<()> {
        // SAFETY: StreamEventRemoveFn matches virStreamEventRemoveCallback
        unsafe {
            self.binding
                .call("virStreamEventRemoveCallback")
                .invoke_int::<StreamEventRemoveFn, _>(|f| f(stream.as_raw()))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, sink, opaque), parent = Span::current(), level = "Trace")]
    fn stream_recv_all(&self, stream: StreamPtr, sink: StreamSinkCallback, opaque: *mut c_void) -> Result<()> {
        // SAFETY: RecvAllFn matches virStreamRecvAll, which only calls `sink`
        // before returning
        unsafe {
            self.binding
                .call("virStreamRecvAll")
                .invoke_int::<RecvAllFn, _>(|f| f(stream.as_raw(), sink, opaque))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, sink, hole, opaque), parent = Span::current(), level = "Trace")]
    fn stream_sparse_recv_all(
        &self,
        stream: StreamPtr,
        sink: StreamSinkCallback,
        hole: StreamSinkHoleCallback,
        opaque: *mut c_void,
    ) -> Result<()> {
        // SAFETY: SparseRecvAllFn matches virStreamSparseRecvAll
        unsafe {
            self.binding
                .call("virStreamSparseRecvAll")
                .invoke_int::<SparseRecvAllFn, _>(|f| f(stream.as_raw(), sink, hole, opaque))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, source, opaque), parent = Span::current(), level = "Trace")]
    fn stream_send_all(&self, stream: StreamPtr, source: StreamSourceCallback, opaque: *mut c_void) -> Result<()> {
        // SAFETY: SendAllFn matches virStreamSendAll, which only calls
        // `source` before returning
        unsafe {
            self.binding
                .call("virStreamSendAll")
                .invoke_int::<SendAllFn, _>(|f| f(stream.as_raw(), source, opaque))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, source, hole, skip, opaque), parent = Span::current(), level = "Trace")]
    fn stream_sparse_send_all(
        &self,
        stream: StreamPtr,
        source: StreamSourceCallback,
        hole: StreamSourceHoleCallback,
        skip: StreamSourceSkipCallback,
        opaque: *mut c_void,
    ) -> Result<()> {
        // SAFETY: SparseSendAllFn matches virStreamSparseSendAll
        unsafe {
            self.binding
                .call("virStreamSparseSendAll")
                .invoke_int::<SparseSendAllFn, _>(|f| {
                    f(stream.as_raw(), source, hole, skip, opaque)
                })
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, auth), parent = Span::current(), level = "Trace")]
    fn open_auth(&self, name: Option<&CStr>, auth: &mut RawConnectAuth, flags: c_uint) -> Result<ConnectPtr> {
        let name = opt_ptr(name);
        let auth: *mut RawConnectAuth = auth;
        // SAFETY: OpenAuthFn matches virConnectOpenAuth; `name` and `auth`
        // are borrowed for the call and the library does not keep them
        unsafe {
            self.binding
                .call("virConnectOpenAuth")
                .invoke::<OpenAuthFn, *mut c_void, _, _>(|f| f(name, auth, flags), |conn| conn.is_null())
                .map(ConnectPtr::from_raw)
        }
    }

    #[instrument(err(Debug), skip(self, cb, opaque, free), parent = Span::current(), level = "Trace")]
    fn adm_register_close_callback(
        &self,
        conn: AdmConnectPtr,
        cb: AdmCloseCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()> {
        // SAFETY: AdmRegisterCloseFn matches
        // virAdmConnectRegisterCloseCallback in the admin library
        unsafe {
            self.binding
                .call("virAdmConnectRegisterCloseCallback")
                .invoke_int::<AdmRegisterCloseFn, _>(|f| f(conn.as_raw(), cb, opaque, free))
                .map(|_| ())
        }
    }

    #[instrument(err(Debug), skip(self, cb), parent = Span::current(), level = "Trace")]
    fn adm_unregister_close_callback(&self, conn: AdmConnectPtr, cb: AdmCloseCallback) -> Result<()> {
        // SAFETY: AdmUnregisterCloseFn matches
        // virAdmConnectUnregisterCloseCallback in the admin library
        unsafe {
            self.binding
                .call("virAdmConnectUnregisterCloseCallback")
                .invoke_int::<AdmUnregisterCloseFn, _>(|f| f(conn.as_raw(), cb))
                .map(|_| ())
        }
    }
}
