use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::callbacks::events::{EventHandleType, QemuMonitorEventFlags, StreamEventType};
use crate::callbacks::trampolines::{
    AdmCloseCallback, CloseCallback, EventImplCallbacks, FreeCallback, GenericEventCallback,
    HandleCallback, QemuMonitorCallback, StreamEventCallback, StreamSinkCallback,
    StreamSinkHoleCallback, StreamSourceCallback, StreamSourceHoleCallback,
    StreamSourceSkipCallback, TimeoutCallback,
};
use crate::callbacks::{EventFamily, HandleId};
use crate::native::error::{ErrorLevel, LastErrorSource, NativeError, VIR_ERR_INTERNAL_ERROR};
use crate::native::event_api::NativeEventApi;
use crate::native::params::{RawConnectAuth, RawConnectCredential};
use crate::native::types::{AdmConnectPtr, ConnectPtr, StreamPtr};
use crate::resolver::loader::{LibraryLoader, LoadedLibrary, SymbolAddr};
use crate::{Result, VirtBridgeError};

/// Plain `extern "C"` functions that stand in for native entry points.
pub(crate) mod fake_symbol {
    use std::ffi::{c_char, c_int, c_uint, c_void};

    use crate::native::params::RawConnectAuth;

    pub(crate) extern "C" fn echo(value: c_int) -> c_int {
        value
    }

    pub(crate) extern "C" fn deregister_ok(_conn: *mut c_void, _callback_id: c_int) -> c_int {
        0
    }

    pub(crate) extern "C" fn remove_fails(_id: c_int) -> c_int {
        -1
    }

    pub(crate) extern "C" fn open_auth_refused(
        _name: *const c_char,
        _auth: *mut RawConnectAuth,
        _flags: c_uint,
    ) -> *mut c_void {
        std::ptr::null_mut()
    }
}

/// How often a [`CountingLoader`] was asked to do something.
#[derive(Debug, Default)]
pub(crate) struct LoaderCounters {
    loads: AtomicUsize,
    lookups: Mutex<HashMap<String, usize>>,
}

impl LoaderCounters {
    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn lookups(&self, name: &str) -> usize {
        self.lookups
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or_default()
    }
}

/// A [`LibraryLoader`] over a fixed symbol table that counts what it does.
pub(crate) struct CountingLoader {
    symbols: HashMap<String, usize>,
    failure: Option<String>,
    counters: Arc<LoaderCounters>,
}

impl CountingLoader {
    /// Symbols with made up, distinct addresses. Never call them.
    pub(crate) fn with_symbols(names: &[&str]) -> Self {
        let symbols = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), 0x1000 + i * 0x10))
            .collect();
        Self::from_table(symbols, None)
    }

    /// Symbols backed by real functions
    pub(crate) fn with_functions(functions: &[(&str, *const c_void)]) -> Self {
        let symbols = functions
            .iter()
            .map(|(name, f)| (name.to_string(), *f as usize))
            .collect();
        Self::from_table(symbols, None)
    }

    /// A loader whose library never opens
    pub(crate) fn failing(reason: &str) -> Self {
        Self::from_table(HashMap::new(), Some(reason.to_string()))
    }

    fn from_table(symbols: HashMap<String, usize>, failure: Option<String>) -> Self {
        Self {
            symbols,
            failure,
            counters: Arc::new(LoaderCounters::default()),
        }
    }

    pub(crate) fn counters(&self) -> Arc<LoaderCounters> {
        self.counters.clone()
    }
}

impl LibraryLoader for CountingLoader {
    fn load(&self) -> std::result::Result<Box<dyn LoadedLibrary>, String> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        // widen the window for racing first uses
        thread::sleep(Duration::from_millis(5));
        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(Box::new(CountingLibrary {
                symbols: self.symbols.clone(),
                counters: self.counters.clone(),
            })),
        }
    }
}

struct CountingLibrary {
    symbols: HashMap<String, usize>,
    counters: Arc<LoaderCounters>,
}

impl LoadedLibrary for CountingLibrary {
    fn lookup(&self, name: &CStr) -> Option<SymbolAddr> {
        let name = name.to_string_lossy().into_owned();
        let addr = self.symbols.get(&name).copied();
        *self.counters.lookups.lock().unwrap().entry(name).or_default() += 1;
        addr.and_then(|a| SymbolAddr::new(a as *const c_void))
    }
}

/// A [`LastErrorSource`] that records a new failure every time it is read,
/// like native error state that keeps moving under the caller.
#[derive(Debug, Default)]
pub(crate) struct FakeErrorState {
    failures: AtomicUsize,
}

impl FakeErrorState {
    pub(crate) fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl LastErrorSource for FakeErrorState {
    fn copy_last_error(&self) -> NativeError {
        let n = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        NativeError {
            code: VIR_ERR_INTERNAL_ERROR,
            message: format!("failure #{}", n),
            level: ErrorLevel::Error,
            ..NativeError::default()
        }
    }
}

/// What [`FakeEventApi`] was given for one `register_any` call.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) family: EventFamily,
    pub(crate) event_id: c_int,
    pub(crate) subject: usize,
    pub(crate) has_free: bool,
    pub(crate) handle: HandleId,
    cb: GenericEventCallback,
    free: Option<FreeCallback>,
}

struct CloseRegistration {
    cb: CloseCallback,
    handle: HandleId,
    free: Option<FreeCallback>,
}

/// One section of stream data as the fake library transfers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Chunk {
    Data(Vec<u8>),
    Hole(i64),
}

struct QemuRegistration {
    cb: QemuMonitorCallback,
    handle: HandleId,
    free: Option<FreeCallback>,
    event: Option<String>,
    flags: QemuMonitorEventFlags,
}

struct AdmCloseRegistration {
    cb: AdmCloseCallback,
    handle: HandleId,
    free: Option<FreeCallback>,
}

/// The size of the buffer the fake hands to stream sources
pub(crate) const FAKE_STREAM_BUFFER: usize = 8;

struct FakeState {
    next_id: c_int,
    qemu: HashMap<c_int, QemuRegistration>,
    streams: HashMap<usize, (StreamEventCallback, HandleId, StreamEventType)>,
    adm_close: HashMap<usize, AdmCloseRegistration>,
    event_impl: Option<EventImplCallbacks>,
    incoming: Vec<Chunk>,
    sent: Vec<Chunk>,
    auth_results: Vec<Option<String>>,
    registrations: HashMap<c_int, Registration>,
    close: HashMap<usize, CloseRegistration>,
    timers: HashMap<c_int, (TimeoutCallback, HandleId)>,
    watches: HashMap<c_int, (HandleCallback, HandleId)>,
    fail_register: bool,
    fail_deregister: bool,
    free_on_deregister: bool,
    last_registered: Option<HandleId>,
    default_impl_runs: usize,
}

/// An in-memory [`NativeEventApi`] that stores registrations and lets tests
/// fire the stored trampolines the way the native event loop would.
pub(crate) struct FakeEventApi {
    state: Mutex<FakeState>,
}

impl Default for FakeEventApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                qemu: HashMap::new(),
                streams: HashMap::new(),
                adm_close: HashMap::new(),
                event_impl: None,
                incoming: Vec::new(),
                sent: Vec::new(),
                auth_results: Vec::new(),
                registrations: HashMap::new(),
                close: HashMap::new(),
                timers: HashMap::new(),
                watches: HashMap::new(),
                fail_register: false,
                fail_deregister: false,
                free_on_deregister: true,
                last_registered: None,
                default_impl_runs: 0,
            }),
        }
    }
}

impl std::fmt::Debug for FakeEventApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeEventApi").finish_non_exhaustive()
    }
}

fn native_failure(what: &str) -> VirtBridgeError {
    VirtBridgeError::NativeCallFailed(NativeError {
        code: VIR_ERR_INTERNAL_ERROR,
        message: format!("fake {} failure", what),
        level: ErrorLevel::Error,
        ..NativeError::default()
    })
}

impl FakeEventApi {
    pub(crate) fn registration(&self, callback_id: c_int) -> Option<Registration> {
        self.state.lock().unwrap().registrations.get(&callback_id).cloned()
    }

    /// The handle offered to the most recent registration or callback
    /// taking call, failed or not
    pub(crate) fn last_registered_handle(&self) -> Option<HandleId> {
        self.state.lock().unwrap().last_registered
    }

    pub(crate) fn set_free_on_deregister(&self, free: bool) {
        self.state.lock().unwrap().free_on_deregister = free;
    }

    pub(crate) fn fail_next_register(&self) {
        self.state.lock().unwrap().fail_register = true;
    }

    pub(crate) fn fail_next_deregister(&self) {
        self.state.lock().unwrap().fail_deregister = true;
    }

    pub(crate) fn default_impl_runs(&self) -> usize {
        self.state.lock().unwrap().default_impl_runs
    }

    /// Run the free callback of a registration without removing it
    pub(crate) fn simulate_free(&self, callback_id: c_int) {
        let reg = self.registration(callback_id).unwrap();
        if let Some(free) = reg.free {
            free(reg.handle.as_opaque());
        }
    }

    /// Fire a registration whose trampoline takes no event arguments
    pub(crate) fn fire_generic(&self, callback_id: c_int, conn: ConnectPtr, subject: *mut c_void) {
        let reg = self.registration(callback_id).unwrap();
        (reg.cb)(conn.as_raw(), subject, reg.handle.as_opaque());
    }

    /// Fire a registration whose trampoline takes two `int` arguments
    pub(crate) fn fire_int_int(
        &self,
        callback_id: c_int,
        conn: ConnectPtr,
        subject: *mut c_void,
        a: c_int,
        b: c_int,
    ) {
        type IntInt = extern "C" fn(*mut c_void, *mut c_void, c_int, c_int, *mut c_void);
        let reg = self.registration(callback_id).unwrap();
        // SAFETY: the registration was made for a kind with this shape
        let cb: IntInt = unsafe { std::mem::transmute::<GenericEventCallback, IntInt>(reg.cb) };
        cb(conn.as_raw(), subject, a, b, reg.handle.as_opaque());
    }

    pub(crate) fn fire_close(&self, conn: ConnectPtr, reason: c_int) {
        let (cb, handle) = {
            let state = self.state.lock().unwrap();
            let reg = state.close.get(&conn.addr()).unwrap();
            (reg.cb, reg.handle)
        };
        cb(conn.as_raw(), reason, handle.as_opaque());
    }

    pub(crate) fn fire_timeout(&self, timer: c_int) {
        let (cb, handle) = *self.state.lock().unwrap().timers.get(&timer).unwrap();
        cb(timer, handle.as_opaque());
    }

    pub(crate) fn fire_handle(&self, watch: c_int, fd: c_int, events: EventHandleType) {
        let (cb, handle) = *self.state.lock().unwrap().watches.get(&watch).unwrap();
        cb(watch, fd, events.bits(), handle.as_opaque());
    }

    /// Fire a QEMU monitor registration
    pub(crate) fn fire_qemu_monitor(
        &self,
        callback_id: c_int,
        conn: ConnectPtr,
        dom: *mut c_void,
        event: &CStr,
        seconds: i64,
        micros: c_uint,
        details: Option<&CStr>,
    ) {
        let (cb, handle) = {
            let state = self.state.lock().unwrap();
            let reg = state.qemu.get(&callback_id).unwrap();
            (reg.cb, reg.handle)
        };
        let details = details.map(CStr::as_ptr).unwrap_or(std::ptr::null());
        cb(conn.as_raw(), dom, event.as_ptr(), seconds, micros, details, handle.as_opaque());
    }

    /// The event name filter and flags of a QEMU monitor registration
    pub(crate) fn qemu_filter(&self, callback_id: c_int) -> Option<(Option<String>, QemuMonitorEventFlags)> {
        let state = self.state.lock().unwrap();
        state.qemu.get(&callback_id).map(|r| (r.event.clone(), r.flags))
    }

    /// The handle behind the event callback of `stream`
    pub(crate) fn stream_handle(&self, stream: StreamPtr) -> Option<HandleId> {
        self.state.lock().unwrap().streams.get(&stream.addr()).map(|s| s.1)
    }

    /// The events the callback of `stream` currently waits for
    pub(crate) fn stream_events(&self, stream: StreamPtr) -> Option<StreamEventType> {
        self.state.lock().unwrap().streams.get(&stream.addr()).map(|s| s.2)
    }

    pub(crate) fn fire_stream(&self, stream: StreamPtr, events: StreamEventType) {
        let (cb, handle, _) = *self.state.lock().unwrap().streams.get(&stream.addr()).unwrap();
        cb(stream.as_raw(), events.bits(), handle.as_opaque());
    }

    pub(crate) fn fire_adm_close(&self, conn: AdmConnectPtr, reason: c_int) {
        let (cb, handle) = {
            let state = self.state.lock().unwrap();
            let reg = state.adm_close.get(&conn.addr()).unwrap();
            (reg.cb, reg.handle)
        };
        cb(conn.as_raw(), reason, handle.as_opaque());
    }

    /// What the next receive hands to its sink
    pub(crate) fn set_incoming(&self, chunks: Vec<Chunk>) {
        self.state.lock().unwrap().incoming = chunks;
    }

    /// What the sends so far read from their source, holes included
    pub(crate) fn sent(&self) -> Vec<Chunk> {
        self.state.lock().unwrap().sent.clone()
    }

    /// The results the last authentication collected
    pub(crate) fn auth_results(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().auth_results.clone()
    }

    /// The callbacks handed to the last `register_impl`
    pub(crate) fn event_impl(&self) -> Option<EventImplCallbacks> {
        self.state.lock().unwrap().event_impl
    }

    fn next_id(state: &mut FakeState) -> c_int {
        let id = state.next_id;
        state.next_id += 1;
        id
    }
}

fn handle_of(opaque: *mut c_void) -> HandleId {
    HandleId::from_opaque(opaque).unwrap()
}

impl NativeEventApi for FakeEventApi {
    fn register_any(
        &self,
        family: EventFamily,
        _conn: ConnectPtr,
        subject: *mut c_void,
        event_id: c_int,
        cb: GenericEventCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<c_int> {
        let mut state = self.state.lock()?;
        let handle = handle_of(opaque);
        state.last_registered = Some(handle);
        if std::mem::take(&mut state.fail_register) {
            return Err(native_failure("register"));
        }
        let id = Self::next_id(&mut state);
        state.registrations.insert(
            id,
            Registration {
                family,
                event_id,
                subject: subject as usize,
                has_free: free.is_some(),
                handle,
                cb,
                free,
            },
        );
        Ok(id)
    }

    fn deregister_any(&self, family: EventFamily, _conn: ConnectPtr, callback_id: c_int) -> Result<()> {
        if family == EventFamily::QemuMonitor {
            let (reg, free_now) = {
                let mut state = self.state.lock()?;
                if std::mem::take(&mut state.fail_deregister) {
                    return Err(native_failure("deregister"));
                }
                let reg = state
                    .qemu
                    .remove(&callback_id)
                    .ok_or_else(|| native_failure("unknown callback id"))?;
                (reg, state.free_on_deregister)
            };
            if let (true, Some(free)) = (free_now, reg.free) {
                free(reg.handle.as_opaque());
            }
            return Ok(());
        }
        let (reg, free_now) = {
            let mut state = self.state.lock()?;
            if std::mem::take(&mut state.fail_deregister) {
                return Err(native_failure("deregister"));
            }
            let reg = state
                .registrations
                .remove(&callback_id)
                .ok_or_else(|| native_failure("unknown callback id"))?;
            (reg, state.free_on_deregister)
        };
        if let (true, Some(free)) = (free_now, reg.free) {
            free(reg.handle.as_opaque());
        }
        Ok(())
    }

    fn register_close_callback(
        &self,
        conn: ConnectPtr,
        cb: CloseCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()> {
        self.state.lock()?.close.insert(
            conn.addr(),
            CloseRegistration {
                cb,
                handle: handle_of(opaque),
                free,
            },
        );
        Ok(())
    }

    fn unregister_close_callback(&self, conn: ConnectPtr, _cb: CloseCallback) -> Result<()> {
        let (reg, free_now) = {
            let mut state = self.state.lock()?;
            let reg = state
                .close
                .remove(&conn.addr())
                .ok_or_else(|| native_failure("unregister close"))?;
            (reg, state.free_on_deregister)
        };
        if let (true, Some(free)) = (free_now, reg.free) {
            free(reg.handle.as_opaque());
        }
        Ok(())
    }

    fn add_timeout(
        &self,
        _frequency_ms: c_int,
        cb: TimeoutCallback,
        opaque: *mut c_void,
        _free: Option<FreeCallback>,
    ) -> Result<c_int> {
        let mut state = self.state.lock()?;
        let id = Self::next_id(&mut state);
        state.timers.insert(id, (cb, handle_of(opaque)));
        Ok(id)
    }

    fn remove_timeout(&self, timer: c_int) -> Result<()> {
        match self.state.lock()?.timers.remove(&timer) {
            Some(_) => Ok(()),
            None => Err(native_failure("remove timeout")),
        }
    }

    fn add_handle(
        &self,
        _fd: c_int,
        _events: EventHandleType,
        cb: HandleCallback,
        opaque: *mut c_void,
        _free: Option<FreeCallback>,
    ) -> Result<c_int> {
        let mut state = self.state.lock()?;
        let id = Self::next_id(&mut state);
        state.watches.insert(id, (cb, handle_of(opaque)));
        Ok(id)
    }

    fn remove_handle(&self, watch: c_int) -> Result<()> {
        match self.state.lock()?.watches.remove(&watch) {
            Some(_) => Ok(()),
            None => Err(native_failure("remove handle")),
        }
    }

    fn register_default_impl(&self) -> Result<()> {
        Ok(())
    }

    fn run_default_impl(&self) -> Result<()> {
        self.state.lock()?.default_impl_runs += 1;
        Ok(())
    }

    fn register_impl(&self, callbacks: EventImplCallbacks) -> Result<()> {
        self.state.lock()?.event_impl = Some(callbacks);
        Ok(())
    }

    fn qemu_monitor_event_register(
        &self,
        _conn: ConnectPtr,
        _dom: *mut c_void,
        event: Option<&CStr>,
        cb: QemuMonitorCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
        flags: QemuMonitorEventFlags,
    ) -> Result<c_int> {
        let mut state = self.state.lock()?;
        let handle = handle_of(opaque);
        state.last_registered = Some(handle);
        if std::mem::take(&mut state.fail_register) {
            return Err(native_failure("register"));
        }
        let id = Self::next_id(&mut state);
        state.qemu.insert(
            id,
            QemuRegistration {
                cb,
                handle,
                free,
                event: event.map(|e| e.to_string_lossy().into_owned()),
                flags,
            },
        );
        Ok(id)
    }

    fn stream_event_add_callback(
        &self,
        stream: StreamPtr,
        events: StreamEventType,
        cb: StreamEventCallback,
        opaque: *mut c_void,
        _free: Option<FreeCallback>,
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        state.last_registered = Some(handle_of(opaque));
        if std::mem::take(&mut state.fail_register) {
            return Err(native_failure("stream event add"));
        }
        state.streams.insert(stream.addr(), (cb, handle_of(opaque), events));
        Ok(())
    }

    fn stream_event_update_callback(&self, stream: StreamPtr, events: StreamEventType) -> Result<()> {
        match self.state.lock()?.streams.get_mut(&stream.addr()) {
            Some(reg) => {
                reg.2 = events;
                Ok(())
            }
            None => Err(native_failure("stream event update")),
        }
    }

    fn stream_event_remove_callback(&self, stream: StreamPtr) -> Result<()> {
        match self.state.lock()?.streams.remove(&stream.addr()) {
            Some(_) => Ok(()),
            None => Err(native_failure("stream event remove")),
        }
    }

    fn stream_recv_all(&self, stream: StreamPtr, sink: StreamSinkCallback, opaque: *mut c_void) -> Result<()> {
        self.state.lock()?.last_registered = Some(handle_of(opaque));
        let incoming = std::mem::take(&mut self.state.lock()?.incoming);
        for chunk in incoming {
            let data = match chunk {
                Chunk::Data(data) => data,
                Chunk::Hole(len) => vec![0; usize::try_from(len).unwrap_or_default()],
            };
            if sink(stream.as_raw(), data.as_ptr() as *const c_char, data.len(), opaque) < 0 {
                return Err(native_failure("stream sink"));
            }
        }
        Ok(())
    }

    fn stream_sparse_recv_all(
        &self,
        stream: StreamPtr,
        sink: StreamSinkCallback,
        hole: StreamSinkHoleCallback,
        opaque: *mut c_void,
    ) -> Result<()> {
        self.state.lock()?.last_registered = Some(handle_of(opaque));
        let incoming = std::mem::take(&mut self.state.lock()?.incoming);
        for chunk in incoming {
            let ret = match chunk {
                Chunk::Data(data) => sink(stream.as_raw(), data.as_ptr() as *const c_char, data.len(), opaque),
                Chunk::Hole(len) => hole(stream.as_raw(), len, opaque),
            };
            if ret < 0 {
                return Err(native_failure("stream sink"));
            }
        }
        Ok(())
    }

    fn stream_send_all(&self, stream: StreamPtr, source: StreamSourceCallback, opaque: *mut c_void) -> Result<()> {
        self.state.lock()?.last_registered = Some(handle_of(opaque));
        let mut sent = Vec::new();
        loop {
            let mut buf = [0u8; FAKE_STREAM_BUFFER];
            let got = source(stream.as_raw(), buf.as_mut_ptr() as *mut c_char, buf.len(), opaque);
            if got < 0 {
                return Err(native_failure("stream source"));
            }
            if got == 0 {
                break;
            }
            sent.push(Chunk::Data(buf[..got as usize].to_vec()));
        }
        self.state.lock()?.sent.extend(sent);
        Ok(())
    }

    fn stream_sparse_send_all(
        &self,
        stream: StreamPtr,
        source: StreamSourceCallback,
        hole: StreamSourceHoleCallback,
        skip: StreamSourceSkipCallback,
        opaque: *mut c_void,
    ) -> Result<()> {
        self.state.lock()?.last_registered = Some(handle_of(opaque));
        let mut sent = Vec::new();
        loop {
            let (mut in_data, mut length): (c_int, i64) = (0, 0);
            if hole(stream.as_raw(), &mut in_data, &mut length, opaque) < 0 {
                return Err(native_failure("stream source hole"));
            }
            if in_data == 0 && length > 0 {
                if skip(stream.as_raw(), length, opaque) < 0 {
                    return Err(native_failure("stream source skip"));
                }
                sent.push(Chunk::Hole(length));
                continue;
            }
            let mut buf = [0u8; FAKE_STREAM_BUFFER];
            let want = match usize::try_from(length) {
                Ok(len) if len > 0 && len < buf.len() => len,
                _ => buf.len(),
            };
            let got = source(stream.as_raw(), buf.as_mut_ptr() as *mut c_char, want, opaque);
            if got < 0 {
                return Err(native_failure("stream source"));
            }
            if got == 0 {
                break;
            }
            sent.push(Chunk::Data(buf[..got as usize].to_vec()));
        }
        self.state.lock()?.sent.extend(sent);
        Ok(())
    }

    fn open_auth(&self, _name: Option<&CStr>, auth: &mut RawConnectAuth, _flags: c_uint) -> Result<ConnectPtr> {
        self.state.lock()?.last_registered = Some(handle_of(auth.cbdata));
        let kinds: Vec<c_int> = if auth.credtype.is_null() {
            Vec::new()
        } else {
            // SAFETY: the caller passes `ncredtype` entries
            unsafe { std::slice::from_raw_parts(auth.credtype, auth.ncredtype as usize) }.to_vec()
        };
        let prompts: Vec<CString> = kinds
            .iter()
            .map(|k| CString::new(format!("fake prompt {}", k)).unwrap())
            .collect();
        let mut creds: Vec<RawConnectCredential> = kinds
            .iter()
            .zip(prompts.iter())
            .map(|(kind, prompt)| RawConnectCredential {
                kind: *kind,
                prompt: prompt.as_ptr(),
                challenge: std::ptr::null(),
                defresult: std::ptr::null(),
                result: std::ptr::null_mut(),
                resultlen: 0,
            })
            .collect();
        let ret = (auth.cb)(creds.as_mut_ptr(), creds.len() as c_uint, auth.cbdata);
        let results = creds
            .iter()
            .map(|c| {
                if c.result.is_null() {
                    return None;
                }
                // SAFETY: the callback stored a malloc'ed, NUL-terminated string
                let value = unsafe { CStr::from_ptr(c.result) }.to_string_lossy().into_owned();
                // SAFETY: allocated with malloc and owned by the library side
                unsafe { libc::free(c.result as *mut c_void) };
                Some(value)
            })
            .collect();
        self.state.lock()?.auth_results = results;
        if ret < 0 {
            return Err(native_failure("authentication"));
        }
        Ok(ConnectPtr::from_raw(0xa0 as *mut c_void))
    }

    fn adm_register_close_callback(
        &self,
        conn: AdmConnectPtr,
        cb: AdmCloseCallback,
        opaque: *mut c_void,
        free: Option<FreeCallback>,
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        state.last_registered = Some(handle_of(opaque));
        if std::mem::take(&mut state.fail_register) {
            return Err(native_failure("admin close register"));
        }
        state.adm_close.insert(
            conn.addr(),
            AdmCloseRegistration {
                cb,
                handle: handle_of(opaque),
                free,
            },
        );
        Ok(())
    }

    fn adm_unregister_close_callback(&self, conn: AdmConnectPtr, _cb: AdmCloseCallback) -> Result<()> {
        let (reg, free_now) = {
            let mut state = self.state.lock()?;
            let reg = state
                .adm_close
                .remove(&conn.addr())
                .ok_or_else(|| native_failure("admin close unregister"))?;
            (reg, state.free_on_deregister)
        };
        if let (true, Some(free)) = (free_now, reg.free) {
            free(reg.handle.as_opaque());
        }
        Ok(())
    }
}
