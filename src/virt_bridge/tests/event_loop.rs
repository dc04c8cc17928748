//! Subscriptions driven end to end through the native entry points, with a
//! stand-in library that stores callbacks the way the real event loop does.
use std::collections::HashMap;
use std::ffi::{c_int, c_void, CStr};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use virt_bridge::callbacks::events::{DomainEventType, DomainLifecycleEvent, DomainRebootEvent};
use virt_bridge::callbacks::trampolines::{FreeCallback, GenericEventCallback};
use virt_bridge::callbacks::{HandleId, RegistrySource};
use virt_bridge::native::types::{ConnectPtr, DomainPtr};
use virt_bridge::native::LibvirtEventApi;
use virt_bridge::resolver::{LibraryLoader, LoadedLibrary, SymbolAddr};
use virt_bridge::{Binding, CallbackRegistry, EventSubscriptions, SymbolResolver, VirtBridgeError};

#[derive(Clone, Copy)]
struct Stored {
    cb: GenericEventCallback,
    opaque: usize,
    free: Option<FreeCallback>,
    event_id: c_int,
}

static NATIVE: Lazy<Mutex<HashMap<c_int, Stored>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_CALLBACK_ID: AtomicI32 = AtomicI32::new(1);

extern "C" fn register_any(
    _conn: *mut c_void,
    _dom: *mut c_void,
    event_id: c_int,
    cb: GenericEventCallback,
    opaque: *mut c_void,
    free: Option<FreeCallback>,
) -> c_int {
    let id = NEXT_CALLBACK_ID.fetch_add(1, Ordering::SeqCst);
    NATIVE.lock().unwrap().insert(
        id,
        Stored {
            cb,
            opaque: opaque as usize,
            free,
            event_id,
        },
    );
    id
}

extern "C" fn deregister_any(_conn: *mut c_void, callback_id: c_int) -> c_int {
    let stored = NATIVE.lock().unwrap().remove(&callback_id);
    match stored {
        Some(Stored {
            free: Some(free),
            opaque,
            ..
        }) => {
            free(opaque as *mut c_void);
            0
        }
        Some(_) => 0,
        None => -1,
    }
}

struct StandInLibvirt;

impl LibraryLoader for StandInLibvirt {
    fn load(&self) -> Result<Box<dyn LoadedLibrary>, String> {
        Ok(Box::new(StandInLibvirt))
    }
}

impl LoadedLibrary for StandInLibvirt {
    fn lookup(&self, name: &CStr) -> Option<SymbolAddr> {
        match name.to_bytes() {
            b"virConnectDomainEventRegisterAny" => SymbolAddr::new(register_any as *const c_void),
            b"virConnectDomainEventDeregisterAny" => {
                SymbolAddr::new(deregister_any as *const c_void)
            }
            _ => None,
        }
    }
}

static REGISTRY: Lazy<CallbackRegistry> = Lazy::new(CallbackRegistry::new);

struct TestRegistry;

impl RegistrySource for TestRegistry {
    fn registry() -> &'static CallbackRegistry {
        &REGISTRY
    }
}

fn subscriptions() -> EventSubscriptions<LibvirtEventApi, TestRegistry> {
    let resolver = Arc::new(SymbolResolver::with_loader(Box::new(StandInLibvirt), None));
    EventSubscriptions::new(LibvirtEventApi::new(Binding::new(resolver)))
}

fn stored(callback_id: c_int) -> Stored {
    *NATIVE.lock().unwrap().get(&callback_id).unwrap()
}

#[test]
fn lifecycle_events_reach_the_closure() -> anyhow::Result<()> {
    type Lifecycle = extern "C" fn(*mut c_void, *mut c_void, c_int, c_int, *mut c_void);

    let subs = subscriptions();
    let conn = ConnectPtr::from_raw(0x100 as *mut c_void);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let sub = subs.domain_event_register::<DomainLifecycleEvent, _>(conn, None, move |_, dom, ev| {
        s.lock().unwrap().push((dom, ev.event, ev.detail));
    })?;

    let native = stored(sub.callback_id);
    assert_eq!(native.event_id, 0);
    assert!(native.free.is_some());
    let handle = HandleId::from_opaque(native.opaque as *mut c_void).unwrap();
    assert!(REGISTRY.is_live(handle));

    // SAFETY: lifecycle registrations take the two-int trampoline
    let cb: Lifecycle = unsafe { std::mem::transmute::<GenericEventCallback, Lifecycle>(native.cb) };
    let dom = 0x200 as *mut c_void;
    cb(conn.as_raw(), dom, 2, 1, native.opaque as *mut c_void);
    cb(conn.as_raw(), dom, 5, 0, native.opaque as *mut c_void);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (DomainPtr::from_raw(dom), DomainEventType::Started, 1),
            (DomainPtr::from_raw(dom), DomainEventType::Stopped, 0),
        ]
    );

    subs.domain_event_deregister(conn, sub)?;
    assert!(!REGISTRY.is_live(handle));
    assert_eq!(subs.subscription_count()?, 0);
    Ok(())
}

#[test]
fn native_deregister_failure_is_reported() -> anyhow::Result<()> {
    let subs = subscriptions();
    let conn = ConnectPtr::from_raw(0x300 as *mut c_void);
    let sub = subs.domain_event_register::<DomainRebootEvent, _>(conn, None, |_, _, _| {})?;

    // pull the registration out from under the binding
    let native = NATIVE.lock().unwrap().remove(&sub.callback_id).unwrap();
    let err = subs.domain_event_deregister(conn, sub).unwrap_err();
    assert!(matches!(err, VirtBridgeError::NativeCallFailed(_)));
    assert_eq!(subs.subscription_count()?, 1);

    // the library frees it on its own schedule
    (native.free.unwrap())(native.opaque as *mut c_void);
    let handle = HandleId::from_opaque(native.opaque as *mut c_void).unwrap();
    assert!(!REGISTRY.is_live(handle));
    Ok(())
}

#[test]
fn entry_points_the_library_lacks_fail_cleanly() {
    let subs = subscriptions();
    let conn = ConnectPtr::from_raw(0x400 as *mut c_void);
    let res = subs.network_event_register::<virt_bridge::callbacks::events::NetworkLifecycleEvent, _>(
        conn,
        None,
        |_, _, _| {},
    );
    assert_eq!(
        res.unwrap_err(),
        VirtBridgeError::SymbolNotFound("virConnectNetworkEventRegisterAny".to_string())
    );
}
