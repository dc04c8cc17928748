use std::collections::HashMap;
use std::ffi::c_int;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Mutex;

use tracing::{error, info, instrument, Span};

use crate::callbacks::events::{
    ConnectCloseReason, Event, EventHandleType, HandleWatchEvent, TimeoutEvent,
};
use crate::callbacks::trampolines::{
    close_callback_for, event_callback_for, free_callback_for, handle_callback_for,
    timeout_callback_for,
};
use crate::callbacks::{
    CallbackKind, EventFamily, EventRecord, GlobalRegistry, HandleId, Invocation, RegistrySource,
    ReleaseCause,
};
use crate::native::types::{
    ConnectPtr, DomainPtr, FromSubject, NetworkPtr, NodeDevicePtr, SecretPtr, StoragePoolPtr,
};
use crate::native::NativeEventApi;
use crate::{log_then_return, new_error, Result, VirtBridgeError};

/// The admin connection close callback
pub mod admin;
/// Opening a connection with a credential callback
pub mod auth;
/// Installing a custom event loop
pub mod event_impl;
/// QEMU monitor events
pub mod qemu;
/// Stream readiness callbacks and whole-stream transfers
pub mod stream;

pub use event_impl::EventLoopImpl;

/// Identifies a `Register*Any` subscription. `callback_id` is the id the
/// native library returned, which is unrelated to the registry's
/// `HandleId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    /// The family the subscription was made in
    pub family: EventFamily,
    /// The native callback id
    pub callback_id: c_int,
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.family, self.callback_id)
    }
}

/// A native event loop timer id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub c_int);

/// A native event loop handle watch id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub c_int);

type SubscriptionKey = (usize, EventFamily, c_int);

/// Registers Rust closures with the native library and keeps track of
/// which handle backs each native registration.
///
/// `A` reaches the native entry points and `P` names the registry the
/// trampolines dispatch into.
pub struct EventSubscriptions<A: NativeEventApi, P: RegistrySource = GlobalRegistry> {
    api: A,
    subscriptions: Mutex<HashMap<SubscriptionKey, HandleId>>,
    close_callbacks: Mutex<HashMap<usize, HandleId>>,
    timers: Mutex<HashMap<c_int, HandleId>>,
    watches: Mutex<HashMap<c_int, HandleId>>,
    stream_events: Mutex<HashMap<usize, HandleId>>,
    adm_close: Mutex<HashMap<usize, HandleId>>,
    _registry: PhantomData<fn() -> P>,
}

impl<A: NativeEventApi, P: RegistrySource> EventSubscriptions<A, P> {
    /// Create an empty set of subscriptions over `api`
    pub fn new(api: A) -> Self {
        Self {
            api,
            subscriptions: Mutex::new(HashMap::new()),
            close_callbacks: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
            stream_events: Mutex::new(HashMap::new()),
            adm_close: Mutex::new(HashMap::new()),
            _registry: PhantomData,
        }
    }

    /// The native API registrations go through
    pub fn api(&self) -> &A {
        &self.api
    }

    // The native registration did not take the handle, so nothing will ever
    // free or dispatch it.
    fn abandon(&self, id: HandleId) {
        if let Err(e) = P::registry().release(id, ReleaseCause::RegistrationFailed) {
            error!("could not release {} after a failed registration: {}", id, e);
        }
    }

    // Registers `handler` for the length of one native call that invokes it
    // synchronously, then releases it whatever the call returned.
    fn with_call_handler<T, H, R>(&self, kind: CallbackKind, handler: H, run: R) -> Result<T>
    where
        H: for<'a> Fn(Invocation<'a>) -> c_int + Send + Sync + 'static,
        R: FnOnce(HandleId) -> Result<T>,
    {
        let id = P::registry().register_call(kind, handler);
        let res = run(id);
        if let Err(e) = P::registry().release(id, ReleaseCause::Deregistered) {
            error!("could not release {} after a {} call: {}", id, kind, e);
        }
        res
    }

    /// Subscribe `callback` to events of type `E` on `conn`, optionally only
    /// for `subject`.
    #[instrument(err(Debug), skip(self, subject, callback), parent = Span::current(), level = "Trace")]
    pub fn event_register<E, F>(
        &self,
        conn: ConnectPtr,
        subject: Option<E::Subject>,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        E: EventRecord,
        F: Fn(ConnectPtr, E::Subject, &E) + Send + Sync + 'static,
    {
        let (family, event_id) = match E::KIND.event_id() {
            Some(id) => id,
            None => {
                log_then_return!("{} events are not registered through a family", E::KIND);
            }
        };
        let trampoline = event_callback_for::<P>(E::KIND)
            .ok_or_else(|| new_error!("no trampoline for {} events", E::KIND))?;

        let id = P::registry().register_paired(E::KIND, move |conn, subject, event: &Event| {
            match (E::Subject::from_subject(subject), E::extract(event)) {
                (Some(subject), Some(record)) => callback(conn, subject, record),
                _ => error!("{:?} delivered to a {} subscriber", event.kind(), E::KIND),
            }
        });

        let filter = subject
            .map(|s| s.as_filter())
            .unwrap_or(std::ptr::null_mut());
        let callback_id = match self.api.register_any(
            family,
            conn,
            filter,
            event_id,
            trampoline,
            id.as_opaque(),
            Some(free_callback_for::<P>()),
        ) {
            Ok(callback_id) => callback_id,
            Err(e) => {
                self.abandon(id);
                return Err(e);
            }
        };

        self.subscriptions
            .lock()?
            .insert((conn.addr(), family, callback_id), id);
        let sub = SubscriptionId {
            family,
            callback_id,
        };
        info!("subscribed {} to {} events as {}", id, E::KIND, sub);
        Ok(sub)
    }

    /// Cancel a subscription made with [`Self::event_register`].
    ///
    /// When the native call fails the subscription stays in place and the
    /// error is returned.
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        let key = (conn.addr(), sub.family, sub.callback_id);
        let id = match self.subscriptions.lock()?.remove(&key) {
            Some(id) => id,
            None => return Err(VirtBridgeError::UnknownSubscription(sub.callback_id)),
        };
        if let Err(e) = self.api.deregister_any(sub.family, conn, sub.callback_id) {
            self.subscriptions.lock()?.insert(key, id);
            return Err(e);
        }
        P::registry().release(id, ReleaseCause::Deregistered)
    }

    fn family_deregister(&self, family: EventFamily, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        if sub.family != family {
            return Err(VirtBridgeError::UnknownSubscription(sub.callback_id));
        }
        self.event_deregister(conn, sub)
    }

    /// Subscribe to domain events of type `E`
    pub fn domain_event_register<E, F>(&self, conn: ConnectPtr, dom: Option<DomainPtr>, callback: F) -> Result<SubscriptionId>
    where
        E: EventRecord<Subject = DomainPtr>,
        F: Fn(ConnectPtr, DomainPtr, &E) + Send + Sync + 'static,
    {
        self.event_register::<E, F>(conn, dom, callback)
    }

    /// Cancel a domain event subscription
    pub fn domain_event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        self.family_deregister(EventFamily::Domain, conn, sub)
    }

    /// Subscribe to network events of type `E`
    pub fn network_event_register<E, F>(&self, conn: ConnectPtr, net: Option<NetworkPtr>, callback: F) -> Result<SubscriptionId>
    where
        E: EventRecord<Subject = NetworkPtr>,
        F: Fn(ConnectPtr, NetworkPtr, &E) + Send + Sync + 'static,
    {
        self.event_register::<E, F>(conn, net, callback)
    }

    /// Cancel a network event subscription
    pub fn network_event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        self.family_deregister(EventFamily::Network, conn, sub)
    }

    /// Subscribe to storage pool events of type `E`
    pub fn storage_pool_event_register<E, F>(
        &self,
        conn: ConnectPtr,
        pool: Option<StoragePoolPtr>,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        E: EventRecord<Subject = StoragePoolPtr>,
        F: Fn(ConnectPtr, StoragePoolPtr, &E) + Send + Sync + 'static,
    {
        self.event_register::<E, F>(conn, pool, callback)
    }

    /// Cancel a storage pool event subscription
    pub fn storage_pool_event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        self.family_deregister(EventFamily::StoragePool, conn, sub)
    }

    /// Subscribe to node device events of type `E`
    pub fn node_device_event_register<E, F>(
        &self,
        conn: ConnectPtr,
        dev: Option<NodeDevicePtr>,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        E: EventRecord<Subject = NodeDevicePtr>,
        F: Fn(ConnectPtr, NodeDevicePtr, &E) + Send + Sync + 'static,
    {
        self.event_register::<E, F>(conn, dev, callback)
    }

    /// Cancel a node device event subscription
    pub fn node_device_event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        self.family_deregister(EventFamily::NodeDevice, conn, sub)
    }

    /// Subscribe to secret events of type `E`
    pub fn secret_event_register<E, F>(&self, conn: ConnectPtr, secret: Option<SecretPtr>, callback: F) -> Result<SubscriptionId>
    where
        E: EventRecord<Subject = SecretPtr>,
        F: Fn(ConnectPtr, SecretPtr, &E) + Send + Sync + 'static,
    {
        self.event_register::<E, F>(conn, secret, callback)
    }

    /// Cancel a secret event subscription
    pub fn secret_event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        self.family_deregister(EventFamily::Secret, conn, sub)
    }

    /// Have `callback` run when `conn` is closed. A connection carries at
    /// most one close callback.
    #[instrument(err(Debug), skip(self, callback), parent = Span::current(), level = "Trace")]
    pub fn register_close_callback<F>(&self, conn: ConnectPtr, callback: F) -> Result<()>
    where
        F: Fn(ConnectPtr, ConnectCloseReason) + Send + Sync + 'static,
    {
        let mut close_callbacks = self.close_callbacks.lock()?;
        if close_callbacks.contains_key(&conn.addr()) {
            log_then_return!("A close callback is already registered");
        }
        let id = P::registry().register_paired(CallbackKind::ConnectClose, move |conn, _, event| {
            match event {
                Event::ConnectClose(close) => callback(conn, close.reason),
                other => error!("{:?} delivered to a close callback", other.kind()),
            }
        });
        if let Err(e) = self.api.register_close_callback(
            conn,
            close_callback_for::<P>(),
            id.as_opaque(),
            Some(free_callback_for::<P>()),
        ) {
            self.abandon(id);
            return Err(e);
        }
        close_callbacks.insert(conn.addr(), id);
        Ok(())
    }

    /// Remove the close callback of `conn`
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn unregister_close_callback(&self, conn: ConnectPtr) -> Result<()> {
        let mut close_callbacks = self.close_callbacks.lock()?;
        let id = match close_callbacks.get(&conn.addr()) {
            Some(id) => *id,
            None => {
                log_then_return!("A different callback was requested");
            }
        };
        self.api
            .unregister_close_callback(conn, close_callback_for::<P>())?;
        close_callbacks.remove(&conn.addr());
        drop(close_callbacks);
        P::registry().release(id, ReleaseCause::Deregistered)
    }

    /// Run `callback` every `frequency_ms` milliseconds on the native event
    /// loop. A negative frequency creates a disabled timer.
    #[instrument(err(Debug), skip(self, callback), parent = Span::current(), level = "Trace")]
    pub fn event_add_timeout<F>(&self, frequency_ms: c_int, callback: F) -> Result<TimerId>
    where
        F: Fn(TimerId) + Send + Sync + 'static,
    {
        let id = P::registry().register(CallbackKind::Timeout, move |_, _, event| match event {
            Event::Timeout(TimeoutEvent { timer }) => callback(TimerId(*timer)),
            other => error!("{:?} delivered to a timer", other.kind()),
        });
        // the native side gets no free callback; removal releases the handle
        let timer = match self
            .api
            .add_timeout(frequency_ms, timeout_callback_for::<P>(), id.as_opaque(), None)
        {
            Ok(timer) => timer,
            Err(e) => {
                self.abandon(id);
                return Err(e);
            }
        };
        self.timers.lock()?.insert(timer, id);
        Ok(TimerId(timer))
    }

    /// Remove a timer added with [`Self::event_add_timeout`]
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn event_remove_timeout(&self, timer: TimerId) -> Result<()> {
        let mut timers = self.timers.lock()?;
        let id = match timers.get(&timer.0) {
            Some(id) => *id,
            None => return Err(VirtBridgeError::UnknownSubscription(timer.0)),
        };
        self.api.remove_timeout(timer.0)?;
        timers.remove(&timer.0);
        drop(timers);
        P::registry().release(id, ReleaseCause::Deregistered)
    }

    /// Run `callback` when `fd` becomes ready for any of `events` on the
    /// native event loop.
    #[instrument(err(Debug), skip(self, callback), parent = Span::current(), level = "Trace")]
    pub fn event_add_handle<F>(&self, fd: c_int, events: EventHandleType, callback: F) -> Result<WatchId>
    where
        F: Fn(WatchId, c_int, EventHandleType) + Send + Sync + 'static,
    {
        let id = P::registry().register(CallbackKind::HandleWatch, move |_, _, event| match event {
            Event::HandleWatch(HandleWatchEvent { watch, fd, events }) => {
                callback(WatchId(*watch), *fd, *events)
            }
            other => error!("{:?} delivered to a handle watch", other.kind()),
        });
        let watch = match self.api.add_handle(
            fd,
            events,
            handle_callback_for::<P>(),
            id.as_opaque(),
            None,
        ) {
            Ok(watch) => watch,
            Err(e) => {
                self.abandon(id);
                return Err(e);
            }
        };
        self.watches.lock()?.insert(watch, id);
        Ok(WatchId(watch))
    }

    /// Remove a watch added with [`Self::event_add_handle`]
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn event_remove_handle(&self, watch: WatchId) -> Result<()> {
        let mut watches = self.watches.lock()?;
        let id = match watches.get(&watch.0) {
            Some(id) => *id,
            None => return Err(VirtBridgeError::UnknownSubscription(watch.0)),
        };
        self.api.remove_handle(watch.0)?;
        watches.remove(&watch.0);
        drop(watches);
        P::registry().release(id, ReleaseCause::Deregistered)
    }

    /// Install the native library's default event loop implementation
    pub fn event_register_default_impl(&self) -> Result<()> {
        self.api.register_default_impl()
    }

    /// Run one iteration of the native default event loop
    pub fn event_run_default_impl(&self) -> Result<()> {
        self.api.run_default_impl()
    }

    /// Number of live `Register*Any` subscriptions
    pub fn subscription_count(&self) -> Result<usize> {
        Ok(self.subscriptions.lock()?.len())
    }
}

impl<A: NativeEventApi + fmt::Debug, P: RegistrySource> fmt::Debug for EventSubscriptions<A, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscriptions")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}
