use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_int;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strum::Display;
use tracing::{debug, error, instrument, trace, Span};

use super::events::{CallbackKind, Event, RawEvent};
use super::handle::{HandleAllocator, HandleId};
use super::invocation::Invocation;
use crate::native::types::{ConnectPtr, Subject};
use crate::{Result, VirtBridgeError};

/// A subscriber closure as stored in the registry.
pub type EventHandler = dyn Fn(ConnectPtr, Subject, &Event) + Send + Sync;

/// A closure answering native calls, as stored in the registry.
pub type CallHandler = dyn for<'a> Fn(Invocation<'a>) -> c_int + Send + Sync;

/// Why a handle is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ReleaseCause {
    /// The subscriber cancelled the subscription
    Deregistered,
    /// The native library signalled that it dropped the opaque pointer
    NativeFreed,
    /// The native registration carrying the handle failed
    RegistrationFailed,
}

impl ReleaseCause {
    /// The cause expected to arrive second for a paired handle released
    /// with `self` first.
    fn counterpart(&self) -> Option<ReleaseCause> {
        match self {
            ReleaseCause::Deregistered => Some(ReleaseCause::NativeFreed),
            ReleaseCause::NativeFreed => Some(ReleaseCause::Deregistered),
            ReleaseCause::RegistrationFailed => None,
        }
    }
}

#[derive(Clone)]
enum Handler {
    Event(Arc<EventHandler>),
    Call(Arc<CallHandler>),
}

struct Entry {
    kind: CallbackKind,
    handler: Handler,
    paired: bool,
}

#[derive(Default)]
struct Table {
    live: HashMap<HandleId, Entry>,
    // released paired handles still owed their second notification
    awaiting: HashMap<HandleId, ReleaseCause>,
    // the handle behind the event loop installed with virEventRegisterImpl
    event_impl: Option<HandleId>,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Owns every callback the native library can reach and routes
/// trampoline invocations to them.
///
/// Ids are never reused. A handle is dispatchable from the moment
/// `register` returns until the first `release` for it returns; after
/// that no dispatch can find it.
pub struct CallbackRegistry {
    ids: HandleAllocator,
    table: Mutex<Table>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            ids: HandleAllocator::new(),
            table: Mutex::new(Table::default()),
        }
    }

    // Every mutation leaves the table consistent before anything that can
    // panic runs, so a poisoned lock still guards valid data.
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `handler` for events of `kind` and return its fresh id. The
    /// handle is released exactly once.
    #[instrument(skip(self, handler), parent = Span::current(), level = "Trace")]
    pub fn register<F>(&self, kind: CallbackKind, handler: F) -> HandleId
    where
        F: Fn(ConnectPtr, Subject, &Event) + Send + Sync + 'static,
    {
        self.insert(kind, Handler::Event(Arc::new(handler)), false)
    }

    /// Store `handler` for native calls of `kind`, which must be a call
    /// kind. Such handles are never passed with a free callback.
    #[instrument(skip(self, handler), parent = Span::current(), level = "Trace")]
    pub fn register_call<F>(&self, kind: CallbackKind, handler: F) -> HandleId
    where
        F: for<'a> Fn(Invocation<'a>) -> c_int + Send + Sync + 'static,
    {
        self.insert(kind, Handler::Call(Arc::new(handler)), false)
    }

    /// Like [`Self::register`], for handles passed to the native library
    /// together with a free callback. Once registered natively such a
    /// handle receives both a `Deregistered` and a `NativeFreed` release,
    /// in either order; the second is a no-op.
    #[instrument(skip(self, handler), parent = Span::current(), level = "Trace")]
    pub fn register_paired<F>(&self, kind: CallbackKind, handler: F) -> HandleId
    where
        F: Fn(ConnectPtr, Subject, &Event) + Send + Sync + 'static,
    {
        self.insert(kind, Handler::Event(Arc::new(handler)), true)
    }

    fn insert(&self, kind: CallbackKind, handler: Handler, paired: bool) -> HandleId {
        let id = self.ids.next_id();
        self.table().live.insert(
            id,
            Entry {
                kind,
                handler,
                paired,
            },
        );
        debug!("registered {} for {} events", id, kind);
        id
    }

    /// Remove the handle. A release that the handle was not expecting is
    /// reported as `DoubleRelease` and leaves every other handle untouched.
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn release(&self, id: HandleId, cause: ReleaseCause) -> Result<()> {
        let mut table = self.table();
        if let Some(entry) = table.live.remove(&id) {
            if entry.paired {
                if let Some(second) = cause.counterpart() {
                    table.awaiting.insert(id, second);
                }
            }
            if table.event_impl == Some(id) {
                table.event_impl = None;
            }
            let awaiting = table.awaiting.len();
            drop(table);
            debug!("released {} ({}), {} awaiting a second release", id, cause, awaiting);
            return Ok(());
        }
        if table.awaiting.get(&id) == Some(&cause) {
            table.awaiting.remove(&id);
            let awaiting = table.awaiting.len();
            drop(table);
            debug!("second release of {} ({}) ignored, {} still awaiting", id, cause, awaiting);
            return Ok(());
        }
        drop(table);
        let err = VirtBridgeError::DoubleRelease(id);
        error!("{} ({})", err, cause);
        Err(err)
    }

    /// Decode `raw` for the kind `id` was registered with and invoke its
    /// handler. The handler runs outside the table lock; a panic in it is
    /// logged and does not propagate.
    pub fn dispatch(&self, id: HandleId, raw: &RawEvent<'_>) -> Result<()> {
        let (kind, handler) = self.lookup(id)?;
        let handler = match handler {
            Handler::Event(handler) => handler,
            Handler::Call(_) => {
                return Err(VirtBridgeError::EventKindMismatch {
                    handle: id,
                    kind,
                    received: raw.args.len(),
                })
            }
        };
        let (subject, event) = Event::decode(id, kind, raw)?;
        trace!("dispatching {:?} to {}", event, id);
        let conn = raw.conn;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(conn, subject, &event))) {
            error!("callback for {} ({}) panicked: {}", id, kind, panic_message(&*panic));
        }
        Ok(())
    }

    /// Hand `invocation` to the call handler of `id` and return its answer.
    /// A panic in the handler is logged and answered with `-1`.
    pub fn invoke(&self, id: HandleId, invocation: Invocation<'_>) -> Result<c_int> {
        let (registered, handler) = self.lookup(id)?;
        let received = invocation.kind();
        let handler = match handler {
            Handler::Call(handler) if registered == received => handler,
            _ => {
                return Err(VirtBridgeError::CallbackKindMismatch {
                    handle: id,
                    registered,
                    received,
                })
            }
        };
        trace!("invoking {} for {:?}", id, invocation);
        match catch_unwind(AssertUnwindSafe(|| handler(invocation))) {
            Ok(ret) => Ok(ret),
            Err(panic) => {
                error!("callback for {} ({}) panicked: {}", id, registered, panic_message(&*panic));
                Ok(-1)
            }
        }
    }

    fn lookup(&self, id: HandleId) -> Result<(CallbackKind, Handler)> {
        let table = self.table();
        match table.live.get(&id) {
            Some(entry) => Ok((entry.kind, entry.handler.clone())),
            None => Err(VirtBridgeError::StaleHandleDispatched(id)),
        }
    }

    /// Record `id` as the handle behind the installed event loop and
    /// return the one it replaces.
    pub fn set_event_impl(&self, id: HandleId) -> Option<HandleId> {
        self.table().event_impl.replace(id)
    }

    /// The handle behind the installed event loop, if any
    pub fn event_impl(&self) -> Option<HandleId> {
        self.table().event_impl
    }

    /// Whether `id` is currently dispatchable
    pub fn is_live(&self, id: HandleId) -> bool {
        self.table().live.contains_key(&id)
    }

    /// The kind `id` was registered with, if it is live
    pub fn kind_of(&self, id: HandleId) -> Option<CallbackKind> {
        self.table().live.get(&id).map(|e| e.kind)
    }

    /// Number of dispatchable handles
    pub fn len(&self) -> usize {
        self.table().live.len()
    }

    /// Whether no handle is dispatchable
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of released handles still owed their second release
    pub fn awaiting_len(&self) -> usize {
        self.table().awaiting.len()
    }
}

impl Drop for CallbackRegistry {
    fn drop(&mut self) {
        let table = self.table.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !table.awaiting.is_empty() {
            debug!(
                "dropping registry with {} handles awaiting a second release",
                table.awaiting.len()
            );
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table();
        f.debug_struct("CallbackRegistry")
            .field("live", &table.live.len())
            .field("awaiting", &table.awaiting.len())
            .finish()
    }
}
