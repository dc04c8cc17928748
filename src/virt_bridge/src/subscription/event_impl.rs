use std::ffi::c_int;

use tracing::{error, info, instrument, Span};

use super::EventSubscriptions;
use crate::callbacks::events::EventHandleType;
use crate::callbacks::trampolines::event_impl_callbacks_for;
use crate::callbacks::{CallbackKind, Invocation, NativeHandleCallback, NativeTimeoutCallback, RegistrySource};
use crate::native::NativeEventApi;
use crate::{log_then_return, Result};

/// An event loop the native library drives its file handles and timers
/// through, installed with [`EventSubscriptions::event_register_impl`].
///
/// Ids are chosen by the implementation and must be non-negative. Every
/// removal answers `0` on success and `-1` for an unknown id, and must
/// [`free`](NativeHandleCallback::free) the callback it removes.
pub trait EventLoopImpl: Send + Sync + 'static {
    /// Start watching `fd` and answer the watch id
    fn add_handle(&self, fd: c_int, events: EventHandleType, callback: NativeHandleCallback) -> c_int;

    /// Change the events `watch` waits for
    fn update_handle(&self, watch: c_int, events: EventHandleType);

    /// Stop watching
    fn remove_handle(&self, watch: c_int) -> c_int;

    /// Start a timer firing every `frequency_ms` milliseconds, disabled when
    /// negative, and answer the timer id
    fn add_timeout(&self, frequency_ms: c_int, callback: NativeTimeoutCallback) -> c_int;

    /// Change the frequency of `timer`
    fn update_timeout(&self, timer: c_int, frequency_ms: c_int);

    /// Stop the timer
    fn remove_timeout(&self, timer: c_int) -> c_int;
}

impl<A: NativeEventApi, P: RegistrySource> EventSubscriptions<A, P> {
    /// Have the native library run its handles and timers on `event_loop`.
    ///
    /// Only one implementation can be installed per process, and it stays
    /// installed for the life of the process.
    #[instrument(err(Debug), skip(self, event_loop), parent = Span::current(), level = "Trace")]
    pub fn event_register_impl<L: EventLoopImpl>(&self, event_loop: L) -> Result<()> {
        let id = P::registry().register_call(CallbackKind::EventLoopImpl, move |invocation| match invocation {
            Invocation::AddHandle { fd, events, callback } => event_loop.add_handle(fd, events, callback),
            Invocation::UpdateHandle { watch, events } => {
                event_loop.update_handle(watch, events);
                0
            }
            Invocation::RemoveHandle { watch } => event_loop.remove_handle(watch),
            Invocation::AddTimeout { frequency_ms, callback } => event_loop.add_timeout(frequency_ms, callback),
            Invocation::UpdateTimeout { timer, frequency_ms } => {
                event_loop.update_timeout(timer, frequency_ms);
                0
            }
            Invocation::RemoveTimeout { timer } => event_loop.remove_timeout(timer),
            other => {
                error!("{:?} delivered to an event loop", other.kind());
                -1
            }
        });
        if let Some(installed) = P::registry().set_event_impl(id) {
            P::registry().set_event_impl(installed);
            self.abandon(id);
            log_then_return!("An event loop implementation is already registered");
        }
        if let Err(e) = self.api.register_impl(event_impl_callbacks_for::<P>()) {
            self.abandon(id);
            return Err(e);
        }
        info!("installed event loop implementation as {}", id);
        Ok(())
    }
}
