use std::ffi::CString;

use tracing::{error, info, instrument, Span};

use super::{EventSubscriptions, SubscriptionId};
use crate::callbacks::events::{Event, QemuMonitorEvent, QemuMonitorEventFlags};
use crate::callbacks::trampolines::{free_callback_for, qemu_monitor_callback_for};
use crate::callbacks::{CallbackKind, EventFamily, RegistrySource};
use crate::native::types::{ConnectPtr, DomainPtr, FromSubject};
use crate::native::NativeEventApi;
use crate::Result;

impl<A: NativeEventApi, P: RegistrySource> EventSubscriptions<A, P> {
    /// Subscribe to QEMU monitor events, optionally only those of `dom`.
    ///
    /// `event` filters on the monitor event name, matched as `flags`
    /// describe; `None` receives every event.
    #[instrument(err(Debug), skip(self, dom, callback), parent = Span::current(), level = "Trace")]
    pub fn domain_qemu_monitor_event_register<F>(
        &self,
        conn: ConnectPtr,
        dom: Option<DomainPtr>,
        event: Option<&str>,
        flags: QemuMonitorEventFlags,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(ConnectPtr, DomainPtr, &QemuMonitorEvent) + Send + Sync + 'static,
    {
        let event = event.map(CString::new).transpose()?;
        let id = P::registry().register_paired(CallbackKind::QemuMonitor, move |conn, subject, ev| {
            match (DomainPtr::from_subject(subject), ev) {
                (Some(dom), Event::QemuMonitor(record)) => callback(conn, dom, record),
                (_, other) => error!("{:?} delivered to a QEMU monitor subscriber", other.kind()),
            }
        });
        let filter = dom.map(|d| d.as_raw()).unwrap_or(std::ptr::null_mut());
        let callback_id = match self.api.qemu_monitor_event_register(
            conn,
            filter,
            event.as_deref(),
            qemu_monitor_callback_for::<P>(),
            id.as_opaque(),
            Some(free_callback_for::<P>()),
            flags,
        ) {
            Ok(callback_id) => callback_id,
            Err(e) => {
                self.abandon(id);
                return Err(e);
            }
        };

        let family = EventFamily::QemuMonitor;
        self.subscriptions
            .lock()?
            .insert((conn.addr(), family, callback_id), id);
        let sub = SubscriptionId {
            family,
            callback_id,
        };
        info!("subscribed {} to QEMU monitor events as {}", id, sub);
        Ok(sub)
    }

    /// Cancel a subscription made with
    /// [`Self::domain_qemu_monitor_event_register`]
    pub fn domain_qemu_monitor_event_deregister(&self, conn: ConnectPtr, sub: SubscriptionId) -> Result<()> {
        self.family_deregister(EventFamily::QemuMonitor, conn, sub)
    }
}
