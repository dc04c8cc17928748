use tracing::{error, info, instrument, Span};

use super::EventSubscriptions;
use crate::callbacks::events::{ConnectCloseReason, Event};
use crate::callbacks::trampolines::{adm_close_callback_for, free_callback_for};
use crate::callbacks::{CallbackKind, RegistrySource, ReleaseCause};
use crate::native::types::{AdmConnectPtr, FromSubject};
use crate::native::NativeEventApi;
use crate::Result;

impl<A: NativeEventApi, P: RegistrySource> EventSubscriptions<A, P> {
    /// Have `callback` run when the admin connection `conn` is closed.
    /// Registering replaces the callback registered before, if any.
    #[instrument(err(Debug), skip(self, callback), parent = Span::current(), level = "Trace")]
    pub fn adm_register_close_callback<F>(&self, conn: AdmConnectPtr, callback: F) -> Result<()>
    where
        F: Fn(AdmConnectPtr, ConnectCloseReason) + Send + Sync + 'static,
    {
        self.adm_unregister_close_callback(conn)?;
        let mut adm_close = self.adm_close.lock()?;
        let id = P::registry().register_paired(CallbackKind::AdmConnectClose, move |_, subject, event| {
            match (AdmConnectPtr::from_subject(subject), event) {
                (Some(conn), Event::AdmConnectClose(close)) => callback(conn, close.reason),
                (_, other) => error!("{:?} delivered to an admin close callback", other.kind()),
            }
        });
        if let Err(e) = self.api.adm_register_close_callback(
            conn,
            adm_close_callback_for::<P>(),
            id.as_opaque(),
            Some(free_callback_for::<P>()),
        ) {
            self.abandon(id);
            return Err(e);
        }
        adm_close.insert(conn.addr(), id);
        info!("registered admin close callback {} for {:#x}", id, conn.addr());
        Ok(())
    }

    /// Remove the close callback of the admin connection `conn`. Does
    /// nothing when none is registered.
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn adm_unregister_close_callback(&self, conn: AdmConnectPtr) -> Result<()> {
        let mut adm_close = self.adm_close.lock()?;
        let id = match adm_close.get(&conn.addr()) {
            Some(id) => *id,
            None => return Ok(()),
        };
        self.api
            .adm_unregister_close_callback(conn, adm_close_callback_for::<P>())?;
        adm_close.remove(&conn.addr());
        drop(adm_close);
        P::registry().release(id, ReleaseCause::Deregistered)
    }
}
