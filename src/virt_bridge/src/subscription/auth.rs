use std::ffi::{c_int, c_uint, CString};
use std::sync::Mutex;

use tracing::{error, info, instrument, Span};

use super::EventSubscriptions;
use crate::callbacks::events::CredentialType;
use crate::callbacks::trampolines::auth_callback_for;
use crate::callbacks::{CallbackKind, Invocation, RegistrySource};
use crate::native::params::{Credential, RawConnectAuth};
use crate::native::types::ConnectPtr;
use crate::native::NativeEventApi;
use crate::Result;

impl<A: NativeEventApi, P: RegistrySource> EventSubscriptions<A, P> {
    /// Open a connection to `name`, asking `callback` for any of the
    /// `credentials` the driver needs.
    ///
    /// `callback` fills in [`Credential::result`] for each credential it
    /// is given and answers `false` to refuse the authentication. It is
    /// only called while the connection is being opened.
    #[instrument(err(Debug), skip(self, callback), parent = Span::current(), level = "Trace")]
    pub fn connect_open_auth<F>(
        &self,
        name: Option<&str>,
        credentials: &[CredentialType],
        flags: c_uint,
        callback: F,
    ) -> Result<ConnectPtr>
    where
        F: FnMut(&mut [Credential]) -> bool + Send + 'static,
    {
        let name = name.map(CString::new).transpose()?;
        let mut credtype: Vec<c_int> = credentials.iter().map(CredentialType::code).collect();
        let callback = Mutex::new(callback);
        let conn = self.with_call_handler(
            CallbackKind::ConnectAuth,
            move |invocation| match invocation {
                Invocation::Auth { creds } => match callback.lock() {
                    Ok(mut f) => {
                        if f(creds) {
                            0
                        } else {
                            -1
                        }
                    }
                    Err(_) => -1,
                },
                other => {
                    error!("{:?} delivered to an auth callback", other.kind());
                    -1
                }
            },
            |id| {
                let mut auth = RawConnectAuth {
                    credtype: credtype.as_mut_ptr(),
                    ncredtype: credtype.len() as c_uint,
                    cb: auth_callback_for::<P>(),
                    cbdata: id.as_opaque(),
                };
                self.api.open_auth(name.as_deref(), &mut auth, flags)
            },
        )?;
        info!("opened connection {:#x}", conn.addr());
        Ok(conn)
    }
}
