use std::ffi::c_int;
use std::sync::Mutex;

use tracing::{error, info, instrument, Span};

use super::EventSubscriptions;
use crate::callbacks::events::{Event, StreamEventType};
use crate::callbacks::trampolines::{
    stream_event_callback_for, stream_sink_callback_for, stream_sink_hole_callback_for,
    stream_source_callback_for, stream_source_hole_callback_for, stream_source_skip_callback_for,
};
use crate::callbacks::{CallbackKind, Invocation, RegistrySource, ReleaseCause};
use crate::native::types::{FromSubject, StreamPtr};
use crate::native::NativeEventApi;
use crate::{log_then_return, Result};

// A transfer closure that was poisoned by an earlier panic fails the
// transfer instead of running again.
fn locked<T>(f: &Mutex<T>, run: impl FnOnce(&mut T) -> c_int) -> c_int {
    match f.lock() {
        Ok(mut f) => run(&mut f),
        Err(_) => -1,
    }
}

impl<A: NativeEventApi, P: RegistrySource> EventSubscriptions<A, P> {
    /// Run `callback` when `stream` becomes ready for any of `events`. A
    /// stream carries at most one event callback.
    #[instrument(err(Debug), skip(self, callback), parent = Span::current(), level = "Trace")]
    pub fn stream_event_add_callback<F>(
        &self,
        stream: StreamPtr,
        events: StreamEventType,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(StreamPtr, StreamEventType) + Send + Sync + 'static,
    {
        let mut streams = self.stream_events.lock()?;
        if streams.contains_key(&stream.addr()) {
            log_then_return!("A stream event callback is already registered");
        }
        let id = P::registry().register(CallbackKind::Stream, move |_, subject, event| {
            match (StreamPtr::from_subject(subject), event) {
                (Some(stream), Event::Stream(ev)) => callback(stream, ev.events),
                (_, other) => error!("{:?} delivered to a stream callback", other.kind()),
            }
        });
        // the native side gets no free callback; removal releases the handle
        if let Err(e) = self.api.stream_event_add_callback(
            stream,
            events,
            stream_event_callback_for::<P>(),
            id.as_opaque(),
            None,
        ) {
            self.abandon(id);
            return Err(e);
        }
        streams.insert(stream.addr(), id);
        info!("watching stream {:#x} for {:?} as {}", stream.addr(), events, id);
        Ok(())
    }

    /// Change the events the callback of `stream` waits for
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn stream_event_update_callback(&self, stream: StreamPtr, events: StreamEventType) -> Result<()> {
        if !self.stream_events.lock()?.contains_key(&stream.addr()) {
            log_then_return!("No stream event callback is registered");
        }
        self.api.stream_event_update_callback(stream, events)
    }

    /// Remove the event callback of `stream`
    #[instrument(err(Debug), skip(self), parent = Span::current(), level = "Trace")]
    pub fn stream_event_remove_callback(&self, stream: StreamPtr) -> Result<()> {
        let mut streams = self.stream_events.lock()?;
        let id = match streams.get(&stream.addr()) {
            Some(id) => *id,
            None => {
                log_then_return!("No stream event callback is registered");
            }
        };
        self.api.stream_event_remove_callback(stream)?;
        streams.remove(&stream.addr());
        drop(streams);
        P::registry().release(id, ReleaseCause::Deregistered)
    }

    /// Receive everything from `stream`, handing each chunk to `sink`.
    ///
    /// `sink` answers the number of bytes it consumed or `-1` to abort the
    /// transfer.
    #[instrument(err(Debug), skip(self, sink), parent = Span::current(), level = "Trace")]
    pub fn stream_recv_all<S>(&self, stream: StreamPtr, sink: S) -> Result<()>
    where
        S: FnMut(StreamPtr, &[u8]) -> c_int + Send + 'static,
    {
        let sink = Mutex::new(sink);
        self.with_call_handler(
            CallbackKind::StreamSink,
            move |invocation| match invocation {
                Invocation::StreamSink { stream, data } => locked(&sink, |f| f(stream, data)),
                other => {
                    error!("{:?} delivered to a stream sink", other.kind());
                    -1
                }
            },
            |id| {
                self.api
                    .stream_recv_all(stream, stream_sink_callback_for::<P>(), id.as_opaque())
            },
        )
    }

    /// Like [`Self::stream_recv_all`], reporting holes to `hole` instead of
    /// passing their zeroes to `sink`.
    #[instrument(err(Debug), skip(self, sink, hole), parent = Span::current(), level = "Trace")]
    pub fn stream_sparse_recv_all<S, H>(&self, stream: StreamPtr, sink: S, hole: H) -> Result<()>
    where
        S: FnMut(StreamPtr, &[u8]) -> c_int + Send + 'static,
        H: FnMut(StreamPtr, i64) -> c_int + Send + 'static,
    {
        let handlers = Mutex::new((sink, hole));
        self.with_call_handler(
            CallbackKind::StreamSink,
            move |invocation| match invocation {
                Invocation::StreamSink { stream, data } => locked(&handlers, |(sink, _)| sink(stream, data)),
                Invocation::StreamSinkHole { stream, length } => {
                    locked(&handlers, |(_, hole)| hole(stream, length))
                }
                other => {
                    error!("{:?} delivered to a stream sink", other.kind());
                    -1
                }
            },
            |id| {
                self.api.stream_sparse_recv_all(
                    stream,
                    stream_sink_callback_for::<P>(),
                    stream_sink_hole_callback_for::<P>(),
                    id.as_opaque(),
                )
            },
        )
    }

    /// Send everything `source` produces over `stream`.
    ///
    /// `source` fills the buffer and answers the number of bytes written,
    /// `0` at the end of the data or `-1` to abort the transfer.
    #[instrument(err(Debug), skip(self, source), parent = Span::current(), level = "Trace")]
    pub fn stream_send_all<S>(&self, stream: StreamPtr, source: S) -> Result<()>
    where
        S: FnMut(StreamPtr, &mut [u8]) -> c_int + Send + 'static,
    {
        let source = Mutex::new(source);
        self.with_call_handler(
            CallbackKind::StreamSource,
            move |invocation| match invocation {
                Invocation::StreamSource { stream, buf } => locked(&source, |f| f(stream, buf)),
                other => {
                    error!("{:?} delivered to a stream source", other.kind());
                    -1
                }
            },
            |id| {
                self.api
                    .stream_send_all(stream, stream_source_callback_for::<P>(), id.as_opaque())
            },
        )
    }

    /// Like [`Self::stream_send_all`] for sparse data.
    ///
    /// `hole` reports whether the current position is in data and how long
    /// that section is, `None` aborting the transfer. `skip` moves past a
    /// hole of the given length.
    #[instrument(err(Debug), skip(self, source, hole, skip), parent = Span::current(), level = "Trace")]
    pub fn stream_sparse_send_all<S, H, K>(&self, stream: StreamPtr, source: S, hole: H, skip: K) -> Result<()>
    where
        S: FnMut(StreamPtr, &mut [u8]) -> c_int + Send + 'static,
        H: FnMut(StreamPtr) -> Option<(bool, i64)> + Send + 'static,
        K: FnMut(StreamPtr, i64) -> c_int + Send + 'static,
    {
        let handlers = Mutex::new((source, hole, skip));
        self.with_call_handler(
            CallbackKind::StreamSource,
            move |invocation| match invocation {
                Invocation::StreamSource { stream, buf } => {
                    locked(&handlers, |(source, _, _)| source(stream, buf))
                }
                Invocation::StreamSourceHole {
                    stream,
                    in_data,
                    length,
                } => locked(&handlers, |(_, hole, _)| match hole(stream) {
                    Some((data, len)) => {
                        *in_data = data;
                        *length = len;
                        0
                    }
                    None => -1,
                }),
                Invocation::StreamSourceSkip { stream, length } => {
                    locked(&handlers, |(_, _, skip)| skip(stream, length))
                }
                other => {
                    error!("{:?} delivered to a stream source", other.kind());
                    -1
                }
            },
            |id| {
                self.api.stream_sparse_send_all(
                    stream,
                    stream_source_callback_for::<P>(),
                    stream_source_hole_callback_for::<P>(),
                    stream_source_skip_callback_for::<P>(),
                    id.as_opaque(),
                )
            },
        )
    }
}
