use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tracing::Subscriber;
use tracing_core::event::Event;
use tracing_core::metadata::Metadata;
use tracing_core::span::{Attributes, Current, Id, Record};
use tracing_core::{Level, LevelFilter};
use tracing_serde::AsSerde;

/// Records every span and event as JSON, so tests can assert on the fields
/// the code under test attached to them.
///
/// Spans are stored as `{"span": {"id": .., "attributes": {..}}}` and events
/// as `{"event": {..}}`, both in the shape `tracing-serde` produces.
#[derive(Debug, Clone)]
pub struct TracingSubscriber {
    span_metadata: Arc<Mutex<HashMap<u64, &'static Metadata<'static>>>>,
    spans: Arc<Mutex<HashMap<u64, Value>>>,
    events: Arc<Mutex<Vec<Value>>>,
    level_filter: LevelFilter,
    next_id: Arc<AtomicU64>,
    span_stack: Arc<Mutex<Vec<Id>>>,
}

impl TracingSubscriber {
    /// Capture everything at `trace_level` and above
    pub fn new(trace_level: Level) -> Self {
        Self {
            span_metadata: Arc::new(Mutex::new(HashMap::new())),
            spans: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            level_filter: trace_level.into(),
            next_id: Arc::new(AtomicU64::new(1)),
            span_stack: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All spans created so far, by id
    pub fn get_spans(&self) -> HashMap<u64, Value> {
        self.spans.lock().expect("Failed to lock spans").clone()
    }

    /// The attributes of every span called `name`, including recorded
    /// fields
    pub fn span_attributes(&self, name: &str) -> Vec<Value> {
        self.get_spans()
            .values()
            .filter_map(|span| span.pointer("/span/attributes"))
            .filter(|attrs| attrs.pointer("/metadata/name") == Some(&json!(name)))
            .cloned()
            .collect()
    }

    /// All events seen so far, in order
    pub fn get_events(&self) -> Vec<Value> {
        self.events.lock().expect("Failed to lock events").clone()
    }

    /// The `message` field of every event, in order
    pub fn event_messages(&self) -> Vec<String> {
        self.get_events()
            .iter()
            .filter_map(|e| e.pointer("/event/message"))
            .filter_map(|m| m.as_str().map(String::from))
            .collect()
    }

    /// Run `f` over the captured spans and events, then drop the events
    pub fn test_trace_records<F: Fn(&HashMap<u64, Value>, &Vec<Value>)>(&self, f: F) {
        f(&self.get_spans(), &self.get_events());
        self.events.lock().expect("Failed to lock events").clear();
    }

    /// Forget everything captured so far
    pub fn clear(&self) {
        self.spans.lock().expect("Failed to lock spans").clear();
        self.events.lock().expect("Failed to lock events").clear();
        self.span_stack
            .lock()
            .expect("Failed to lock span stack")
            .clear();
        self.span_metadata
            .lock()
            .expect("Failed to lock span metadata")
            .clear();
        self.next_id.store(1, Ordering::Relaxed);
    }
}

impl Subscriber for TracingSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= &self.level_filter
    }

    fn new_span(&self, span_attributes: &Attributes<'_>) -> Id {
        let span_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = Id::from_u64(span_id);
        let json = json!({
            "span": {
                "id": id.as_serde(),
                "attributes": span_attributes.as_serde(),
            }
        });
        self.spans
            .lock()
            .expect("Failed to lock spans")
            .insert(span_id, json);
        self.span_metadata
            .lock()
            .expect("Failed to lock span metadata")
            .insert(span_id, span_attributes.metadata());
        id
    }

    fn record(&self, id: &Id, values: &Record<'_>) {
        let mut spans = self.spans.lock().expect("Failed to lock spans");
        let Some(attributes) = spans
            .get_mut(&id.into_u64())
            .and_then(|span| span.pointer_mut("/span/attributes"))
            .and_then(Value::as_object_mut)
        else {
            return;
        };
        if let Value::Object(mut recorded) = json!(values.as_serde()) {
            attributes.append(&mut recorded);
        }
    }

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        self.events
            .lock()
            .expect("Failed to lock events")
            .push(json!({ "event": event.as_serde() }));
    }

    fn enter(&self, span: &Id) {
        self.span_stack
            .lock()
            .expect("Failed to lock span stack")
            .push(span.clone());
    }

    fn exit(&self, _span: &Id) {
        let _ = self
            .span_stack
            .lock()
            .expect("Failed to lock span stack")
            .pop();
    }

    fn current_span(&self) -> Current {
        let stack = self.span_stack.lock().expect("Failed to lock span stack");
        let Some(id) = stack.last() else {
            return Current::none();
        };
        let metadata = self
            .span_metadata
            .lock()
            .expect("Failed to lock span metadata")
            .get(&id.into_u64())
            .copied();
        match metadata {
            Some(metadata) => Current::new(id.clone(), metadata),
            None => Current::none(),
        }
    }
}
