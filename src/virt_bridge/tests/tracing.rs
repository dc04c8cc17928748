#![cfg(target_os = "linux")]
use std::ffi::CString;

use tracing::Level;
use virt_bridge::Binding;
use virt_bridge_testing::subscriber::TracingSubscriber;

mod common;
use common::{AtoiFn, StrlenFn};

#[test]
fn native_calls_run_in_a_span_carrying_name_and_correlation_id() {
    let subscriber = TracingSubscriber::new(Level::TRACE);
    tracing::subscriber::with_default(subscriber.clone(), || {
        let binding = Binding::new(common::libc_resolver());
        let text = CString::new("abc").unwrap();
        let len = unsafe {
            binding
                .call("strlen")
                .invoke::<StrlenFn, _, _, _>(|f| f(text.as_ptr()), |_| false)
        }
        .unwrap();
        assert_eq!(len, 3);

        let spans = subscriber.span_attributes("native_call");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0]["FunctionName"].as_str(), Some("strlen"));
        assert_eq!(
            spans[0]["CorrelationId"].as_str(),
            Some(binding.correlation_id())
        );

        let messages = subscriber.event_messages();
        let calling = messages
            .iter()
            .position(|m| m == "Calling Function strlen")
            .unwrap();
        let returned = messages
            .iter()
            .position(|m| m == "Returned from Calling Function strlen")
            .unwrap();
        assert!(calling < returned);
    });
}

#[test]
fn failed_native_calls_emit_an_error_event() {
    let subscriber = TracingSubscriber::new(Level::TRACE);
    tracing::subscriber::with_default(subscriber.clone(), || {
        let binding = Binding::new(common::libc_resolver());
        let text = CString::new("-1").unwrap();
        let res = unsafe { binding.call("atoi").invoke_int::<AtoiFn, _>(|f| f(text.as_ptr())) };
        assert!(res.is_err());

        let errors: Vec<_> = subscriber
            .get_events()
            .into_iter()
            .filter(|e| e.pointer("/event/metadata/level").and_then(|l| l.as_str()) == Some("ERROR"))
            .filter(|e| e.pointer("/event/FunctionName").and_then(|f| f.as_str()) == Some("atoi"))
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0]["event"]["CorrelationId"].as_str(),
            Some(binding.correlation_id())
        );
        assert!(errors[0]["event"]["Error"].as_str().is_some());
    });
}

#[test]
fn each_binding_stamps_its_own_correlation_id() {
    let subscriber = TracingSubscriber::new(Level::INFO);
    tracing::subscriber::with_default(subscriber.clone(), || {
        let resolver = common::libc_resolver();
        let a = Binding::new(resolver.clone());
        let b = Binding::new(resolver);
        let text = CString::new("x").unwrap();
        for binding in [&a, &b] {
            unsafe {
                binding
                    .call("strlen")
                    .invoke::<StrlenFn, _, _, _>(|f| f(text.as_ptr()), |_| false)
            }
            .unwrap();
        }

        let mut ids: Vec<_> = subscriber
            .span_attributes("native_call")
            .iter()
            .filter_map(|s| s["CorrelationId"].as_str().map(String::from))
            .collect();
        ids.sort();
        let mut expected = vec![a.correlation_id().to_string(), b.correlation_id().to_string()];
        expected.sort();
        assert_eq!(ids, expected);
    });
}
