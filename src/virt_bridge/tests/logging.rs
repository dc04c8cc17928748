use log::{Level, LevelFilter};
use serial_test::serial;
use virt_bridge::callbacks::events::CallbackKind;
use virt_bridge::callbacks::ReleaseCause;
use virt_bridge::{CallbackRegistry, VirtBridgeError};
use virt_bridge_testing::logger::{Logger, LOGGER};

mod common;

#[test]
#[serial]
fn double_release_is_logged_at_error_level() {
    Logger::initialize_test_logger();
    LOGGER.set_max_level(LevelFilter::Trace);

    let registry = CallbackRegistry::new();
    let id = registry.register(CallbackKind::Timeout, |_, _, _| {});
    registry.release(id, ReleaseCause::Deregistered).unwrap();
    LOGGER.clear_log_calls();

    let err = registry.release(id, ReleaseCause::Deregistered).unwrap_err();
    assert_eq!(err, VirtBridgeError::DoubleRelease(id));
    LOGGER.test_log_records(|calls| {
        assert!(
            calls
                .iter()
                .any(|c| c.level == Level::Error && c.args.contains(&id.to_string())),
            "no error record for {} in {:?}",
            id,
            calls
        );
    });
    // the registry keeps working
    let next = registry.register(CallbackKind::Timeout, |_, _, _| {});
    assert!(registry.is_live(next));
}

#[test]
#[serial]
fn unloadable_library_is_logged_once() {
    Logger::initialize_test_logger();
    LOGGER.set_max_level(LevelFilter::Trace);
    LOGGER.clear_log_calls();

    let resolver = common::missing_resolver();
    for _ in 0..3 {
        assert!(resolver.resolve_addr("virConnectOpen").is_err());
    }
    LOGGER.test_log_records(|calls| {
        let loads = calls
            .iter()
            .filter(|c| c.level == Level::Error && c.args.contains("native library not loadable"))
            .count();
        assert_eq!(loads, 1);
    });
}

#[test]
#[serial]
fn nothing_is_captured_when_logging_is_off() {
    Logger::initialize_test_logger();
    LOGGER.set_max_level(LevelFilter::Off);
    LOGGER.clear_log_calls();

    let registry = CallbackRegistry::new();
    let id = registry.register(CallbackKind::Timeout, |_, _, _| {});
    registry.release(id, ReleaseCause::Deregistered).unwrap();
    assert!(registry.release(id, ReleaseCause::Deregistered).is_err());
    assert_eq!(LOGGER.num_log_calls(), 0);
    LOGGER.set_max_level(LevelFilter::Trace);
}

#[test]
#[serial]
fn failed_lookup_logs_the_loader_error() {
    Logger::initialize_test_logger();
    LOGGER.set_max_level(LevelFilter::Trace);
    LOGGER.clear_log_calls();

    let resolver = common::libc_resolver();
    assert!(resolver.resolve_addr("virBridgeNoSuchFunction").is_err());
    LOGGER.test_log_records(|calls| {
        assert!(
            calls.iter().any(|c| c.level == Level::Debug
                && c.args.contains("lookup of")
                && c.args.contains("virBridgeNoSuchFunction")),
            "no debug record for the failed lookup in {:?}",
            calls
        );
    });
}
