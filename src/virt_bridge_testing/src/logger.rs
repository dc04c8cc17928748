use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;

/// The logger installed by [`Logger::initialize_test_logger`]
pub static LOGGER: Logger = Logger {
    log_calls: Mutex::new(Vec::new()),
};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// One captured log record
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogCall {
    /// The record's level
    pub level: Level,
    /// The formatted message
    pub args: String,
    /// The record's target
    pub target: String,
    /// The module the record came from, if known
    pub module_path: Option<String>,
}

/// Captures log records for later inspection
pub struct Logger {
    log_calls: Mutex<Vec<LogCall>>,
}

impl Logger {
    /// Install [`LOGGER`] as the process logger. Safe to call more than once.
    pub fn initialize_test_logger() {
        INSTALLED.get_or_init(|| {
            // another logger may already be installed by the harness
            if log::set_logger(&LOGGER).is_ok() {
                log::set_max_level(LevelFilter::Trace);
            }
        });
    }

    /// Change the process-wide maximum level
    pub fn set_max_level(&self, level: LevelFilter) {
        log::set_max_level(level);
    }

    /// Number of records captured since the last clear
    pub fn num_log_calls(&self) -> usize {
        self.log_calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// The record at `idx`
    pub fn get_log_call(&self, idx: usize) -> Option<LogCall> {
        self.log_calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(idx).cloned())
    }

    /// Forget all captured records
    pub fn clear_log_calls(&self) {
        if let Ok(mut calls) = self.log_calls.lock() {
            calls.clear();
        }
    }

    /// Run `f` over the captured records, then clear them
    pub fn test_log_records<F: Fn(&Vec<LogCall>)>(&self, f: F) {
        let calls = self
            .log_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default();
        f(&calls);
        self.clear_log_calls();
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut calls) = self.log_calls.lock() {
            calls.push(LogCall {
                level: record.level(),
                args: record.args().to_string(),
                target: record.target().to_string(),
                module_path: record.module_path().map(String::from),
            });
        }
    }

    fn flush(&self) {}
}
