//! Structured diagnostic logging for triage.
//!
//! Log levels:
//! - ERROR: Critical failures that prevent operations from completing
//! - WARN: Unexpected conditions that are recoverable (degraded replies, drops)
//! - INFO: High-level operation notifications (startup, pool changes, routing)
//! - DEBUG: Detailed operation traces (useful for debugging)
//! - TRACE: Very detailed traces (worker stdout/stderr, internal state)
//!
//! Debug mode can be enabled with `--debug` flag or `TRIAGE_DEBUG=1` env var.
//!
//! This is the operator-facing diagnostic channel. The per-request audit
//! sink lives in `telemetry` and has its own durability contract.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Log levels for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Initialize logging to ~/.triage/triage.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
pub fn init_with_debug(debug: bool) {
    // Check env var for debug mode
    let env_debug = std::env::var("TRIAGE_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);

    let debug_enabled = debug || env_debug;
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    // Set log level based on debug mode
    let level = if debug_enabled {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);

    if let Some(triage_dir) = dirs::home_dir().map(|h| h.join(".triage")) {
        let _ = std::fs::create_dir_all(&triage_dir);
        let path = triage_dir.join("triage.log");
        // Truncate file on startup
        let _ = std::fs::write(&path, "");
        LOG_PATH.set(path).ok();
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Set the minimum log level for output.
pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Get the current log level.
pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Log a message at the specified level.
pub fn log_at(level: LogLevel, msg: &str) {
    let current_level = LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed));
    if level > current_level {
        return;
    }

    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
        }
    }
}

/// Log a message at INFO level (default, always logged).
pub fn log(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log a message at ERROR level.
pub fn error(msg: &str) {
    log_at(LogLevel::Error, msg);
}

/// Log a message at WARN level.
pub fn warn(msg: &str) {
    log_at(LogLevel::Warn, msg);
}

/// Log a message at INFO level.
pub fn info(msg: &str) {
    log_at(LogLevel::Info, msg);
}

/// Log a message at DEBUG level (only in debug mode).
pub fn debug(msg: &str) {
    log_at(LogLevel::Debug, msg);
}

/// Log a message at TRACE level (very verbose).
pub fn trace(msg: &str) {
    log_at(LogLevel::Trace, msg);
}

/// Log macro for INFO level (convenience).
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::log::log(&format!($($arg)*))
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! tlog_error {
    ($($arg:tt)*) => {
        $crate::log::error(&format!($($arg)*))
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! tlog_warn {
    ($($arg:tt)*) => {
        $crate::log::warn(&format!($($arg)*))
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! tlog_debug {
    ($($arg:tt)*) => {
        $crate::log::debug(&format!($($arg)*))
    };
}

/// Log macro for TRACE level (very verbose, only in debug mode with trace level).
#[macro_export]
macro_rules! tlog_trace {
    ($($arg:tt)*) => {
        $crate::log::trace(&format!($($arg)*))
    };
}
