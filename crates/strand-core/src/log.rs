//! Leveled stderr logger
//!
//! Fire-and-forget structured lines that never block the fiber loop:
//! a plain locked stderr write, no channels, no background thread.
//!
//! # Environment variables
//!
//! - `STRAND_LOG_LEVEL` — 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//! - `STRAND_LOG_FLUSH` — flush stderr after each line (crash debugging)
//! - `STRAND_LOG_TIME` — prefix lines with seconds since logger init
//!
//! # Usage
//!
//! ```ignore
//! use strand_core::{log_info, log_error};
//!
//! log_info!("worker {} started", id);
//! log_error!("connection lost: {}", err);
//! ```

use crate::env::{env_get, env_get_bool};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Log levels, most severe first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Initialize from environment variables.
///
/// Called lazily on first log; call explicitly for deterministic
/// startup ordering.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    EPOCH.get_or_init(Instant::now);
    LOG_LEVEL.store(
        env_get("STRAND_LOG_LEVEL", LogLevel::Info as u8),
        Ordering::Relaxed,
    );
    FLUSH_ENABLED.store(env_get_bool("STRAND_LOG_FLUSH", false), Ordering::Relaxed);
    TIME_ENABLED.store(env_get_bool("STRAND_LOG_TIME", false), Ordering::Relaxed);
}

pub fn set_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

#[inline]
pub fn enabled(level: LogLevel) -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    level as u8 <= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Emit one line. Not called directly; use the `log_*!` macros.
pub fn write(level: LogLevel, args: core::fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    if TIME_ENABLED.load(Ordering::Relaxed) {
        let t = EPOCH.get_or_init(Instant::now).elapsed();
        let _ = write!(out, "[{:>9.3}] ", t.as_secs_f64());
    }
    let _ = writeln!(out, "{} {}", level.prefix(), args);
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}
