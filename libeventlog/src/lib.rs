/*
 * Main library entry point that exposes the public API
 *
 * This file defines the public interface for the event logger, including:
 * - Re-exporting LogRegistry and LogHandle for acquiring shared logs
 * - Re-exporting LogOptions and LogLevel for configuration
 * - Defining logging macros (log_debug, log_info, log_warn, log_error, log_critical)
 *
 * Messages written through a handle are rendered immediately, queued, and
 * written to a day-indexed file by a per-log flush timer, or right away once
 * the queue reaches its limit.
 */

mod clock;
mod config;
mod error;
mod formatter;
mod instance;
mod lock;
mod name;
mod queue;
mod registry;
mod rotator;
mod scheduler;

pub use clock::{Clock, SystemClock};
pub use config::{LogLevel, LogOptions};
pub use error::{LogError, Result};
pub use formatter::format_line;
pub use name::LogName;
pub use registry::{LogHandle, LogRegistry};

// Add the macros to be publicly accessible
#[macro_export]
macro_rules! log_debug {
    ($log:expr, $($arg:tt)+) => {
        $log.write($crate::LogLevel::Debug, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_info {
    ($log:expr, $($arg:tt)+) => {
        $log.write($crate::LogLevel::Info, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($log:expr, $($arg:tt)+) => {
        $log.write($crate::LogLevel::Warn, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_error {
    ($log:expr, $($arg:tt)+) => {
        $log.write($crate::LogLevel::Error, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_critical {
    ($log:expr, $($arg:tt)+) => {
        $log.write($crate::LogLevel::Critical, format_args!($($arg)+))
    };
}
