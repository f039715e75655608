//! Logging macros for the real-time client.
//!
//! Thin wrappers over `tracing` so every connection-manager diagnostic lands
//! under one target (`huddle_client::ws`) regardless of which module emits it.

pub const TARGET: &str = "huddle_client::ws";

pub fn log_info_impl(msg: &str) {
    tracing::info!(target: TARGET, "{}", msg);
}

pub fn log_error_impl(msg: &str) {
    tracing::error!(target: TARGET, "{}", msg);
}

pub fn log_warn_impl(msg: &str) {
    tracing::warn!(target: TARGET, "{}", msg);
}

pub fn log_debug_impl(msg: &str) {
    tracing::debug!(target: TARGET, "{}", msg);
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info_impl(&format!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error_impl(&format!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_warn_impl(&format!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug_impl(&format!($($arg)*))
    };
}
