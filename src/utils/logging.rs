//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Frame ingestion and tracker simulation run tens of times per second; their
//! modules declare `const ENABLE_LOGS: bool` and log through these macros so
//! the chatter can be silenced per module without touching `RUST_LOG`.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//! use crate::log_debug;
//!
//! log_debug!("frame {} ingested", frame.timestamp_ms);
//! ```

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}
