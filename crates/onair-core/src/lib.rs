//! Foundational low-level utilities shared across onair crates.
//!
//! Provides the atomic JSON document writer and the chrono-based time arithmetic used
//! by trigger-time computation, watchdog checks, and retention windows.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_json_atomic;
pub use time_utils::{
    current_unix_timestamp_ms, delay_until, elapsed_exceeds, humanize_duration,
    non_negative_std_duration, scale_duration,
};
