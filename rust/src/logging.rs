//! Verbosity-gated logging macros for the planning engine.
//!
//! Nothing is formatted when the configured verbosity is below the macro's level.
//! Levels:
//! - 0: SILENT
//! - 1: SUMMARY (schedule computed, selection permitted/denied, edge rejected)
//! - 2: CHECKS (per-rule outcomes, per-task dates)
//! - 3: TRACE (forward/backward pass internals)

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_SUMMARY: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_TRACE: u8 = 3;

/// Log at SUMMARY level (verbosity >= 1).
#[macro_export]
macro_rules! log_summary {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_SUMMARY {
            eprintln!("[planner] {}", format_args!($($arg)*));
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!("[planner]   {}", format_args!($($arg)*));
        }
    };
}

/// Log at TRACE level (verbosity >= 3).
#[macro_export]
macro_rules! log_trace {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_TRACE {
            eprintln!("[planner]     {}", format_args!($($arg)*));
        }
    };
}
