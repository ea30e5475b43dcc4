//! Logging macros that can be silenced per module.
//!
//! A module opts in by declaring the switch and importing the macros from the
//! crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_error, log_info, log_warn};
//!
//! log_info!("session {} started", id);
//! ```
//! Flipping `ENABLE_LOGS` to `false` compiles the calls down to nothing while
//! leaving the unconditional `log::debug!`/`log::trace!` calls alone.

/// `log::info!` behind the calling module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// `log::warn!` behind the calling module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// `log::error!` behind the calling module's `ENABLE_LOGS` switch.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Installs the process-wide logger. `RUST_LOG` overrides the `info` default.
pub fn init() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
