//! Status logging macros.
//!
//! Thin wrappers over `tracing` so that every crate reports progress the same
//! way. The terminal formatter in the CLI renders `success!` events with their
//! own symbol, everything else is rendered by level.

/// Target used by [`success!`] events.
pub const SUCCESS_TARGET: &str = "devtarget::success";

#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "devtarget::success", $($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}
