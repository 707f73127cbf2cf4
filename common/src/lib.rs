//! # devtarget common
//!
//! Models, configuration and the error taxonomy shared by the `devtarget`
//! crates. Nothing in here performs IO beyond reading environment variables.

pub mod config;
pub mod error;
pub mod log;
pub mod network;
pub mod version;

pub use error::{Result, TargetError};
