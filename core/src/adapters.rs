//! # Adapters
//!
//! Concrete implementations of the [`crate::ports`], backed by the host tools
//! a developer machine already has.
//!
//! * **[`process`]**: local subprocesses through `tokio::process`.
//! * **[`ffx`]**: the device discovery service.
//! * **[`ssh`]**: control sessions over OpenSSH.
//!
//! ## Rules
//! * Adapters depend on `ports` and the common models only.
//! * A query the tool answered with a failure is a [`TargetError::QueryFailed`],
//!   a tool that could not be spawned at all is an I/O error.
//!
//! [`TargetError::QueryFailed`]: devtarget_common::TargetError::QueryFailed

pub mod ffx;
pub mod process;
pub mod ssh;
