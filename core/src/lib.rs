//! # devtarget core
//!
//! The lifecycle of a single network-attached development device.
//!
//! * **[`ports`]**: traits for the discovery service, remote sessions and
//!   local subprocesses.
//! * **[`locator`]**, **[`connection`]**, **[`version`]**, **[`provision`]**:
//!   the stateless services the lifecycle is made of.
//! * **[`orchestrator`]**: [`DeviceTarget`], the `start` / `restart` / `stop`
//!   state machine.
//! * **[`adapters`]**: implementations of the ports over `ffx`, `ssh` and
//!   `tokio::process`.

pub mod adapters;
pub mod connection;
pub mod locator;
pub mod orchestrator;
pub mod ports;
pub mod provision;
pub mod sdk;
pub mod version;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use orchestrator::{DeviceTarget, LifecycleState, Services};
