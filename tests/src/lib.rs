//! Scenario tests of the device target lifecycle, driven through
//! [`devtarget_core::DeviceTarget`] against the recording fakes of
//! `devtarget_core::testing`.

#[cfg(test)]
mod lifecycle;
