//! Runtime provisioning for the vrx X server bundle.
//!
//! [`install`] materializes the packaged binaries and resources into a
//! writable directory, [`host`] gates the native server on that having
//! succeeded, and [`config`] describes the layout.

pub mod config;
pub mod host;
pub mod install;
