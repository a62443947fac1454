//! Core types and contracts for the USB-to-serial host class subsystem.
//!
//! This crate defines everything the subsystem crates and the vendor
//! adapter drivers share:
//!
//! - [`error::SerialError`]: the error taxonomy every public operation
//!   reports through.
//! - [`types`]: serial line parameters (baud rate, framing, flow control,
//!   modem pins) and the line/modem status words.
//! - [`adapter`]: the contract every vendor-specific serial-bridge driver
//!   implements, plus the completion sink the host hands to adapters.
//! - [`events`]: the application notification set (connect, disconnect,
//!   received data, serial status changes).
//!
//! The host subsystem itself lives in `usbser-host`; adapter drivers only
//! need this crate.

pub mod adapter;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Result, SerialError};

/// Handle to a USB-to-serial function managed by the host subsystem.
///
/// Generation-checked: once the function is freed on disconnect, every
/// operation on the stale handle fails with
/// [`SerialError::InvalidHandle`].
pub type FnctHandle = usbser_pool::Handle;
