//! USB-to-serial host class subsystem.
//!
//! This crate sits on top of a generic USB host stack and exposes one
//! vendor-independent serial-port abstraction (baud rate, framing, modem
//! pins, flow control, asynchronous transmit/receive) while the wire
//! protocol for each bridge-chip family is supplied by an interchangeable
//! adapter driver implementing the contract in
//! [`usbser_core::adapter`].
//!
//! # Shape of the subsystem
//!
//! - [`RegistryBuilder`]: the ordered adapter driver table. First claim
//!   wins at probe time, so order encodes priority.
//! - [`HostConfig`]: construction-time configuration (receive buffer
//!   count, speed support, pool bounds, timeouts).
//! - [`SerialHost`]: the subsystem instance. The embedding USB host core
//!   drives `attach` / `open_endpoints` / `connect` /
//!   `select_alt_setting` / `suspend` / `resume` / `detach`; applications
//!   call the per-function operations and receive notifications through
//!   their [`SerialEvents`](usbser_core::events::SerialEvents)
//!   implementation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use usbser_host::{HostConfig, RegistryBuilder, SerialHost};
//! # fn driver() -> Arc<dyn usbser_core::adapter::AdapterDriver> { unimplemented!() }
//!
//! # fn main() -> usbser_core::Result<()> {
//! let registry = RegistryBuilder::new().register(driver());
//! let host = SerialHost::new(HostConfig::default(), registry, None)?;
//! # let _ = host;
//! # Ok(())
//! # }
//! ```

mod config;
mod host;
mod registry;
mod transfer;

pub use config::HostConfig;
pub use host::SerialHost;
pub use registry::RegistryBuilder;
pub use transfer::{TxCompletion, TxTicket};

pub use usbser_core::{adapter, events, types, FnctHandle, Result, SerialError};
