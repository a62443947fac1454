//! Error taxonomy for the USB-to-serial host class subsystem.
//!
//! Every public operation returns an explicit [`Result`]; nothing in the
//! subsystem signals failure through panics. [`SerialError::Abort`] is the
//! expected completion status of transfers cancelled by device disconnect
//! and is deliberately distinct from genuine I/O failures, which callers
//! (and the subsystem itself) log.

use thiserror::Error;
use usbser_pool::PoolError;

/// Convenience alias for results using the subsystem error type.
pub type Result<T> = std::result::Result<T, SerialError>;

#[derive(Error, Debug)]
pub enum SerialError {
    /// The function handle no longer refers to a live resource.
    #[error("invalid function handle")]
    InvalidHandle,

    /// A zero-wait acquisition could not complete immediately.
    #[error("operation would block")]
    WouldBlock,

    /// Pool-slot or adapter-lock acquisition expired.
    #[error("timed out waiting for function resource")]
    Timeout,

    /// No pool slot or transmit permit available. Fatal at subsystem
    /// construction, recoverable for a steady-state transmit submission.
    #[error("resource pool exhausted")]
    PoolExhausted,

    /// Manual DTR/RTS manipulation while the matching hardware
    /// flow-control protocol owns that pin.
    #[error("pin is owned by the active hardware flow-control protocol")]
    FlowControlActive,

    /// Operation not implemented by the matched adapter.
    #[error("operation not supported by the matched adapter")]
    NotSupported,

    /// In-flight operation cancelled by disconnect. Expected; not logged
    /// as an error.
    #[error("operation aborted by disconnect")]
    Abort,

    /// Lifecycle operation invoked out of order.
    #[error("function is in state {actual}, operation requires {required}")]
    InvalidState {
        required: &'static str,
        actual: &'static str,
    },

    /// Rejected configuration, at construction or on a parameter set.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Vendor-protocol failure surfaced by an adapter driver.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PoolError> for SerialError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InvalidHandle => SerialError::InvalidHandle,
            PoolError::WouldBlock => SerialError::WouldBlock,
            PoolError::Timeout => SerialError::Timeout,
            PoolError::Exhausted => SerialError::PoolExhausted,
        }
    }
}

impl SerialError {
    /// True for the disconnect-driven abort status.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, SerialError::Abort)
    }
}
