//! Subsystem configuration.
//!
//! All options are consumed by [`SerialHost::new`](crate::SerialHost::new);
//! there is no post-start mutation path. The one runtime-adjustable knob,
//! the standard request timeout, is changed through
//! [`SerialHost::set_request_timeout`](crate::SerialHost::set_request_timeout).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use usbser_core::{Result, SerialError};

/// Configuration of one host subsystem instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Sizing granularity for receive buffers, in bytes. Must be a power
    /// of two; buffer capacities are rounded up to it.
    pub buf_align: usize,

    /// Accept high-speed devices. When disabled, probing rejects them and
    /// high-speed receive sizing is skipped entirely.
    pub high_speed: bool,

    /// Receive buffers kept in flight per function once streaming starts.
    pub rx_buf_count: u8,

    /// Maximum concurrently attached functions. `None` grows on demand.
    pub max_functions: Option<usize>,

    /// Maximum concurrently outstanding transmits across all functions.
    /// `None` is unbounded.
    pub max_pending_tx: Option<usize>,

    /// Wait budget for pool-slot and family-lock acquisition in the
    /// public operations.
    pub request_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            buf_align: 1,
            high_speed: true,
            rx_buf_count: 1,
            max_functions: None,
            max_pending_tx: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl HostConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.buf_align.is_power_of_two() {
            return Err(SerialError::InvalidConfig(format!(
                "buffer alignment {} is not a power of two",
                self.buf_align
            )));
        }
        if self.rx_buf_count == 0 {
            return Err(SerialError::InvalidConfig(
                "receive buffer count must be at least 1".into(),
            ));
        }
        if self.max_functions == Some(0) {
            return Err(SerialError::InvalidConfig(
                "maximum function count must be nonzero".into(),
            ));
        }
        if self.max_pending_tx == Some(0) {
            return Err(SerialError::InvalidConfig(
                "maximum outstanding transmit count must be nonzero".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SerialError::InvalidConfig(
                "request timeout must be nonzero".into(),
            ));
        }
        Ok(())
    }

    /// Rounds `len` up to the configured alignment.
    pub(crate) fn align_len(&self, len: usize) -> usize {
        (len + self.buf_align - 1) & !(self.buf_align - 1)
    }
}
