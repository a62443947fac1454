//! The contract between the class subsystem and vendor adapter drivers.
//!
//! One [`AdapterDriver`] is registered per supported bridge-chip family.
//! During probing the registry walks the registered drivers in order; the
//! first one whose [`AdapterDriver::probe`] claims the function wins and
//! returns its per-function state as a boxed [`AdapterFunction`], the
//! claim token. All stateful calls into that state are serialized by the
//! host through the family lock, so implementations never see two
//! operations of the same family in flight at once.
//!
//! Transfer completion is not reported through the submit call's return
//! value: adapters deliver it later through the [`CompletionSink`] they
//! received at connect time. Completions must be delivered from a task
//! context of their own, never synchronously from inside `submit_rx` (the
//! receive completion path re-enters the host and would deadlock against
//! the submitting call's locks).

use crate::error::{Result, SerialError};
use crate::types::{
    DataFormat, DeviceId, DeviceInfo, HwFlowControl, ModemControl, PortSpeed, ResetSelector,
    SerialStatus, SwFlowControl,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;

/// Identifies an in-flight transmit; handed to the adapter at submission
/// and returned through [`CompletionSink::tx_complete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxToken(pub u64);

/// Final status of an asynchronous transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Transfer finished normally.
    Complete,
    /// Cancelled by device disconnect. An expected outcome; the subsystem
    /// never logs it as an error.
    Aborted,
    /// Genuine transport failure.
    Failed(SerialError),
}

impl TransferOutcome {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, TransferOutcome::Complete)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferOutcome::Aborted)
    }
}

/// Host-provided completion path handed to adapters at connect time.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Reports a finished receive. `buf` is the buffer the host submitted,
    /// with `read` valid bytes at the front; on a non-aborted outcome the
    /// host resubmits it.
    async fn rx_complete(&self, buf: BytesMut, read: usize, outcome: TransferOutcome);

    /// Reports a finished transmit for the given submission token.
    async fn tx_complete(&self, token: TxToken, sent: usize, outcome: TransferOutcome);

    /// Reports the device's current line/modem status. The host suppresses
    /// redundant reports, so adapters may forward every poll unfiltered.
    async fn status_update(&self, status: SerialStatus);
}

/// Fixed buffer requirements a driver advertises at registration, used to
/// size shared allocations once for the largest registered adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterCapacities {
    /// Scratch space for vendor control requests.
    pub ctrl_buf_len: usize,
    /// Scratch space for status polling.
    pub status_buf_len: usize,
    /// Receive transfer size at full speed.
    pub rx_buf_len_fs: usize,
    /// Receive transfer size at high speed.
    pub rx_buf_len_hs: usize,
}

impl AdapterCapacities {
    /// Receive transfer size for the negotiated speed.
    #[must_use]
    pub fn rx_len(&self, speed: PortSpeed) -> usize {
        match speed {
            PortSpeed::Full => self.rx_buf_len_fs,
            PortSpeed::High => self.rx_buf_len_hs,
        }
    }
}

/// A vendor-specific serial-bridge driver family. One instance lives for
/// the whole subsystem lifetime; it is consulted during probing and
/// manufactures the per-function state.
pub trait AdapterDriver: Send + Sync {
    /// Short family name, for logs.
    fn name(&self) -> &str;

    /// Buffer requirements of this family.
    fn capacities(&self) -> AdapterCapacities;

    /// Claim decision for a newly enumerated function. `overrides` is the
    /// registry-supplied device-ID table for this entry; drivers treat a
    /// listed ID as theirs even when the class code alone would not match.
    ///
    /// Returns the per-function adapter state when claiming, `None` to
    /// decline.
    fn probe(
        &self,
        device: &DeviceInfo,
        overrides: &[DeviceId],
    ) -> Option<Box<dyn AdapterFunction>>;
}

/// Per-function adapter state, created by a successful probe.
///
/// The host serializes all calls through the family lock; methods may keep
/// plain mutable state. Operations a family cannot express should return
/// [`SerialError::NotSupported`].
#[async_trait]
pub trait AdapterFunction: Send {
    /// Endpoint-open notification, before connect.
    async fn endpoints_opened(&mut self) -> Result<()> {
        Ok(())
    }

    /// Connection hook. The sink stays valid for the function's lifetime
    /// and is the only way to deliver transfer completions and status.
    async fn connect(&mut self, sink: Arc<dyn CompletionSink>) -> Result<()>;

    /// Disconnection hook. In-flight transfers must complete through the
    /// sink with [`TransferOutcome::Aborted`], in submission order.
    async fn disconnect(&mut self) -> Result<()>;

    /// Bus suspend notification.
    async fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    /// Bus resume notification.
    async fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Port number of this function on the device.
    async fn port_number(&mut self) -> Result<u8>;

    /// Purges device-side buffers.
    async fn reset(&mut self, selector: ResetSelector) -> Result<()>;

    async fn baud_rate(&mut self) -> Result<u32>;
    async fn set_baud_rate(&mut self, baud: u32) -> Result<()>;

    async fn data_format(&mut self) -> Result<DataFormat>;
    async fn set_data_format(&mut self, format: DataFormat) -> Result<()>;

    /// Asserts or clears the break signal.
    async fn set_break(&mut self, set: bool) -> Result<()>;

    async fn modem_control(&mut self) -> Result<ModemControl>;
    async fn set_modem_control(&mut self, control: ModemControl) -> Result<()>;

    async fn hw_flow_control(&mut self) -> Result<HwFlowControl>;
    async fn set_hw_flow_control(&mut self, protocol: HwFlowControl) -> Result<()>;

    async fn sw_flow_control(&mut self) -> Result<SwFlowControl>;
    async fn set_sw_flow_control(&mut self, control: SwFlowControl) -> Result<()>;

    /// Hands the adapter a receive buffer to keep in flight. Non-blocking;
    /// the buffer comes back through [`CompletionSink::rx_complete`].
    async fn submit_rx(&mut self, buf: BytesMut) -> Result<()>;

    /// Submits a transmit. Non-blocking; completion is reported through
    /// [`CompletionSink::tx_complete`] with the same token.
    async fn submit_tx(&mut self, data: Bytes, token: TxToken) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_len_follows_speed() {
        let caps = AdapterCapacities {
            rx_buf_len_fs: 64,
            rx_buf_len_hs: 512,
            ..AdapterCapacities::default()
        };
        assert_eq!(caps.rx_len(PortSpeed::Full), 64);
        assert_eq!(caps.rx_len(PortSpeed::High), 512);
    }

    #[test]
    fn outcome_predicates() {
        assert!(TransferOutcome::Complete.is_complete());
        assert!(TransferOutcome::Aborted.is_aborted());
        assert!(!TransferOutcome::Failed(SerialError::Timeout).is_complete());
    }
}
