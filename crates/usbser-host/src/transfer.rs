//! Async transfer manager: pending-transmit accounting and the completion
//! sink handed to adapters.
//!
//! Pending transmits are tracked in a concurrent map keyed by an opaque
//! token. On completion the record is removed and its permit returned to
//! the pool *before* the completion value reaches the submitter, so a
//! caller that immediately transmits again from its completion can never
//! observe exhaustion caused by its own finished transfer.

use crate::host::HostInner;
use async_trait::async_trait;
use bytes::BytesMut;
use std::sync::Weak;
use tokio::sync::oneshot;
use usbser_core::adapter::{CompletionSink, TransferOutcome, TxToken};
use usbser_core::types::SerialStatus;
use usbser_core::{FnctHandle, Result, SerialError};
use usbser_pool::TxPermit;

/// Final report of an asynchronous transmit.
#[derive(Debug)]
pub struct TxCompletion {
    /// Bytes the device accepted.
    pub bytes_sent: usize,
    pub outcome: TransferOutcome,
}

/// Awaitable handle for one submitted transmit.
#[derive(Debug)]
pub struct TxTicket {
    pub(crate) rx: oneshot::Receiver<TxCompletion>,
}

impl TxTicket {
    /// Waits for the transmit to finish. A disconnect that tears the
    /// function down before the adapter reports completion resolves as
    /// [`SerialError::Abort`].
    pub async fn wait(self) -> Result<TxCompletion> {
        self.rx.await.map_err(|_| SerialError::Abort)
    }
}

/// Book-keeping for one in-flight transmit. Dropping it releases the
/// transmit permit.
pub(crate) struct PendingTx {
    pub(crate) permit: TxPermit,
    pub(crate) done: oneshot::Sender<TxCompletion>,
}

/// Completion path handed to adapters; weakly tied to the host so a sink
/// outliving its subsystem degrades to a no-op.
pub(crate) struct HostSink {
    inner: Weak<HostInner>,
    handle: FnctHandle,
}

impl HostSink {
    pub(crate) fn new(inner: Weak<HostInner>, handle: FnctHandle) -> Self {
        Self { inner, handle }
    }
}

#[async_trait]
impl CompletionSink for HostSink {
    async fn rx_complete(&self, buf: BytesMut, read: usize, outcome: TransferOutcome) {
        if let Some(host) = self.inner.upgrade() {
            host.rx_complete(self.handle, buf, read, outcome).await;
        }
    }

    async fn tx_complete(&self, token: TxToken, sent: usize, outcome: TransferOutcome) {
        if let Some(host) = self.inner.upgrade() {
            host.tx_complete(token, sent, outcome);
        }
    }

    async fn status_update(&self, status: SerialStatus) {
        if let Some(host) = self.inner.upgrade() {
            host.status_update(self.handle, status).await;
        }
    }
}
