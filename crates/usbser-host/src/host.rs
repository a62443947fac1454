//! The host subsystem: connection lifecycle, per-function operations,
//! and the notification bridge.
//!
//! Every public operation follows the same skeleton: acquire the function
//! slot from the pool (shared for ordinary operations, exclusive for
//! lifecycle steps), take the matched family's lock for stateful adapter
//! calls, perform the operation, and let the RAII guards release in
//! reverse order. A disconnect racing any in-progress operation is
//! serialized by the pool itself.

use crate::config::HostConfig;
use crate::registry::{AdapterFamily, RegistryBuilder};
use crate::transfer::{HostSink, PendingTx, TxCompletion, TxTicket};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};
use usbser_core::adapter::{AdapterFunction, CompletionSink, TransferOutcome, TxToken};
use usbser_core::events::{AppContext, SerialEvents};
use usbser_core::types::{
    DataFormat, DeviceHandle, DeviceInfo, HwFlowControl, ModemControlChange, PortSpeed,
    ResetSelector, SerialStatus, SwFlowControl,
};
use usbser_core::{FnctHandle, Result, SerialError};
use usbser_pool::{FnctPool, TxPermits};

/// Lifecycle of one attached serial function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LifecycleState {
    Probed,
    EndpointsOpened,
    Connected,
    Streaming,
    Disconnected,
}

impl LifecycleState {
    fn name(self) -> &'static str {
        match self {
            LifecycleState::Probed => "Probed",
            LifecycleState::EndpointsOpened => "EndpointsOpened",
            LifecycleState::Connected => "Connected",
            LifecycleState::Streaming => "Streaming",
            LifecycleState::Disconnected => "Disconnected",
        }
    }
}

/// One attached serial function: the matched family, the adapter-private
/// state, and the per-function caches.
pub(crate) struct FunctionResource {
    pub(crate) family: Arc<AdapterFamily>,
    pub(crate) adapter: tokio::sync::Mutex<Box<dyn AdapterFunction>>,
    pub(crate) device: DeviceInfo,
    state: parking_lot::Mutex<LifecycleState>,
    pub(crate) status: parking_lot::Mutex<SerialStatus>,
    pub(crate) app_ctx: parking_lot::Mutex<Option<AppContext>>,
}

impl FunctionResource {
    fn require_state(&self, required: LifecycleState) -> Result<()> {
        let actual = *self.state.lock();
        if actual == required {
            Ok(())
        } else {
            Err(SerialError::InvalidState {
                required: required.name(),
                actual: actual.name(),
            })
        }
    }
}

pub(crate) struct HostInner {
    cfg: HostConfig,
    families: Vec<Arc<AdapterFamily>>,
    pool: FnctPool<FunctionResource>,
    tx_permits: TxPermits,
    pending_tx: DashMap<u64, PendingTx>,
    tx_seq: AtomicU64,
    events: Option<Arc<dyn SerialEvents>>,
    rx_len_fs: usize,
    rx_len_hs: usize,
    timeout_ms: AtomicU64,
}

impl HostInner {
    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    fn rx_buf_len(&self, speed: PortSpeed) -> usize {
        match speed {
            PortSpeed::Full => self.rx_len_fs,
            PortSpeed::High => self.rx_len_hs,
        }
    }

    /// Receive completion: forward the payload, then keep the buffer in
    /// flight. Aborts are the expected disconnect outcome and are dropped
    /// silently without touching the (possibly already freed) function.
    pub(crate) async fn rx_complete(
        &self,
        handle: FnctHandle,
        mut buf: BytesMut,
        read: usize,
        outcome: TransferOutcome,
    ) {
        match outcome {
            TransferOutcome::Aborted => {
                trace!(handle = ?handle, "receive aborted by disconnect");
                return;
            }
            TransferOutcome::Failed(ref err) => {
                error!(handle = ?handle, %err, "receive completion reported failure");
            }
            TransferOutcome::Complete => {}
        }

        let timeout = self.request_timeout();
        let fnct = match self.pool.acquire(handle, Some(timeout)).await {
            Ok(fnct) => fnct,
            Err(err) => {
                error!(handle = ?handle, %err, "acquiring function for receive completion");
                return;
            }
        };

        if outcome.is_complete() && read > 0 {
            if let Some(events) = &self.events {
                let ctx = fnct.app_ctx.lock().clone();
                events.data_received(handle, ctx, &buf[..read.min(buf.len())]);
            }
        }

        buf.clear();
        let family = Arc::clone(&fnct.family);
        let family_guard = match family.lock_timed(timeout).await {
            Ok(guard) => guard,
            Err(err) => {
                error!(handle = ?handle, %err, "family lock for receive resubmission");
                return;
            }
        };
        let mut adapter = fnct.adapter.lock().await;
        match adapter.submit_rx(buf).await {
            Ok(()) => {}
            Err(err) if err.is_abort() => {
                trace!(handle = ?handle, "receive resubmission skipped, device gone");
            }
            Err(err) => error!(handle = ?handle, %err, "resubmitting receive buffer"),
        }
        drop(adapter);
        drop(family_guard);
    }

    /// Transmit completion: release the descriptor back to its pool, then
    /// notify the submitter. The ordering is what keeps the permit pool
    /// from appearing to leak when the submitter immediately transmits
    /// again from its completion.
    pub(crate) fn tx_complete(&self, token: TxToken, sent: usize, outcome: TransferOutcome) {
        let Some((_, pending)) = self.pending_tx.remove(&token.0) else {
            warn!(token = token.0, "completion for unknown transmit token");
            return;
        };

        let PendingTx { permit, done } = pending;
        drop(permit);

        if let TransferOutcome::Failed(ref err) = outcome {
            error!(token = token.0, %err, "transmit failed");
        }
        let _ = done.send(TxCompletion {
            bytes_sent: sent,
            outcome,
        });
    }

    /// Status report from the adapter: cache it and notify the
    /// application only when it actually differs from the last report.
    pub(crate) async fn status_update(&self, handle: FnctHandle, status: SerialStatus) {
        let timeout = self.request_timeout();
        let fnct = match self.pool.acquire(handle, Some(timeout)).await {
            Ok(fnct) => fnct,
            Err(err) => {
                error!(handle = ?handle, %err, "acquiring function for status update");
                return;
            }
        };

        let changed = {
            let mut current = fnct.status.lock();
            if *current != status {
                *current = status;
                true
            } else {
                false
            }
        };

        if changed {
            if let Some(events) = &self.events {
                let ctx = fnct.app_ctx.lock().clone();
                events.serial_status_changed(handle, ctx, status);
            }
        }
    }
}

/// Merges a modem pin change onto the adapter's current state and applies
/// it only when something actually changed.
async fn apply_modem_control(
    adapter: &mut dyn AdapterFunction,
    change: ModemControlChange,
) -> Result<()> {
    let current = adapter.modem_control().await?;
    let (merged, changed) = change.merge_into(current);
    if changed {
        adapter.set_modem_control(merged).await
    } else {
        Ok(())
    }
}

/// The USB-to-serial host class subsystem.
///
/// One instance owns the adapter registry, the function resource pool and
/// the transfer accounting; independent instances are fully isolated. The
/// embedding USB host core drives the lifecycle entry points
/// ([`attach`](Self::attach) through [`detach`](Self::detach)); the
/// application uses the per-function operations and receives events
/// through its registered [`SerialEvents`] implementation.
pub struct SerialHost {
    inner: Arc<HostInner>,
}

impl core::fmt::Debug for SerialHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialHost").finish_non_exhaustive()
    }
}

impl SerialHost {
    /// Builds the subsystem. Fails with
    /// [`SerialError::InvalidConfig`] on a malformed configuration or
    /// driver table; there is no partial-registration state.
    pub fn new(
        cfg: HostConfig,
        registry: RegistryBuilder,
        events: Option<Arc<dyn SerialEvents>>,
    ) -> Result<Self> {
        cfg.validate()?;
        let families = registry.build()?;

        let mut rx_len_fs = 0usize;
        let mut rx_len_hs = 0usize;
        for family in &families {
            let caps = family.driver().capacities();
            if caps.rx_buf_len_fs == 0 {
                return Err(SerialError::InvalidConfig(format!(
                    "adapter '{}' advertises a zero full-speed receive size",
                    family.driver().name()
                )));
            }
            rx_len_fs = rx_len_fs.max(caps.rx_buf_len_fs);
            if cfg.high_speed {
                if caps.rx_buf_len_hs == 0 {
                    return Err(SerialError::InvalidConfig(format!(
                        "adapter '{}' advertises a zero high-speed receive size",
                        family.driver().name()
                    )));
                }
                rx_len_hs = rx_len_hs.max(caps.rx_buf_len_hs);
            }
        }
        rx_len_fs = cfg.align_len(rx_len_fs);
        rx_len_hs = cfg.align_len(rx_len_hs);

        let timeout_ms = cfg.request_timeout.as_millis() as u64;
        Ok(Self {
            inner: Arc::new(HostInner {
                pool: FnctPool::new(cfg.max_functions),
                tx_permits: TxPermits::new(cfg.max_pending_tx),
                pending_tx: DashMap::new(),
                tx_seq: AtomicU64::new(1),
                events,
                rx_len_fs,
                rx_len_hs,
                timeout_ms: AtomicU64::new(timeout_ms),
                cfg,
                families,
            }),
        })
    }

    /// Adjusts the wait budget used by every public operation.
    pub fn set_request_timeout(&self, timeout: Duration) {
        self.inner
            .timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    // ---------------------------------------------------------------
    // Lifecycle entry points, driven by the USB host core integration.
    // ---------------------------------------------------------------

    /// Probes a newly enumerated function against the registry in
    /// registration order. The first adapter to claim it wins; no claim
    /// at all is `Ok(None)`: the function simply is not a serial
    /// adapter this subsystem knows.
    pub async fn attach(&self, device: DeviceInfo) -> Result<Option<FnctHandle>> {
        for family in &self.inner.families {
            let Some(function) = family.probe(&device) else {
                continue;
            };

            if !self.inner.cfg.high_speed && device.speed == PortSpeed::High {
                return Err(SerialError::NotSupported);
            }

            let resource = FunctionResource {
                family: Arc::clone(family),
                adapter: tokio::sync::Mutex::new(function),
                device,
                state: parking_lot::Mutex::new(LifecycleState::Probed),
                status: parking_lot::Mutex::new(SerialStatus::unknown()),
                app_ctx: parking_lot::Mutex::new(None),
            };
            let handle = self.inner.pool.allocate(resource).await?;
            debug!(adapter = family.driver().name(), handle = ?handle, "function claimed");
            return Ok(Some(handle));
        }

        debug!(class = device.class_code, "no adapter claimed function");
        Ok(None)
    }

    /// Endpoint-open notification, after probing and before connect.
    pub async fn open_endpoints(&self, handle: FnctHandle) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let mut fnct = self.inner.pool.acquire_mut(handle, Some(timeout)).await?;
        fnct.require_state(LifecycleState::Probed)?;

        let family = Arc::clone(&fnct.family);
        let guard = family.lock_timed(timeout).await?;
        fnct.adapter.get_mut().endpoints_opened().await?;
        drop(guard);

        *fnct.state.lock() = LifecycleState::EndpointsOpened;
        Ok(())
    }

    /// Connects the function: runs the adapter's connection hook, then
    /// unconditionally purges the device's buffers, since a newly
    /// connected device's internal buffers are not trusted to be empty. The
    /// application `connected` callback runs after the resource guard is
    /// released.
    pub async fn connect(&self, handle: FnctHandle) -> Result<()> {
        let timeout = self.inner.request_timeout();

        let device = {
            let mut fnct = self.inner.pool.acquire_mut(handle, Some(timeout)).await?;
            fnct.require_state(LifecycleState::EndpointsOpened)?;

            let sink: Arc<dyn CompletionSink> =
                Arc::new(HostSink::new(Arc::downgrade(&self.inner), handle));

            let family = Arc::clone(&fnct.family);
            let guard = family.lock_timed(timeout).await?;
            let adapter = fnct.adapter.get_mut();
            adapter.connect(sink).await?;
            if let Err(err) = adapter.reset(ResetSelector::All).await {
                warn!(handle = ?handle, %err, "purging device buffers after connect");
            }
            drop(guard);

            *fnct.state.lock() = LifecycleState::Connected;
            fnct.device.device
        };

        if let Some(events) = &self.inner.events {
            let ctx = events.connected(device, handle);
            if ctx.is_some() {
                if let Ok(fnct) = self.inner.pool.acquire(handle, Some(timeout)).await {
                    *fnct.app_ctx.lock() = ctx;
                }
            }
        }
        Ok(())
    }

    /// An operative interface alternate setting was selected: size the
    /// receive transfers for the negotiated speed, submit the full
    /// configured receive-buffer quantity and enter steady-state
    /// streaming.
    pub async fn select_alt_setting(&self, handle: FnctHandle) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        {
            let state = *fnct.state.lock();
            if state != LifecycleState::Connected && state != LifecycleState::Streaming {
                return Err(SerialError::InvalidState {
                    required: LifecycleState::Connected.name(),
                    actual: state.name(),
                });
            }
        }

        let buf_len = self.inner.rx_buf_len(fnct.device.speed);
        let family = Arc::clone(&fnct.family);
        let guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        for _ in 0..self.inner.cfg.rx_buf_count {
            let buf = BytesMut::with_capacity(buf_len);
            if let Err(err) = adapter.submit_rx(buf).await {
                error!(handle = ?handle, %err, "initiating data reception");
            }
        }
        drop(adapter);
        drop(guard);

        *fnct.state.lock() = LifecycleState::Streaming;
        Ok(())
    }

    /// Forwards a bus suspend to the adapter. In-flight transfers are
    /// deliberately left alone.
    pub async fn suspend(&self, handle: FnctHandle) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let mut fnct = self.inner.pool.acquire_mut(handle, None).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        fnct.adapter.get_mut().suspend().await
    }

    /// Forwards a bus resume to the adapter.
    pub async fn resume(&self, handle: FnctHandle) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let mut fnct = self.inner.pool.acquire_mut(handle, None).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        fnct.adapter.get_mut().resume().await
    }

    /// Disconnects the function. The application is notified first, with
    /// the resource still valid so a final status can be read; the
    /// adapter's disconnect hook then aborts in-flight transfers, and
    /// only afterwards is the pool slot freed.
    pub async fn detach(&self, handle: FnctHandle) -> Result<()> {
        let timeout = self.inner.request_timeout();

        let ctx = {
            let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
            let ctx = fnct.app_ctx.lock().clone();
            ctx
        };
        if let Some(events) = &self.inner.events {
            events.disconnected(handle, ctx);
        }

        {
            let mut fnct = self.inner.pool.acquire_mut(handle, None).await?;
            let family = Arc::clone(&fnct.family);
            match family.lock_timed(timeout).await {
                Ok(guard) => {
                    if let Err(err) = fnct.adapter.get_mut().disconnect().await {
                        if !err.is_abort() {
                            error!(handle = ?handle, %err, "adapter disconnect hook");
                        }
                    }
                    drop(guard);
                }
                Err(err) => {
                    error!(handle = ?handle, %err, "family lock for disconnect; freeing anyway");
                }
            }
            *fnct.state.lock() = LifecycleState::Disconnected;
        }

        let resource = self.inner.pool.free(handle).await?;
        drop(resource);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Per-function operations.
    // ---------------------------------------------------------------

    /// Device handle of the underlying USB device.
    pub async fn device_handle(&self, handle: FnctHandle) -> Result<DeviceHandle> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        Ok(fnct.device.device)
    }

    /// Port number of the function on its device.
    pub async fn port_number(&self, handle: FnctHandle) -> Result<u8> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.port_number().await
    }

    /// Purges device buffers per the selector.
    pub async fn reset(&self, handle: FnctHandle, selector: ResetSelector) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.reset(selector).await
    }

    pub async fn baud_rate(&self, handle: FnctHandle) -> Result<u32> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.baud_rate().await
    }

    /// Sets the baud rate. A request matching the current rate is not
    /// forwarded to the adapter.
    pub async fn set_baud_rate(&self, handle: FnctHandle, baud: u32) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.baud_rate().await? == baud {
            return Ok(());
        }
        adapter.set_baud_rate(baud).await
    }

    pub async fn data_format(&self, handle: FnctHandle) -> Result<DataFormat> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.data_format().await
    }

    /// Sets the data framing. A request matching the current framing is
    /// not forwarded to the adapter.
    pub async fn set_data_format(&self, handle: FnctHandle, format: DataFormat) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.data_format().await? == format {
            return Ok(());
        }
        adapter.set_data_format(format).await
    }

    /// Asserts or clears the break signal.
    pub async fn set_break(&self, handle: FnctHandle, set: bool) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.set_break(set).await
    }

    /// Current DTR pin level. Rejected while DTR/DSR hardware flow
    /// control owns the pin.
    pub async fn dtr(&self, handle: FnctHandle) -> Result<bool> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.hw_flow_control().await? == HwFlowControl::DtrDsr {
            return Err(SerialError::FlowControlActive);
        }
        Ok(adapter.modem_control().await?.dtr)
    }

    /// Drives the DTR pin manually. Rejected while DTR/DSR hardware flow
    /// control owns the pin; the pin state is left untouched in that
    /// case.
    pub async fn set_dtr(&self, handle: FnctHandle, set: bool) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.hw_flow_control().await? == HwFlowControl::DtrDsr {
            return Err(SerialError::FlowControlActive);
        }
        apply_modem_control(adapter.as_mut(), ModemControlChange::dtr(set)).await
    }

    /// Current RTS pin level. Rejected while RTS/CTS hardware flow
    /// control owns the pin.
    pub async fn rts(&self, handle: FnctHandle) -> Result<bool> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.hw_flow_control().await? == HwFlowControl::RtsCts {
            return Err(SerialError::FlowControlActive);
        }
        Ok(adapter.modem_control().await?.rts)
    }

    /// Drives the RTS pin manually. Rejected while RTS/CTS hardware flow
    /// control owns the pin; the pin state is left untouched in that
    /// case.
    pub async fn set_rts(&self, handle: FnctHandle, set: bool) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.hw_flow_control().await? == HwFlowControl::RtsCts {
            return Err(SerialError::FlowControlActive);
        }
        apply_modem_control(adapter.as_mut(), ModemControlChange::rts(set)).await
    }

    pub async fn hw_flow_control(&self, handle: FnctHandle) -> Result<HwFlowControl> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.hw_flow_control().await
    }

    /// Selects the hardware flow-control protocol. Manual control of the
    /// pin the protocol takes over is disabled first; a request matching
    /// the current protocol is not forwarded.
    pub async fn set_hw_flow_control(
        &self,
        handle: FnctHandle,
        protocol: HwFlowControl,
    ) -> Result<()> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;

        if adapter.hw_flow_control().await? == protocol {
            return Ok(());
        }

        let change = ModemControlChange {
            dtr_enabled: (protocol == HwFlowControl::DtrDsr).then_some(false),
            rts_enabled: (protocol == HwFlowControl::RtsCts).then_some(false),
            ..ModemControlChange::default()
        };
        apply_modem_control(adapter.as_mut(), change).await?;
        adapter.set_hw_flow_control(protocol).await
    }

    pub async fn sw_flow_control(&self, handle: FnctHandle) -> Result<SwFlowControl> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        adapter.sw_flow_control().await
    }

    /// Configures software (xon/xoff) flow control. The xon and xoff
    /// characters must differ when enabling; a request matching the
    /// current configuration is not forwarded.
    pub async fn set_sw_flow_control(
        &self,
        handle: FnctHandle,
        control: SwFlowControl,
    ) -> Result<()> {
        if control.enabled && control.xon == control.xoff {
            return Err(SerialError::InvalidConfig(
                "xon and xoff characters must differ".into(),
            ));
        }

        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let family = Arc::clone(&fnct.family);
        let _guard = family.lock_timed(timeout).await?;
        let mut adapter = fnct.adapter.lock().await;
        if adapter.sw_flow_control().await? == control {
            return Ok(());
        }
        adapter.set_sw_flow_control(control).await
    }

    /// Last reported line/modem status.
    pub async fn status(&self, handle: FnctHandle) -> Result<SerialStatus> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;
        let status = *fnct.status.lock();
        Ok(status)
    }

    /// Submits an asynchronous transmit. Non-blocking: the returned
    /// ticket resolves once the adapter reports completion. Fails with
    /// [`SerialError::PoolExhausted`] when the configured outstanding
    /// transmit cap is reached, a local condition that leaves other
    /// in-flight transmits untouched.
    pub async fn tx_async(&self, handle: FnctHandle, data: Bytes) -> Result<TxTicket> {
        let timeout = self.inner.request_timeout();
        let fnct = self.inner.pool.acquire(handle, Some(timeout)).await?;

        let permit = self.inner.tx_permits.try_reserve().map_err(|err| {
            error!(handle = ?handle, "no transmit descriptor available");
            SerialError::from(err)
        })?;

        let token = TxToken(self.inner.tx_seq.fetch_add(1, Ordering::Relaxed));
        let (done, rx) = oneshot::channel();
        self.inner.pending_tx.insert(token.0, PendingTx { permit, done });

        let family = Arc::clone(&fnct.family);
        let guard = match family.lock_timed(timeout).await {
            Ok(guard) => guard,
            Err(err) => {
                self.inner.pending_tx.remove(&token.0);
                return Err(err);
            }
        };
        let mut adapter = fnct.adapter.lock().await;
        if let Err(err) = adapter.submit_tx(data, token).await {
            self.inner.pending_tx.remove(&token.0);
            return Err(err);
        }
        drop(adapter);
        drop(guard);

        Ok(TxTicket { rx })
    }
}
