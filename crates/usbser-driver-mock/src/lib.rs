//! Mock adapter driver for testing and simulation.
//!
//! [`MockAdapter`] implements the adapter contract with scripted claim
//! decisions and fully observable behavior: every operation is counted
//! and journaled, transmits can be completed inline or held until
//! disconnect, and inbound data or status reports are injected from test
//! code through the per-function [`MockPort`].
//!
//! A typical test wires one or more mock adapters into the registry,
//! attaches a device, and then inspects the adapter's counters and
//! journal:
//!
//! ```
//! use usbser_driver_mock::{ClaimPolicy, MockAdapter};
//!
//! let adapter = MockAdapter::new("mock").with_claim(ClaimPolicy::ClassCode(0xFF));
//! assert_eq!(adapter.count("connect"), 0);
//! ```

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use usbser_core::adapter::{
    AdapterCapacities, AdapterDriver, AdapterFunction, CompletionSink, TransferOutcome, TxToken,
};
use usbser_core::types::{
    DataFormat, DeviceId, DeviceInfo, HwFlowControl, ModemControl, ResetSelector, SerialStatus,
    SwFlowControl,
};
use usbser_core::{Result, SerialError};

/// Shared journal the mock writes adapter-side entries into. Tests can
/// hand the same journal to their event recorder to assert cross-layer
/// ordering.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Creates an empty shared journal.
#[must_use]
pub fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// How the mock decides whether to claim a probed function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Claim everything.
    #[default]
    Always,
    /// Decline everything.
    Never,
    /// Claim functions with this class code.
    ClassCode(u8),
    /// Claim only devices listed in the registry's override table.
    OverrideIds,
}

#[derive(Default)]
struct Counters {
    counts: Mutex<HashMap<&'static str, usize>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Counters {
    fn enter(&self, op: &'static str) -> OpGuard<'_> {
        *self.counts.lock().entry(op).or_insert(0) += 1;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        OpGuard { counters: self }
    }
}

struct OpGuard<'a> {
    counters: &'a Counters,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable adapter driver. One instance models one bridge-chip
/// family; its counters aggregate across all functions it claims, which
/// is exactly the scope of the host's family lock.
pub struct MockAdapter {
    name: String,
    capacities: AdapterCapacities,
    claim: ClaimPolicy,
    op_delay: Duration,
    hold_tx: bool,
    unsupported_break: bool,
    failing_reset: bool,
    port_number: u8,
    journal: Journal,
    counters: Arc<Counters>,
    ports: Mutex<Vec<Arc<MockPort>>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacities: AdapterCapacities {
                ctrl_buf_len: 16,
                status_buf_len: 8,
                rx_buf_len_fs: 64,
                rx_buf_len_hs: 512,
            },
            claim: ClaimPolicy::Always,
            op_delay: Duration::ZERO,
            hold_tx: false,
            unsupported_break: false,
            failing_reset: false,
            port_number: 0,
            journal: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
            ports: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_claim(mut self, claim: ClaimPolicy) -> Self {
        self.claim = claim;
        self
    }

    #[must_use]
    pub fn with_capacities(mut self, capacities: AdapterCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    /// Inserts an artificial delay into every stateful operation, making
    /// serialization and parallelism observable from timing.
    #[must_use]
    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    /// Holds submitted transmits instead of completing them inline; they
    /// finish via [`MockPort::complete_next_tx`] or abort at disconnect.
    #[must_use]
    pub fn with_held_transmits(mut self) -> Self {
        self.hold_tx = true;
        self
    }

    /// Makes the break-signal operation report `NotSupported`.
    #[must_use]
    pub fn with_unsupported_break(mut self) -> Self {
        self.unsupported_break = true;
        self
    }

    /// Makes every buffer purge fail with an adapter error.
    #[must_use]
    pub fn with_failing_reset(mut self) -> Self {
        self.failing_reset = true;
        self
    }

    #[must_use]
    pub fn with_port_number(mut self, port_number: u8) -> Self {
        self.port_number = port_number;
        self
    }

    /// Shares `journal` with this adapter; every operation appends
    /// `"<name>:<op>"` to it.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// The port created by the `index`-th successful probe.
    #[must_use]
    pub fn port(&self, index: usize) -> Option<Arc<MockPort>> {
        self.ports.lock().get(index).cloned()
    }

    /// Times `op` was invoked across all functions of this family.
    #[must_use]
    pub fn count(&self, op: &str) -> usize {
        self.counters.counts.lock().get(op).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously executing operations observed.
    /// Stays at 1 when the host's family lock does its job.
    #[must_use]
    pub fn max_concurrent_ops(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }

    fn claims(&self, device: &DeviceInfo, overrides: &[DeviceId]) -> bool {
        match self.claim {
            ClaimPolicy::Always => true,
            ClaimPolicy::Never => false,
            ClaimPolicy::ClassCode(code) => device.class_code == code,
            ClaimPolicy::OverrideIds => overrides.contains(&device.id),
        }
    }
}

impl AdapterDriver for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacities(&self) -> AdapterCapacities {
        self.capacities
    }

    fn probe(
        &self,
        device: &DeviceInfo,
        overrides: &[DeviceId],
    ) -> Option<Box<dyn AdapterFunction>> {
        if !self.claims(device, overrides) {
            return None;
        }

        let port = Arc::new(MockPort::new());
        self.ports.lock().push(Arc::clone(&port));
        trace!(adapter = %self.name, "mock claimed function");

        Some(Box::new(MockFunction {
            name: self.name.clone(),
            port_number: self.port_number,
            port,
            journal: Arc::clone(&self.journal),
            counters: Arc::clone(&self.counters),
            op_delay: self.op_delay,
            hold_tx: self.hold_tx,
            unsupported_break: self.unsupported_break,
            failing_reset: self.failing_reset,
        }))
    }
}

struct PortState {
    sink: Option<Arc<dyn CompletionSink>>,
    connected: bool,
    baud: u32,
    format: DataFormat,
    modem: ModemControl,
    hw_flow: HwFlowControl,
    sw_flow: SwFlowControl,
    break_set: bool,
    rx_held: VecDeque<BytesMut>,
    tx_pending: VecDeque<(TxToken, usize)>,
}

/// Test-side view of one claimed function. Lets tests inject inbound
/// data and status reports and inspect the line state the host drove the
/// adapter into.
pub struct MockPort {
    state: Mutex<PortState>,
}

impl MockPort {
    fn new() -> Self {
        Self {
            state: Mutex::new(PortState {
                sink: None,
                connected: false,
                baud: 9600,
                format: DataFormat::default(),
                modem: ModemControl::default(),
                hw_flow: HwFlowControl::None,
                sw_flow: SwFlowControl::default(),
                break_set: false,
                rx_held: VecDeque::new(),
                tx_pending: VecDeque::new(),
            }),
        }
    }

    /// Delivers `data` through the oldest held receive buffer. Returns
    /// `false` when the function is not streaming (no sink or no buffer
    /// in flight).
    pub async fn inject_rx(&self, data: &[u8]) -> bool {
        let (sink, mut buf) = {
            let mut state = self.state.lock();
            let Some(sink) = state.sink.clone() else {
                return false;
            };
            let Some(buf) = state.rx_held.pop_front() else {
                return false;
            };
            (sink, buf)
        };

        buf.clear();
        buf.extend_from_slice(data);
        let read = buf.len();
        sink.rx_complete(buf, read, TransferOutcome::Complete).await;
        true
    }

    /// Injects `len` bytes of seeded pseudo-random payload.
    pub async fn inject_noise(&self, len: usize, seed: u64) -> bool {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        self.inject_rx(&data).await
    }

    /// Reports a line/modem status word pair to the host.
    pub async fn push_status(&self, status: SerialStatus) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            sink.status_update(status).await;
        }
    }

    /// Completes the oldest held transmit with its full byte count.
    pub async fn complete_next_tx(&self) -> bool {
        let (sink, token, len) = {
            let mut state = self.state.lock();
            let Some(sink) = state.sink.clone() else {
                return false;
            };
            let Some((token, len)) = state.tx_pending.pop_front() else {
                return false;
            };
            (sink, token, len)
        };
        sink.tx_complete(token, len, TransferOutcome::Complete).await;
        true
    }

    /// Receive buffers currently held in flight.
    #[must_use]
    pub fn held_rx_buffers(&self) -> usize {
        self.state.lock().rx_held.len()
    }

    /// Transmits submitted but not yet completed.
    #[must_use]
    pub fn pending_tx(&self) -> usize {
        self.state.lock().tx_pending.len()
    }

    #[must_use]
    pub fn baud(&self) -> u32 {
        self.state.lock().baud
    }

    #[must_use]
    pub fn modem(&self) -> ModemControl {
        self.state.lock().modem
    }

    #[must_use]
    pub fn hw_flow(&self) -> HwFlowControl {
        self.state.lock().hw_flow
    }

    #[must_use]
    pub fn break_set(&self) -> bool {
        self.state.lock().break_set
    }
}

struct MockFunction {
    name: String,
    port_number: u8,
    port: Arc<MockPort>,
    journal: Journal,
    counters: Arc<Counters>,
    op_delay: Duration,
    hold_tx: bool,
    unsupported_break: bool,
    failing_reset: bool,
}

impl MockFunction {
    async fn op(&self, op: &'static str) -> OpGuard<'_> {
        self.journal.lock().push(format!("{}:{}", self.name, op));
        let guard = self.counters.enter(op);
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }
        guard
    }
}

#[async_trait]
impl AdapterFunction for MockFunction {
    async fn endpoints_opened(&mut self) -> Result<()> {
        let _op = self.op("endpoints_opened").await;
        Ok(())
    }

    async fn connect(&mut self, sink: Arc<dyn CompletionSink>) -> Result<()> {
        let _op = self.op("connect").await;
        let mut state = self.port.state.lock();
        state.sink = Some(sink);
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let _op = self.op("disconnect").await;
        let (sink, pending, held) = {
            let mut state = self.port.state.lock();
            state.connected = false;
            (
                state.sink.clone(),
                state.tx_pending.drain(..).collect::<Vec<_>>(),
                state.rx_held.drain(..).collect::<Vec<_>>(),
            )
        };

        if let Some(sink) = sink {
            for (token, _) in pending {
                self.journal
                    .lock()
                    .push(format!("{}:abort_tx:{}", self.name, token.0));
                sink.tx_complete(token, 0, TransferOutcome::Aborted).await;
            }
            for buf in held {
                sink.rx_complete(buf, 0, TransferOutcome::Aborted).await;
            }
        }
        Ok(())
    }

    async fn suspend(&mut self) -> Result<()> {
        let _op = self.op("suspend").await;
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        let _op = self.op("resume").await;
        Ok(())
    }

    async fn port_number(&mut self) -> Result<u8> {
        let _op = self.op("port_number").await;
        Ok(self.port_number)
    }

    async fn reset(&mut self, selector: ResetSelector) -> Result<()> {
        let op = match selector {
            ResetSelector::Tx => "reset:tx",
            ResetSelector::Rx => "reset:rx",
            ResetSelector::All => "reset:all",
        };
        let _op = self.op(op).await;
        if self.failing_reset {
            return Err(SerialError::Adapter("purge rejected by device".into()));
        }
        Ok(())
    }

    async fn baud_rate(&mut self) -> Result<u32> {
        let _op = self.op("baud_rate").await;
        Ok(self.port.state.lock().baud)
    }

    async fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        let _op = self.op("set_baud_rate").await;
        self.port.state.lock().baud = baud;
        Ok(())
    }

    async fn data_format(&mut self) -> Result<DataFormat> {
        let _op = self.op("data_format").await;
        Ok(self.port.state.lock().format)
    }

    async fn set_data_format(&mut self, format: DataFormat) -> Result<()> {
        let _op = self.op("set_data_format").await;
        self.port.state.lock().format = format;
        Ok(())
    }

    async fn set_break(&mut self, set: bool) -> Result<()> {
        if self.unsupported_break {
            return Err(SerialError::NotSupported);
        }
        let _op = self.op("set_break").await;
        self.port.state.lock().break_set = set;
        Ok(())
    }

    async fn modem_control(&mut self) -> Result<ModemControl> {
        let _op = self.op("modem_control").await;
        Ok(self.port.state.lock().modem)
    }

    async fn set_modem_control(&mut self, control: ModemControl) -> Result<()> {
        let _op = self.op("set_modem_control").await;
        self.port.state.lock().modem = control;
        Ok(())
    }

    async fn hw_flow_control(&mut self) -> Result<HwFlowControl> {
        let _op = self.op("hw_flow_control").await;
        Ok(self.port.state.lock().hw_flow)
    }

    async fn set_hw_flow_control(&mut self, protocol: HwFlowControl) -> Result<()> {
        let _op = self.op("set_hw_flow_control").await;
        self.port.state.lock().hw_flow = protocol;
        Ok(())
    }

    async fn sw_flow_control(&mut self) -> Result<SwFlowControl> {
        let _op = self.op("sw_flow_control").await;
        Ok(self.port.state.lock().sw_flow)
    }

    async fn set_sw_flow_control(&mut self, control: SwFlowControl) -> Result<()> {
        let _op = self.op("set_sw_flow_control").await;
        self.port.state.lock().sw_flow = control;
        Ok(())
    }

    async fn submit_rx(&mut self, buf: BytesMut) -> Result<()> {
        let _op = self.op("submit_rx").await;
        let mut state = self.port.state.lock();
        if !state.connected {
            return Err(SerialError::Abort);
        }
        state.rx_held.push_back(buf);
        Ok(())
    }

    async fn submit_tx(&mut self, data: Bytes, token: TxToken) -> Result<()> {
        let _op = self.op("submit_tx").await;
        let sink = {
            let mut state = self.port.state.lock();
            if !state.connected {
                return Err(SerialError::Abort);
            }
            if self.hold_tx {
                state.tx_pending.push_back((token, data.len()));
                return Ok(());
            }
            state.sink.clone()
        };

        if let Some(sink) = sink {
            sink.tx_complete(token, data.len(), TransferOutcome::Complete)
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbser_core::types::{DeviceHandle, PortSpeed};

    fn device(class_code: u8, vendor: u16, product: u16) -> DeviceInfo {
        DeviceInfo {
            device: DeviceHandle(1),
            speed: PortSpeed::Full,
            class_code,
            subclass_code: 0,
            protocol_code: 0,
            id: DeviceId { vendor, product },
        }
    }

    #[test]
    fn claim_policies() {
        let always = MockAdapter::new("a");
        assert!(always.probe(&device(0x02, 0, 0), &[]).is_some());

        let never = MockAdapter::new("b").with_claim(ClaimPolicy::Never);
        assert!(never.probe(&device(0x02, 0, 0), &[]).is_none());

        let class = MockAdapter::new("c").with_claim(ClaimPolicy::ClassCode(0xFF));
        assert!(class.probe(&device(0xFF, 0, 0), &[]).is_some());
        assert!(class.probe(&device(0x02, 0, 0), &[]).is_none());

        let ids = MockAdapter::new("d").with_claim(ClaimPolicy::OverrideIds);
        let table = [DeviceId {
            vendor: 0x0403,
            product: 0x6001,
        }];
        assert!(ids.probe(&device(0x02, 0x0403, 0x6001), &table).is_some());
        assert!(ids.probe(&device(0x02, 0x1234, 0x5678), &table).is_none());
    }

    #[tokio::test]
    async fn counters_and_journal_record_ops() {
        let adapter = MockAdapter::new("mock");
        let mut function = adapter.probe(&device(0x02, 0, 0), &[]).unwrap();

        function.set_baud_rate(115_200).await.unwrap();
        function.set_baud_rate(9600).await.unwrap();

        assert_eq!(adapter.count("set_baud_rate"), 2);
        assert_eq!(adapter.port(0).unwrap().baud(), 9600);
    }

    #[tokio::test]
    async fn submissions_rejected_when_not_connected() {
        let adapter = MockAdapter::new("mock");
        let mut function = adapter.probe(&device(0x02, 0, 0), &[]).unwrap();

        let err = function
            .submit_tx(Bytes::from_static(b"x"), TxToken(1))
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }
}
