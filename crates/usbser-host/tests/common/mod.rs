//! Shared fixtures for the integration suites.

#![allow(dead_code)] // Not every suite uses every fixture.

use std::sync::Arc;
use std::sync::Mutex;
use usbser_core::events::{AppContext, SerialEvents};
use usbser_core::types::{DeviceHandle, DeviceId, DeviceInfo, PortSpeed, SerialStatus};
use usbser_core::FnctHandle;
use usbser_driver_mock::Journal;
use usbser_host::SerialHost;

/// Application-side recorder. Shares the mock's journal so tests can
/// assert ordering across the adapter/application boundary.
pub struct Recorder {
    journal: Journal,
    pub connected: Mutex<Vec<DeviceHandle>>,
    pub disconnected_ctx: Mutex<Vec<Option<u32>>>,
    pub data: Mutex<Vec<Vec<u8>>>,
    pub statuses: Mutex<Vec<SerialStatus>>,
}

impl Recorder {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            journal,
            connected: Mutex::new(Vec::new()),
            disconnected_ctx: Mutex::new(Vec::new()),
            data: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        })
    }
}

impl SerialEvents for Recorder {
    fn connected(&self, device: DeviceHandle, _function: FnctHandle) -> Option<AppContext> {
        self.journal.lock().push("app:connected".to_string());
        self.connected.lock().unwrap().push(device);
        Some(Arc::new(41u32))
    }

    fn disconnected(&self, _function: FnctHandle, ctx: Option<AppContext>) {
        self.journal.lock().push("app:disconnected".to_string());
        let value = ctx.and_then(|ctx| ctx.downcast_ref::<u32>().copied());
        self.disconnected_ctx.lock().unwrap().push(value);
    }

    fn data_received(&self, _function: FnctHandle, _ctx: Option<AppContext>, data: &[u8]) {
        self.journal.lock().push("app:data".to_string());
        self.data.lock().unwrap().push(data.to_vec());
    }

    fn serial_status_changed(
        &self,
        _function: FnctHandle,
        _ctx: Option<AppContext>,
        status: SerialStatus,
    ) {
        self.journal.lock().push("app:status".to_string());
        self.statuses.lock().unwrap().push(status);
    }
}

pub fn device(class_code: u8) -> DeviceInfo {
    DeviceInfo {
        device: DeviceHandle(7),
        speed: PortSpeed::Full,
        class_code,
        subclass_code: 0,
        protocol_code: 0,
        id: DeviceId {
            vendor: 0x0403,
            product: 0x6001,
        },
    }
}

pub fn high_speed_device(class_code: u8) -> DeviceInfo {
    DeviceInfo {
        speed: PortSpeed::High,
        ..device(class_code)
    }
}

/// Attach through streaming, panicking on any step failing.
pub async fn bring_up(host: &SerialHost, info: DeviceInfo) -> FnctHandle {
    let handle = host
        .attach(info)
        .await
        .expect("attach failed")
        .expect("no adapter claimed device");
    host.open_endpoints(handle).await.expect("open_endpoints");
    host.connect(handle).await.expect("connect");
    host.select_alt_setting(handle).await.expect("alt setting");
    handle
}
