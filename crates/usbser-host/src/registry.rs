//! Adapter driver registry.
//!
//! Drivers are registered in priority order; probing walks the table from
//! the front and the first driver to claim a function wins. Each
//! registered entry carries one family lock serializing all stateful
//! adapter calls for functions matched to it; functions bound to
//! different families never contend.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use usbser_core::adapter::{AdapterDriver, AdapterFunction};
use usbser_core::types::{DeviceId, DeviceInfo};
use usbser_core::{Result, SerialError};

/// One registered adapter driver family: the driver, its optional
/// device-ID override table, and the family lock.
pub(crate) struct AdapterFamily {
    driver: Arc<dyn AdapterDriver>,
    overrides: Vec<DeviceId>,
    lock: Mutex<()>,
}

impl AdapterFamily {
    pub(crate) fn driver(&self) -> &dyn AdapterDriver {
        self.driver.as_ref()
    }

    pub(crate) fn probe(&self, device: &DeviceInfo) -> Option<Box<dyn AdapterFunction>> {
        self.driver.probe(device, &self.overrides)
    }

    /// Takes the family lock within `timeout`.
    pub(crate) async fn lock_timed(&self, timeout: Duration) -> Result<MutexGuard<'_, ()>> {
        tokio::time::timeout(timeout, self.lock.lock())
            .await
            .map_err(|_| SerialError::Timeout)
    }
}

/// Ordered adapter driver table, handed to
/// [`SerialHost::new`](crate::SerialHost::new).
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(Arc<dyn AdapterDriver>, Vec<DeviceId>)>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a driver. Registration order encodes priority among
    /// drivers that could both match a generic class code.
    #[must_use]
    pub fn register(self, driver: Arc<dyn AdapterDriver>) -> Self {
        self.register_with_ids(driver, Vec::new())
    }

    /// Appends a driver with a device-ID override table: listed IDs are
    /// treated as this family's even when the class code alone would not
    /// match.
    #[must_use]
    pub fn register_with_ids(mut self, driver: Arc<dyn AdapterDriver>, ids: Vec<DeviceId>) -> Self {
        self.entries.push((driver, ids));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn build(self) -> Result<Vec<Arc<AdapterFamily>>> {
        if self.entries.is_empty() {
            return Err(SerialError::InvalidConfig(
                "adapter driver table is empty".into(),
            ));
        }

        Ok(self
            .entries
            .into_iter()
            .map(|(driver, overrides)| {
                Arc::new(AdapterFamily {
                    driver,
                    overrides,
                    lock: Mutex::new(()),
                })
            })
            .collect())
    }
}
