//! Application notification set.
//!
//! The application registers one [`SerialEvents`] implementation with the
//! host; the subsystem forwards connect/disconnect/data/status events to
//! it. All callbacks are invoked from the subsystem's task context and
//! should return promptly.

use crate::types::{DeviceHandle, SerialStatus};
use crate::FnctHandle;
use std::any::Any;
use std::sync::Arc;

/// Opaque per-function application context, produced by
/// [`SerialEvents::connected`] and handed back on every later callback
/// for that function.
pub type AppContext = Arc<dyn Any + Send + Sync>;

/// Callbacks the application registers with the host subsystem. Every
/// method has a no-op default, so implementations only provide what they
/// care about.
pub trait SerialEvents: Send + Sync {
    /// A serial function was connected and is ready for configuration.
    /// The returned context is attached to the function and passed to the
    /// other callbacks.
    fn connected(&self, device: DeviceHandle, function: FnctHandle) -> Option<AppContext> {
        let _ = (device, function);
        None
    }

    /// The function was disconnected. The handle is still valid while
    /// this callback runs, so a final status snapshot may be read; it
    /// becomes invalid once the callback returns.
    fn disconnected(&self, function: FnctHandle, ctx: Option<AppContext>) {
        let _ = (function, ctx);
    }

    /// Data arrived on the function's receive path. Only invoked for
    /// non-empty payloads.
    fn data_received(&self, function: FnctHandle, ctx: Option<AppContext>, data: &[u8]) {
        let _ = (function, ctx, data);
    }

    /// The device reported a line/modem status differing from the last
    /// reported one.
    fn serial_status_changed(
        &self,
        function: FnctHandle,
        ctx: Option<AppContext>,
        status: SerialStatus,
    ) {
        let _ = (function, ctx, status);
    }
}
