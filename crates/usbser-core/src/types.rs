//! Serial line parameters and status words.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Handle to a device owned by the generic USB host core.
///
/// Opaque to this subsystem; it is captured at probe time and handed back
/// to the application in the connect notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u32);

/// Negotiated bus speed of the attached device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSpeed {
    Full,
    High,
}

/// Vendor/product identification pair, as used in adapter override tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub vendor: u16,
    pub product: u16,
}

/// Descriptor-level identity of a newly enumerated USB function, as
/// reported by the USB host core and consumed by adapter probing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device: DeviceHandle,
    pub speed: PortSpeed,
    pub class_code: u8,
    pub subclass_code: u8,
    pub protocol_code: u8,
    pub id: DeviceId,
}

/// Parity bit usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Number of stop bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    One,
    OneAndHalf,
    Two,
}

/// Data framing of the serial line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFormat {
    /// Data bits per character (5 through 8).
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for DataFormat {
    fn default() -> Self {
        Self {
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Hardware flow-control protocol. While a protocol is active, the pin it
/// drives cannot be manipulated manually.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HwFlowControl {
    #[default]
    None,
    RtsCts,
    DtrDsr,
}

/// Software (xon/xoff) flow-control configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwFlowControl {
    pub enabled: bool,
    pub xon: u8,
    pub xoff: u8,
}

impl Default for SwFlowControl {
    fn default() -> Self {
        Self {
            enabled: false,
            xon: 0x11,  // DC1
            xoff: 0x13, // DC3
        }
    }
}

/// Buffer purge selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetSelector {
    Tx,
    Rx,
    All,
}

/// Manual modem pin control state as held by an adapter: whether each pin
/// is under manual control, and the driven level when it is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemControl {
    pub dtr_enabled: bool,
    pub dtr: bool,
    pub rts_enabled: bool,
    pub rts: bool,
}

/// A requested modem pin change; `None` fields leave the current value
/// untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModemControlChange {
    pub dtr_enabled: Option<bool>,
    pub dtr: Option<bool>,
    pub rts_enabled: Option<bool>,
    pub rts: Option<bool>,
}

impl ModemControlChange {
    /// Manual DTR assertion.
    #[must_use]
    pub fn dtr(level: bool) -> Self {
        Self {
            dtr_enabled: Some(true),
            dtr: Some(level),
            ..Self::default()
        }
    }

    /// Manual RTS assertion.
    #[must_use]
    pub fn rts(level: bool) -> Self {
        Self {
            rts_enabled: Some(true),
            rts: Some(level),
            ..Self::default()
        }
    }

    /// Merges this change onto `current`, returning the merged state and
    /// whether anything actually changed.
    #[must_use]
    pub fn merge_into(&self, current: ModemControl) -> (ModemControl, bool) {
        let mut merged = current;
        let mut changed = false;

        let mut apply = |field: &mut bool, requested: Option<bool>| {
            if let Some(value) = requested {
                if *field != value {
                    *field = value;
                    changed = true;
                }
            }
        };

        apply(&mut merged.dtr_enabled, self.dtr_enabled);
        apply(&mut merged.dtr, self.dtr);
        apply(&mut merged.rts_enabled, self.rts_enabled);
        apply(&mut merged.rts, self.rts);

        (merged, changed)
    }
}

bitflags! {
    /// Line status word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        const RX_OVERFLOW = 1 << 0;
        const PARITY_ERR  = 1 << 1;
        const FRAMING_ERR = 1 << 2;
        const BREAK       = 1 << 3;
    }
}

bitflags! {
    /// Modem status word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ModemStatus: u8 {
        const CTS     = 1 << 0;
        const DSR     = 1 << 1;
        const RING    = 1 << 2;
        const CARRIER = 1 << 3;
    }
}

/// Cached line/modem status pair for one serial function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialStatus {
    pub line: LineStatus,
    pub modem: ModemStatus,
}

impl SerialStatus {
    /// Quiescent status: no line errors, no modem signals.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            line: LineStatus::empty(),
            modem: ModemStatus::empty(),
        }
    }

    /// Sentinel the cache is primed with at probe time. No device reports
    /// all bits at once, so the first genuine update always notifies.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            line: LineStatus::from_bits_retain(0xFF),
            modem: ModemStatus::from_bits_retain(0xFF),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modem_merge_reports_change() {
        let current = ModemControl::default();

        let (merged, changed) = ModemControlChange::dtr(true).merge_into(current);
        assert!(changed);
        assert!(merged.dtr_enabled && merged.dtr);
        assert!(!merged.rts_enabled);

        // Re-applying the same state is a no-op.
        let (again, changed) = ModemControlChange::dtr(true).merge_into(merged);
        assert!(!changed);
        assert_eq!(again, merged);
    }

    #[test]
    fn modem_merge_leaves_unrequested_pins_alone() {
        let current = ModemControl {
            dtr_enabled: true,
            dtr: true,
            rts_enabled: true,
            rts: false,
        };

        let change = ModemControlChange {
            rts_enabled: Some(false),
            ..ModemControlChange::default()
        };
        let (merged, changed) = change.merge_into(current);
        assert!(changed);
        assert!(merged.dtr_enabled && merged.dtr);
        assert!(!merged.rts_enabled);
    }

    #[test]
    fn unknown_status_differs_from_any_report() {
        let first_report = SerialStatus::empty();
        assert_ne!(SerialStatus::unknown(), first_report);
    }
}
