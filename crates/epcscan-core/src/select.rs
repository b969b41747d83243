//! Primary/alternate reader selection.
//!
//! Pure decision logic over one enumeration snapshot: a docked USB reader
//! is preferred as primary, and an opposite-transport reader is recorded
//! as the alternate for diagnostics. The alternate is never connected
//! automatically; a mid-session primary loss requires a fresh `start()`.

use epcscan_types::{ReaderDevice, Transport};

/// Choose the primary reader: first USB device, else first in
/// enumeration order. Returns `None` only for an empty list.
pub fn pick_primary(devices: &[ReaderDevice]) -> Option<&ReaderDevice> {
    devices
        .iter()
        .find(|d| d.transport == Transport::Usb)
        .or_else(|| devices.first())
}

/// Choose an alternate reader on the opposite transport from `primary`.
///
/// USB primary yields the first Bluetooth device and vice versa; for an
/// `Other`-transport primary, Bluetooth is preferred over USB. Returns
/// `None` when no opposite-transport device exists.
pub fn pick_alternate<'a>(
    devices: &'a [ReaderDevice],
    primary: &ReaderDevice,
) -> Option<&'a ReaderDevice> {
    let first_usb = devices.iter().find(|d| d.transport == Transport::Usb);
    let first_bt = devices.iter().find(|d| d.transport == Transport::Bluetooth);

    // Transport is non-exhaustive; any transport that is not USB or
    // Bluetooth gets the Other treatment.
    match primary.transport {
        Transport::Usb => first_bt,
        Transport::Bluetooth => first_usb,
        _ => first_bt.or(first_usb),
    }
}
