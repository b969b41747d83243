//! Driver SDK seam.
//!
//! Vendor RFID driver stacks expose a registry of enumerable readers and
//! a per-reader handle with connect/configure/inventory operations. This
//! module abstracts that surface behind two traits so the session manager
//! works against any backend: a vendor SDK binding, or the in-tree
//! [`SimulatedRegistry`](crate::sim::SimulatedRegistry) used by tests and
//! the CLI.
//!
//! The hardware's asynchronous read-notification callback is modeled as a
//! [`ReaderEvent`] message on a driver-owned channel rather than a direct
//! function call, so the same drain logic serves both the event path and
//! the poll path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use epcscan_types::{
    AntennaConfig, EventSubscriptions, ReaderDevice, ReaderOptions, TagRead, TriggerType,
};

use crate::error::Result;

/// Events delivered by the driver on its own execution context.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event
/// types in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReaderEvent {
    /// New tags are waiting in the reader's buffer.
    TagsBuffered,
    /// Human-readable reader status line.
    Status(String),
    /// A continuous inventory operation started.
    InventoryStarted,
    /// A continuous inventory operation stopped.
    InventoryStopped,
    /// The link to the reader dropped.
    Disconnected,
}

/// A handle to one reader, as opened through a [`DeviceRegistry`].
///
/// The session manager mutates a handle from exactly one worker task;
/// implementations only need interior mutability for the buffer-reading
/// operations, which are also called from the drain tasks.
#[async_trait]
pub trait ReaderHandle: Send + Sync {
    /// Establish the connection. One attempt; retry policy lives in the
    /// session manager.
    async fn connect(&self) -> Result<()>;

    /// Tear down the connection. Safe to call when already disconnected.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up.
    async fn is_connected(&self) -> bool;

    /// Identity of the live connection, used for idempotent reconnects.
    async fn host_name(&self) -> Result<String>;

    /// Enable event notifications and return the channel they are
    /// delivered on. Subscribing again replaces any previous channel.
    async fn subscribe(&self, subs: EventSubscriptions) -> Result<mpsc::Receiver<ReaderEvent>>;

    /// Apply base reader options (batch mode, unique-tag reporting,
    /// trigger mode).
    async fn set_options(&self, options: ReaderOptions) -> Result<()>;

    /// Clear pre-existing tag filters and queued operation sequences.
    async fn clear_prefilters(&self) -> Result<()>;

    /// Set the inventory start/stop trigger types.
    async fn set_triggers(&self, start: TriggerType, stop: TriggerType) -> Result<()>;

    /// Cap the reader's internal tag-storage buffer.
    async fn set_tag_storage_limit(&self, max_tags: u32) -> Result<()>;

    /// Antenna ids the reader reports as available.
    async fn available_antennas(&self) -> Result<Vec<u16>>;

    /// Supported transmit power levels, lowest to highest.
    async fn transmit_power_levels(&self) -> Result<Vec<u16>>;

    /// Apply RF configuration to one antenna.
    async fn set_antenna_config(&self, antenna: u16, config: AntennaConfig) -> Result<()>;

    /// Begin continuous inventory.
    async fn start_inventory(&self) -> Result<()>;

    /// Stop a running inventory. Errors when none is running; callers on
    /// the defensive-stop path ignore that.
    async fn stop_inventory(&self) -> Result<()>;

    /// Discard everything in the reader's tag buffer.
    async fn purge_tags(&self) -> Result<()>;

    /// Drain up to `max_tags` from the primary tag buffer.
    async fn read_buffered(&self, max_tags: usize) -> Result<Vec<TagRead>>;

    /// Drain up to `max_tags` from the secondary/extended buffer. Some
    /// driver/transport combinations only surface tags here.
    async fn read_buffered_extended(&self, max_tags: usize) -> Result<Vec<TagRead>>;
}

/// Enumerates reader devices and opens handles to them.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Enumerate available readers.
    ///
    /// The first call may initialize transport scanning (USB enumeration,
    /// Bluetooth discovery) as a side effect; later calls reuse it. An
    /// empty list is returned as-is; callers decide whether that is an
    /// error.
    async fn list_devices(&self) -> Result<Vec<ReaderDevice>>;

    /// Open a handle to an enumerated device. Does not connect.
    async fn open(&self, device: &ReaderDevice) -> Result<Arc<dyn ReaderHandle>>;

    /// Release transport resources held by the registry. Idempotent.
    async fn release(&self) -> Result<()>;
}
