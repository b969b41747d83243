//! Core types for RFID reader sessions.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical connection medium to a reader.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new transports
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Transport {
    /// USB-attached or docked reader.
    Usb,
    /// Bluetooth-paired reader.
    Bluetooth,
    /// Any other transport (network, serial, vendor service).
    Other,
}

impl Transport {
    /// Map a driver-reported transport label to a [`Transport`].
    ///
    /// Driver stacks report transports as free-form strings such as
    /// `"SERVICE_USB"` or `"BLUETOOTH_SMART"`; matching is substring-based
    /// and case-insensitive, and anything unrecognized maps to
    /// [`Transport::Other`].
    ///
    /// # Examples
    ///
    /// ```
    /// use epcscan_types::Transport;
    ///
    /// assert_eq!(Transport::from_service_name("SERVICE_USB"), Transport::Usb);
    /// assert_eq!(Transport::from_service_name("bluetooth_smart"), Transport::Bluetooth);
    /// assert_eq!(Transport::from_service_name("SERVICE_SERIAL"), Transport::Other);
    /// ```
    #[must_use]
    pub fn from_service_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        if upper.contains("USB") {
            Transport::Usb
        } else if upper.contains("BLUETOOTH") {
            Transport::Bluetooth
        } else {
            Transport::Other
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Usb => write!(f, "USB"),
            Transport::Bluetooth => write!(f, "Bluetooth"),
            Transport::Other => write!(f, "Other"),
        }
    }
}

/// An enumerated reader device.
///
/// This is an immutable snapshot taken at enumeration time. It becomes
/// stale if the device disconnects; re-enumerate rather than caching a
/// snapshot across long idle periods.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReaderDevice {
    /// Reader name as reported by the driver (e.g. `"RFD4031-G10B700-US"`).
    pub name: String,
    /// Transport the reader was enumerated on.
    pub transport: Transport,
}

impl ReaderDevice {
    /// Create a new device snapshot.
    pub fn new(name: impl Into<String>, transport: Transport) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    /// Whether this reader is USB-attached.
    #[must_use]
    pub fn is_usb(&self) -> bool {
        self.transport == Transport::Usb
    }

    /// Whether this reader is Bluetooth-paired.
    #[must_use]
    pub fn is_bluetooth(&self) -> bool {
        self.transport == Transport::Bluetooth
    }
}

impl fmt::Display for ReaderDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.transport)
    }
}

/// One tag pulled from the reader's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TagRead {
    /// The tag identifier (EPC) as a hex string.
    pub tag_id: String,
    /// Raw tag data attached to the read, if the driver provided any.
    pub raw: Option<Vec<u8>>,
}

impl TagRead {
    /// Create a tag read from an identifier, with no raw data.
    pub fn new(tag_id: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            raw: None,
        }
    }

    /// Check whether the identifier looks like a well-formed EPC.
    ///
    /// A well-formed EPC is a non-empty, even-length hex string. Drivers
    /// occasionally surface truncated reads; callers may use this to skip
    /// them.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.tag_id.is_empty()
            && self.tag_id.len() % 2 == 0
            && self.tag_id.chars().all(|c| c.is_ascii_hexdigit())
    }
}

/// EPC Gen2 singulation session.
///
/// Controls how a tag population is addressed within one inventory round
/// so the same physical tag is not re-read excessively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SingulationSession {
    /// Session 0: tags respond again as soon as they are re-energized.
    #[default]
    S0,
    /// Session 1.
    S1,
    /// Session 2.
    S2,
    /// Session 3.
    S3,
}

impl fmt::Display for SingulationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingulationSession::S0 => write!(f, "S0"),
            SingulationSession::S1 => write!(f, "S1"),
            SingulationSession::S2 => write!(f, "S2"),
            SingulationSession::S3 => write!(f, "S3"),
        }
    }
}

/// EPC Gen2 inventory state targeted by singulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InventoryState {
    /// Target state A.
    #[default]
    A,
    /// Target state B.
    B,
    /// Alternate between A and B each round.
    AbFlip,
}

/// EPC Gen2 selected-flag filter for the tag population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SlFlag {
    /// Match the whole population regardless of SL state.
    #[default]
    All,
    /// Match only tags with SL asserted.
    Asserted,
    /// Match only tags with SL deasserted.
    Deasserted,
}

/// Start/stop trigger type for inventory operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TriggerType {
    /// Software-driven: inventory starts/stops when commanded.
    #[default]
    Immediate,
    /// Driven by the physical handheld trigger.
    HandheldTrigger,
    /// Periodic, driver-scheduled.
    Periodic,
}

/// Reader batch-mode setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BatchMode {
    /// Report tags as they are read.
    #[default]
    Disable,
    /// Buffer tags on the reader and report in batches.
    Enable,
    /// Let the reader decide based on link state.
    Auto,
}

/// Per-antenna RF configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AntennaConfig {
    /// Index into the reader's transmit power table.
    pub power_index: u16,
    /// Singulation session.
    pub session: SingulationSession,
    /// Inventory state targeted by singulation.
    pub inventory_state: InventoryState,
    /// Selected-flag population filter.
    pub sl_flag: SlFlag,
}

impl Default for AntennaConfig {
    fn default() -> Self {
        Self {
            power_index: 30,
            session: SingulationSession::S0,
            inventory_state: InventoryState::A,
            sl_flag: SlFlag::All,
        }
    }
}

/// Which driver event notifications to enable after connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventSubscriptions {
    /// Tag read notifications.
    pub tag_read: bool,
    /// Reader status notifications.
    pub status: bool,
    /// Inventory-start notifications.
    pub inventory_start: bool,
    /// Inventory-stop notifications.
    pub inventory_stop: bool,
    /// Attach tag data to read notifications.
    pub attach_tag_data: bool,
}

impl EventSubscriptions {
    /// Enable every notification the session consumes.
    #[must_use]
    pub fn all() -> Self {
        Self {
            tag_read: true,
            status: true,
            inventory_start: true,
            inventory_stop: true,
            attach_tag_data: true,
        }
    }
}

/// Base reader options applied after every connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReaderOptions {
    /// Batch-mode setting.
    pub batch_mode: BatchMode,
    /// Report each unique tag once per inventory round.
    pub unique_tag_report: bool,
    /// Put the trigger in RFID mode (software start/stop, not the
    /// physical trigger).
    pub trigger_mode_rfid: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            batch_mode: BatchMode::Disable,
            unique_tag_report: true,
            trigger_mode_rfid: true,
        }
    }
}

/// Lifecycle state of a reader session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionState {
    /// No connection activity; `start()` is valid.
    #[default]
    Idle,
    /// Establishing a connection to the selected reader.
    Connecting,
    /// Applying post-connect configuration.
    Configuring,
    /// Continuous inventory is running and tags are being drained.
    Scanning,
    /// Halting inventory and drain tasks.
    Stopping,
    /// An unrecoverable failure was reported; a fresh `start()` is
    /// required.
    Error,
}

impl SessionState {
    /// Whether the session currently holds driver resources.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::Configuring
                | SessionState::Scanning
                | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Configuring => write!(f, "configuring"),
            SessionState::Scanning => write!(f, "scanning"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Error => write!(f, "error"),
        }
    }
}
