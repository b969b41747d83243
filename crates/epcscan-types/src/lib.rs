//! Platform-agnostic types for RFID reader sessions.
//!
//! This crate holds the vocabulary shared across the epcscan workspace:
//! reader transports and enumeration snapshots, buffered tag reads, and
//! the EPC Gen2 configuration enums drivers are configured with. It has
//! no driver or runtime dependencies so it can be reused by any driver
//! backend implementation.

#![warn(missing_docs)]

pub mod types;

pub use types::{
    AntennaConfig, BatchMode, EventSubscriptions, InventoryState, ReaderDevice, ReaderOptions,
    SessionState, SingulationSession, SlFlag, TagRead, Transport, TriggerType,
};
