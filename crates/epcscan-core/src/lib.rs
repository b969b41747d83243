//! Core session library for handheld RFID readers.
//!
//! This crate drives one RFID reader at a time through a complete scan
//! lifecycle: discover attached readers, connect with retry, configure
//! the reader for continuous inventory, and deliver deduplicated tag
//! reads to caller-owned sinks.
//!
//! # Features
//!
//! - **Device discovery**: Enumerate attached readers and prefer USB
//!   over Bluetooth
//! - **Resilient connect**: Exponential backoff retry with a structured
//!   failure taxonomy
//! - **Reader configuration**: Event subscriptions, per-antenna RF
//!   tuning, triggers and tag storage
//! - **Dual-path draining**: Driver notifications plus an interval
//!   poller, funneled through one duplicate filter
//! - **Serialized control**: One worker task owns the driver, so start
//!   and stop never race
//! - **Simulated hardware**: A full in-memory driver for development
//!   and tests
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use epcscan_core::{ReaderSession, SessionConfig};
//! use epcscan_core::sim::{SimulatedReader, SimulatedRegistry};
//! use epcscan_types::Transport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
//!     let registry = Arc::new(SimulatedRegistry::with_readers(vec![reader]));
//!
//!     let session = ReaderSession::new(
//!         registry,
//!         SessionConfig::default(),
//!         Arc::new(|tag: &str| println!("tag: {tag}")),
//!         Arc::new(|message: &str, ok: bool| println!("[{ok}] {message}")),
//!     )?;
//!
//!     session.start().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     session.stop().await?;
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
mod connect;
pub mod dedup;
mod drain;
pub mod driver;
pub mod error;
pub mod retry;
pub mod select;
pub mod session;
pub mod sim;
pub mod sink;

// Re-export the shared wire types for downstream convenience.
pub use epcscan_types as types;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use dedup::{DEFAULT_WINDOW, DuplicateFilter};
pub use driver::{DeviceRegistry, ReaderEvent, ReaderHandle};
pub use error::{ConnectFailureReason, Error, NoDeviceReason, Result};
pub use retry::RetryConfig;
pub use select::{pick_alternate, pick_primary};
pub use session::ReaderSession;
pub use sink::{ChannelStatusSink, ChannelTagSink, StatusSink, StatusUpdate, TagSink};
