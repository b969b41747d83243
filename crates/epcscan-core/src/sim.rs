//! Simulated reader hardware for development and testing.
//!
//! [`SimulatedReader`] is a full in-memory [`ReaderHandle`]: it tracks
//! connection state, remembers every configuration call, buffers pushed
//! tags, and emits driver events over the subscribed channel. Failure
//! injection hooks script connect rejections, power-query errors, and
//! configuration faults so error paths can be exercised without
//! hardware. [`SimulatedRegistry`] wraps a fixed set of simulated
//! readers behind the [`DeviceRegistry`] trait.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use epcscan_core::sim::{SimulatedReader, SimulatedRegistry};
//! use epcscan_types::Transport;
//!
//! let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
//! let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
//! reader.fail_next_connects(2); // first two connect attempts rejected
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use epcscan_types::{
    AntennaConfig, EventSubscriptions, ReaderDevice, ReaderOptions, TagRead, Transport,
    TriggerType,
};

use crate::driver::{DeviceRegistry, ReaderEvent, ReaderHandle};
use crate::error::{ConnectFailureReason, Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct SimState {
    buffer: VecDeque<TagRead>,
    extended_buffer: VecDeque<TagRead>,
    events: Option<mpsc::Sender<ReaderEvent>>,
    subscriptions: Option<EventSubscriptions>,
    options: Option<ReaderOptions>,
    triggers: Option<(TriggerType, TriggerType)>,
    antenna_configs: HashMap<u16, AntennaConfig>,
}

/// In-memory reader that behaves like connected RFID hardware.
pub struct SimulatedReader {
    name: String,
    transport: Transport,
    connected: AtomicBool,
    connect_attempts: AtomicU32,
    remaining_connect_failures: AtomicU32,
    inventory_active: AtomicBool,
    prefilters_cleared: AtomicBool,
    fail_power_query: AtomicBool,
    fail_configuration: AtomicBool,
    fail_start_inventory: AtomicBool,
    tag_storage_limit: AtomicU32,
    purge_count: AtomicU32,
    state: Mutex<SimState>,
}

impl SimulatedReader {
    /// Create a simulated reader advertising the given name and
    /// transport.
    pub fn new(name: impl Into<String>, transport: Transport) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            transport,
            connected: AtomicBool::new(false),
            connect_attempts: AtomicU32::new(0),
            remaining_connect_failures: AtomicU32::new(0),
            inventory_active: AtomicBool::new(false),
            prefilters_cleared: AtomicBool::new(false),
            fail_power_query: AtomicBool::new(false),
            fail_configuration: AtomicBool::new(false),
            fail_start_inventory: AtomicBool::new(false),
            tag_storage_limit: AtomicU32::new(0),
            purge_count: AtomicU32::new(0),
            state: Mutex::new(SimState::default()),
        })
    }

    /// The device entry this reader shows up as during discovery.
    pub fn device(&self) -> ReaderDevice {
        ReaderDevice::new(self.name.clone(), self.transport)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Buffer tags and notify the subscriber that tags are available.
    pub fn push_tags(&self, tags: Vec<TagRead>) {
        let sender = {
            let mut state = self.state();
            state.buffer.extend(tags);
            state.events.clone()
        };
        if let Some(tx) = sender {
            let _ = tx.try_send(ReaderEvent::TagsBuffered);
        }
    }

    /// Buffer tags without emitting an event; only the poller will find
    /// them.
    pub fn push_tags_silent(&self, tags: Vec<TagRead>) {
        self.state().buffer.extend(tags);
    }

    /// Buffer tags that only the extended read surfaces.
    pub fn push_tags_extended(&self, tags: Vec<TagRead>) {
        self.state().extended_buffer.extend(tags);
    }

    /// Emit a driver status event.
    pub fn emit_status(&self, message: impl Into<String>) {
        if let Some(tx) = self.state().events.clone() {
            let _ = tx.try_send(ReaderEvent::Status(message.into()));
        }
    }

    /// Emit a disconnect event, as hardware does when the cable is
    /// pulled.
    pub fn emit_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(tx) = self.state().events.clone() {
            let _ = tx.try_send(ReaderEvent::Disconnected);
        }
    }

    /// Reject the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.remaining_connect_failures.store(n, Ordering::SeqCst);
    }

    /// Make the transmit power capability query fail.
    pub fn fail_power_query(&self, fail: bool) {
        self.fail_power_query.store(fail, Ordering::SeqCst);
    }

    /// Make base configuration (option application) fail.
    pub fn fail_configuration(&self, fail: bool) {
        self.fail_configuration.store(fail, Ordering::SeqCst);
    }

    /// Make inventory start fail.
    pub fn fail_start_inventory(&self, fail: bool) {
        self.fail_start_inventory.store(fail, Ordering::SeqCst);
    }

    /// Total connect attempts observed, including rejected ones.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Whether continuous inventory is currently running.
    pub fn inventory_active(&self) -> bool {
        self.inventory_active.load(Ordering::SeqCst)
    }

    /// Options applied by the last `set_options` call.
    pub fn applied_options(&self) -> Option<ReaderOptions> {
        self.state().options
    }

    /// Event subscriptions from the last `subscribe` call.
    pub fn applied_subscriptions(&self) -> Option<EventSubscriptions> {
        self.state().subscriptions
    }

    /// Whether `clear_prefilters` has been called.
    pub fn prefilters_cleared(&self) -> bool {
        self.prefilters_cleared.load(Ordering::SeqCst)
    }

    /// Triggers applied by the last `set_triggers` call.
    pub fn applied_triggers(&self) -> Option<(TriggerType, TriggerType)> {
        self.state().triggers
    }

    /// Limit applied by the last `set_tag_storage_limit` call.
    pub fn tag_storage_limit(&self) -> u32 {
        self.tag_storage_limit.load(Ordering::SeqCst)
    }

    /// Configuration applied to the given antenna, if any.
    pub fn antenna_config(&self, antenna: u16) -> Option<AntennaConfig> {
        self.state().antenna_configs.get(&antenna).copied()
    }

    /// Number of `purge_tags` calls observed.
    pub fn purge_count(&self) -> u32 {
        self.purge_count.load(Ordering::SeqCst)
    }

    /// Tags currently buffered and visible to the primary read.
    pub fn buffered_len(&self) -> usize {
        self.state().buffer.len()
    }

    fn require_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn take_from(queue: &mut VecDeque<TagRead>, max: usize) -> Vec<TagRead> {
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }
}

#[async_trait]
impl ReaderHandle for SimulatedReader {
    async fn connect(&self) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.remaining_connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            trace!("simulated connect rejection ({} more scripted)", remaining - 1);
            return Err(Error::connection_failed(
                Some(self.name.clone()),
                1,
                ConnectFailureReason::Rejected,
            ));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.inventory_active.store(false, Ordering::SeqCst);
        self.state().events = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn host_name(&self) -> Result<String> {
        self.require_connected()?;
        Ok(self.name.clone())
    }

    async fn subscribe(&self, subs: EventSubscriptions) -> Result<mpsc::Receiver<ReaderEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut state = self.state();
        state.events = Some(tx);
        state.subscriptions = Some(subs);
        Ok(rx)
    }

    async fn set_options(&self, options: ReaderOptions) -> Result<()> {
        if self.fail_configuration.load(Ordering::SeqCst) {
            return Err(Error::driver_call_failed(
                "set_options",
                "simulated configuration fault",
            ));
        }
        self.state().options = Some(options);
        Ok(())
    }

    async fn clear_prefilters(&self) -> Result<()> {
        self.prefilters_cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_triggers(&self, start: TriggerType, stop: TriggerType) -> Result<()> {
        self.state().triggers = Some((start, stop));
        Ok(())
    }

    async fn set_tag_storage_limit(&self, max_tags: u32) -> Result<()> {
        self.tag_storage_limit.store(max_tags, Ordering::SeqCst);
        Ok(())
    }

    async fn available_antennas(&self) -> Result<Vec<u16>> {
        self.require_connected()?;
        Ok(vec![1, 2])
    }

    async fn transmit_power_levels(&self) -> Result<Vec<u16>> {
        if self.fail_power_query.load(Ordering::SeqCst) {
            return Err(Error::driver_call_failed(
                "transmit_power_levels",
                "simulated capability fault",
            ));
        }
        // 31 dBm-index steps, 100..=400 in tenths of a dBm.
        Ok((0..31).map(|i| 100 + i * 10).collect())
    }

    async fn set_antenna_config(&self, antenna: u16, config: AntennaConfig) -> Result<()> {
        self.state().antenna_configs.insert(antenna, config);
        Ok(())
    }

    async fn start_inventory(&self) -> Result<()> {
        self.require_connected()?;
        if self.fail_start_inventory.load(Ordering::SeqCst) {
            return Err(Error::driver_call_failed(
                "start_inventory",
                "simulated inventory fault",
            ));
        }
        self.inventory_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_inventory(&self) -> Result<()> {
        self.require_connected()?;
        self.inventory_active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn purge_tags(&self) -> Result<()> {
        self.purge_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.buffer.clear();
        state.extended_buffer.clear();
        Ok(())
    }

    async fn read_buffered(&self, max: usize) -> Result<Vec<TagRead>> {
        self.require_connected()?;
        Ok(Self::take_from(&mut self.state().buffer, max))
    }

    async fn read_buffered_extended(&self, max: usize) -> Result<Vec<TagRead>> {
        self.require_connected()?;
        Ok(Self::take_from(&mut self.state().extended_buffer, max))
    }
}

/// Registry over a fixed set of simulated readers.
pub struct SimulatedRegistry {
    readers: Vec<Arc<SimulatedReader>>,
    released: AtomicBool,
    list_calls: AtomicU32,
}

impl SimulatedRegistry {
    /// Registry that discovers the given readers, in order.
    pub fn with_readers(readers: Vec<Arc<SimulatedReader>>) -> Self {
        Self {
            readers,
            released: AtomicBool::new(false),
            list_calls: AtomicU32::new(0),
        }
    }

    /// Registry that never discovers any device.
    pub fn empty() -> Self {
        Self::with_readers(Vec::new())
    }

    /// Whether `release` has been called.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of discovery passes performed.
    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceRegistry for SimulatedRegistry {
    async fn list_devices(&self) -> Result<Vec<ReaderDevice>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.readers.iter().map(|r| r.device()).collect())
    }

    async fn open(&self, device: &ReaderDevice) -> Result<Arc<dyn ReaderHandle>> {
        self.readers
            .iter()
            .find(|r| r.name == device.name)
            .map(|r| Arc::clone(r) as Arc<dyn ReaderHandle>)
            .ok_or_else(|| Error::device_not_found(device.name.clone()))
    }

    async fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}
