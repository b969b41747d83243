//! The reader session: a handle plus a single worker task.
//!
//! All driver interaction happens inside one worker task that consumes
//! commands from an mpsc queue, so start, stop, and shutdown requests
//! are serialized in arrival order and never race each other against
//! the driver. The public [`ReaderSession`] handle is cheap to clone
//! and safe to call from any task; each control call resolves once the
//! worker has fully processed it.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Connecting -> Configuring -> Scanning -> Stopping -> Idle
//! ```
//!
//! A failed start lands back in `Idle` with the failure delivered both
//! as the returned error and as a not-ok status message, so the session
//! stays usable for another attempt.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use epcscan_types::{ReaderDevice, SessionState};

use crate::config::SessionConfig;
use crate::connect::Connector;
use crate::dedup::DuplicateFilter;
use crate::drain::{DrainContext, DrainTasks, spawn_drains};
use crate::driver::{DeviceRegistry, ReaderHandle};
use crate::error::{Error, Result};
use crate::select::{pick_alternate, pick_primary};
use crate::sink::{StatusSink, TagSink};

enum Command {
    Start { ack: oneshot::Sender<Result<()>> },
    Stop { ack: oneshot::Sender<Result<()>> },
    Shutdown { ack: oneshot::Sender<Result<()>> },
}

/// Handle to a running reader session.
///
/// Cloning the handle shares the same underlying worker. The session
/// shuts down either explicitly via [`shutdown`](Self::shutdown) or
/// implicitly when every handle is dropped.
#[derive(Clone)]
pub struct ReaderSession {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    tags_reported: Arc<AtomicU64>,
}

impl ReaderSession {
    /// Spawn a session worker over `registry` and return its handle.
    ///
    /// Fails fast on an invalid configuration; no task is spawned in
    /// that case.
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        config: SessionConfig,
        tags: Arc<dyn TagSink>,
        status: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        config.validate()?;

        let (commands, rx) = mpsc::channel(config.command_queue_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (disconnects_tx, disconnects_rx) = mpsc::unbounded_channel();
        let tags_reported = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            registry: Arc::clone(&registry),
            connector: Connector::new(registry, config.clone()),
            config,
            tags,
            status,
            state: state_tx,
            tags_reported: Arc::clone(&tags_reported),
            connected: None,
            drains: None,
            disconnects: disconnects_tx,
            shut_down: false,
        };
        tokio::spawn(worker.run(rx, disconnects_rx));

        Ok(Self {
            commands,
            state: state_rx,
            tags_reported,
        })
    }

    /// Connect (if needed), configure, and begin continuous inventory.
    ///
    /// Resolves once the worker has finished the attempt, successful or
    /// not. Operational failures (no device, retry exhaustion, a
    /// rejected configuration) are reported through the status sink
    /// with `ok == false` and leave the session in `Idle`, ready for
    /// another attempt; the call itself fails only when the session has
    /// been shut down.
    pub async fn start(&self) -> Result<()> {
        self.submit(|ack| Command::Start { ack }).await
    }

    /// Stop inventory and halt tag delivery.
    ///
    /// Once this resolves no further tags are reported for the finished
    /// scan. A no-op when not scanning.
    pub async fn stop(&self) -> Result<()> {
        self.submit(|ack| Command::Stop { ack }).await
    }

    /// Stop scanning, disconnect, and release driver resources.
    ///
    /// Idempotent; subsequent calls resolve immediately. The session
    /// cannot be started again afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.submit(|ack| Command::Shutdown { ack }).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch channel for lifecycle state changes.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Tags reported since the last scan started.
    pub fn tags_reported(&self) -> u64 {
        self.tags_reported.load(Ordering::Relaxed)
    }

    async fn submit(&self, make: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(make(ack))
            .await
            .map_err(|_| Error::SessionClosed)?;
        done.await.map_err(|_| Error::SessionClosed)?
    }
}

/// The single task that owns all driver state.
struct Worker {
    registry: Arc<dyn DeviceRegistry>,
    connector: Connector,
    config: SessionConfig,
    tags: Arc<dyn TagSink>,
    status: Arc<dyn StatusSink>,
    state: watch::Sender<SessionState>,
    tags_reported: Arc<AtomicU64>,
    connected: Option<(ReaderDevice, Arc<dyn ReaderHandle>)>,
    drains: Option<DrainTasks>,
    // Cloned into every drain scope; kept here so the channel outlives
    // individual scans.
    disconnects: mpsc::UnboundedSender<()>,
    shut_down: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut disconnects: mpsc::UnboundedReceiver<()>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start { ack }) => {
                        let _ = ack.send(self.handle_start().await);
                    }
                    Some(Command::Stop { ack }) => {
                        let _ = ack.send(self.handle_stop().await);
                    }
                    Some(Command::Shutdown { ack }) => {
                        let _ = ack.send(self.handle_shutdown().await);
                    }
                    None => break,
                },
                Some(()) = disconnects.recv() => {
                    self.handle_disconnect().await;
                }
            }
        }

        // Every handle dropped without an explicit shutdown.
        if !self.shut_down {
            debug!("session handles dropped, tearing down");
            let _ = self.handle_shutdown().await;
        }
        debug!("session worker exited");
    }

    async fn handle_start(&mut self) -> Result<()> {
        if self.shut_down {
            self.status.on_status("Session is shut down", false);
            return Err(Error::SessionClosed);
        }
        if self.state.borrow().is_active() {
            debug!("start requested while {}, ignoring", *self.state.borrow());
            return Ok(());
        }

        // Failures are reported, not returned: the caller learns of
        // them through the status sink and the session drops back to
        // Idle for another attempt.
        match self.start_scanning().await {
            Ok(device) => {
                info!("scanning on {}", device);
            }
            Err(e) => {
                warn!("start failed: {}", e);
                self.status.on_status(&format!("RFID start failed: {e}"), false);
                self.set_state(SessionState::Idle);
            }
        }
        Ok(())
    }

    async fn start_scanning(&mut self) -> Result<ReaderDevice> {
        let target = self.select_target().await?;
        self.status
            .on_status(&format!("Connecting to {}", target.name), false);
        self.set_state(SessionState::Connecting);

        let cancel = CancellationToken::new();
        let connected = self
            .connector
            .ensure_connected(self.connected.as_ref(), &target, &cancel)
            .await?;
        self.connected = Some(connected);
        let (device, reader) = self
            .connected
            .as_ref()
            .map(|(d, r)| (d.clone(), Arc::clone(r)))
            .ok_or(Error::NotConnected)?;

        self.set_state(SessionState::Configuring);
        let events = self.connector.configure(&reader, self.status.as_ref()).await?;

        // Clean slate: stop a possibly dangling inventory and drop
        // whatever the device buffered since the last scan.
        if let Err(e) = reader.stop_inventory().await {
            debug!("no inventory to stop: {}", e);
        }
        if let Err(e) = reader.purge_tags().await {
            warn!("tag purge failed: {}", e);
        }

        reader
            .start_inventory()
            .await
            .map_err(|e| Error::driver_call_failed("start_inventory", e))?;

        self.tags_reported.store(0, Ordering::Relaxed);
        let ctx = DrainContext {
            reader,
            filter: Arc::new(DuplicateFilter::new(self.config.dedup_window)),
            tags: Arc::clone(&self.tags),
            status: Arc::clone(&self.status),
            reported: Arc::clone(&self.tags_reported),
            batch: self.config.drain_batch,
            disconnected: self.disconnects.clone(),
        };
        self.drains = Some(spawn_drains(ctx, events, self.config.poll_interval));

        self.set_state(SessionState::Scanning);
        self.status.on_status(
            &format!("Connected to {} ({}) - Scanning...", device.name, device.transport),
            true,
        );
        Ok(device)
    }

    /// Prefer a USB reader; keep the opposite transport as the logged
    /// alternate.
    async fn select_target(&self) -> Result<ReaderDevice> {
        let devices = self.registry.list_devices().await?;
        let primary = pick_primary(&devices).ok_or_else(Error::no_devices)?.clone();
        if let Some(alternate) = pick_alternate(&devices, &primary) {
            debug!("alternate reader available: {}", alternate);
        }
        Ok(primary)
    }

    async fn handle_stop(&mut self) -> Result<()> {
        if !self.state.borrow().is_active() {
            debug!("stop requested while {}, ignoring", *self.state.borrow());
            return Ok(());
        }
        self.set_state(SessionState::Stopping);

        if let Some((_, reader)) = &self.connected {
            if let Err(e) = reader.stop_inventory().await {
                warn!("inventory stop failed: {}", e);
            }
        }
        if let Some(drains) = self.drains.take() {
            drains.halt().await;
        }

        self.set_state(SessionState::Idle);
        self.status.on_status("Stopped scanning", true);
        Ok(())
    }

    /// Tear down after the driver reports the connection lost mid-scan.
    ///
    /// The event pump has already reported the loss and cancelled the
    /// drain scope; this joins the drain tasks, drops the dead handle,
    /// and takes the session through `Error` back to `Idle` so a fresh
    /// `start()` can reconnect.
    async fn handle_disconnect(&mut self) {
        if *self.state.borrow() != SessionState::Scanning {
            // A stale signal from a scan already torn down.
            return;
        }
        warn!("reader connection lost while scanning");

        if let Some(drains) = self.drains.take() {
            drains.halt().await;
        }
        self.connected = None;

        self.set_state(SessionState::Error);
        self.set_state(SessionState::Idle);
    }

    async fn handle_shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.handle_stop().await?;

        if let Some((device, reader)) = self.connected.take() {
            if let Err(e) = reader.disconnect().await {
                warn!("disconnect from {} failed: {}", device.name, e);
            }
        }
        if let Err(e) = self.registry.release().await {
            warn!("registry release failed: {}", e);
        }

        self.shut_down = true;
        info!("session shut down");
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }
}
