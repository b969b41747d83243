//! Connection establishment and post-connect configuration.
//!
//! [`Connector`] owns the connect sequence for one target device:
//! idempotent reuse of a live connection to the same reader, best-effort
//! teardown of a stale one, retry with backoff, and the configuration a
//! freshly connected reader needs before continuous inventory can run.
//!
//! Configuration splits into a hard and a soft half. Event subscriptions
//! and base options are hard requirements: without them no tags flow, so
//! a failure there is [`Error::ConfigurationFailed`] and aborts the start
//! attempt. RF tuning (per-antenna power, singulation) and trigger/
//! storage setup are best-effort: a functional inventory matters more
//! than optimal RF parameters, so failures are logged and configuration
//! continues.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use epcscan_types::{
    AntennaConfig, EventSubscriptions, InventoryState, ReaderDevice, ReaderOptions, SlFlag,
    TriggerType,
};

use crate::config::SessionConfig;
use crate::driver::{DeviceRegistry, ReaderEvent, ReaderHandle};
use crate::error::{Error, Result};
use crate::retry::connect_with_retry;
use crate::sink::StatusSink;

/// Establishes and configures reader connections for the session worker.
pub(crate) struct Connector {
    registry: Arc<dyn DeviceRegistry>,
    config: SessionConfig,
}

impl Connector {
    pub(crate) fn new(registry: Arc<dyn DeviceRegistry>, config: SessionConfig) -> Self {
        Self { registry, config }
    }

    /// Ensure a live connection to `target`.
    ///
    /// When `current` already holds a live connection whose reported
    /// identity matches the target name, it is returned unchanged and no
    /// connect attempt is made. Otherwise any existing connection is torn
    /// down (best effort) and a fresh handle is opened and connected with
    /// retry.
    pub(crate) async fn ensure_connected(
        &self,
        current: Option<&(ReaderDevice, Arc<dyn ReaderHandle>)>,
        target: &ReaderDevice,
        cancel: &CancellationToken,
    ) -> Result<(ReaderDevice, Arc<dyn ReaderHandle>)> {
        if let Some((_, handle)) = current {
            if handle.is_connected().await {
                match handle.host_name().await {
                    Ok(name) if name == target.name => {
                        debug!("already connected to reader {}", name);
                        return Ok((target.clone(), Arc::clone(handle)));
                    }
                    Ok(name) => {
                        debug!("connected to {} but target is {}", name, target.name);
                    }
                    Err(e) => {
                        warn!("cannot query connected reader identity: {}", e);
                    }
                }

                debug!("disconnecting from current reader");
                if let Err(e) = handle.disconnect().await {
                    warn!("disconnect of stale connection failed: {}", e);
                }
            }
        }

        let handle = self.registry.open(target).await?;
        connect_with_retry(&handle, target, &self.config.retry, cancel).await?;
        debug!("connected to {}", target);

        Ok((target.clone(), handle))
    }

    /// Apply post-connect configuration and return the driver event
    /// channel.
    pub(crate) async fn configure(
        &self,
        reader: &Arc<dyn ReaderHandle>,
        status: &dyn StatusSink,
    ) -> Result<mpsc::Receiver<ReaderEvent>> {
        // Hard half: without these no tags flow.
        let events = reader
            .subscribe(EventSubscriptions::all())
            .await
            .map_err(|e| Error::configuration_failed("subscribe", e))?;
        reader
            .set_options(ReaderOptions::default())
            .await
            .map_err(|e| Error::configuration_failed("set_options", e))?;
        reader
            .clear_prefilters()
            .await
            .map_err(|e| Error::configuration_failed("clear_prefilters", e))?;
        debug!("reader base configuration completed");

        // Soft half: best effort, never aborts the start attempt.
        if let Err(e) = self.tune_rf(reader, status).await {
            warn!("RF tuning failed: {}", e);
        }
        if let Err(e) = self.configure_triggers_and_storage(reader).await {
            warn!("trigger/storage setup failed: {}", e);
        }

        Ok(events)
    }

    /// Push transmit power to the highest supported index and apply the
    /// configured singulation to every available antenna.
    async fn tune_rf(&self, reader: &Arc<dyn ReaderHandle>, status: &dyn StatusSink) -> Result<()> {
        let antennas = reader.available_antennas().await?;
        if antennas.is_empty() {
            debug!("reader reports no antennas, skipping RF tuning");
            return Ok(());
        }

        debug!("available antennas: {:?}", antennas);
        status.on_status(&format!("Antennas: {antennas:?}"), true);

        let power_index = match reader.transmit_power_levels().await {
            Ok(levels) if !levels.is_empty() => {
                let index = (levels.len() - 1) as u16;
                debug!("using max power index {} ({})", index, levels[levels.len() - 1]);
                index
            }
            Ok(_) => {
                warn!(
                    "empty power table, falling back to index {}",
                    self.config.fallback_power_index
                );
                self.config.fallback_power_index
            }
            Err(e) => {
                warn!(
                    "power capability query failed ({}), falling back to index {}",
                    e, self.config.fallback_power_index
                );
                self.config.fallback_power_index
            }
        };

        for antenna in antennas {
            reader
                .set_antenna_config(
                    antenna,
                    AntennaConfig {
                        power_index,
                        session: self.config.singulation_session,
                        inventory_state: InventoryState::A,
                        sl_flag: SlFlag::All,
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// Immediate software triggers and a bounded device-side tag buffer.
    async fn configure_triggers_and_storage(&self, reader: &Arc<dyn ReaderHandle>) -> Result<()> {
        reader
            .set_triggers(TriggerType::Immediate, TriggerType::Immediate)
            .await?;
        reader
            .set_tag_storage_limit(self.config.tag_storage_limit)
            .await?;
        Ok(())
    }
}
