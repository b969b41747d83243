//! Tag draining: the poller and the driver event pump.
//!
//! Buffered tags reach the caller through two concurrent paths. The
//! event pump drains whenever the driver signals tags are available; the
//! poller drains on a fixed interval as a safety net for drivers whose
//! notifications are unreliable. Both paths funnel through [`drain_once`]
//! and one shared [`DuplicateFilter`], so the same tag surfacing on both
//! paths within the suppression window is reported exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::dedup::DuplicateFilter;
use crate::driver::{ReaderEvent, ReaderHandle};
use crate::sink::{StatusSink, TagSink};

/// Handles to the two drain tasks of an active scan.
pub(crate) struct DrainTasks {
    cancel: CancellationToken,
    poller: JoinHandle<()>,
    event_pump: JoinHandle<()>,
}

impl DrainTasks {
    /// Cancel both tasks and wait for them to exit.
    ///
    /// After this returns no further tag reports are emitted for the
    /// finished scan.
    pub(crate) async fn halt(self) {
        self.cancel.cancel();
        let _ = self.poller.await;
        let _ = self.event_pump.await;
    }
}

/// Shared state both drain paths operate on.
pub(crate) struct DrainContext {
    pub(crate) reader: Arc<dyn ReaderHandle>,
    pub(crate) filter: Arc<DuplicateFilter>,
    pub(crate) tags: Arc<dyn TagSink>,
    pub(crate) status: Arc<dyn StatusSink>,
    pub(crate) reported: Arc<AtomicU64>,
    pub(crate) batch: usize,
    /// Signals the session worker that the reader connection is gone.
    pub(crate) disconnected: mpsc::UnboundedSender<()>,
}

/// Pull one batch of buffered tags and report the non-duplicates.
///
/// Falls back to the extended read when the primary read returns
/// nothing; some driver stacks only surface tags through the extended
/// call. Read errors are logged and treated as an empty batch so a
/// transient driver hiccup never kills a drain task.
pub(crate) async fn drain_once(ctx: &DrainContext) -> usize {
    let mut batch = match ctx.reader.read_buffered(ctx.batch).await {
        Ok(tags) => tags,
        Err(e) => {
            warn!("buffered tag read failed: {}", e);
            return 0;
        }
    };
    if batch.is_empty() {
        batch = match ctx.reader.read_buffered_extended(ctx.batch).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("extended tag read failed: {}", e);
                return 0;
            }
        };
    }

    let mut reported = 0;
    let now = Instant::now();
    for tag in &batch {
        if ctx.filter.should_report(&tag.tag_id, now) {
            ctx.tags.on_tag(&tag.tag_id);
            ctx.reported.fetch_add(1, Ordering::Relaxed);
            reported += 1;
        } else {
            trace!("suppressed duplicate tag {}", tag.tag_id);
        }
    }
    if reported > 0 {
        debug!("drained {} tags, reported {}", batch.len(), reported);
    }
    reported
}

/// Interval-driven drain, the safety net behind driver notifications.
pub(crate) fn spawn_poller(
    ctx: Arc<DrainContext>,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    drain_once(&ctx).await;
                }
            }
        }
        debug!("tag poller stopped");
    })
}

/// Drain in response to driver events, and surface status/disconnects.
pub(crate) fn spawn_event_pump(
    ctx: Arc<DrainContext>,
    mut events: mpsc::Receiver<ReaderEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(ReaderEvent::TagsBuffered) => {
                        drain_once(&ctx).await;
                    }
                    Some(ReaderEvent::Status(message)) => {
                        ctx.status.on_status(&format!("Status: {message}"), true);
                    }
                    Some(ReaderEvent::InventoryStarted) => {
                        debug!("driver reports inventory started");
                    }
                    Some(ReaderEvent::InventoryStopped) => {
                        debug!("driver reports inventory stopped");
                    }
                    Some(ReaderEvent::Disconnected) => {
                        warn!("driver reports reader disconnected");
                        ctx.status.on_status("Reader connection lost", false);
                        // Halt the poller too; a dead handle has nothing
                        // left to drain. The worker tears down the rest.
                        cancel.cancel();
                        let _ = ctx.disconnected.send(());
                        break;
                    }
                    None => {
                        debug!("driver event channel closed");
                        break;
                    }
                },
            }
        }
        debug!("event pump stopped");
    })
}

/// Spawn both drain tasks over a fresh cancellation scope.
pub(crate) fn spawn_drains(
    ctx: DrainContext,
    events: mpsc::Receiver<ReaderEvent>,
    poll_interval: std::time::Duration,
) -> DrainTasks {
    let ctx = Arc::new(ctx);
    let cancel = CancellationToken::new();
    let poller = spawn_poller(Arc::clone(&ctx), poll_interval, cancel.clone());
    let event_pump = spawn_event_pump(ctx, events, cancel.clone());
    DrainTasks {
        cancel,
        poller,
        event_pump,
    }
}
