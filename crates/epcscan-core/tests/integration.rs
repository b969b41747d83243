//! End-to-end session tests over the simulated driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use epcscan_core::sim::{SimulatedReader, SimulatedRegistry};
use epcscan_core::{
    ChannelStatusSink, ChannelTagSink, Error, ReaderHandle, ReaderSession, RetryConfig,
    SessionConfig, StatusUpdate,
};
use epcscan_types::{SessionState, TagRead, Transport, TriggerType};

const TICK: Duration = Duration::from_millis(10);

fn fast_config() -> SessionConfig {
    SessionConfig::builder()
        .poll_interval(TICK)
        .retry(RetryConfig::for_connect().initial_delay(Duration::from_millis(1)))
        .build()
}

struct Harness {
    session: ReaderSession,
    tags: UnboundedReceiver<String>,
    statuses: UnboundedReceiver<StatusUpdate>,
}

fn spawn_session(registry: SimulatedRegistry, config: SessionConfig) -> Harness {
    let (tag_sink, tags) = ChannelTagSink::new();
    let (status_sink, statuses) = ChannelStatusSink::new();
    let session = ReaderSession::new(
        Arc::new(registry),
        config,
        Arc::new(tag_sink),
        Arc::new(status_sink),
    )
    .unwrap();
    Harness {
        session,
        tags,
        statuses,
    }
}

async fn next_tag(rx: &mut UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for tag")
        .expect("tag channel closed")
}

async fn next_status(rx: &mut UnboundedReceiver<StatusUpdate>) -> StatusUpdate {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
}

#[tokio::test]
async fn test_full_scan_lifecycle() {
    let bt = SimulatedReader::new("RFD40-BT", Transport::Bluetooth);
    let usb = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&bt), Arc::clone(&usb)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Scanning);

    // USB wins over the Bluetooth entry listed first.
    assert!(usb.is_connected().await);
    assert!(!bt.is_connected().await);
    assert!(usb.inventory_active());

    let connecting = next_status(&mut h.statuses).await;
    assert_eq!(connecting.message, "Connecting to RFD40-USB");
    assert!(!connecting.ok);
    let antennas = next_status(&mut h.statuses).await;
    assert_eq!(antennas.message, "Antennas: [1, 2]");
    assert!(antennas.ok);
    let scanning = next_status(&mut h.statuses).await;
    assert_eq!(scanning.message, "Connected to RFD40-USB (USB) - Scanning...");
    assert!(scanning.ok);

    // Post-connect configuration reached the reader.
    assert!(usb.applied_options().is_some());
    assert!(usb.prefilters_cleared());
    assert_eq!(
        usb.applied_triggers(),
        Some((TriggerType::Immediate, TriggerType::Immediate))
    );
    assert_eq!(usb.tag_storage_limit(), 1000);
    assert_eq!(usb.antenna_config(1).unwrap().power_index, 30);
    assert_eq!(usb.antenna_config(2).unwrap().power_index, 30);
    assert!(usb.purge_count() >= 1);

    usb.push_tags(vec![TagRead::new("E28011700000020F1234ABCD")]);
    assert_eq!(next_tag(&mut h.tags).await, "E28011700000020F1234ABCD");
    assert_eq!(h.session.tags_reported(), 1);

    h.session.stop().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!usb.inventory_active());

    let mut stopped = next_status(&mut h.statuses).await;
    // Driver status chatter may precede the final line.
    while stopped.message != "Stopped scanning" {
        stopped = next_status(&mut h.statuses).await;
    }
    assert!(stopped.ok);
}

#[tokio::test]
async fn test_restart_reuses_live_connection() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    h.session.stop().await.unwrap();
    h.session.start().await.unwrap();

    // Stop does not disconnect, and a restart to the same reader must
    // not open a second connection.
    assert_eq!(reader.connect_attempts(), 1);
    assert!(reader.inventory_active());
}

#[tokio::test]
async fn test_start_while_scanning_is_noop() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    h.session.start().await.unwrap();

    assert_eq!(reader.connect_attempts(), 1);
    assert_eq!(h.session.state(), SessionState::Scanning);
}

#[tokio::test]
async fn test_connect_retry_exhaustion_leaves_session_idle() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    reader.fail_next_connects(10);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    // Failures surface through the status sink, not the control call.
    h.session.start().await.unwrap();
    assert_eq!(reader.connect_attempts(), 3);
    assert_eq!(h.session.state(), SessionState::Idle);

    let mut failed = next_status(&mut h.statuses).await;
    while !failed.message.starts_with("RFID start failed") {
        failed = next_status(&mut h.statuses).await;
    }
    assert!(!failed.ok);
    assert!(failed.message.contains("3 attempt"));

    // The session stays usable: clear the fault and start again.
    reader.fail_next_connects(0);
    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Scanning);
}

#[tokio::test]
async fn test_no_devices_is_recoverable() {
    let mut h = spawn_session(SimulatedRegistry::empty(), fast_config());

    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);

    let mut failed = next_status(&mut h.statuses).await;
    while !failed.message.starts_with("RFID start failed") {
        failed = next_status(&mut h.statuses).await;
    }
    assert!(!failed.ok);
}

#[tokio::test]
async fn test_configuration_failure_aborts_start() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    reader.fail_configuration(true);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(!reader.inventory_active());

    let mut failed = next_status(&mut h.statuses).await;
    while !failed.message.starts_with("RFID start failed") {
        failed = next_status(&mut h.statuses).await;
    }
    assert!(!failed.ok);
    assert!(failed.message.contains("set_options"));
}

#[tokio::test]
async fn test_tags_buffered_while_stopped_are_purged_on_restart() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    h.session.stop().await.unwrap();

    // Tags that pile up between scans must never surface.
    reader.push_tags_silent(vec![TagRead::new("DEAD"), TagRead::new("BEEF")]);

    h.session.start().await.unwrap();
    assert_eq!(reader.buffered_len(), 0);

    reader.push_tags(vec![TagRead::new("CAFE")]);
    assert_eq!(next_tag(&mut h.tags).await, "CAFE");
    assert_eq!(h.session.tags_reported(), 1);
}

#[tokio::test]
async fn test_poller_delivers_unnotified_tags() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();

    // No driver notification: only the interval poller can find these.
    reader.push_tags_silent(vec![TagRead::new("ABCD")]);
    assert_eq!(next_tag(&mut h.tags).await, "ABCD");
}

#[tokio::test]
async fn test_duplicate_suppressed_across_both_paths() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();

    reader.push_tags(vec![TagRead::new("E280"), TagRead::new("E281")]);
    reader.push_tags_silent(vec![TagRead::new("E280")]);

    assert_eq!(next_tag(&mut h.tags).await, "E280");
    assert_eq!(next_tag(&mut h.tags).await, "E281");

    // The poller re-reads E280 inside the window; nothing further
    // arrives.
    assert!(
        timeout(Duration::from_millis(100), h.tags.recv())
            .await
            .is_err()
    );
    assert_eq!(h.session.tags_reported(), 2);
}

#[tokio::test]
async fn test_mid_scan_disconnect_returns_session_to_idle() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    let mut states = h.session.state_watch();

    reader.emit_disconnected();

    // The event pump reports the loss and the worker tears down.
    let mut lost = next_status(&mut h.statuses).await;
    while lost.message != "Reader connection lost" {
        lost = next_status(&mut h.statuses).await;
    }
    assert!(!lost.ok);

    timeout(
        Duration::from_secs(1),
        states.wait_for(|s| *s == SessionState::Idle),
    )
    .await
    .expect("session did not leave Scanning")
    .unwrap();

    // The poller is gone: buffered tags are no longer drained.
    reader.push_tags_silent(vec![TagRead::new("GONE")]);
    assert!(
        timeout(Duration::from_millis(100), h.tags.recv())
            .await
            .is_err()
    );

    // A fresh start reconnects rather than reusing the dead handle.
    h.session.start().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Scanning);
    assert_eq!(reader.connect_attempts(), 2);
    assert!(reader.is_connected().await);
}

#[tokio::test]
async fn test_stop_halts_tag_delivery() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    h.session.stop().await.unwrap();

    // Once stop resolves the drain tasks are gone.
    reader.push_tags(vec![TagRead::new("LATE")]);
    assert!(
        timeout(Duration::from_millis(100), h.tags.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_counter_resets_on_each_scan() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let mut h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    reader.push_tags(vec![TagRead::new("0001"), TagRead::new("0002")]);
    next_tag(&mut h.tags).await;
    next_tag(&mut h.tags).await;
    assert_eq!(h.session.tags_reported(), 2);

    h.session.stop().await.unwrap();
    h.session.start().await.unwrap();
    assert_eq!(h.session.tags_reported(), 0);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_terminal() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]);
    let h = spawn_session(registry, fast_config());

    h.session.start().await.unwrap();
    h.session.shutdown().await.unwrap();
    h.session.shutdown().await.unwrap();

    assert!(!reader.is_connected().await);
    assert_eq!(h.session.state(), SessionState::Idle);

    let err = h.session.start().await.unwrap_err();
    assert!(matches!(err, Error::SessionClosed));
}

#[tokio::test]
async fn test_shutdown_releases_registry() {
    let reader = SimulatedReader::new("RFD40-USB", Transport::Usb);
    let registry = Arc::new(SimulatedRegistry::with_readers(vec![Arc::clone(&reader)]));

    let (tag_sink, _tags) = ChannelTagSink::new();
    let (status_sink, _statuses) = ChannelStatusSink::new();
    let session = ReaderSession::new(
        Arc::clone(&registry) as Arc<dyn epcscan_core::DeviceRegistry>,
        fast_config(),
        Arc::new(tag_sink),
        Arc::new(status_sink),
    )
    .unwrap();

    session.start().await.unwrap();
    session.shutdown().await.unwrap();

    assert!(registry.released());
}

#[tokio::test]
async fn test_invalid_config_rejected_before_spawn() {
    let config = SessionConfig::builder()
        .poll_interval(Duration::ZERO)
        .build();
    let (tag_sink, _tags) = ChannelTagSink::new();
    let (status_sink, _statuses) = ChannelStatusSink::new();

    let result = ReaderSession::new(
        Arc::new(SimulatedRegistry::empty()),
        config,
        Arc::new(tag_sink),
        Arc::new(status_sink),
    );
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
