//! Caller-owned sinks for tags and status.
//!
//! The session reports through these two contracts and owns nothing
//! about their other side: a UI bridge, a log file, a channel. Closures
//! implement them directly, and channel-backed adapters are provided for
//! consumers that want an async receiving end.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receives deduplicated tag identifiers.
///
/// Invoked zero or more times per observation, never with a duplicate
/// inside the dedup window. Calls come from the drain tasks; keep
/// implementations fast and non-blocking.
pub trait TagSink: Send + Sync {
    /// One unique tag id.
    fn on_tag(&self, tag_id: &str);
}

/// Receives human-readable session status.
///
/// Invoked on every state transition and on recoverable or fatal
/// failures. `ok == false` means the action described did not complete
/// as intended.
pub trait StatusSink: Send + Sync {
    /// One status line.
    fn on_status(&self, message: &str, ok: bool);
}

impl<F> TagSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_tag(&self, tag_id: &str) {
        self(tag_id);
    }
}

impl<F> StatusSink for F
where
    F: Fn(&str, bool) + Send + Sync,
{
    fn on_status(&self, message: &str, ok: bool) {
        self(message, ok);
    }
}

/// One status report, as carried by [`ChannelStatusSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Human-readable message.
    pub message: String,
    /// Whether the described action completed as intended.
    pub ok: bool,
}

/// Tag sink that forwards ids into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTagSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTagSink {
    /// Create the sink and its receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TagSink for ChannelTagSink {
    fn on_tag(&self, tag_id: &str) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(tag_id.to_string());
    }
}

/// Status sink that forwards updates into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelStatusSink {
    /// Create the sink and its receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelStatusSink {
    fn on_status(&self, message: &str, ok: bool) {
        let _ = self.tx.send(StatusUpdate {
            message: message.to_string(),
            ok,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |tag: &str| seen.lock().unwrap().push(tag.to_string());
        TagSink::on_tag(&sink, "E280");
        assert_eq!(seen.lock().unwrap().as_slice(), ["E280"]);
    }

    #[tokio::test]
    async fn test_channel_sinks() {
        let (tags, mut tag_rx) = ChannelTagSink::new();
        let (status, mut status_rx) = ChannelStatusSink::new();

        tags.on_tag("E280");
        status.on_status("Stopped scanning", true);

        assert_eq!(tag_rx.recv().await.as_deref(), Some("E280"));
        let update = status_rx.recv().await.unwrap();
        assert_eq!(update.message, "Stopped scanning");
        assert!(update.ok);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tags, rx) = ChannelTagSink::new();
        drop(rx);
        tags.on_tag("E280"); // must not panic
    }
}
