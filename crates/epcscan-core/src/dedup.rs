//! Time-windowed duplicate suppression.
//!
//! A reader in continuous inventory re-reads the same physical tag many
//! times per second, and the session drains tags over two independent
//! paths (read-event and poller). Both paths funnel through one
//! [`DuplicateFilter`] so each tag id is reported at most once per
//! window.
//!
//! The table is swept opportunistically on every lookup instead of by a
//! background task: entries older than twice the window are dropped,
//! which bounds growth with one fewer thread to reason about.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default suppression window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(2000);

/// A "seen recently" table shared by both drain paths.
///
/// The check-then-record step runs under one lock, so a race between the
/// event path and the poll path on the same tag id resolves to exactly
/// one acceptance per window, never zero and never two.
#[derive(Debug)]
pub struct DuplicateFilter {
    window: Duration,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DuplicateFilter {
    /// Create a filter with the given suppression window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// The configured suppression window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether a tag observed at `now` should be reported.
    ///
    /// Returns `false` when the tag was last accepted less than one
    /// window ago; a rejection records nothing. Otherwise the observation
    /// time is recorded and the tag is accepted. Every call also sweeps
    /// entries older than twice the window.
    pub fn should_report(&self, tag_id: &str, now: Instant) -> bool {
        let mut seen = match self.last_seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let accept = match seen.get(tag_id) {
            Some(&last) if now.duration_since(last) < self.window => false,
            _ => {
                seen.insert(tag_id.to_string(), now);
                true
            }
        };

        let horizon = self.window * 2;
        seen.retain(|_, &mut last| now.duration_since(last) <= horizon);

        accept
    }

    /// Number of tag ids currently tracked.
    pub fn tracked(&self) -> usize {
        match self.last_seen.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
