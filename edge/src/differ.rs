//! Length-based diffing for ordered message snapshots.
//!
//! The messaging view re-fetches its conversation as a whole snapshot and
//! only wants to render what was appended since the last one. Because the
//! snapshot is kept ordered (ascending timestamp, ties by arrival), growth
//! means the new entries are exactly the tail, so the differ only has to
//! remember the previous length. A shrink or same-size snapshot is treated
//! as a resync and yields no diff: deletions and edits re-render in place
//! without falsely announcing new messages. The accepted blind spot is a
//! same-size snapshot where one message was added and another removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// How long the new-message signal stays raised after the last growth.
const SIGNAL_HOLD: Duration = Duration::from_secs(1);

/// One message in a conversation snapshot. Snapshots are ordered by the
/// store: ascending timestamp, ties broken by arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DiffResult {
    /// Entries appended since the previous snapshot; empty on resync.
    pub newly_appended: Vec<MessageEntry>,
}

/// Transient "new message arrived" indicator.
///
/// Raised on snapshot growth and read by the UI on its own cadence; rather
/// than requiring an explicit clear, it reports raised only within a short
/// hold window of the last growth.
pub struct NewMessageSignal {
    raised_at: Option<Instant>,
    hold: Duration,
}

impl NewMessageSignal {
    fn new() -> Self {
        Self {
            raised_at: None,
            hold: SIGNAL_HOLD,
        }
    }

    fn raise(&mut self) {
        self.raised_at = Some(Instant::now());
    }

    pub fn is_raised(&self) -> bool {
        self.raised_at
            .map(|at| at.elapsed() < self.hold)
            .unwrap_or(false)
    }
}

/// Diffs successive snapshots of one ordered conversation.
pub struct SnapshotDiffer {
    previous_len: usize,
    signal: NewMessageSignal,
}

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self {
            previous_len: 0,
            signal: NewMessageSignal::new(),
        }
    }

    /// Compare a snapshot against the previous one. Growth returns the
    /// appended tail and raises the signal; anything else returns nothing.
    /// The new length is adopted either way, so the next growth diffs
    /// against what the caller actually has.
    pub fn on_snapshot(&mut self, snapshot: &[MessageEntry]) -> DiffResult {
        let newly_appended = if snapshot.len() > self.previous_len {
            self.signal.raise();
            snapshot[self.previous_len..].to_vec()
        } else {
            Vec::new()
        };

        self.previous_len = snapshot.len();
        DiffResult { newly_appended }
    }

    pub fn signal(&self) -> &NewMessageSignal {
        &self.signal
    }
}

impl Default for SnapshotDiffer {
    fn default() -> Self {
        Self::new()
    }
}
