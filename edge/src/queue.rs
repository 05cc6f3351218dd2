//! Durable queue for actions taken while offline.
//!
//! Writes the user performs without connectivity (sending a chat message,
//! submitting an order) are queued locally and replayed in order once the
//! realtime stream is re-established. Every state transition is persisted,
//! so a crash mid-replay loses nothing: an attempt that was in flight when
//! the process died simply runs again.

use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Platform-level reconnect trigger name. The client asks its runtime to
/// fire this when connectivity returns, and replays the queue in response.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync-messages";

/// Attempt ceiling per action; reaching it flips the action to
/// [`ActionState::Failed`] so the user can be told instead of the action
/// silently retrying forever.
pub const MAX_REPLAY_ATTEMPTS: u32 = 5;

/// Lifecycle of a queued action.
///
/// `Pending -> InFlight -> removed` on success, `InFlight -> Pending` on a
/// retryable failure, `InFlight -> Failed` once the attempt ceiling is
/// reached. `Failed` is terminal: the action stays in the queue for
/// surfacing but is never attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Pending,
    InFlight,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: String,
    /// What the action is, e.g. `"send-message"`. The dispatcher switches
    /// on it to pick the upstream call.
    pub kind: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub state: ActionState,
}

/// The upstream authenticated write API seam. Implementations perform the
/// real call for one action; the queue owns ordering, retries, and
/// bookkeeping.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, action: &QueuedAction) -> Result<(), Error>;
}

/// Exponential backoff for re-attempting previously failed actions.
///
/// Delays double per recorded attempt, capped at a maximum.
pub struct ReplayBackoff {
    base_delay: Duration,
    max_delay: Duration,
}

impl ReplayBackoff {
    pub fn new() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }

    /// Delay required after `attempts` failed attempts.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let delay = self.base_delay.as_secs_f64() * 2_f64.powi(exponent as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Whether enough time has passed since the last attempt to try again.
    /// Fresh actions are always ready.
    pub fn ready(
        &self,
        attempts: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if attempts == 0 {
            return true;
        }
        let Some(last) = last_attempt_at else {
            return true;
        };
        match now.signed_duration_since(last).to_std() {
            Ok(elapsed) => elapsed >= self.delay_for(attempts),
            // Clock went backwards; wait out the full delay.
            Err(_) => false,
        }
    }
}

impl Default for ReplayBackoff {
    fn default() -> Self {
        Self::new()
    }
}

/// What one replay pass did, by action id. `retrying` covers both actions
/// deferred by backoff and actions that failed this attempt but remain
/// below the ceiling; `failed` lists only actions that reached the ceiling
/// during this pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplayReport {
    pub completed: Vec<String>,
    pub retrying: Vec<String>,
    pub failed: Vec<String>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.retrying.is_empty() && self.failed.is_empty()
    }
}

/// FIFO action queue persisted as a JSON file.
pub struct OfflineActionQueue {
    path: PathBuf,
    actions: Vec<QueuedAction>,
    backoff: ReplayBackoff,
}

impl OfflineActionQueue {
    /// Open the queue at `path`, loading any persisted actions. Attempts
    /// that were in flight when the process died never resolved; they come
    /// back as pending and run again on the next replay.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let actions = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut actions: Vec<QueuedAction> = serde_json::from_str(&content)?;
            for action in &mut actions {
                if action.state == ActionState::InFlight {
                    action.state = ActionState::Pending;
                }
            }
            actions
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            actions,
            backoff: ReplayBackoff::new(),
        })
    }

    /// Queue an action for later replay. Succeeds locally regardless of
    /// connectivity; only storage I/O can fail.
    pub fn enqueue(&mut self, kind: &str, payload: Value) -> Result<String, Error> {
        let action = QueuedAction {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_attempt_at: None,
            state: ActionState::Pending,
        };
        let id = action.id.clone();
        self.actions.push(action);
        self.persist()?;

        debug!("Queued {kind} action ({} total)", self.actions.len());
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[QueuedAction] {
        &self.actions
    }

    /// Replay pending actions in enqueue order.
    ///
    /// A failed attempt leaves the action queued in place, so later actions
    /// are still tried on the same pass and order is preserved for the
    /// next one. Only storage I/O aborts a pass; dispatcher failures are
    /// bookkept per action and reported.
    pub async fn replay(&mut self, dispatcher: &dyn ActionDispatcher) -> Result<ReplayReport, Error> {
        let mut report = ReplayReport::default();
        let ids: Vec<String> = self.actions.iter().map(|a| a.id.clone()).collect();

        for id in ids {
            let Some(position) = self.actions.iter().position(|a| a.id == id) else {
                continue;
            };

            {
                let action = &self.actions[position];
                if action.state != ActionState::Pending {
                    continue;
                }
                if !self
                    .backoff
                    .ready(action.attempts, action.last_attempt_at, Utc::now())
                {
                    debug!(
                        "Action {id} waiting out backoff (attempt {})",
                        action.attempts
                    );
                    report.retrying.push(id);
                    continue;
                }
            }

            {
                let action = &mut self.actions[position];
                action.state = ActionState::InFlight;
                action.attempts += 1;
                action.last_attempt_at = Some(Utc::now());
            }
            self.persist()?;

            let action = self.actions[position].clone();
            match dispatcher.dispatch(&action).await {
                Ok(()) => {
                    self.actions.remove(position);
                    report.completed.push(id);
                }
                Err(e) => {
                    let action = &mut self.actions[position];
                    if action.attempts >= MAX_REPLAY_ATTEMPTS {
                        warn!(
                            "Action {id} failed attempt {}/{MAX_REPLAY_ATTEMPTS}; giving up: {e}",
                            action.attempts
                        );
                        action.state = ActionState::Failed;
                        report.failed.push(id);
                    } else {
                        warn!(
                            "Action {id} failed attempt {}/{MAX_REPLAY_ATTEMPTS}; will retry: {e}",
                            action.attempts
                        );
                        action.state = ActionState::Pending;
                        report.retrying.push(id);
                    }
                }
            }
            self.persist()?;
        }

        info!(
            "Replay finished: {} completed, {} retrying, {} failed",
            report.completed.len(),
            report.retrying.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn persist(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.actions)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}
