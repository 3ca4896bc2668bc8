//! Pending edit queue with background retry.
//!
//! Each activity has at most one pending payload; recording a new edit
//! replaces the previous unsent one. Submissions for the same activity never
//! overlap, and a submission whose payload was replaced while it was in
//! flight is followed by one carrying the newest payload.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::models::{ActivityId, ActivityUpdate};
use crate::remote::{with_timeout, RemoteStore};
use crate::state::SyncStatus;

/// A recorded edit that the remote store has not confirmed yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub activity_id: ActivityId,
    pub update: ActivityUpdate,
    pub recorded_at: DateTime<Utc>,
    /// Submissions attempted for this payload
    #[serde(default)]
    pub attempts: u32,
}

/// Outcome counts of one drain of the pending map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Entries already being submitted by another task
    pub skipped: usize,
}

impl SyncReport {
    /// Nothing was pending
    pub const fn is_noop(&self) -> bool {
        self.attempted == 0 && self.skipped == 0
    }
}

#[derive(Debug)]
struct Entry {
    edit: PendingEdit,
    revision: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: BTreeMap<ActivityId, Entry>,
    statuses: BTreeMap<ActivityId, SyncStatus>,
    errors: HashMap<ActivityId, String>,
    in_flight: HashSet<ActivityId>,
    next_revision: u64,
}

struct QueueInner<S> {
    store: Arc<S>,
    config: EngineConfig,
    state: Mutex<QueueState>,
    cycle_running: AtomicBool,
}

/// Result of trying to submit one activity's pending edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Submission {
    Settled(SyncStatus),
    /// Another task is submitting this activity
    Busy,
    /// Nothing pending (already synced or discarded)
    Idle,
}

/// Queue of activity edits awaiting confirmation
pub struct EditSyncQueue<S> {
    inner: Arc<QueueInner<S>>,
}

impl<S> Clone for EditSyncQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EntityGuard<'a> {
    state: &'a Mutex<QueueState>,
    activity_id: ActivityId,
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .remove(&self.activity_id);
    }
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: RemoteStore> EditSyncQueue<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                config,
                state: Mutex::new(QueueState::default()),
                cycle_running: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, activity_id: &ActivityId) -> Option<SyncStatus> {
        self.state().statuses.get(activity_id).copied()
    }

    /// Message of the most recent failed submission, if still pending
    pub fn last_error(&self, activity_id: &ActivityId) -> Option<String> {
        self.state().errors.get(activity_id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn pending_ids(&self) -> Vec<ActivityId> {
        self.state().pending.keys().cloned().collect()
    }

    pub fn pending_edits(&self) -> Vec<PendingEdit> {
        self.state()
            .pending
            .values()
            .map(|entry| entry.edit.clone())
            .collect()
    }

    pub fn is_in_flight(&self, activity_id: &ActivityId) -> bool {
        self.state().in_flight.contains(activity_id)
    }

    /// Record an edit and return the immediate submission attempt.
    ///
    /// The payload is stored and marked pending before this returns. The
    /// returned future performs the attempt and reads the newest payload
    /// when it runs, so edits recorded before it is first polled are sent
    /// as one. If it is dropped unpolled, the retry loop picks the edit up.
    pub fn record_edit(
        &self,
        activity_id: ActivityId,
        update: ActivityUpdate,
    ) -> impl Future<Output = SyncStatus> + Send + 'static {
        {
            let mut state = self.state();
            state.next_revision += 1;
            let revision = state.next_revision;
            let replaced = state
                .pending
                .insert(
                    activity_id.clone(),
                    Entry {
                        edit: PendingEdit {
                            activity_id: activity_id.clone(),
                            update,
                            recorded_at: Utc::now(),
                            attempts: 0,
                        },
                        revision,
                    },
                )
                .is_some();
            state
                .statuses
                .insert(activity_id.clone(), SyncStatus::Pending);
            if replaced {
                tracing::debug!("Replaced unsent edit for activity {}", activity_id);
            }
        }

        let queue = self.clone();
        async move {
            match queue.submit(&activity_id).await {
                Submission::Settled(status) => status,
                Submission::Busy | Submission::Idle => {
                    queue.status(&activity_id).unwrap_or(SyncStatus::Pending)
                }
            }
        }
    }

    /// Reload edits persisted by an earlier session, without submitting them
    pub fn restore<I>(&self, edits: I)
    where
        I: IntoIterator<Item = PendingEdit>,
    {
        let mut state = self.state();
        for edit in edits {
            state.next_revision += 1;
            let revision = state.next_revision;
            let activity_id = edit.activity_id.clone();
            state.statuses.insert(activity_id.clone(), SyncStatus::Pending);
            state.pending.insert(activity_id, Entry { edit, revision });
        }
    }

    /// Drop a pending edit and its status, e.g. for an activity deleted remotely
    pub fn discard(&self, activity_id: &ActivityId) -> bool {
        let mut state = self.state();
        state.statuses.remove(activity_id);
        state.errors.remove(activity_id);
        let removed = state.pending.remove(activity_id).is_some();
        if removed {
            tracing::info!("Discarded pending edit for activity {}", activity_id);
        }
        removed
    }

    /// Submit every pending edit now
    pub async fn force_sync(&self) -> SyncReport {
        let report = self.drain().await;
        if report.is_noop() {
            tracing::info!("No pending edits to sync");
        } else {
            tracing::info!(
                "Force sync finished: {} synced, {} failed, {} busy",
                report.synced,
                report.failed,
                report.skipped
            );
        }
        report
    }

    /// One background retry cycle; `None` when the previous one is still running
    pub async fn retry_pending(&self) -> Option<SyncReport> {
        if self
            .inner
            .cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Skipping retry cycle: previous cycle still running");
            return None;
        }
        let _cycle = CycleGuard(&self.inner.cycle_running);
        Some(self.drain().await)
    }

    /// Retry pending edits every `retry_interval` until the handle is dropped
    pub fn spawn_retry_loop(&self) -> RetryLoop {
        let queue = self.clone();
        let period = self.inner.config.retry_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if queue.pending_count() == 0 {
                    continue;
                }
                if let Some(report) = queue.retry_pending().await {
                    tracing::debug!(
                        "Retry cycle: {} attempted, {} synced, {} failed",
                        report.attempted,
                        report.synced,
                        report.failed
                    );
                }
            }
        });
        RetryLoop { handle }
    }

    async fn drain(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for activity_id in self.pending_ids() {
            match self.submit(&activity_id).await {
                Submission::Settled(SyncStatus::Synced) => {
                    report.attempted += 1;
                    report.synced += 1;
                }
                Submission::Settled(_) => {
                    report.attempted += 1;
                    report.failed += 1;
                }
                Submission::Busy => report.skipped += 1,
                Submission::Idle => {}
            }
        }
        report
    }

    /// Submit the newest payload for one activity until it settles
    async fn submit(&self, activity_id: &ActivityId) -> Submission {
        if !self.state().in_flight.insert(activity_id.clone()) {
            return Submission::Busy;
        }
        let _in_flight = EntityGuard {
            state: &self.inner.state,
            activity_id: activity_id.clone(),
        };

        loop {
            let (revision, update) = {
                let mut state = self.state();
                let Some(entry) = state.pending.get_mut(activity_id) else {
                    return Submission::Idle;
                };
                entry.edit.attempts += 1;
                (entry.revision, entry.edit.update.clone())
            };

            let result = with_timeout(
                self.inner.config.remote_timeout,
                self.inner.store.update_activity(activity_id, &update),
            )
            .await;

            let mut state = self.state();
            let Some(current) = state.pending.get(activity_id).map(|entry| entry.revision) else {
                tracing::debug!(
                    "Edit for activity {} was discarded while in flight",
                    activity_id
                );
                return Submission::Idle;
            };
            if current != revision {
                tracing::debug!(
                    "Edit for activity {} was replaced while in flight; sending newest",
                    activity_id
                );
                continue;
            }

            return match result {
                Ok(_) => {
                    state.pending.remove(activity_id);
                    state.errors.remove(activity_id);
                    state
                        .statuses
                        .insert(activity_id.clone(), SyncStatus::Synced);
                    tracing::info!("Synced edit for activity {}", activity_id);
                    Submission::Settled(SyncStatus::Synced)
                }
                Err(error) => {
                    if error.is_not_found() {
                        tracing::warn!(
                            "Activity {} no longer exists remotely; edit kept until discarded",
                            activity_id
                        );
                    } else {
                        tracing::warn!("Failed to sync edit for {}: {}", activity_id, error);
                    }
                    state.errors.insert(activity_id.clone(), error.to_string());
                    state
                        .statuses
                        .insert(activity_id.clone(), SyncStatus::Error);
                    Submission::Settled(SyncStatus::Error)
                }
            };
        }
    }
}

/// Handle to the background retry task; stops the task when dropped
#[derive(Debug)]
pub struct RetryLoop {
    handle: JoinHandle<()>,
}

impl RetryLoop {
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for RetryLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
