//! Optimistic vote toggling.
//!
//! A toggle flips the local membership and count immediately, then asks the
//! remote store to create or delete the vote. Success is followed by a
//! reconciliation against the store; failure rolls the local flip back.
//! Duplicate toggles of a key that is already in flight are ignored.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::EngineConfig;
use crate::models::{ActivityId, ActivitySnapshot, PollOptionId, VoterId};
use crate::names::VoterNameResolver;
use crate::optimistic::run_optimistic;
use crate::remote::{with_timeout, RemoteStore};
use crate::{Error, Result};

/// Identifies one toggle target: an option within its activity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoteKey {
    pub activity_id: ActivityId,
    pub poll_option_id: PollOptionId,
}

impl VoteKey {
    pub const fn new(activity_id: ActivityId, poll_option_id: PollOptionId) -> Self {
        Self {
            activity_id,
            poll_option_id,
        }
    }
}

/// How a toggle settled
#[derive(Debug)]
pub enum ToggleOutcome {
    /// The key was already in flight; nothing was sent
    Ignored,
    /// The remote store accepted the change
    Confirmed { voted: bool },
    /// The remote call failed and the local flip was reverted
    RolledBack { error: Error },
}

impl ToggleOutcome {
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Local state that a single toggle changed, for rollback
#[derive(Debug, Clone, Copy)]
struct ToggleSnapshot {
    was_voted: bool,
    previous_count: usize,
}

#[derive(Debug, Default)]
struct VoteState {
    membership: HashMap<ActivityId, BTreeSet<PollOptionId>>,
    counts: HashMap<PollOptionId, usize>,
    options: HashMap<ActivityId, BTreeSet<PollOptionId>>,
    /// Bumped on every local change to an option; stale fetches compare against it
    epochs: HashMap<PollOptionId, u64>,
    in_flight: HashSet<VoteKey>,
}

impl VoteState {
    fn epoch(&self, option: &PollOptionId) -> u64 {
        self.epochs.get(option).copied().unwrap_or_default()
    }

    fn touch(&mut self, option: &PollOptionId) {
        *self.epochs.entry(option.clone()).or_default() += 1;
    }

    fn set_voted(&mut self, activity: &ActivityId, option: &PollOptionId, voted: bool) {
        let members = self.membership.entry(activity.clone()).or_default();
        if voted {
            members.insert(option.clone());
        } else {
            members.remove(option);
        }
    }
}

/// Marks a key as in flight for as long as it is alive
struct InFlight<'a> {
    state: &'a Mutex<VoteState>,
    key: VoteKey,
}

impl<'a> InFlight<'a> {
    fn acquire(state: &'a Mutex<VoteState>, key: VoteKey) -> Option<Self> {
        let inserted = state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .insert(key.clone());
        inserted.then_some(Self { state, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .remove(&self.key);
    }
}

/// Coordinates the current user's votes across activities
pub struct VoteCoordinator<S> {
    store: Arc<S>,
    names: VoterNameResolver<S>,
    config: EngineConfig,
    state: Arc<Mutex<VoteState>>,
}

impl<S> Clone for VoteCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            names: self.names.clone(),
            config: self.config,
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: RemoteStore> VoteCoordinator<S> {
    pub fn new(store: Arc<S>, names: VoterNameResolver<S>, config: EngineConfig) -> Self {
        Self {
            store,
            names,
            config,
            state: Arc::new(Mutex::new(VoteState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, VoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub const fn names(&self) -> &VoterNameResolver<S> {
        &self.names
    }

    /// Options of the activity the current user has voted for
    pub fn membership(&self, activity_id: &ActivityId) -> BTreeSet<PollOptionId> {
        self.state()
            .membership
            .get(activity_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_voted(&self, activity_id: &ActivityId, poll_option_id: &PollOptionId) -> bool {
        self.state()
            .membership
            .get(activity_id)
            .is_some_and(|members| members.contains(poll_option_id))
    }

    /// Locally displayed vote count, including unconfirmed changes
    pub fn vote_count(&self, poll_option_id: &PollOptionId) -> usize {
        self.state()
            .counts
            .get(poll_option_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_in_flight(&self, activity_id: &ActivityId, poll_option_id: &PollOptionId) -> bool {
        self.state()
            .in_flight
            .contains(&VoteKey::new(activity_id.clone(), poll_option_id.clone()))
    }

    /// Rebuild local state from a full listing.
    ///
    /// Options with a toggle in flight keep their optimistic state.
    pub fn load_snapshot(&self, snapshots: &[ActivitySnapshot], voter_id: &VoterId) {
        let mut state = self.state();
        for snapshot in snapshots {
            let activity_id = &snapshot.activity.id;
            state.options.insert(
                activity_id.clone(),
                snapshot
                    .poll_options
                    .iter()
                    .map(|option| option.option.id.clone())
                    .collect(),
            );

            for option in &snapshot.poll_options {
                let option_id = &option.option.id;
                if state
                    .in_flight
                    .contains(&VoteKey::new(activity_id.clone(), option_id.clone()))
                {
                    continue;
                }
                let voted = option.votes.iter().any(|vote| &vote.voter_id == voter_id);
                state.set_voted(activity_id, option_id, voted);
                state.counts.insert(option_id.clone(), option.votes.len());
                state.touch(option_id);
            }
        }
    }

    /// Fetch every activity with its polls and rebuild local state from it
    pub async fn refresh(&self, voter_id: &VoterId) -> Result<Vec<ActivitySnapshot>> {
        let snapshots = with_timeout(
            self.config.remote_timeout,
            self.store.list_activities_with_polls(),
        )
        .await?;
        self.load_snapshot(&snapshots, voter_id);
        tracing::debug!("Loaded vote state for {} activities", snapshots.len());
        Ok(snapshots)
    }

    /// Flip the voter's membership in one option.
    ///
    /// The local flip is visible as soon as the returned future is first
    /// polled. A second toggle of the same key while this one is pending
    /// returns [`ToggleOutcome::Ignored`]. Dropping the future before the
    /// remote call settles reverts the flip and frees the key.
    pub async fn toggle_vote(
        &self,
        poll_option_id: &PollOptionId,
        activity_id: &ActivityId,
        voter_id: &VoterId,
    ) -> ToggleOutcome {
        let key = VoteKey::new(activity_id.clone(), poll_option_id.clone());
        let Some(_in_flight) = InFlight::acquire(&self.state, key.clone()) else {
            tracing::debug!(
                "Ignoring duplicate toggle for {}/{}",
                activity_id,
                poll_option_id
            );
            return ToggleOutcome::Ignored;
        };

        let result = run_optimistic(
            || self.apply_toggle(&key),
            |snapshot| self.send_toggle(poll_option_id, voter_id, snapshot.was_voted),
            |snapshot| self.revert_toggle(&key, snapshot),
        )
        .await;

        match result {
            Ok(voted) => {
                if let Err(error) = self.reconcile(&key, voter_id).await {
                    tracing::warn!(
                        "Reconciling votes for activity {} failed: {}",
                        activity_id,
                        error
                    );
                }
                self.names.refresh(poll_option_id).await;
                ToggleOutcome::Confirmed { voted }
            }
            Err(error) => {
                tracing::warn!(
                    "Vote toggle on {}/{} rolled back: {}",
                    activity_id,
                    poll_option_id,
                    error
                );
                ToggleOutcome::RolledBack { error }
            }
        }
    }

    fn apply_toggle(&self, key: &VoteKey) -> ToggleSnapshot {
        let snapshot = {
            let mut state = self.state();
            state
                .options
                .entry(key.activity_id.clone())
                .or_default()
                .insert(key.poll_option_id.clone());

            let was_voted = state
                .membership
                .get(&key.activity_id)
                .is_some_and(|members| members.contains(&key.poll_option_id));
            state.set_voted(&key.activity_id, &key.poll_option_id, !was_voted);

            let count = state
                .counts
                .entry(key.poll_option_id.clone())
                .or_default();
            let previous_count = *count;
            *count = if was_voted {
                previous_count.saturating_sub(1)
            } else {
                previous_count + 1
            };
            state.touch(&key.poll_option_id);

            ToggleSnapshot {
                was_voted,
                previous_count,
            }
        };
        self.names.invalidate(&key.poll_option_id);
        snapshot
    }

    fn revert_toggle(&self, key: &VoteKey, snapshot: &ToggleSnapshot) {
        let mut state = self.state();
        state.set_voted(&key.activity_id, &key.poll_option_id, snapshot.was_voted);
        state
            .counts
            .insert(key.poll_option_id.clone(), snapshot.previous_count);
        state.touch(&key.poll_option_id);
    }

    /// Returns whether the voter holds a vote afterwards
    async fn send_toggle(
        &self,
        poll_option_id: &PollOptionId,
        voter_id: &VoterId,
        was_voted: bool,
    ) -> Result<bool> {
        let limit = self.config.remote_timeout;
        if was_voted {
            with_timeout(limit, self.store.delete_vote(poll_option_id, voter_id)).await?;
        } else {
            with_timeout(limit, self.store.create_vote(poll_option_id, voter_id)).await?;
        }
        Ok(!was_voted)
    }

    /// Replace local state of the key's activity with what the store reports.
    ///
    /// Options changed locally since the fetch started, or toggled under
    /// another key that is still in flight, are left alone.
    async fn reconcile(&self, key: &VoteKey, voter_id: &VoterId) -> Result<()> {
        let (options, epochs) = {
            let state = self.state();
            let options = state
                .options
                .get(&key.activity_id)
                .cloned()
                .unwrap_or_default();
            let epochs: HashMap<PollOptionId, u64> = options
                .iter()
                .map(|option| (option.clone(), state.epoch(option)))
                .collect();
            (options, epochs)
        };
        if options.is_empty() {
            return Ok(());
        }

        let rows = with_timeout(self.config.remote_timeout, self.store.list_votes(&options)).await?;

        let mut counts: HashMap<&PollOptionId, usize> =
            options.iter().map(|option| (option, 0)).collect();
        let mut voted = BTreeSet::new();
        for row in &rows {
            if let Some(count) = counts.get_mut(&row.poll_option_id) {
                *count += 1;
                if &row.voter_id == voter_id {
                    voted.insert(&row.poll_option_id);
                }
            }
        }

        let mut state = self.state();
        let mut skipped = 0usize;
        for option in &options {
            let other_key = VoteKey::new(key.activity_id.clone(), option.clone());
            let busy = other_key != *key && state.in_flight.contains(&other_key);
            if busy || epochs.get(option).copied() != Some(state.epoch(option)) {
                skipped += 1;
                continue;
            }
            state.set_voted(&key.activity_id, option, voted.contains(option));
            state
                .counts
                .insert(option.clone(), counts.get(option).copied().unwrap_or_default());
        }
        tracing::debug!(
            "Reconciled activity {} ({} options, {} skipped as stale)",
            key.activity_id,
            options.len(),
            skipped
        );
        Ok(())
    }
}
