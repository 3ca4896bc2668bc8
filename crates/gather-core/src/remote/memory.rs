//! In-process remote store.
//!
//! Behaves like the hosted store (unique vote per option and voter, partial
//! activity updates, ordered listings) and adds knobs to make it slow,
//! unreachable or stalled, plus a log of every call it received.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use super::RemoteStore;
use crate::models::{
    Activity, ActivityId, ActivitySnapshot, ActivityUpdate, PollOption, PollOptionId,
    PollOptionSnapshot, Vote, VoteRow, VoterId,
};
use crate::{Error, Result};

/// Kind of remote call, used to script failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateVote,
    DeleteVote,
    ListVotes,
    ResolveVoterNames,
    UpdateActivity,
    ListActivities,
}

/// A call as received by the store, recorded before it is processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateVote {
        poll_option_id: PollOptionId,
        voter_id: VoterId,
    },
    DeleteVote {
        poll_option_id: PollOptionId,
        voter_id: VoterId,
    },
    ListVotes(Vec<PollOptionId>),
    ResolveVoterNames(Vec<VoterId>),
    UpdateActivity {
        activity_id: ActivityId,
        update: ActivityUpdate,
    },
    ListActivities,
}

impl RemoteCall {
    pub const fn operation(&self) -> Operation {
        match self {
            Self::CreateVote { .. } => Operation::CreateVote,
            Self::DeleteVote { .. } => Operation::DeleteVote,
            Self::ListVotes(_) => Operation::ListVotes,
            Self::ResolveVoterNames(_) => Operation::ResolveVoterNames,
            Self::UpdateActivity { .. } => Operation::UpdateActivity,
            Self::ListActivities => Operation::ListActivities,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    activities: BTreeMap<ActivityId, Activity>,
    options: Vec<PollOption>,
    votes: Vec<Vote>,
    names: HashMap<VoterId, String>,
    calls: Vec<RemoteCall>,
    scripted_failures: HashMap<Operation, u32>,
    offline: bool,
    latency: Option<Duration>,
}

/// Remote store kept entirely in memory
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    hold: watch::Sender<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(MemoryState::default()),
            hold,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub fn insert_activity(&self, activity: Activity) {
        self.state()
            .activities
            .insert(activity.id.clone(), activity);
    }

    /// Insert an activity with poll options given as `(id, text)` pairs
    pub fn insert_poll(&self, activity: Activity, options: &[(&str, &str)]) {
        let activity_id = activity.id.clone();
        let mut state = self.state();
        state.activities.insert(activity_id.clone(), activity);
        state
            .options
            .extend(options.iter().map(|(id, text)| PollOption {
                id: PollOptionId::from(*id),
                activity_id: activity_id.clone(),
                text: (*text).to_string(),
            }));
    }

    pub fn insert_vote(&self, poll_option_id: &PollOptionId, voter_id: &VoterId) {
        self.state()
            .votes
            .push(Vote::new(poll_option_id.clone(), voter_id.clone()));
    }

    pub fn set_voter_name(&self, voter_id: &VoterId, name: impl Into<String>) {
        self.state().names.insert(voter_id.clone(), name.into());
    }

    /// Delete an activity with its options and votes, as another client would
    pub fn remove_activity(&self, activity_id: &ActivityId) {
        let mut state = self.state();
        state.activities.remove(activity_id);
        let removed: BTreeSet<PollOptionId> = state
            .options
            .iter()
            .filter(|option| &option.activity_id == activity_id)
            .map(|option| option.id.clone())
            .collect();
        state.options.retain(|option| !removed.contains(&option.id));
        state
            .votes
            .retain(|vote| !removed.contains(&vote.poll_option_id));
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    /// While offline every call fails with a transient error
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail the next `times` calls of the given kind
    pub fn fail_next(&self, operation: Operation, times: u32) {
        *self
            .state()
            .scripted_failures
            .entry(operation)
            .or_default() += times;
    }

    /// Delay every call by `latency` (after it has been recorded)
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Stall every call until [`MemoryStore::release_calls`]
    pub fn hold_calls(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_calls(&self) {
        self.hold.send_replace(false);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn activity(&self, activity_id: &ActivityId) -> Option<Activity> {
        self.state().activities.get(activity_id).cloned()
    }

    pub fn vote_count(&self, poll_option_id: &PollOptionId) -> usize {
        self.state()
            .votes
            .iter()
            .filter(|vote| &vote.poll_option_id == poll_option_id)
            .count()
    }

    /// Record the call, then apply latency, the hold gate and injected faults
    async fn enter(&self, call: RemoteCall) -> Result<()> {
        let operation = call.operation();
        let latency = {
            let mut state = self.state();
            state.calls.push(call);
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut released = self.hold.subscribe();
        let _ = released.wait_for(|held| !*held).await;

        let mut state = self.state();
        if state.offline {
            return Err(Error::Remote("store is offline".to_string()));
        }
        if let Some(remaining) = state.scripted_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Remote(format!("injected {operation:?} failure")));
            }
        }
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    async fn create_vote(&self, poll_option_id: &PollOptionId, voter_id: &VoterId) -> Result<()> {
        self.enter(RemoteCall::CreateVote {
            poll_option_id: poll_option_id.clone(),
            voter_id: voter_id.clone(),
        })
        .await?;

        let mut state = self.state();
        if !state.options.iter().any(|option| &option.id == poll_option_id) {
            return Err(Error::NotFound(format!("poll option {poll_option_id}")));
        }
        let duplicate = state
            .votes
            .iter()
            .any(|vote| &vote.poll_option_id == poll_option_id && &vote.voter_id == voter_id);
        if duplicate {
            return Err(Error::Remote(format!(
                "duplicate vote by {voter_id} on {poll_option_id}"
            )));
        }
        state
            .votes
            .push(Vote::new(poll_option_id.clone(), voter_id.clone()));
        Ok(())
    }

    async fn delete_vote(&self, poll_option_id: &PollOptionId, voter_id: &VoterId) -> Result<()> {
        self.enter(RemoteCall::DeleteVote {
            poll_option_id: poll_option_id.clone(),
            voter_id: voter_id.clone(),
        })
        .await?;

        self.state()
            .votes
            .retain(|vote| !(&vote.poll_option_id == poll_option_id && &vote.voter_id == voter_id));
        Ok(())
    }

    async fn list_votes(&self, poll_option_ids: &BTreeSet<PollOptionId>) -> Result<Vec<VoteRow>> {
        self.enter(RemoteCall::ListVotes(
            poll_option_ids.iter().cloned().collect(),
        ))
        .await?;

        let state = self.state();
        let mut votes: Vec<&Vote> = state
            .votes
            .iter()
            .filter(|vote| poll_option_ids.contains(&vote.poll_option_id))
            .collect();
        votes.sort_by_key(|vote| vote.created_at);
        Ok(votes.into_iter().map(Vote::row).collect())
    }

    async fn resolve_voter_names(&self, voter_ids: &[VoterId]) -> Result<Vec<Option<String>>> {
        self.enter(RemoteCall::ResolveVoterNames(voter_ids.to_vec()))
            .await?;

        let state = self.state();
        Ok(voter_ids
            .iter()
            .map(|voter_id| state.names.get(voter_id).cloned())
            .collect())
    }

    async fn update_activity(
        &self,
        activity_id: &ActivityId,
        update: &ActivityUpdate,
    ) -> Result<Activity> {
        self.enter(RemoteCall::UpdateActivity {
            activity_id: activity_id.clone(),
            update: update.clone(),
        })
        .await?;

        let mut state = self.state();
        let activity = state
            .activities
            .get_mut(activity_id)
            .ok_or_else(|| Error::NotFound(format!("activity {activity_id}")))?;
        activity.apply(update);
        Ok(activity.clone())
    }

    async fn list_activities_with_polls(&self) -> Result<Vec<ActivitySnapshot>> {
        self.enter(RemoteCall::ListActivities).await?;

        let state = self.state();
        let mut snapshots: Vec<ActivitySnapshot> = state
            .activities
            .values()
            .map(|activity| ActivitySnapshot {
                activity: activity.clone(),
                poll_options: state
                    .options
                    .iter()
                    .filter(|option| option.activity_id == activity.id)
                    .map(|option| PollOptionSnapshot {
                        option: option.clone(),
                        votes: state
                            .votes
                            .iter()
                            .filter(|vote| vote.poll_option_id == option.id)
                            .cloned()
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        snapshots.sort_by(|left, right| {
            (left.activity.date, left.activity.time).cmp(&(right.activity.date, right.activity.time))
        });
        Ok(snapshots)
    }
}
