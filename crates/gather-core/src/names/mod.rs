//! Voter name resolution with a per-option cache.
//!
//! Names are display sugar: nothing here returns an error. Lookups that
//! fail degrade to placeholder labels derived from the voter id.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::EngineConfig;
use crate::models::{PollOptionId, VoteRow, VoterId};
use crate::remote::{with_timeout, RemoteStore};

/// What a view can show for an option's voter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameList {
    /// Nothing cached and no lookup running
    Unresolved,
    /// A lookup is running
    Loading,
    Resolved(Arc<[String]>),
}

#[derive(Debug, Default)]
struct NameState {
    cache: HashMap<PollOptionId, Arc<[String]>>,
    /// Bumped on invalidation so lookups started earlier do not repopulate
    generations: HashMap<PollOptionId, u64>,
    loading: HashMap<PollOptionId, usize>,
}

impl NameState {
    fn generation(&self, option: &PollOptionId) -> u64 {
        self.generations.get(option).copied().unwrap_or_default()
    }

    fn begin_loading(&mut self, option: &PollOptionId) -> u64 {
        *self.loading.entry(option.clone()).or_default() += 1;
        self.generation(option)
    }

    fn end_loading(&mut self, option: &PollOptionId) {
        if let Some(count) = self.loading.get_mut(option) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.loading.remove(option);
            }
        }
    }

    fn store(&mut self, option: &PollOptionId, generation: u64, names: Arc<[String]>) -> bool {
        if self.generation(option) != generation {
            return false;
        }
        self.cache.insert(option.clone(), names);
        true
    }
}

/// Resolves voter ids to display names per poll option
pub struct VoterNameResolver<S> {
    store: Arc<S>,
    config: EngineConfig,
    state: Arc<Mutex<NameState>>,
}

impl<S> Clone for VoterNameResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
            state: Arc::clone(&self.state),
        }
    }
}

/// Clears "loading" markers even if the lookup future is dropped mid-way
struct Loading<'a> {
    state: &'a Mutex<NameState>,
    options: Vec<PollOptionId>,
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for option in &self.options {
            state.end_loading(option);
        }
    }
}

impl<S: RemoteStore> VoterNameResolver<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            state: Arc::new(Mutex::new(NameState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, NameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached names for an option, without any I/O
    pub fn cached(&self, poll_option_id: &PollOptionId) -> Option<Arc<[String]>> {
        self.state().cache.get(poll_option_id).cloned()
    }

    pub fn names(&self, poll_option_id: &PollOptionId) -> NameList {
        let state = self.state();
        if let Some(names) = state.cache.get(poll_option_id) {
            NameList::Resolved(Arc::clone(names))
        } else if state.loading.contains_key(poll_option_id) {
            NameList::Loading
        } else {
            NameList::Unresolved
        }
    }

    /// Drop the cached entry so the next resolve fetches fresh data
    pub fn invalidate(&self, poll_option_id: &PollOptionId) {
        let mut state = self.state();
        state.cache.remove(poll_option_id);
        *state
            .generations
            .entry(poll_option_id.clone())
            .or_default() += 1;
    }

    /// Names of everyone who voted for the option, in vote order
    pub async fn resolve(&self, poll_option_id: &PollOptionId) -> Arc<[String]> {
        let generation = {
            let mut state = self.state();
            if let Some(names) = state.cache.get(poll_option_id) {
                tracing::debug!("Voter names for {} served from cache", poll_option_id);
                return Arc::clone(names);
            }
            state.begin_loading(poll_option_id)
        };
        let _loading = Loading {
            state: &self.state,
            options: vec![poll_option_id.clone()],
        };

        let options = BTreeSet::from([poll_option_id.clone()]);
        let rows = match with_timeout(self.config.remote_timeout, self.store.list_votes(&options))
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!("Failed to list votes for {}: {}", poll_option_id, error);
                return Arc::from(Vec::new());
            }
        };

        let voters: Vec<VoterId> = rows
            .into_iter()
            .filter(|row| &row.poll_option_id == poll_option_id)
            .map(|row| row.voter_id)
            .collect();
        let lookup = self.lookup_names(&voters).await;
        let names: Arc<[String]> = voters.iter().map(|voter| lookup.label(voter)).collect();

        if !self.state().store(poll_option_id, generation, Arc::clone(&names)) {
            tracing::debug!(
                "Discarding voter names for {}: invalidated while loading",
                poll_option_id
            );
        }
        names
    }

    /// Invalidate and resolve again
    pub async fn refresh(&self, poll_option_id: &PollOptionId) -> Arc<[String]> {
        self.invalidate(poll_option_id);
        self.resolve(poll_option_id).await
    }

    /// Fill the cache for many options with one vote listing and one name lookup.
    ///
    /// Returns how many options were cached.
    pub async fn preload<I>(&self, poll_option_ids: I) -> usize
    where
        I: IntoIterator<Item = PollOptionId>,
    {
        let options: BTreeSet<PollOptionId> = poll_option_ids.into_iter().collect();
        if options.is_empty() {
            return 0;
        }

        let generations: HashMap<PollOptionId, u64> = {
            let mut state = self.state();
            options
                .iter()
                .map(|option| (option.clone(), state.begin_loading(option)))
                .collect()
        };
        let _loading = Loading {
            state: &self.state,
            options: options.iter().cloned().collect(),
        };

        let rows = match with_timeout(self.config.remote_timeout, self.store.list_votes(&options))
            .await
        {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!("Failed to preload votes for {} options: {}", options.len(), error);
                return 0;
            }
        };

        let voters = distinct_voters(&rows);
        let lookup = self.lookup_names(&voters).await;

        let mut per_option: HashMap<PollOptionId, Vec<String>> = options
            .iter()
            .map(|option| (option.clone(), Vec::new()))
            .collect();
        for row in &rows {
            if let Some(names) = per_option.get_mut(&row.poll_option_id) {
                names.push(lookup.label(&row.voter_id));
            }
        }

        let mut state = self.state();
        let cached = per_option
            .into_iter()
            .filter(|(option, names)| {
                let generation = generations.get(option).copied().unwrap_or_default();
                state.store(option, generation, Arc::from(names.as_slice()))
            })
            .count();
        tracing::debug!(
            "Preloaded voter names for {cached} options ({} voters)",
            voters.len()
        );
        cached
    }

    /// One batched lookup; failures and gaps become placeholders
    async fn lookup_names(&self, voters: &[VoterId]) -> NameLookup {
        let distinct: Vec<VoterId> = {
            let mut seen = BTreeSet::new();
            voters
                .iter()
                .filter(|voter| seen.insert(*voter))
                .cloned()
                .collect()
        };
        if distinct.is_empty() {
            return NameLookup::default();
        }

        let resolved = match with_timeout(
            self.config.remote_timeout,
            self.store.resolve_voter_names(&distinct),
        )
        .await
        {
            Ok(names) if names.len() == distinct.len() => names,
            Ok(names) => {
                tracing::warn!(
                    "Name lookup returned {} entries for {} voters; using placeholders",
                    names.len(),
                    distinct.len()
                );
                vec![None; distinct.len()]
            }
            Err(error) => {
                tracing::warn!("Name lookup failed, using placeholders: {}", error);
                vec![None; distinct.len()]
            }
        };

        NameLookup {
            names: distinct
                .into_iter()
                .zip(resolved)
                .filter_map(|(voter, name)| {
                    let name = name?.trim().to_string();
                    (!name.is_empty()).then_some((voter, name))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct NameLookup {
    names: HashMap<VoterId, String>,
}

impl NameLookup {
    fn label(&self, voter: &VoterId) -> String {
        self.names
            .get(voter)
            .cloned()
            .unwrap_or_else(|| voter.placeholder_name())
    }
}

fn distinct_voters(rows: &[VoteRow]) -> Vec<VoterId> {
    let mut seen = BTreeSet::new();
    rows.iter()
        .filter(|row| seen.insert(&row.voter_id))
        .map(|row| row.voter_id.clone())
        .collect()
}
