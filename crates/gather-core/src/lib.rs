//! gather-core - Core library for Gather
//!
//! This crate contains the shared models, the remote store interface, and the
//! optimistic mutation engines (votes, activity edits, voter names) used by
//! every Gather interface.

pub mod config;
pub mod edits;
pub mod error;
pub mod models;
pub mod names;
pub mod optimistic;
pub mod remote;
pub mod state;
pub mod util;
pub mod votes;

pub use config::{EngineConfig, RemoteConfig};
pub use edits::{EditSyncQueue, PendingEdit, RetryLoop, SyncReport};
pub use error::{Error, Result};
pub use models::{Activity, ActivityId, ActivityUpdate, PollOptionId, VoterId};
pub use names::{NameList, VoterNameResolver};
pub use remote::{MemoryStore, RemoteStore, SupabaseStore};
pub use state::SyncStatus;
pub use votes::{ToggleOutcome, VoteCoordinator};
