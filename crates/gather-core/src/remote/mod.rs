//! Remote store contract and its implementations.

mod memory;
mod supabase;

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use crate::models::{
    Activity, ActivityId, ActivitySnapshot, ActivityUpdate, PollOptionId, VoteRow, VoterId,
};
use crate::{Error, Result};

pub use memory::{MemoryStore, Operation, RemoteCall};
pub use supabase::SupabaseStore;

/// Persistent store reached over the network.
///
/// Every call may fail or be slow; callers bound them with [`with_timeout`].
pub trait RemoteStore: Send + Sync + 'static {
    fn create_vote(
        &self,
        poll_option_id: &PollOptionId,
        voter_id: &VoterId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_vote(
        &self,
        poll_option_id: &PollOptionId,
        voter_id: &VoterId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Vote rows for the given options, oldest first
    fn list_votes(
        &self,
        poll_option_ids: &BTreeSet<PollOptionId>,
    ) -> impl Future<Output = Result<Vec<VoteRow>>> + Send;

    /// Display names in input order; `None` marks an id with no known name
    fn resolve_voter_names(
        &self,
        voter_ids: &[VoterId],
    ) -> impl Future<Output = Result<Vec<Option<String>>>> + Send;

    /// Fails with [`Error::NotFound`] when the activity no longer exists
    fn update_activity(
        &self,
        activity_id: &ActivityId,
        update: &ActivityUpdate,
    ) -> impl Future<Output = Result<Activity>> + Send;

    fn list_activities_with_polls(
        &self,
    ) -> impl Future<Output = Result<Vec<ActivitySnapshot>>> + Send;
}

/// Bound a remote call so a hung request surfaces as an ordinary failure.
pub async fn with_timeout<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(Error::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_elapsed_limit() {
        let limit = Duration::from_secs(2);
        let result: Result<()> = with_timeout(limit, std::future::pending()).await;
        assert!(matches!(result, Err(Error::Timeout(elapsed)) if elapsed == limit));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_results() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let failed: Result<()> = with_timeout(Duration::from_secs(1), async {
            Err(Error::NotFound("a1".to_string()))
        })
        .await;
        assert!(failed.unwrap_err().is_not_found());
    }
}
