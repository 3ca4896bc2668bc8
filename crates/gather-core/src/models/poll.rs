//! Poll option and vote models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{remote_id, ActivityId};

remote_id!(
    /// Identifier of a poll option row
    PollOptionId
);

remote_id!(
    /// Identifier of a vote row
    VoteId
);

remote_id!(
    /// Identifier of a member who can vote
    VoterId
);

impl VoteId {
    /// Generate a fresh time-sortable ID for locally created votes
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl VoterId {
    /// Fallback display label for a voter whose name could not be resolved
    #[must_use]
    pub fn placeholder_name(&self) -> String {
        let short: String = self.0.chars().take(8).collect();
        format!("User {short}")
    }
}

/// One selectable choice attached to an activity's poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: PollOptionId,
    pub activity_id: ActivityId,
    pub text: String,
}

/// A voter's selection of one poll option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub poll_option_id: PollOptionId,
    pub voter_id: VoterId,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(poll_option_id: PollOptionId, voter_id: VoterId) -> Self {
        Self {
            id: VoteId::generate(),
            poll_option_id,
            voter_id,
            created_at: Utc::now(),
        }
    }

    /// Project to the `(option, voter)` pair used by vote listings
    #[must_use]
    pub fn row(&self) -> VoteRow {
        VoteRow {
            poll_option_id: self.poll_option_id.clone(),
            voter_id: self.voter_id.clone(),
        }
    }
}

/// `(option, voter)` pair returned when listing votes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteRow {
    pub poll_option_id: PollOptionId,
    pub voter_id: VoterId,
}
