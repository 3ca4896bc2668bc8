//! Shared state types exposed to views.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sync status of an edited entity, shown as a badge next to it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Recorded locally, not yet confirmed
    Pending,
    /// Confirmed by the remote store
    Synced,
    /// The last attempt failed; the edit is kept for retry
    Error,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
