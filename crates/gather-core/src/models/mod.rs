//! Data models for Gather

/// Declare an opaque string identifier as assigned by the remote store.
macro_rules! remote_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Get the string representation of this ID
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

pub(crate) use remote_id;

mod activity;
mod poll;

pub use activity::{Activity, ActivityId, ActivitySnapshot, ActivityUpdate, PollOptionSnapshot};
pub use poll::{PollOption, PollOptionId, Vote, VoteId, VoteRow, VoterId};
