use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] gather_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Activity ID cannot be empty")]
    EmptyActivityId,
    #[error("Poll option ID cannot be empty")]
    EmptyOptionId,
    #[error("No fields to edit; pass at least one of --name, --location, --date, --time, --description, --poll-name")]
    EmptyEdit,
    #[error("Invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("Poll option {option} does not belong to activity {activity}")]
    OptionNotFound { activity: String, option: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote store is not configured. Run `gather config init --supabase-url <url> --supabase-anon-key <key>`, or set GATHER_SUPABASE_URL and GATHER_SUPABASE_ANON_KEY."
    )]
    RemoteNotConfigured,
    #[error(
        "Voter ID is not configured. Run `gather config init --voter-id <id>`, or set GATHER_VOTER_ID."
    )]
    VoterNotConfigured,
}
