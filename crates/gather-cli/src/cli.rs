use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "gather")]
#[command(about = "Browse community activities, vote on polls, and edit events")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name to read connection settings from
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Optional path to the pending edits file
    #[arg(long, global = true, value_name = "PATH")]
    pub pending_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List activities with their polls, vote counts and voters
    #[command(alias = "ls")]
    Activities {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle your vote on a poll option
    Vote {
        /// Activity ID
        activity_id: String,
        /// Poll option ID
        option_id: String,
    },
    /// Edit an activity; the edit is kept and retried if it cannot be sent
    Edit {
        /// Activity ID
        activity_id: String,
        #[command(flatten)]
        fields: EditFields,
    },
    /// Send pending edits now
    Sync {
        /// Keep retrying in the background until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// List edits waiting to be sent
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop a pending edit without sending it
    Discard {
        /// Activity ID
        activity_id: String,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct EditFields {
    /// New activity name
    #[arg(long)]
    pub name: Option<String>,
    /// New location
    #[arg(long)]
    pub location: Option<String>,
    /// New date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,
    /// New start time (HH:MM)
    #[arg(long, value_name = "TIME", conflicts_with = "clear_time")]
    pub time: Option<String>,
    /// Remove the start time
    #[arg(long)]
    pub clear_time: bool,
    /// New description
    #[arg(long)]
    pub description: Option<String>,
    /// New poll title
    #[arg(long, conflicts_with = "clear_poll_name")]
    pub poll_name: Option<String>,
    /// Remove the poll title
    #[arg(long)]
    pub clear_poll_name: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Voter ID used for votes cast from this profile
        #[arg(long, value_name = "ID")]
        voter_id: Option<String>,
        /// Seconds between background retries of pending edits
        #[arg(long, value_name = "SECS")]
        retry_interval_secs: Option<u64>,
        /// Seconds before a remote call is treated as failed
        #[arg(long, value_name = "SECS")]
        remote_timeout_secs: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
