//! Gather CLI - browse activities, vote on polls and edit events from the terminal
//!
//! Votes are applied optimistically and rolled back when the remote store
//! rejects them. Edits that cannot be sent are kept on disk and retried by
//! `gather sync`.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod pending_store;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::activities::run_activities;
use crate::commands::common::Session;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::edit::run_edit;
use crate::commands::pending::{run_discard, run_pending};
use crate::commands::sync::run_sync;
use crate::commands::vote::run_vote;
use crate::error::CliError;
use crate::pending_store::resolve_pending_path;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "gather=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let pending_path = resolve_pending_path(cli.pending_path)?;

    match cli.command {
        Commands::Activities { json } => {
            run_activities(json, &Session::open(profile)?).await?;
        }
        Commands::Vote {
            activity_id,
            option_id,
        } => run_vote(&activity_id, &option_id, &Session::open(profile)?).await?,
        Commands::Edit {
            activity_id,
            fields,
        } => {
            run_edit(
                &activity_id,
                fields,
                &Session::open(profile)?,
                &pending_path,
            )
            .await?;
        }
        Commands::Sync { watch } => {
            run_sync(watch, &Session::open(profile)?, &pending_path).await?;
        }
        Commands::Pending { json } => run_pending(json, &pending_path)?,
        Commands::Discard { activity_id } => run_discard(&activity_id, &pending_path)?,
        Commands::Config { command } => run_config(command, profile, &pending_path)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
