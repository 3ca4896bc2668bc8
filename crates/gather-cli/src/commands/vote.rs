use gather_core::ToggleOutcome;

use crate::commands::common::{normalize_activity_id, normalize_option_id, Session};
use crate::error::CliError;

pub async fn run_vote(
    activity_id: &str,
    option_id: &str,
    session: &Session,
) -> Result<(), CliError> {
    let activity_id = normalize_activity_id(activity_id)?;
    let option_id = normalize_option_id(option_id)?;
    let voter_id = session.voter()?;

    let votes = session.votes();
    let snapshots = votes.refresh(voter_id).await?;
    let option_text = snapshots
        .iter()
        .filter(|snapshot| snapshot.activity.id == activity_id)
        .flat_map(|snapshot| &snapshot.poll_options)
        .find(|option| option.option.id == option_id)
        .map(|option| option.option.text.clone())
        .ok_or_else(|| CliError::OptionNotFound {
            activity: activity_id.to_string(),
            option: option_id.to_string(),
        })?;

    match votes.toggle_vote(&option_id, &activity_id, voter_id).await {
        ToggleOutcome::Confirmed { voted } => {
            let verb = if voted { "Voted for" } else { "Removed vote from" };
            println!(
                "{verb} '{option_text}' ({} votes)",
                votes.vote_count(&option_id)
            );
            if let Some(names) = votes.names().cached(&option_id) {
                if !names.is_empty() {
                    println!("Voters: {}", names.join(", "));
                }
            }
            Ok(())
        }
        ToggleOutcome::Ignored => {
            println!("A vote change for '{option_text}' is already in progress");
            Ok(())
        }
        ToggleOutcome::RolledBack { error } => {
            tracing::debug!("Rolled back vote cause: {:?}", error);
            println!(
                "Vote on '{option_text}' was not saved and has been undone ({} votes)",
                votes.vote_count(&option_id)
            );
            Ok(())
        }
    }
}
