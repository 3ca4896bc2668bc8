use std::path::Path;

use chrono::Utc;

use crate::commands::common::{format_pending_lines, normalize_activity_id};
use crate::error::CliError;
use crate::pending_store::PendingEditsFile;

pub fn run_pending(as_json: bool, pending_path: &Path) -> Result<(), CliError> {
    let pending = PendingEditsFile::load_from_path(pending_path)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&pending.edits)?);
        return Ok(());
    }

    if pending.edits.is_empty() {
        println!("No pending edits.");
        return Ok(());
    }

    for line in format_pending_lines(&pending.edits, Utc::now()) {
        println!("{line}");
    }
    Ok(())
}

pub fn run_discard(activity_id: &str, pending_path: &Path) -> Result<(), CliError> {
    let activity_id = normalize_activity_id(activity_id)?;
    let mut pending = PendingEditsFile::load_from_path(pending_path)?;

    if pending.discard(&activity_id) {
        pending.save_to_path(pending_path)?;
        tracing::info!("Discarded pending edit for activity {}", activity_id);
        println!("Discarded pending edit for {activity_id}");
    } else {
        println!("No pending edit for {activity_id}");
    }
    Ok(())
}
