use std::path::Path;

use gather_core::SyncStatus;

use crate::cli::EditFields;
use crate::commands::common::{build_update, normalize_activity_id, Session};
use crate::error::CliError;
use crate::pending_store::PendingEditsFile;

pub async fn run_edit(
    activity_id: &str,
    fields: EditFields,
    session: &Session,
    pending_path: &Path,
) -> Result<(), CliError> {
    let activity_id = normalize_activity_id(activity_id)?;
    let update = build_update(fields)?;

    let queue = session.edits();
    queue.restore(PendingEditsFile::load_from_path(pending_path)?.edits);
    let status = queue.record_edit(activity_id.clone(), update).await;
    PendingEditsFile::from_edits(queue.pending_edits()).save_to_path(pending_path)?;

    match status {
        SyncStatus::Synced => println!("Activity {activity_id} updated"),
        SyncStatus::Error | SyncStatus::Pending => {
            let reason = queue
                .last_error(&activity_id)
                .unwrap_or_else(|| "not confirmed yet".to_string());
            println!("Edit for {activity_id} saved as pending: {reason}");
            println!("Run `gather sync` to retry.");
        }
    }
    Ok(())
}
