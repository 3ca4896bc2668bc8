use std::path::Path;

use gather_core::{EditSyncQueue, SupabaseStore};

use crate::commands::common::Session;
use crate::error::CliError;
use crate::pending_store::PendingEditsFile;

pub async fn run_sync(watch: bool, session: &Session, pending_path: &Path) -> Result<(), CliError> {
    let pending = PendingEditsFile::load_from_path(pending_path)?;
    if pending.edits.is_empty() {
        println!("No pending edits.");
        return Ok(());
    }

    let queue = session.edits();
    queue.restore(pending.edits);
    let report = queue.force_sync().await;
    save_pending(&queue, pending_path)?;
    println!(
        "Sync completed: {} synced, {} failed",
        report.synced, report.failed
    );
    print_failures(&queue);

    if watch && queue.pending_count() > 0 {
        watch_pending(&queue, session, pending_path).await?;
    }
    Ok(())
}

async fn watch_pending(
    queue: &EditSyncQueue<SupabaseStore>,
    session: &Session,
    pending_path: &Path,
) -> Result<(), CliError> {
    println!(
        "Retrying {} pending edits every {}s (Ctrl-C to stop)",
        queue.pending_count(),
        session.engine.retry_interval.as_secs()
    );
    let retry = queue.spawn_retry_loop();
    let mut ticker = tokio::time::interval(session.engine.retry_interval);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                save_pending(queue, pending_path)?;
                if queue.pending_count() == 0 {
                    println!("All pending edits synced");
                    break;
                }
            }
        }
    }

    retry.shutdown();
    save_pending(queue, pending_path)?;
    print_failures(queue);
    Ok(())
}

fn save_pending(queue: &EditSyncQueue<SupabaseStore>, pending_path: &Path) -> Result<(), CliError> {
    PendingEditsFile::from_edits(queue.pending_edits()).save_to_path(pending_path)
}

fn print_failures(queue: &EditSyncQueue<SupabaseStore>) {
    for activity_id in queue.pending_ids() {
        if let Some(error) = queue.last_error(&activity_id) {
            println!("  {activity_id}: {error}");
        }
    }
}
