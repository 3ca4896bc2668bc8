use gather_core::remote::with_timeout;
use gather_core::RemoteStore;

use crate::commands::common::{
    activity_to_list_item, format_activity_lines, ActivityListItem, Session,
};
use crate::error::CliError;

pub async fn run_activities(as_json: bool, session: &Session) -> Result<(), CliError> {
    let snapshots = with_timeout(
        session.engine.remote_timeout,
        session.store.list_activities_with_polls(),
    )
    .await?;

    let names = session.names();
    names
        .preload(
            snapshots
                .iter()
                .flat_map(|snapshot| &snapshot.poll_options)
                .map(|option| option.option.id.clone()),
        )
        .await;

    let items = snapshots
        .iter()
        .map(|snapshot| {
            activity_to_list_item(snapshot, session.voter_id.as_ref(), |option| {
                names
                    .cached(option)
                    .map(|list| list.to_vec())
                    .unwrap_or_default()
            })
        })
        .collect::<Vec<ActivityListItem>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("No activities yet.");
    } else {
        for line in format_activity_lines(&items) {
            println!("{line}");
        }
    }

    Ok(())
}
