use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Parser;
use gather_core::models::{ActivitySnapshot, PollOption, PollOptionSnapshot, Vote};
use gather_core::{
    Activity, ActivityId, ActivityUpdate, EngineConfig, PendingEdit, PollOptionId, RemoteConfig,
    SupabaseStore, VoterId,
};
use mockito::Matcher;
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, EditFields};
use crate::commands::common::{
    activity_to_list_item, build_update, describe_update, format_activity_lines,
    format_pending_lines, format_relative_time, normalize_activity_id, normalize_option_id,
    Session,
};
use crate::commands::completions::run_completions;
use crate::commands::config::{apply_profile_changes, missing_profile_fields, ProfileChanges};
use crate::commands::vote::run_vote;
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn snapshot() -> ActivitySnapshot {
    let mut activity = Activity::new(
        "a1",
        "Picnic",
        "Admin",
        "Park",
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
    );
    activity.time = NaiveTime::from_hms_opt(18, 30, 0);
    activity.poll_name = Some("Bring what?".to_string());

    let option = |id: &str, text: &str| PollOption {
        id: PollOptionId::from(id),
        activity_id: ActivityId::from("a1"),
        text: text.to_string(),
    };
    ActivitySnapshot {
        activity,
        poll_options: vec![
            PollOptionSnapshot {
                option: option("o1", "Snacks"),
                votes: vec![
                    Vote::new(PollOptionId::from("o1"), VoterId::from("me")),
                    Vote::new(PollOptionId::from("o1"), VoterId::from("ash")),
                ],
            },
            PollOptionSnapshot {
                option: option("o2", "Drinks"),
                votes: Vec::new(),
            },
        ],
    }
}

#[test]
fn normalize_ids_reject_empty() {
    assert!(matches!(
        normalize_activity_id("  "),
        Err(CliError::EmptyActivityId)
    ));
    assert!(matches!(
        normalize_option_id(""),
        Err(CliError::EmptyOptionId)
    ));
    assert_eq!(normalize_activity_id(" a1 ").unwrap().as_str(), "a1");
}

#[test]
fn build_update_parses_fields() {
    let update = build_update(EditFields {
        name: Some(" Beach day ".to_string()),
        date: Some("2026-07-04".to_string()),
        time: Some("09:15".to_string()),
        clear_poll_name: true,
        ..EditFields::default()
    })
    .unwrap();

    assert_eq!(
        update,
        ActivityUpdate {
            name: Some("Beach day".to_string()),
            date: NaiveDate::from_ymd_opt(2026, 7, 4),
            time: Some(NaiveTime::from_hms_opt(9, 15, 0)),
            poll_name: Some(None),
            ..ActivityUpdate::default()
        }
    );
}

#[test]
fn build_update_rejects_empty_and_invalid_values() {
    assert!(matches!(
        build_update(EditFields {
            name: Some("   ".to_string()),
            ..EditFields::default()
        }),
        Err(CliError::EmptyEdit)
    ));
    assert!(matches!(
        build_update(EditFields {
            date: Some("07/04/2026".to_string()),
            ..EditFields::default()
        }),
        Err(CliError::InvalidField { field: "date", .. })
    ));
    assert!(matches!(
        build_update(EditFields {
            time: Some("25:00".to_string()),
            ..EditFields::default()
        }),
        Err(CliError::InvalidField { field: "time", .. })
    ));
}

#[test]
fn build_update_keeps_empty_description() {
    let update = build_update(EditFields {
        description: Some("  ".to_string()),
        ..EditFields::default()
    })
    .unwrap();
    assert_eq!(update.description.as_deref(), Some(""));
}

#[test]
fn describe_update_lists_changed_fields() {
    let update = ActivityUpdate {
        location: Some("Pier 4".to_string()),
        time: Some(None),
        ..ActivityUpdate::default()
    };
    assert_eq!(describe_update(&update), "location=\"Pier 4\" time=<cleared>");
}

#[test]
fn list_item_marks_own_votes_and_names() {
    let me = VoterId::from("me");
    let item = activity_to_list_item(&snapshot(), Some(&me), |option| {
        if option.as_str() == "o1" {
            vec!["Me".to_string(), "Ash".to_string()]
        } else {
            Vec::new()
        }
    });

    assert_eq!(item.options.len(), 2);
    assert!(item.options[0].voted);
    assert_eq!(item.options[0].votes, 2);
    assert!(!item.options[1].voted);
    assert_eq!(item.options[1].votes, 0);

    let lines = format_activity_lines(&[item]);
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("a1  2026-06-01 18:30"));
    assert!(lines[0].ends_with("Picnic @ Park (by Admin)"));
    assert_eq!(lines[1], "    Poll: Bring what?");
    assert_eq!(lines[2], "    [x] o1  Snacks  2  Me, Ash");
    assert_eq!(lines[3], "    [ ] o2  Drinks  0");
}

#[test]
fn list_item_without_voter_has_no_marks() {
    let item = activity_to_list_item(&snapshot(), None, |_| Vec::new());
    assert!(item.options.iter().all(|option| !option.voted));
}

#[test]
fn format_relative_time_units() {
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(15), now), "2w ago");
    assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
}

#[test]
fn format_pending_lines_include_attempts() {
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    let edits = vec![PendingEdit {
        activity_id: ActivityId::from("a1"),
        update: ActivityUpdate {
            name: Some("Beach day".to_string()),
            ..ActivityUpdate::default()
        },
        recorded_at: now - Duration::minutes(3),
        attempts: 2,
    }];

    assert_eq!(
        format_pending_lines(&edits, now),
        vec!["a1  3m ago      attempts=2  name=\"Beach day\"".to_string()]
    );
}

#[test]
fn profile_changes_override_stored_values() {
    let mut profile = CliProfile {
        supabase_url: Some("https://old.supabase.co".to_string()),
        retry_interval_secs: Some(30),
        ..CliProfile::default()
    };
    apply_profile_changes(
        &mut profile,
        ProfileChanges {
            supabase_url: Some("https://new.supabase.co/".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            voter_id: Some("voter-1".to_string()),
            retry_interval_secs: None,
            remote_timeout_secs: Some(4),
        },
    );

    assert_eq!(profile.supabase_url.as_deref(), Some("https://new.supabase.co"));
    assert_eq!(profile.retry_interval_secs, Some(30));
    assert_eq!(profile.remote_timeout_secs, Some(4));
    assert!(missing_profile_fields(&profile).is_empty());
}

#[test]
fn missing_profile_fields_lists_everything_for_empty_profile() {
    assert_eq!(
        missing_profile_fields(&CliProfile::default()),
        vec!["supabase_url", "supabase_anon_key", "voter_id"]
    );
}

#[test]
fn cli_parses_edit_flags() {
    let cli = Cli::try_parse_from([
        "gather",
        "--profile",
        "work",
        "edit",
        "a1",
        "--location",
        "Library",
        "--clear-time",
    ])
    .unwrap();

    assert_eq!(cli.profile.as_deref(), Some("work"));
    let Commands::Edit {
        activity_id,
        fields,
    } = cli.command
    else {
        panic!("expected edit command");
    };
    assert_eq!(activity_id, "a1");
    assert_eq!(fields.location.as_deref(), Some("Library"));
    assert!(fields.clear_time);
}

#[test]
fn cli_rejects_time_with_clear_time() {
    let parsed = Cli::try_parse_from(["gather", "edit", "a1", "--time", "10:00", "--clear-time"]);
    assert!(parsed.is_err());
}

#[test]
fn run_completions_writes_bash_script() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("gather.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_gather()"));
    assert!(script.contains("complete -F _gather"));
}

#[test]
fn completions_cover_gather_commands_and_flags() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("gather.fish");

    run_completions(CompletionShell::Fish, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    for subcommand in ["activities", "vote", "edit", "sync", "pending", "discard"] {
        assert!(
            script.contains(&format!("\"{subcommand}\"")),
            "missing {subcommand}"
        );
    }
    assert!(script.contains("pending-path"));
    assert!(script.contains("clear-poll-name"));
}

#[tokio::test]
async fn rolled_back_vote_is_reported_not_failed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex("^/rest/v1/activities".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"id":"a1","name":"Picnic","creator":"Admin","location":"Park",
                "date":"2026-06-01","created_at":"2026-05-01T10:00:00+00:00",
                "poll_options":[{"id":"o1","activity_id":"a1","text":"Snacks","votes":[]}]}]"#,
        )
        .create_async()
        .await;
    let create = server
        .mock("POST", Matcher::Regex("^/rest/v1/votes".to_string()))
        .with_status(503)
        .create_async()
        .await;

    let engine = EngineConfig::default();
    let remote = RemoteConfig::new(&server.url(), "anon").unwrap();
    let session = Session {
        voter_id: Some(VoterId::from("me")),
        engine,
        store: Arc::new(SupabaseStore::new(remote, engine.remote_timeout).unwrap()),
    };

    run_vote("a1", "o1", &session).await.unwrap();
    create.assert_async().await;
}
