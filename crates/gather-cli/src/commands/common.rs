use std::env;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use gather_core::models::ActivitySnapshot;
use gather_core::{
    ActivityId, ActivityUpdate, EditSyncQueue, EngineConfig, PendingEdit, PollOptionId,
    RemoteConfig, SupabaseStore, VoteCoordinator, VoterId, VoterNameResolver,
};
use serde::Serialize;

use crate::cli::EditFields;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Connection settings and engines for one CLI invocation
pub struct Session {
    pub voter_id: Option<VoterId>,
    pub engine: EngineConfig,
    pub store: Arc<SupabaseStore>,
}

impl Session {
    pub fn open(global_profile: Option<&str>) -> Result<Self, CliError> {
        let (profile_name, profile) = resolve_profile(global_profile)?;
        let remote = remote_config_for(&profile)?.ok_or(CliError::RemoteNotConfigured)?;
        let engine = profile.engine_config();
        let store = SupabaseStore::new(remote, engine.remote_timeout)?;
        tracing::debug!("Using remote store from profile '{}'", profile_name);

        Ok(Self {
            voter_id: voter_id_for(&profile),
            engine,
            store: Arc::new(store),
        })
    }

    pub fn voter(&self) -> Result<&VoterId, CliError> {
        self.voter_id.as_ref().ok_or(CliError::VoterNotConfigured)
    }

    pub fn names(&self) -> VoterNameResolver<SupabaseStore> {
        VoterNameResolver::new(Arc::clone(&self.store), self.engine)
    }

    pub fn votes(&self) -> VoteCoordinator<SupabaseStore> {
        VoteCoordinator::new(Arc::clone(&self.store), self.names(), self.engine)
    }

    pub fn edits(&self) -> EditSyncQueue<SupabaseStore> {
        EditSyncQueue::new(Arc::clone(&self.store), self.engine)
    }
}

pub fn resolve_profile(global_profile: Option<&str>) -> Result<(String, CliProfile), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    Ok((profile_name, profile))
}

fn env_text(key: &str) -> Option<String> {
    normalize_text_option(env::var(key).ok())
}

/// Remote settings with environment variables taking precedence over the profile
pub fn remote_config_for(profile: &CliProfile) -> Result<Option<RemoteConfig>, CliError> {
    let url = env_text("GATHER_SUPABASE_URL").or_else(|| profile.supabase_url());
    let anon_key = env_text("GATHER_SUPABASE_ANON_KEY").or_else(|| profile.supabase_anon_key());
    Ok(RemoteConfig::resolve_optional(url, anon_key)?
        .map(|config| config.with_access_token(env_text("GATHER_ACCESS_TOKEN"))))
}

pub fn voter_id_for(profile: &CliProfile) -> Option<VoterId> {
    env_text("GATHER_VOTER_ID")
        .or_else(|| profile.voter_id())
        .map(VoterId::new)
}

pub fn normalize_activity_id(id: &str) -> Result<ActivityId, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyActivityId)
    } else {
        Ok(ActivityId::from(trimmed))
    }
}

pub fn normalize_option_id(id: &str) -> Result<PollOptionId, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyOptionId)
    } else {
        Ok(PollOptionId::from(trimmed))
    }
}

/// Turn edit flags into a partial update; blank text means the flag was not given
pub fn build_update(fields: EditFields) -> Result<ActivityUpdate, CliError> {
    let date = normalize_text_option(fields.date)
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|error| CliError::InvalidField {
                field: "date",
                message: format!("'{raw}' is not YYYY-MM-DD ({error})"),
            })
        })
        .transpose()?;

    let time = if fields.clear_time {
        Some(None)
    } else {
        normalize_text_option(fields.time)
            .map(|raw| parse_time(&raw).map(Some))
            .transpose()?
    };

    let poll_name = if fields.clear_poll_name {
        Some(None)
    } else {
        normalize_text_option(fields.poll_name).map(Some)
    };

    let update = ActivityUpdate {
        name: normalize_text_option(fields.name),
        location: normalize_text_option(fields.location),
        date,
        time,
        description: fields.description.map(|text| text.trim().to_string()),
        poll_name,
    };

    if update.is_empty() {
        Err(CliError::EmptyEdit)
    } else {
        Ok(update)
    }
}

fn parse_time(raw: &str) -> Result<NaiveTime, CliError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|error| CliError::InvalidField {
            field: "time",
            message: format!("'{raw}' is not HH:MM ({error})"),
        })
}

/// Short `field=value` summary of an update
pub fn describe_update(update: &ActivityUpdate) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &update.name {
        parts.push(format!("name={name:?}"));
    }
    if let Some(location) = &update.location {
        parts.push(format!("location={location:?}"));
    }
    if let Some(date) = update.date {
        parts.push(format!("date={date}"));
    }
    match update.time {
        Some(Some(time)) => parts.push(format!("time={}", time.format("%H:%M"))),
        Some(None) => parts.push("time=<cleared>".to_string()),
        None => {}
    }
    if let Some(description) = &update.description {
        parts.push(format!("description={description:?}"));
    }
    match &update.poll_name {
        Some(Some(poll_name)) => parts.push(format!("poll_name={poll_name:?}")),
        Some(None) => parts.push("poll_name=<cleared>".to_string()),
        None => {}
    }
    parts.join(" ")
}

#[derive(Debug, Serialize)]
pub struct ActivityListItem {
    pub id: String,
    pub name: String,
    pub creator: String,
    pub location: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub description: String,
    pub poll_name: Option<String>,
    pub options: Vec<PollOptionItem>,
}

#[derive(Debug, Serialize)]
pub struct PollOptionItem {
    pub id: String,
    pub text: String,
    pub votes: usize,
    pub voted: bool,
    pub voters: Vec<String>,
}

/// Build a list item; `voters` supplies the resolved names for an option
pub fn activity_to_list_item<F>(
    snapshot: &ActivitySnapshot,
    voter_id: Option<&VoterId>,
    voters: F,
) -> ActivityListItem
where
    F: Fn(&PollOptionId) -> Vec<String>,
{
    let activity = &snapshot.activity;
    ActivityListItem {
        id: activity.id.to_string(),
        name: activity.name.clone(),
        creator: activity.creator.clone(),
        location: activity.location.clone(),
        date: activity.date,
        time: activity.time,
        description: activity.description.clone(),
        poll_name: activity.poll_name.clone(),
        options: snapshot
            .poll_options
            .iter()
            .map(|option| PollOptionItem {
                id: option.option.id.to_string(),
                text: option.option.text.clone(),
                votes: option.votes.len(),
                voted: voter_id.is_some_and(|voter| {
                    option.votes.iter().any(|vote| &vote.voter_id == voter)
                }),
                voters: voters(&option.option.id),
            })
            .collect(),
    }
}

pub fn format_activity_lines(items: &[ActivityListItem]) -> Vec<String> {
    let mut lines = Vec::new();
    for item in items {
        let when = item.time.map_or_else(
            || item.date.to_string(),
            |time| format!("{} {}", item.date, time.format("%H:%M")),
        );
        lines.push(format!(
            "{}  {when:<16}  {} @ {} (by {})",
            item.id, item.name, item.location, item.creator
        ));
        if let Some(poll_name) = &item.poll_name {
            lines.push(format!("    Poll: {poll_name}"));
        }
        let width = item
            .options
            .iter()
            .map(|option| option.text.chars().count())
            .max()
            .unwrap_or(0);
        for option in &item.options {
            let mark = if option.voted { "x" } else { " " };
            let mut line = format!(
                "    [{mark}] {}  {:<width$}  {}",
                option.id, option.text, option.votes
            );
            if !option.voters.is_empty() {
                line.push_str("  ");
                line.push_str(&option.voters.join(", "));
            }
            lines.push(line);
        }
    }
    lines
}

pub fn format_pending_lines(edits: &[PendingEdit], now: DateTime<Utc>) -> Vec<String> {
    edits
        .iter()
        .map(|edit| {
            format!(
                "{}  {:<10}  attempts={}  {}",
                edit.activity_id,
                format_relative_time(edit.recorded_at, now),
                edit.attempts,
                describe_update(&edit.update)
            )
        })
        .collect()
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
