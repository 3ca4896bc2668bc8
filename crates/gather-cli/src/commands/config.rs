use std::env;
use std::path::Path;

use gather_core::util::is_http_url;
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::{remote_config_for, resolve_profile, voter_id_for};
use crate::config_profiles::{
    default_config_path, normalize_text_option, CliProfile, CliProfilesConfig,
};
use crate::error::CliError;

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    pending_path: &Path,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            voter_id,
            retry_interval_secs,
            remote_timeout_secs,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileChanges {
                supabase_url,
                supabase_anon_key,
                voter_id,
                retry_interval_secs,
                remote_timeout_secs,
            },
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, json, pending_path),
    }
}

/// Values given on the command line for `config init`
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub voter_id: Option<String>,
    pub retry_interval_secs: Option<u64>,
    pub remote_timeout_secs: Option<u64>,
}

pub fn run_config_init(
    profile_name: Option<&str>,
    changes: ProfileChanges,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    apply_profile_changes(config.profile_mut_or_default(&profile_name), changes);
    if let Some(profile) = config.profile(&profile_name) {
        validate_profile(profile)?;
    }

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profiles
        .get(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_profile_fields(profile);
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `gather activities`.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

/// Merge explicit values, then environment values, over the stored profile
pub fn apply_profile_changes(profile: &mut CliProfile, changes: ProfileChanges) {
    let supabase_url = normalize_text_option(changes.supabase_url)
        .or_else(|| normalize_text_option(env::var("GATHER_SUPABASE_URL").ok()));
    let supabase_anon_key = normalize_text_option(changes.supabase_anon_key)
        .or_else(|| normalize_text_option(env::var("GATHER_SUPABASE_ANON_KEY").ok()));
    let voter_id = normalize_text_option(changes.voter_id)
        .or_else(|| normalize_text_option(env::var("GATHER_VOTER_ID").ok()));

    if let Some(value) = supabase_url {
        profile.supabase_url = Some(value.trim_end_matches('/').to_string());
    }
    if let Some(value) = supabase_anon_key {
        profile.supabase_anon_key = Some(value);
    }
    if let Some(value) = voter_id {
        profile.voter_id = Some(value);
    }
    if changes.retry_interval_secs.is_some() {
        profile.retry_interval_secs = changes.retry_interval_secs;
    }
    if changes.remote_timeout_secs.is_some() {
        profile.remote_timeout_secs = changes.remote_timeout_secs;
    }
}

pub fn missing_profile_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing_fields = Vec::new();
    if profile.supabase_url().is_none() {
        missing_fields.push("supabase_url");
    }
    if profile.supabase_anon_key().is_none() {
        missing_fields.push("supabase_anon_key");
    }
    if profile.voter_id().is_none() {
        missing_fields.push("voter_id");
    }
    missing_fields
}

fn validate_profile(profile: &CliProfile) -> Result<(), CliError> {
    if let Some(url) = profile.supabase_url() {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "supabase_url must include http:// or https://".to_string(),
            ));
        }
    }
    if profile.retry_interval_secs == Some(0) {
        return Err(CliError::Config(
            "retry_interval_secs must be greater than zero".to_string(),
        ));
    }
    if profile.remote_timeout_secs == Some(0) {
        return Err(CliError::Config(
            "remote_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ConfigShowItem {
    pub profile: String,
    pub config_path: Option<String>,
    pub pending_path: String,
    pub rest_url: Option<String>,
    pub anon_key_set: bool,
    pub access_token_set: bool,
    pub voter_id: Option<String>,
    pub retry_interval_secs: u64,
    pub remote_timeout_secs: u64,
}

fn run_config_show(
    global_profile: Option<&str>,
    as_json: bool,
    pending_path: &Path,
) -> Result<(), CliError> {
    let (profile_name, profile) = resolve_profile(global_profile)?;
    let remote = remote_config_for(&profile)?;
    let engine = profile.engine_config();

    let item = ConfigShowItem {
        profile: profile_name,
        config_path: default_config_path()
            .ok()
            .map(|path| path.display().to_string()),
        pending_path: pending_path.display().to_string(),
        rest_url: remote.as_ref().map(|remote| remote.rest_url.clone()),
        anon_key_set: remote.is_some(),
        access_token_set: remote
            .as_ref()
            .is_some_and(|remote| remote.access_token.is_some()),
        voter_id: voter_id_for(&profile).map(|voter| voter.to_string()),
        retry_interval_secs: engine.retry_interval.as_secs(),
        remote_timeout_secs: engine.remote_timeout.as_secs(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Profile:         {}", item.profile);
    if let Some(path) = &item.config_path {
        println!("Config file:     {path}");
    }
    println!("Pending edits:   {}", item.pending_path);
    println!(
        "REST endpoint:   {}",
        item.rest_url.as_deref().unwrap_or("(not configured)")
    );
    println!(
        "Access token:    {}",
        if item.access_token_set { "set" } else { "not set (anon key)" }
    );
    println!(
        "Voter ID:        {}",
        item.voter_id.as_deref().unwrap_or("(not configured)")
    );
    println!("Retry interval:  {}s", item.retry_interval_secs);
    println!("Remote timeout:  {}s", item.remote_timeout_secs);
    Ok(())
}
