//! Activity model

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{remote_id, PollOption, Vote};

remote_id!(
    /// Identifier of an activity row
    ActivityId
);

/// A schedulable community event, optionally carrying a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    /// Display name of the administrator who created it
    pub creator: String,
    pub location: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub poll_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Create an activity without time, description or poll
    pub fn new(
        id: impl Into<ActivityId>,
        name: impl Into<String>,
        creator: impl Into<String>,
        location: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            creator: creator.into(),
            location: location.into(),
            date,
            time: None,
            description: String::new(),
            poll_name: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a partial update locally, as the remote store would
    pub fn apply(&mut self, update: &ActivityUpdate) {
        if let Some(name) = &update.name {
            self.name.clone_from(name);
        }
        if let Some(location) = &update.location {
            self.location.clone_from(location);
        }
        if let Some(date) = update.date {
            self.date = date;
        }
        if let Some(time) = update.time {
            self.time = time;
        }
        if let Some(description) = &update.description {
            self.description.clone_from(description);
        }
        if let Some(poll_name) = &update.poll_name {
            self.poll_name.clone_from(poll_name);
        }
    }
}

/// Editable subset of an activity's fields.
///
/// Absent fields are left untouched remotely. The doubly optional fields
/// distinguish "leave as is" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub time: Option<Option<NaiveTime>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_field"
    )]
    pub poll_name: Option<Option<String>>,
}

/// Keeps an explicit `null` as `Some(None)` instead of collapsing it to `None`.
fn present_field<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ActivityUpdate {
    /// True when no field would be changed
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.location.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.description.is_none()
            && self.poll_name.is_none()
    }
}

/// One poll option together with its current votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptionSnapshot {
    #[serde(flatten)]
    pub option: PollOption,
    #[serde(default)]
    pub votes: Vec<Vote>,
}

/// An activity with its poll options and votes, as listed by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    #[serde(flatten)]
    pub activity: Activity,
    #[serde(default)]
    pub poll_options: Vec<PollOptionSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Activity {
        Activity {
            id: ActivityId::from("a1"),
            name: "Board games".to_string(),
            creator: "Admin".to_string(),
            location: "Library".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            time: NaiveTime::from_hms_opt(18, 30, 0),
            description: String::new(),
            poll_name: Some("Which game?".to_string()),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn update_serializes_only_present_fields() {
        let update = ActivityUpdate {
            name: Some("Chess night".to_string()),
            time: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Chess night", "time": null }));
    }

    #[test]
    fn update_keeps_explicit_null_on_reload() {
        let update: ActivityUpdate =
            serde_json::from_str(r#"{ "poll_name": null, "name": "Quiz" }"#).unwrap();
        assert_eq!(update.poll_name, Some(None));
        assert_eq!(update.time, None);
        assert_eq!(update.name.as_deref(), Some("Quiz"));
    }

    #[test]
    fn apply_clears_optional_fields() {
        let mut activity = sample();
        activity.apply(&ActivityUpdate {
            time: Some(None),
            poll_name: Some(None),
            location: Some("Park".to_string()),
            ..Default::default()
        });
        assert_eq!(activity.time, None);
        assert_eq!(activity.poll_name, None);
        assert_eq!(activity.location, "Park");
        assert_eq!(activity.name, "Board games");
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(ActivityUpdate::default().is_empty());
        assert!(!ActivityUpdate {
            date: NaiveDate::from_ymd_opt(2026, 1, 1),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn snapshot_parses_nested_postgrest_rows() {
        let payload = r#"
        [{
          "id": "a1",
          "name": "Picnic",
          "creator": "Admin",
          "location": "Park",
          "date": "2026-06-01",
          "time": "12:00:00",
          "description": "Bring food",
          "poll_name": "Dessert",
          "created_at": "2026-05-01T10:00:00+00:00",
          "poll_options": [{
            "id": "o1",
            "activity_id": "a1",
            "text": "Cake",
            "votes": [{
              "id": "v1",
              "poll_option_id": "o1",
              "voter_id": "u1",
              "created_at": "2026-05-02T10:00:00+00:00"
            }]
          }]
        }]
        "#;
        let snapshots: Vec<ActivitySnapshot> = serde_json::from_str(payload).unwrap();
        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.activity.name, "Picnic");
        assert_eq!(snapshot.poll_options[0].option.text, "Cake");
        assert_eq!(snapshot.poll_options[0].votes[0].voter_id.as_str(), "u1");
    }
}
