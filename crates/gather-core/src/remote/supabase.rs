//! Supabase (PostgREST) remote store.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::models::{
    Activity, ActivityId, ActivitySnapshot, ActivityUpdate, PollOptionId, VoteRow, VoterId,
};
use crate::util::compact_text;
use crate::{Error, Result};

const VOTES_TABLE: &str = "votes";
const ACTIVITIES_TABLE: &str = "activities";
const PROFILES_TABLE: &str = "profiles";

/// Remote store backed by a Supabase project's REST endpoint
#[derive(Clone)]
pub struct SupabaseStore {
    config: RemoteConfig,
    client: Client,
}

impl SupabaseStore {
    /// Create a store whose HTTP client gives up after `request_timeout`
    pub fn new(config: RemoteConfig, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { config, client })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{table}", self.config.rest_url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.config.bearer_token())
            .header("Accept", "application/json")
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }
}

#[derive(Debug, Serialize)]
struct NewVote<'a> {
    poll_option_id: &'a PollOptionId,
    voter_id: &'a VoterId,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: VoterId,
    #[serde(default)]
    display_name: Option<String>,
}

impl RemoteStore for SupabaseStore {
    async fn create_vote(&self, poll_option_id: &PollOptionId, voter_id: &VoterId) -> Result<()> {
        let request = self
            .request(Method::POST, VOTES_TABLE)
            .header("Prefer", "return=minimal")
            .json(&NewVote {
                poll_option_id,
                voter_id,
            });
        Self::send(request).await?;
        Ok(())
    }

    async fn delete_vote(&self, poll_option_id: &PollOptionId, voter_id: &VoterId) -> Result<()> {
        let request = self
            .request(Method::DELETE, VOTES_TABLE)
            .header("Prefer", "return=minimal")
            .query(&[
                ("poll_option_id", eq_filter(poll_option_id.as_str())),
                ("voter_id", eq_filter(voter_id.as_str())),
            ]);
        Self::send(request).await?;
        Ok(())
    }

    async fn list_votes(&self, poll_option_ids: &BTreeSet<PollOptionId>) -> Result<Vec<VoteRow>> {
        if poll_option_ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.request(Method::GET, VOTES_TABLE).query(&[
            ("select", "poll_option_id,voter_id".to_string()),
            (
                "poll_option_id",
                in_filter(poll_option_ids.iter().map(PollOptionId::as_str)),
            ),
            ("order", "created_at.asc".to_string()),
        ]);
        Ok(Self::send(request).await?.json().await?)
    }

    async fn resolve_voter_names(&self, voter_ids: &[VoterId]) -> Result<Vec<Option<String>>> {
        if voter_ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.request(Method::GET, PROFILES_TABLE).query(&[
            ("select", "id,display_name".to_string()),
            ("id", in_filter(voter_ids.iter().map(VoterId::as_str))),
        ]);
        let rows: Vec<ProfileRow> = Self::send(request).await?.json().await?;
        Ok(order_names(voter_ids, rows))
    }

    async fn update_activity(
        &self,
        activity_id: &ActivityId,
        update: &ActivityUpdate,
    ) -> Result<Activity> {
        let request = self
            .request(Method::PATCH, ACTIVITIES_TABLE)
            .header("Prefer", "return=representation")
            .query(&[("id", eq_filter(activity_id.as_str()))])
            .json(update);
        let rows: Vec<Activity> = Self::send(request).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("activity {activity_id}")))
    }

    async fn list_activities_with_polls(&self) -> Result<Vec<ActivitySnapshot>> {
        let request = self.request(Method::GET, ACTIVITIES_TABLE).query(&[
            ("select", "*,poll_options(*,votes(*))"),
            ("order", "date.asc,time.asc"),
        ]);
        Ok(Self::send(request).await?.json().await?)
    }
}

fn eq_filter(value: &str) -> String {
    format!("eq.{value}")
}

/// PostgREST `in` filter; values are quoted so commas inside ids stay intact
fn in_filter<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values
        .map(|value| format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Re-order profile rows to match the requested ids
fn order_names(voter_ids: &[VoterId], rows: Vec<ProfileRow>) -> Vec<Option<String>> {
    let by_id: HashMap<VoterId, String> = rows
        .into_iter()
        .filter_map(|row| {
            let name = row.display_name?.trim().to_string();
            (!name.is_empty()).then_some((row.id, name))
        })
        .collect();
    voter_ids.iter().map(|id| by_id.get(id).cloned()).collect()
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    if status == StatusCode::NOT_FOUND {
        Error::NotFound(message)
    } else {
        Error::Remote(message)
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.details).or(payload.hint) {
            let code = payload
                .code
                .map(|code| format!(" [{code}]"))
                .unwrap_or_default();
            return format!("{}{} ({})", message.trim(), code, status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn in_filter_quotes_values() {
        let filter = in_filter(["o1", "o,2"].into_iter());
        assert_eq!(filter, r#"in.("o1","o,2")"#);
    }

    #[test]
    fn order_names_follows_request_order() {
        let ids = vec![VoterId::from("u2"), VoterId::from("u9"), VoterId::from("u1")];
        let rows = vec![
            ProfileRow {
                id: VoterId::from("u1"),
                display_name: Some("Ash".to_string()),
            },
            ProfileRow {
                id: VoterId::from("u2"),
                display_name: Some("  ".to_string()),
            },
        ];
        assert_eq!(order_names(&ids, rows), vec![None, None, Some("Ash".to_string())]);
    }

    #[test]
    fn parse_api_error_prefers_postgrest_message() {
        let body = r#"{"code":"23505","message":"duplicate key value","details":null,"hint":null}"#;
        assert_eq!(
            parse_api_error(StatusCode::CONFLICT, body),
            "duplicate key value [23505] (409)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_status() {
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
    }

    #[test]
    fn not_found_status_maps_to_not_found() {
        assert!(api_error(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(api_error(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
    }

    #[test]
    fn store_builds_table_urls() {
        let config = RemoteConfig::new("https://demo.supabase.co", "anon").unwrap();
        let store = SupabaseStore::new(config, Duration::from_secs(5)).unwrap();
        let request = store.request(Method::GET, VOTES_TABLE).build().unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://demo.supabase.co/rest/v1/votes"
        );
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer anon");
    }

    mod http {
        use mockito::{Matcher, Server, ServerGuard};
        use pretty_assertions::assert_eq;

        use super::*;

        fn store_for(server: &ServerGuard) -> SupabaseStore {
            let config = RemoteConfig::new(&server.url(), "anon").unwrap();
            SupabaseStore::new(config, Duration::from_secs(5)).unwrap()
        }

        fn table(name: &str) -> Matcher {
            Matcher::Regex(format!("^/rest/v1/{name}"))
        }

        fn rename() -> ActivityUpdate {
            ActivityUpdate {
                name: Some("Beach day".to_string()),
                ..ActivityUpdate::default()
            }
        }

        #[tokio::test]
        async fn update_activity_returns_representation() {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("PATCH", table(ACTIVITIES_TABLE))
                .match_query(Matcher::UrlEncoded("id".into(), "eq.a1".into()))
                .match_header("prefer", "return=representation")
                .match_header("apikey", "anon")
                .match_body(Matcher::Json(serde_json::json!({ "name": "Beach day" })))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    r#"[{"id":"a1","name":"Beach day","creator":"Admin","location":"Park",
                        "date":"2026-06-01","time":null,"description":"","poll_name":null,
                        "created_at":"2026-05-01T10:00:00+00:00"}]"#,
                )
                .create_async()
                .await;

            let activity = store_for(&server)
                .update_activity(&ActivityId::from("a1"), &rename())
                .await
                .unwrap();

            mock.assert_async().await;
            assert_eq!(activity.name, "Beach day");
            assert_eq!(activity.location, "Park");
        }

        #[tokio::test]
        async fn update_activity_matching_no_rows_is_not_found() {
            let mut server = Server::new_async().await;
            server
                .mock("PATCH", table(ACTIVITIES_TABLE))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body("[]")
                .create_async()
                .await;

            let error = store_for(&server)
                .update_activity(&ActivityId::from("gone"), &rename())
                .await
                .unwrap_err();

            assert!(error.is_not_found());
            assert!(!error.is_transient());
        }

        #[tokio::test]
        async fn update_activity_404_is_not_found() {
            let mut server = Server::new_async().await;
            server
                .mock("PATCH", table(ACTIVITIES_TABLE))
                .with_status(404)
                .with_body(r#"{"code":"PGRST205","message":"relation not found"}"#)
                .create_async()
                .await;

            let error = store_for(&server)
                .update_activity(&ActivityId::from("a1"), &rename())
                .await
                .unwrap_err();

            assert!(matches!(&error, Error::NotFound(message) if message.contains("PGRST205")));
        }

        #[tokio::test]
        async fn server_errors_are_transient() {
            let mut server = Server::new_async().await;
            server
                .mock("POST", table(VOTES_TABLE))
                .with_status(503)
                .with_body("upstream unavailable")
                .create_async()
                .await;

            let error = store_for(&server)
                .create_vote(&PollOptionId::from("o1"), &VoterId::from("u1"))
                .await
                .unwrap_err();

            assert!(error.is_transient());
            assert!(error.to_string().contains("upstream unavailable (503)"));
        }

        #[tokio::test]
        async fn list_votes_filters_by_option_ids() {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("GET", table(VOTES_TABLE))
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("select".into(), "poll_option_id,voter_id".into()),
                    Matcher::UrlEncoded("poll_option_id".into(), r#"in.("o1","o2")"#.into()),
                ]))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    r#"[{"poll_option_id":"o1","voter_id":"u1"},
                        {"poll_option_id":"o2","voter_id":"u2"}]"#,
                )
                .create_async()
                .await;

            let options = BTreeSet::from([PollOptionId::from("o1"), PollOptionId::from("o2")]);
            let rows = store_for(&server).list_votes(&options).await.unwrap();

            mock.assert_async().await;
            assert_eq!(
                rows,
                vec![
                    VoteRow {
                        poll_option_id: PollOptionId::from("o1"),
                        voter_id: VoterId::from("u1"),
                    },
                    VoteRow {
                        poll_option_id: PollOptionId::from("o2"),
                        voter_id: VoterId::from("u2"),
                    },
                ]
            );
        }

        #[tokio::test]
        async fn list_votes_without_options_skips_the_request() {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("GET", Matcher::Any)
                .expect(0)
                .create_async()
                .await;

            let rows = store_for(&server)
                .list_votes(&BTreeSet::new())
                .await
                .unwrap();

            mock.assert_async().await;
            assert!(rows.is_empty());
        }

        #[tokio::test]
        async fn resolve_voter_names_restores_request_order() {
            let mut server = Server::new_async().await;
            server
                .mock("GET", table(PROFILES_TABLE))
                .match_query(Matcher::UrlEncoded(
                    "id".into(),
                    r#"in.("u2","u9","u1")"#.into(),
                ))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    r#"[{"id":"u1","display_name":"Ash"},
                        {"id":"u2","display_name":"Bea"}]"#,
                )
                .create_async()
                .await;

            let ids = [VoterId::from("u2"), VoterId::from("u9"), VoterId::from("u1")];
            let names = store_for(&server).resolve_voter_names(&ids).await.unwrap();

            assert_eq!(
                names,
                vec![Some("Bea".to_string()), None, Some("Ash".to_string())]
            );
        }

        #[tokio::test]
        async fn list_activities_decodes_nested_select() {
            let mut server = Server::new_async().await;
            server
                .mock("GET", table(ACTIVITIES_TABLE))
                .match_query(Matcher::UrlEncoded(
                    "select".into(),
                    "*,poll_options(*,votes(*))".into(),
                ))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(
                    r#"[{"id":"a1","name":"Picnic","creator":"Admin","location":"Park",
                        "date":"2026-06-01","created_at":"2026-05-01T10:00:00+00:00",
                        "poll_options":[
                          {"id":"o1","activity_id":"a1","text":"Cake","votes":[
                            {"id":"v1","poll_option_id":"o1","voter_id":"u1",
                             "created_at":"2026-05-02T10:00:00+00:00"}]},
                          {"id":"o2","activity_id":"a1","text":"Fruit","votes":[]}]}]"#,
                )
                .create_async()
                .await;

            let snapshots = store_for(&server).list_activities_with_polls().await.unwrap();

            assert_eq!(snapshots.len(), 1);
            let snapshot = &snapshots[0];
            assert_eq!(snapshot.activity.id.as_str(), "a1");
            assert_eq!(snapshot.activity.time, None);
            assert_eq!(snapshot.poll_options.len(), 2);
            assert_eq!(snapshot.poll_options[0].votes[0].voter_id.as_str(), "u1");
            assert!(snapshot.poll_options[1].votes.is_empty());
        }
    }
}
