//! Blocking client for the football-data.org v4 API.
//!
//! Every request carries the `X-Auth-Token` credential. A `429 Too Many
//! Requests` answer is absorbed here: the client sleeps for the server's
//! advertised wait and re-issues the identical request, as often as the
//! [`RetryPolicy`] allows. Every other failure goes straight back to the
//! caller.

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, RetryPolicy};
use crate::error::{ConfigError, FetchError};
use crate::http_client::{ApiRequest, HttpTransport, RawResponse, Transport};
use crate::records::MatchStatus;

const TOO_MANY_REQUESTS: u16 = 429;
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;
const RETRY_AFTER_HEADERS: &[&str] = &["retry-after", "x-ratelimit-reset", "x-requestcounter-reset"];

/// Where the client blocks while waiting out a rate limit.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Optional filters shared by the competition and team match listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFilter {
    pub season: Option<u32>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<MatchStatus>,
}

impl MatchFilter {
    pub fn between(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from: Some(date_from),
            date_to: Some(date_to),
            ..Self::default()
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut out = season_query(self.season);
        if let Some(date) = self.date_from {
            out.push(("dateFrom", date.format("%Y-%m-%d").to_string()));
        }
        if let Some(date) = self.date_to {
            out.push(("dateTo", date.format("%Y-%m-%d").to_string()));
        }
        if let Some(status) = &self.status {
            out.push(("status", status.as_str().to_string()));
        }
        out
    }
}

pub struct FootballApiClient {
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
}

impl std::fmt::Debug for FootballApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FootballApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FootballApiClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, transport, ThreadSleeper)?)
    }

    pub fn with_transport(
        config: &ApiConfig,
        transport: impl Transport + 'static,
        sleeper: impl Sleeper + 'static,
    ) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?
            .to_string();
        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry,
            transport: Box::new(transport),
            sleeper: Box::new(sleeper),
        })
    }

    /// GET `<base_url>/<path>` and parse the body as a JSON object.
    pub fn fetch(&self, path: &str, query: &[(&'static str, String)]) -> Result<Value, FetchError> {
        let request = ApiRequest {
            path: path.to_string(),
            url: format!("{}/{}", self.base_url, path.trim_start_matches('/')),
            query: query.to_vec(),
            auth_token: self.api_key.clone(),
        };

        let mut attempts = 0u32;
        let mut waited = Duration::ZERO;
        loop {
            let resp = self.transport.get(&request)?;
            if resp.status == TOO_MANY_REQUESTS {
                let wait = rate_limit_wait(&resp);
                if !self.retry.allows(attempts, waited, wait) {
                    return Err(FetchError::RateLimitExhausted {
                        path: request.path,
                        attempts,
                        waited,
                    });
                }
                warn!(path = %request.path, wait_secs = wait.as_secs(), "rate limited, waiting");
                self.sleeper.sleep(wait);
                attempts = attempts.saturating_add(1);
                waited = waited.saturating_add(wait);
                continue;
            }
            if !resp.is_success() {
                warn!(path = %request.path, status = resp.status, "api request failed");
                return Err(FetchError::Status {
                    path: request.path,
                    status: resp.status,
                    body: resp.body_excerpt(),
                });
            }
            debug!(path = %request.path, retries = attempts, "api request ok");
            return parse_object(&request.path, &resp.body);
        }
    }

    pub fn list_competitions(&self) -> Result<Vec<Value>, FetchError> {
        info!("fetching competitions");
        let data = self.fetch("competitions", &[])?;
        Ok(take_array(data, "competitions"))
    }

    pub fn list_teams(&self, competition_id: u32, season: Option<u32>) -> Result<Vec<Value>, FetchError> {
        info!(competition_id, "fetching teams");
        let path = format!("competitions/{competition_id}/teams");
        let data = self.fetch(&path, &season_query(season))?;
        Ok(take_array(data, "teams"))
    }

    pub fn list_matches(&self, competition_id: u32, filter: &MatchFilter) -> Result<Vec<Value>, FetchError> {
        info!(competition_id, "fetching matches");
        let path = format!("competitions/{competition_id}/matches");
        let data = self.fetch(&path, &filter.query())?;
        Ok(take_array(data, "matches"))
    }

    pub fn get_standings(&self, competition_id: u32, season: Option<u32>) -> Result<Value, FetchError> {
        info!(competition_id, "fetching standings");
        let path = format!("competitions/{competition_id}/standings");
        self.fetch(&path, &season_query(season))
    }

    pub fn get_team(&self, team_id: u32) -> Result<Value, FetchError> {
        info!(team_id, "fetching team");
        self.fetch(&format!("teams/{team_id}"), &[])
    }

    pub fn get_match(&self, match_id: u64) -> Result<Value, FetchError> {
        info!(match_id, "fetching match");
        self.fetch(&format!("matches/{match_id}"), &[])
    }

    pub fn list_team_matches(&self, team_id: u32, filter: &MatchFilter) -> Result<Vec<Value>, FetchError> {
        info!(team_id, "fetching team matches");
        let path = format!("teams/{team_id}/matches");
        let data = self.fetch(&path, &filter.query())?;
        Ok(take_array(data, "matches"))
    }
}

fn season_query(season: Option<u32>) -> Vec<(&'static str, String)> {
    season
        .map(|s| vec![("season", s.to_string())])
        .unwrap_or_default()
}

fn rate_limit_wait(resp: &RawResponse) -> Duration {
    let secs = RETRY_AFTER_HEADERS
        .iter()
        .find_map(|name| resp.header(name))
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS);
    Duration::from_secs(secs)
}

fn parse_object(path: &str, body: &str) -> Result<Value, FetchError> {
    let value = serde_json::from_str::<Value>(body.trim()).map_err(|err| FetchError::Decode {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    if !value.is_object() {
        return Err(FetchError::Decode {
            path: path.to_string(),
            reason: "expected a json object".to_string(),
        });
    }
    Ok(value)
}

fn take_array(mut data: Value, field: &str) -> Vec<Value> {
    match data.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::{parse_object, rate_limit_wait, take_array, MatchFilter};
    use crate::http_client::RawResponse;
    use crate::records::MatchStatus;

    #[test]
    fn rate_limit_wait_prefers_retry_after() {
        let resp = RawResponse::new(429, "")
            .with_header("X-RequestCounter-Reset", "12")
            .with_header("Retry-After", "7");
        assert_eq!(rate_limit_wait(&resp), Duration::from_secs(7));
    }

    #[test]
    fn rate_limit_wait_falls_back_to_counter_reset_then_default() {
        let resp = RawResponse::new(429, "").with_header("X-RequestCounter-Reset", "12");
        assert_eq!(rate_limit_wait(&resp), Duration::from_secs(12));

        let resp = RawResponse::new(429, "").with_header("Retry-After", "soon");
        assert_eq!(rate_limit_wait(&resp), Duration::from_secs(60));
    }

    #[test]
    fn match_filter_query_uses_api_names() {
        let filter = MatchFilter {
            season: Some(2024),
            date_from: NaiveDate::from_ymd_opt(2024, 9, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 10, 1),
            status: Some(MatchStatus::Finished),
        };
        assert_eq!(
            filter.query(),
            vec![
                ("season", "2024".to_string()),
                ("dateFrom", "2024-09-01".to_string()),
                ("dateTo", "2024-10-01".to_string()),
                ("status", "FINISHED".to_string()),
            ]
        );
        assert!(MatchFilter::default().query().is_empty());
    }

    #[test]
    fn take_array_tolerates_missing_field() {
        assert_eq!(take_array(json!({"count": 0}), "teams").len(), 0);
        assert_eq!(take_array(json!({"teams": [{"id": 1}]}), "teams").len(), 1);
    }

    #[test]
    fn non_object_body_is_a_decode_error() {
        assert!(parse_object("competitions", "[1, 2]").is_err());
        assert!(parse_object("competitions", "not json").is_err());
        assert!(parse_object("competitions", "{\"count\": 1}").is_ok());
    }
}
