use serde::Serialize;
use std::time::Duration;

// Post-match result forwarded to the persistence collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub player_id: String,
    pub score: u32,
    pub mode: &'static str,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum StatsError {
    Http(reqwest::Error),
    Status(reqwest::StatusCode),
}

// Thin reqwest client for stat/achievement/leaderboard updates.
// Callers fire requests from spawned tasks; a failure here must never reach
// room lifecycle code.
#[derive(Clone)]
pub struct StatsClient {
    http: reqwest::Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub async fn report_match_result(&self, result: &MatchResult) -> Result<(), StatsError> {
        let url = format!("{}/internal/match-results", self.base_url);
        let response = self
            .http
            .post(url)
            .json(result)
            .send()
            .await
            .map_err(StatsError::Http)?;

        if !response.status().is_success() {
            return Err(StatsError::Status(response.status()));
        }
        Ok(())
    }
}
