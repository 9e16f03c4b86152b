use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::models::SnapshotSet;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("scoring source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

/// Where snapshots come from. The poll loop only needs one request per tick.
pub trait ScoreSource {
    fn fetch(&self, team_ids: &[String]) -> impl Future<Output = Result<SnapshotSet, PollError>>;
}

pub struct HttpScoreSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpScoreSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PollError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                PollError::SourceUnavailable(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn info_url(&self, team_ids: &[String]) -> String {
        format!("{}/info?teams={}", self.base_url, team_ids.join(","))
    }
}

impl ScoreSource for HttpScoreSource {
    async fn fetch(&self, team_ids: &[String]) -> Result<SnapshotSet, PollError> {
        let url = self.info_url(team_ids);
        debug!("Fetching {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| PollError::SourceUnavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::SourceUnavailable(format!(
                "{url} returned {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| PollError::SourceUnavailable(err.to_string()))?;
        decode_response(&body)
    }
}

/// Decodes a poll body. Accepts a superjson envelope (`{"json": .., "meta": ..}`) or the bare
/// mapping; dates arrive as ISO-8601 strings either way.
pub fn decode_response(body: &str) -> Result<SnapshotSet, PollError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| PollError::MalformedSnapshot(format!("invalid JSON: {err}")))?;

    let payload = match value {
        serde_json::Value::Object(mut object)
            if object.contains_key("json")
                && object.keys().all(|key| key == "json" || key == "meta") =>
        {
            object.remove("json").unwrap_or(serde_json::Value::Null)
        }
        other => other,
    };

    if payload.is_null() {
        return Err(PollError::MalformedSnapshot("empty response".to_string()));
    }

    serde_json::from_value::<SnapshotSet>(payload)
        .map_err(|err| PollError::MalformedSnapshot(err.to_string()))
}
