//! HTTP client for the draft endpoints.
//!
//! Talks to a draft server's `/api/workouts/{id}/draft` resource:
//! - POST the full snapshot
//! - GET the current draft
//! - DELETE (abandon) the draft

use async_trait::async_trait;
use draftsync_core::{DraftEnvelope, DraftSummary, DraftView, ErrorBody, LoggedSetDraft, SyncResponse};
use serde::Serialize;
use std::time::Duration;

/// Failure of a single draft API call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Server unreachable, timed out, or the connection dropped.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response.
    #[error("Server returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        invalid_exercise_ids: Vec<String>,
    },

    /// 2xx response whose body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Network failures and 5xx are worth retrying; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::InvalidResponse(_) | ApiError::InvalidUrl(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The server operations the sync machinery needs.
#[async_trait]
pub trait DraftApi: Send + Sync {
    /// Replace the server-side draft with `sets`.
    async fn submit_snapshot(&self, workout_id: &str, sets: &[LoggedSetDraft]) -> Result<DraftSummary, ApiError>;

    /// Current draft, `None` when there is none.
    async fn fetch_draft(&self, workout_id: &str) -> Result<Option<DraftView>, ApiError>;

    /// Abandon the current draft.
    async fn abandon_draft(&self, workout_id: &str) -> Result<(), ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotBody<'a> {
    logged_sets: &'a [LoggedSetDraft],
}

/// reqwest-backed [`DraftApi`].
pub struct HttpDraftApi {
    base_url: reqwest::Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpDraftApi {
    /// Create a client targeting `base_url` (e.g. `http://server:8080`).
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = reqwest::Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { base_url, token, http })
    }

    /// `{base}/api/workouts/{id}/draft` with the id percent-encoded.
    fn draft_url(&self, workout_id: &str) -> Result<reqwest::Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "workouts", workout_id, "draft"]);
        Ok(url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(error_from(resp).await)
        }
    }
}

async fn error_from(resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    let text = match resp.text().await {
        Ok(text) => text,
        Err(e) => return ApiError::Network(e.to_string()),
    };
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => ApiError::Status {
            status,
            message: body.error,
            invalid_exercise_ids: body.invalid_exercise_ids.unwrap_or_default(),
        },
        Err(_) => ApiError::Status {
            status,
            message: text,
            invalid_exercise_ids: Vec::new(),
        },
    }
}

#[async_trait]
impl DraftApi for HttpDraftApi {
    async fn submit_snapshot(&self, workout_id: &str, sets: &[LoggedSetDraft]) -> Result<DraftSummary, ApiError> {
        let url = self.draft_url(workout_id)?;
        let resp = self.send(self.http.post(url).json(&SnapshotBody { logged_sets: sets })).await?;
        let body: SyncResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("POST draft: {}", e)))?;
        Ok(body.draft)
    }

    async fn fetch_draft(&self, workout_id: &str) -> Result<Option<DraftView>, ApiError> {
        let url = self.draft_url(workout_id)?;
        let resp = self.send(self.http.get(url)).await?;
        let body: DraftEnvelope = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("GET draft: {}", e)))?;
        Ok(body.draft)
    }

    async fn abandon_draft(&self, workout_id: &str) -> Result<(), ApiError> {
        let url = self.draft_url(workout_id)?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpDraftApi {
        HttpDraftApi::new(base, Some("t".into()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_draft_url() {
        assert_eq!(
            api("http://localhost:8080").draft_url("w1").unwrap().as_str(),
            "http://localhost:8080/api/workouts/w1/draft"
        );
        assert_eq!(
            api("http://localhost:8080/").draft_url("leg day").unwrap().as_str(),
            "http://localhost:8080/api/workouts/leg%20day/draft"
        );
        assert_eq!(
            api("http://gym.local/sync/").draft_url("w/2").unwrap().as_str(),
            "http://gym.local/sync/api/workouts/w%2F2/draft"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpDraftApi::new("not a url", None, Duration::from_secs(1)),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpDraftApi::new("mailto:coach@example.com", None, Duration::from_secs(1)),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_classification() {
        let status = |status| ApiError::Status {
            status,
            message: String::new(),
            invalid_exercise_ids: vec![],
        };
        assert!(ApiError::Network("refused".into()).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(409).is_transient());
        assert!(!status(422).is_transient());
        assert!(!ApiError::InvalidResponse("x".into()).is_transient());
        assert_eq!(status(403).status(), Some(403));
    }
}
