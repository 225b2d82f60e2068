//! Draft records and the wire types built from them.

use crate::set::LoggedSetDraft;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a `(workout, user)` completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Draft,
    Completed,
    Skipped,
    Abandoned,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Completed => "completed",
            DraftStatus::Skipped => "skipped",
            DraftStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DraftStatus::Draft),
            "completed" => Ok(DraftStatus::Completed),
            "skipped" => Ok(DraftStatus::Skipped),
            "abandoned" => Ok(DraftStatus::Abandoned),
            other => Err(format!("Unknown draft status: {}", other)),
        }
    }
}

/// Read-model view of a workout: who owns it and which exercises it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    pub exercise_ids: Vec<String>,
}

/// Draft metadata returned after a successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub id: String,
    /// RFC 3339 timestamp of the last touch.
    pub last_updated: String,
    pub status: DraftStatus,
    pub sets_count: usize,
}

/// Success body of `POST /api/workouts/{id}/draft`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub draft: DraftSummary,
}

/// A persisted draft together with its materialized sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    pub id: String,
    pub last_updated: String,
    pub status: DraftStatus,
    /// Ordered by `(exercise_id, set_number)`.
    pub sets: Vec<LoggedSetDraft>,
}

/// Body of `GET /api/workouts/{id}/draft`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEnvelope {
    pub draft: Option<DraftView>,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_exercise_ids: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_str() {
        for s in [DraftStatus::Draft, DraftStatus::Completed, DraftStatus::Skipped, DraftStatus::Abandoned] {
            assert_eq!(s.as_str().parse::<DraftStatus>().unwrap(), s);
        }
        assert!("finished".parse::<DraftStatus>().is_err());
    }

    #[test]
    fn test_sync_response_shape() {
        let resp = SyncResponse {
            success: true,
            draft: DraftSummary {
                id: "d1".into(),
                last_updated: "2026-01-01T00:00:00Z".into(),
                status: DraftStatus::Draft,
                sets_count: 3,
            },
        };
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["draft"]["setsCount"], 3);
        assert_eq!(v["draft"]["lastUpdated"], "2026-01-01T00:00:00Z");
        assert_eq!(v["draft"]["status"], "draft");
    }

    #[test]
    fn test_error_body_omits_missing_ids() {
        let body = ErrorBody { error: "nope".into(), invalid_exercise_ids: None };
        let v = serde_json::to_value(&body).unwrap();
        assert!(v.get("invalidExerciseIds").is_none());
    }
}
