//! Logged set model and snapshot validation.
//!
//! A snapshot is the complete list of sets the client currently believes in.
//! Both sides validate it: the client before anything touches the network,
//! the server before anything touches the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Default weight unit when a submitted set omits it.
pub const DEFAULT_WEIGHT_UNIT: &str = "lbs";

/// One logged exercise set, identified within a draft by
/// `(exercise_id, set_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedSetDraft {
    pub exercise_id: String,
    pub set_number: u32,
    pub reps: u32,
    #[serde(default)]
    pub weight: f64,
    #[serde(default = "default_weight_unit")]
    pub weight_unit: String,
    #[serde(default)]
    pub rpe: Option<f64>,
    #[serde(default)]
    pub rir: Option<u32>,
}

fn default_weight_unit() -> String {
    DEFAULT_WEIGHT_UNIT.to_string()
}

impl LoggedSetDraft {
    /// Create a set with the default unit and no effort ratings.
    pub fn new(exercise_id: impl Into<String>, set_number: u32, reps: u32, weight: f64) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            set_number,
            reps,
            weight,
            weight_unit: default_weight_unit(),
            rpe: None,
            rir: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.weight_unit = unit.into();
        self
    }

    pub fn with_rpe(mut self, rpe: f64) -> Self {
        self.rpe = Some(rpe);
        self
    }

    pub fn with_rir(mut self, rir: u32) -> Self {
        self.rir = Some(rir);
        self
    }

    /// Identity of the set inside its draft.
    pub fn key(&self) -> (&str, u32) {
        (&self.exercise_id, self.set_number)
    }
}

/// Why a snapshot was rejected before reaching the store or the network.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Workout identifier is required")]
    MissingWorkoutId,

    #[error("loggedSets must be an array")]
    NotAnArray,

    #[error("Invalid set at index {index}: {reason}")]
    InvalidElement { index: usize, reason: String },

    #[error("Duplicate set {set_number} for exercise {exercise_id}")]
    DuplicateSet { exercise_id: String, set_number: u32 },
}

/// Client-side pre-flight check. Pure, no I/O.
pub fn validate_snapshot(workout_id: &str, sets: &[LoggedSetDraft]) -> Result<(), ValidationError> {
    if workout_id.trim().is_empty() {
        return Err(ValidationError::MissingWorkoutId);
    }
    for (index, set) in sets.iter().enumerate() {
        check_set(index, set)?;
    }
    Ok(())
}

fn check_set(index: usize, set: &LoggedSetDraft) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidElement {
        index,
        reason: reason.to_string(),
    };
    if set.exercise_id.trim().is_empty() {
        return Err(invalid("exerciseId is required"));
    }
    if !set.weight.is_finite() {
        return Err(invalid("weight must be a number"));
    }
    if set.rpe.is_some_and(|r| !r.is_finite()) {
        return Err(invalid("rpe must be a number"));
    }
    Ok(())
}

/// Parse the `loggedSets` member of a request body.
///
/// Shape problems of the container (missing, null, not an array) are reported
/// as [`ValidationError::NotAnArray`] so callers can map them apart from
/// per-element problems.
pub fn parse_snapshot(body: &Value) -> Result<Vec<LoggedSetDraft>, ValidationError> {
    let items = body
        .get("loggedSets")
        .and_then(Value::as_array)
        .ok_or(ValidationError::NotAnArray)?;

    let mut sets = Vec::with_capacity(items.len());
    let mut seen = HashSet::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let set = parse_element(index, item)?;
        if !seen.insert((set.exercise_id.clone(), set.set_number)) {
            return Err(ValidationError::DuplicateSet {
                exercise_id: set.exercise_id,
                set_number: set.set_number,
            });
        }
        sets.push(set);
    }
    Ok(sets)
}

fn parse_element(index: usize, item: &Value) -> Result<LoggedSetDraft, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidElement { index, reason };

    match item.get("exerciseId") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        _ => return Err(invalid("exerciseId is required".into())),
    }
    for field in ["setNumber", "reps"] {
        if !item.get(field).is_some_and(Value::is_number) {
            return Err(invalid(format!("{} must be a number", field)));
        }
    }

    let set: LoggedSetDraft =
        serde_json::from_value(item.clone()).map_err(|e| invalid(e.to_string()))?;
    check_set(index, &set)?;
    Ok(set)
}

/// Exercise ids referenced by `sets` that are not in `allowed`, sorted and
/// de-duplicated.
pub fn foreign_exercise_ids<'a, I>(sets: &[LoggedSetDraft], allowed: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let allowed: HashSet<&str> = allowed.into_iter().collect();
    sets.iter()
        .map(|s| s.exercise_id.as_str())
        .filter(|id| !allowed.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_camel_case() {
        let set = LoggedSetDraft::new("bench", 1, 8, 135.0).with_rpe(8.5);
        let v = serde_json::to_value(&set).unwrap();
        assert_eq!(v["exerciseId"], "bench");
        assert_eq!(v["setNumber"], 1);
        assert_eq!(v["weightUnit"], "lbs");
        assert_eq!(v["rpe"], 8.5);
        assert!(v["rir"].is_null());
    }

    #[test]
    fn test_validate_rejects_empty_workout_id() {
        let err = validate_snapshot("  ", &[]).unwrap_err();
        assert_eq!(err, ValidationError::MissingWorkoutId);
    }

    #[test]
    fn test_validate_accepts_empty_snapshot() {
        assert!(validate_snapshot("w1", &[]).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_exercise() {
        let sets = vec![LoggedSetDraft::new("squat", 1, 5, 225.0), LoggedSetDraft::new("", 2, 5, 225.0)];
        match validate_snapshot("w1", &sets) {
            Err(ValidationError::InvalidElement { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_nan_weight() {
        let sets = vec![LoggedSetDraft::new("squat", 1, 5, f64::NAN)];
        assert!(validate_snapshot("w1", &sets).is_err());
    }

    #[test]
    fn test_parse_missing_array() {
        assert_eq!(parse_snapshot(&json!({})), Err(ValidationError::NotAnArray));
        assert_eq!(parse_snapshot(&json!({"loggedSets": null})), Err(ValidationError::NotAnArray));
        assert_eq!(parse_snapshot(&json!({"loggedSets": {"a": 1}})), Err(ValidationError::NotAnArray));
    }

    #[test]
    fn test_parse_defaults_optional_fields() {
        let sets = parse_snapshot(&json!({
            "loggedSets": [{"exerciseId": "row", "setNumber": 1, "reps": 10}]
        }))
        .unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].weight, 0.0);
        assert_eq!(sets[0].weight_unit, DEFAULT_WEIGHT_UNIT);
        assert_eq!(sets[0].rpe, None);
    }

    #[test]
    fn test_parse_rejects_string_reps() {
        let err = parse_snapshot(&json!({
            "loggedSets": [
                {"exerciseId": "row", "setNumber": 1, "reps": 10},
                {"exerciseId": "row", "setNumber": 2, "reps": "ten"}
            ]
        }))
        .unwrap_err();
        match err {
            ValidationError::InvalidElement { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains("reps"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_exercise_id() {
        let err = parse_snapshot(&json!({"loggedSets": [{"setNumber": 1, "reps": 3}]})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidElement { index: 0, .. }));
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        let err = parse_snapshot(&json!({
            "loggedSets": [
                {"exerciseId": "row", "setNumber": 1, "reps": 10},
                {"exerciseId": "row", "setNumber": 1, "reps": 8}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateSet { set_number: 1, .. }));
    }

    #[test]
    fn test_foreign_exercise_ids_sorted_unique() {
        let sets = vec![
            LoggedSetDraft::new("zz", 1, 1, 0.0),
            LoggedSetDraft::new("bench", 1, 1, 0.0),
            LoggedSetDraft::new("aa", 1, 1, 0.0),
            LoggedSetDraft::new("zz", 2, 1, 0.0),
        ];
        let foreign = foreign_exercise_ids(&sets, ["bench"]);
        assert_eq!(foreign, vec!["aa".to_string(), "zz".to_string()]);
    }
}
