//! Server-side draft reconciliation.
//!
//! Makes the authoritative draft of `(workout, user)` hold exactly the
//! submitted snapshot. Preconditions are checked in a fixed order and each
//! failure short-circuits before the store is touched; the replacement itself
//! is one transaction inside [`DraftStore::replace_sets`].

use crate::draft::{DraftStatus, DraftSummary, DraftView};
use crate::set::{ValidationError, foreign_exercise_ids, parse_snapshot};
use crate::store::{DraftStore, StoreError, WorkoutCatalog};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciliation failures, one variant per precondition.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("loggedSets must be an array")]
    MalformedBody,

    #[error("{0}")]
    InvalidSet(ValidationError),

    #[error("Workout not found: {0}")]
    WorkoutNotFound(String),

    #[error("Not the owner of workout {0}")]
    NotOwner(String),

    #[error("Exercises do not belong to this workout: {}", .0.join(", "))]
    UnknownExercises(Vec<String>),

    #[error("Empty snapshot would delete {0} logged sets")]
    EmptySnapshotRejected(usize),

    #[error("Workout already completed")]
    AlreadyCompleted,

    #[error("No draft to abandon")]
    NoDraft,

    #[error("Internal error: {0}")]
    Store(StoreError),
}

impl ReconcileError {
    /// HTTP status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            ReconcileError::Unauthenticated => 401,
            ReconcileError::MalformedBody => 400,
            ReconcileError::NotOwner(_) => 403,
            ReconcileError::WorkoutNotFound(_) | ReconcileError::NoDraft => 404,
            ReconcileError::AlreadyCompleted => 409,
            ReconcileError::InvalidSet(_)
            | ReconcileError::UnknownExercises(_)
            | ReconcileError::EmptySnapshotRejected(_) => 422,
            ReconcileError::Store(_) => 500,
        }
    }

    /// Offending exercise ids, for clients that want to refetch the workout.
    pub fn invalid_exercise_ids(&self) -> Option<&[String]> {
        match self {
            ReconcileError::UnknownExercises(ids) => Some(ids),
            _ => None,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyCompleted => ReconcileError::AlreadyCompleted,
            other => ReconcileError::Store(other),
        }
    }
}

/// How a replacement changed the draft. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    DeletionOnly,
    PartialDeletion,
    Addition,
    SameLengthUpdate,
    NoOp,
}

impl ChangeKind {
    pub fn classify(previous: Option<usize>, applied: usize) -> Self {
        match previous {
            None => ChangeKind::Created,
            Some(0) if applied == 0 => ChangeKind::NoOp,
            Some(_) if applied == 0 => ChangeKind::DeletionOnly,
            Some(p) if applied < p => ChangeKind::PartialDeletion,
            Some(p) if applied > p => ChangeKind::Addition,
            Some(_) => ChangeKind::SameLengthUpdate,
        }
    }
}

/// Reconciler policy knobs.
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// Accept an empty snapshot against a draft that still has sets.
    pub allow_empty_snapshots: bool,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self { allow_empty_snapshots: true }
    }
}

/// Applies client snapshots to the authoritative draft.
pub struct DraftReconciler<S> {
    store: Arc<S>,
    options: ReconcilerOptions,
}

impl<S> Clone for DraftReconciler<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), options: self.options.clone() }
    }
}

impl<S: WorkoutCatalog + DraftStore> DraftReconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_options(store, ReconcilerOptions::default())
    }

    pub fn with_options(store: Arc<S>, options: ReconcilerOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Replace the caller's draft for `workout_id` with the `loggedSets` of `body`.
    pub fn reconcile(&self, user_id: Option<&str>, workout_id: &str, body: &Value) -> Result<DraftSummary, ReconcileError> {
        let user_id = user_id.ok_or(ReconcileError::Unauthenticated)?;

        let sets = parse_snapshot(body).map_err(|e| match e {
            ValidationError::NotAnArray => ReconcileError::MalformedBody,
            other => ReconcileError::InvalidSet(other),
        })?;

        self.authorize(user_id, workout_id)
            .and_then(|workout| {
                let foreign = foreign_exercise_ids(&sets, workout.exercise_ids.iter().map(String::as_str));
                if foreign.is_empty() { Ok(()) } else { Err(ReconcileError::UnknownExercises(foreign)) }
            })?;

        if sets.is_empty() && !self.options.allow_empty_snapshots {
            if let Some(n) = self.store.draft_set_count(workout_id, user_id)?.filter(|n| *n > 0) {
                return Err(ReconcileError::EmptySnapshotRejected(n));
            }
        }

        let outcome = self.store.replace_sets(workout_id, user_id, &sets)?;
        let kind = ChangeKind::classify(outcome.previous_count, outcome.applied);
        let previous = outcome.previous_count.unwrap_or(0);
        match kind {
            ChangeKind::DeletionOnly => warn!(
                "Draft {} of workout {} cleared: {} sets deleted, none submitted",
                outcome.draft_id, workout_id, previous
            ),
            ChangeKind::PartialDeletion => info!(
                "Draft {} of workout {} shrank from {} to {} sets",
                outcome.draft_id, workout_id, previous, outcome.applied
            ),
            ChangeKind::Addition => info!(
                "Draft {} of workout {} grew from {} to {} sets",
                outcome.draft_id, workout_id, previous, outcome.applied
            ),
            ChangeKind::Created => info!(
                "Draft {} created for workout {} with {} sets",
                outcome.draft_id, workout_id, outcome.applied
            ),
            ChangeKind::SameLengthUpdate | ChangeKind::NoOp => debug!(
                "Draft {} of workout {} rewritten ({} sets, {:?})",
                outcome.draft_id, workout_id, outcome.applied, kind
            ),
        }

        Ok(DraftSummary {
            id: outcome.draft_id,
            last_updated: outcome.last_updated,
            status: DraftStatus::Draft,
            sets_count: outcome.applied,
        })
    }

    /// The caller's current draft for `workout_id`, if any.
    pub fn current_draft(&self, user_id: Option<&str>, workout_id: &str) -> Result<Option<DraftView>, ReconcileError> {
        let user_id = user_id.ok_or(ReconcileError::Unauthenticated)?;
        self.authorize(user_id, workout_id)?;
        Ok(self.store.load_draft(workout_id, user_id)?)
    }

    /// Discard the caller's draft for `workout_id`.
    pub fn abandon(&self, user_id: Option<&str>, workout_id: &str) -> Result<(), ReconcileError> {
        let user_id = user_id.ok_or(ReconcileError::Unauthenticated)?;
        self.authorize(user_id, workout_id)?;
        if self.store.abandon_draft(workout_id, user_id)? {
            info!("Draft of workout {} abandoned by {}", workout_id, user_id);
            Ok(())
        } else {
            Err(ReconcileError::NoDraft)
        }
    }

    fn authorize(&self, user_id: &str, workout_id: &str) -> Result<crate::draft::Workout, ReconcileError> {
        let workout = self
            .store
            .workout(workout_id)?
            .ok_or_else(|| ReconcileError::WorkoutNotFound(workout_id.to_string()))?;
        if workout.owner_id != user_id {
            return Err(ReconcileError::NotOwner(workout_id.to_string()));
        }
        Ok(workout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(ChangeKind::classify(None, 0), ChangeKind::Created);
        assert_eq!(ChangeKind::classify(Some(0), 0), ChangeKind::NoOp);
        assert_eq!(ChangeKind::classify(Some(4), 0), ChangeKind::DeletionOnly);
        assert_eq!(ChangeKind::classify(Some(4), 2), ChangeKind::PartialDeletion);
        assert_eq!(ChangeKind::classify(Some(2), 4), ChangeKind::Addition);
        assert_eq!(ChangeKind::classify(Some(3), 3), ChangeKind::SameLengthUpdate);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ReconcileError::Unauthenticated.status(), 401);
        assert_eq!(ReconcileError::MalformedBody.status(), 400);
        assert_eq!(ReconcileError::NotOwner("w".into()).status(), 403);
        assert_eq!(ReconcileError::WorkoutNotFound("w".into()).status(), 404);
        assert_eq!(ReconcileError::UnknownExercises(vec![]).status(), 422);
        assert_eq!(ReconcileError::AlreadyCompleted.status(), 409);
        assert_eq!(ReconcileError::from(StoreError::Poisoned).status(), 500);
    }
}
