//! SQLite-backed draft store
//!
//! Holds the workout read model (owner and exercise ids) and the draft
//! completion records with their set rows. The database runs in WAL mode;
//! every draft replacement is a single explicit transaction.

use crate::draft::{DraftStatus, DraftView, Workout};
use crate::set::LoggedSetDraft;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Workout already completed")]
    AlreadyCompleted,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What a replacement did, for the response and for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOutcome {
    pub draft_id: String,
    pub last_updated: String,
    /// Set count of the draft before this replacement, `None` if it was created.
    pub previous_count: Option<usize>,
    pub applied: usize,
}

/// Read model for workouts. Never mutated by the sync path.
pub trait WorkoutCatalog: Send + Sync {
    fn workout(&self, workout_id: &str) -> StoreResult<Option<Workout>>;
}

/// Transactional draft persistence.
pub trait DraftStore: Send + Sync {
    /// Make the `draft`-status record of `(workout_id, user_id)` own exactly
    /// `sets`, creating the record if needed. All or nothing.
    fn replace_sets(&self, workout_id: &str, user_id: &str, sets: &[LoggedSetDraft]) -> StoreResult<ReplaceOutcome>;

    /// The current `draft`-status record with its sets, if any.
    fn load_draft(&self, workout_id: &str, user_id: &str) -> StoreResult<Option<DraftView>>;

    /// Number of set rows owned by the current draft, if one exists.
    fn draft_set_count(&self, workout_id: &str, user_id: &str) -> StoreResult<Option<usize>>;

    /// Mark the current draft abandoned. Returns false if there was none.
    fn abandon_draft(&self, workout_id: &str, user_id: &str) -> StoreResult<bool>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workouts (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS workout_exercises (
    workout_id TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
    exercise_id TEXT NOT NULL,
    PRIMARY KEY (workout_id, exercise_id)
) WITHOUT ROWID;
CREATE TABLE IF NOT EXISTS draft_completions (
    id TEXT PRIMARY KEY,
    workout_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS one_open_draft
    ON draft_completions (workout_id, user_id) WHERE status = 'draft';
CREATE TABLE IF NOT EXISTS draft_sets (
    draft_id TEXT NOT NULL REFERENCES draft_completions(id) ON DELETE CASCADE,
    exercise_id TEXT NOT NULL,
    set_number INTEGER NOT NULL,
    reps INTEGER NOT NULL,
    weight REAL NOT NULL,
    weight_unit TEXT NOT NULL,
    rpe REAL,
    rir INTEGER,
    PRIMARY KEY (draft_id, exercise_id, set_number)
) WITHOUT ROWID;
";

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.execute_batch(SCHEMA)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn find_open_draft(conn: &Connection, workout_id: &str, user_id: &str) -> rusqlite::Result<Option<(String, String)>> {
    conn.query_row(
        "SELECT id, updated_at FROM draft_completions WHERE workout_id=?1 AND user_id=?2 AND status='draft'",
        params![workout_id, user_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
}

fn has_completed(conn: &Connection, workout_id: &str, user_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM draft_completions WHERE workout_id=?1 AND user_id=?2 AND status='completed')",
        params![workout_id, user_id],
        |r| r.get(0),
    )
}

fn count_sets(conn: &Connection, draft_id: &str) -> rusqlite::Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM draft_sets WHERE draft_id=?1",
        params![draft_id],
        |r| r.get(0),
    )?;
    Ok(n as usize)
}

fn insert_sets(tx: &Transaction<'_>, draft_id: &str, sets: &[LoggedSetDraft]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO draft_sets (draft_id,exercise_id,set_number,reps,weight,weight_unit,rpe,rir) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
    )?;
    for s in sets {
        stmt.execute(params![draft_id, s.exercise_id, s.set_number, s.reps, s.weight, s.weight_unit, s.rpe, s.rir])?;
    }
    Ok(())
}

fn load_sets(conn: &Connection, draft_id: &str) -> rusqlite::Result<Vec<LoggedSetDraft>> {
    let mut stmt = conn.prepare_cached(
        "SELECT exercise_id,set_number,reps,weight,weight_unit,rpe,rir FROM draft_sets \
         WHERE draft_id=?1 ORDER BY exercise_id, set_number",
    )?;
    let rows = stmt.query_map(params![draft_id], |r| {
        Ok(LoggedSetDraft {
            exercise_id: r.get(0)?,
            set_number: r.get(1)?,
            reps: r.get(2)?,
            weight: r.get(3)?,
            weight_unit: r.get(4)?,
            rpe: r.get(5)?,
            rir: r.get(6)?,
        })
    })?;
    rows.collect()
}

/// SQLite implementation of [`WorkoutCatalog`] and [`DraftStore`].
pub struct SqliteDraftStore {
    conn: Mutex<Connection>,
}

impl SqliteDraftStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        configure(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace a workout in the read model.
    pub fn put_workout(&self, workout: &Workout) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO workouts (id,owner_id,name) VALUES (?1,?2,?3) \
             ON CONFLICT(id) DO UPDATE SET owner_id=excluded.owner_id, name=excluded.name",
            params![workout.id, workout.owner_id, workout.name],
        )?;
        tx.execute("DELETE FROM workout_exercises WHERE workout_id=?1", params![workout.id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO workout_exercises (workout_id,exercise_id) VALUES (?1,?2)",
            )?;
            for ex in &workout.exercise_ids {
                stmt.execute(params![workout.id, ex])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Force the status of the current draft (finalize, skip). Administrative;
    /// the sync path never calls this.
    pub fn set_status(&self, workout_id: &str, user_id: &str, status: DraftStatus) -> StoreResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE draft_completions SET status=?3, updated_at=?4 \
             WHERE workout_id=?1 AND user_id=?2 AND status='draft'",
            params![workout_id, user_id, status.as_str(), now_rfc3339()],
        )?;
        Ok(n > 0)
    }

    /// Sets of the most recent record with the given status, in key order.
    pub fn sets_with_status(&self, workout_id: &str, user_id: &str, status: DraftStatus) -> StoreResult<Vec<LoggedSetDraft>> {
        let conn = self.conn()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM draft_completions WHERE workout_id=?1 AND user_id=?2 AND status=?3 \
                 ORDER BY updated_at DESC LIMIT 1",
                params![workout_id, user_id, status.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(load_sets(&conn, &id)?),
            None => Ok(Vec::new()),
        }
    }

    fn replace_in_tx(tx: &Transaction<'_>, workout_id: &str, user_id: &str, sets: &[LoggedSetDraft]) -> StoreResult<ReplaceOutcome> {
        if has_completed(tx, workout_id, user_id)? {
            return Err(StoreError::AlreadyCompleted);
        }

        let now = now_rfc3339();
        let existing = find_open_draft(tx, workout_id, user_id)?;
        let (draft_id, previous_count) = match existing {
            Some((id, _)) => {
                let previous = count_sets(tx, &id)?;
                tx.execute(
                    "UPDATE draft_completions SET updated_at=?2 WHERE id=?1",
                    params![id, now],
                )?;
                (id, Some(previous))
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO draft_completions (id,workout_id,user_id,status,created_at,updated_at) \
                     VALUES (?1,?2,?3,'draft',?4,?4)",
                    params![id, workout_id, user_id, now],
                )?;
                (id, None)
            }
        };

        tx.execute("DELETE FROM draft_sets WHERE draft_id=?1", params![draft_id])?;
        if !sets.is_empty() {
            insert_sets(tx, &draft_id, sets)?;
        }

        Ok(ReplaceOutcome {
            draft_id,
            last_updated: now,
            previous_count,
            applied: sets.len(),
        })
    }
}

impl WorkoutCatalog for SqliteDraftStore {
    fn workout(&self, workout_id: &str) -> StoreResult<Option<Workout>> {
        let conn = self.conn()?;
        let head: Option<(String, String)> = conn
            .query_row(
                "SELECT owner_id, name FROM workouts WHERE id=?1",
                params![workout_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((owner_id, name)) = head else {
            return Ok(None);
        };
        let mut stmt = conn.prepare_cached(
            "SELECT exercise_id FROM workout_exercises WHERE workout_id=?1 ORDER BY exercise_id",
        )?;
        let exercise_ids = stmt
            .query_map(params![workout_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(Workout {
            id: workout_id.to_string(),
            owner_id,
            name,
            exercise_ids,
        }))
    }
}

impl DraftStore for SqliteDraftStore {
    fn replace_sets(&self, workout_id: &str, user_id: &str, sets: &[LoggedSetDraft]) -> StoreResult<ReplaceOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        match Self::replace_in_tx(&tx, workout_id, user_id, sets) {
            Ok(outcome) => {
                tx.commit()?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    tracing::error!("Rollback failed for draft of workout {}: {}", workout_id, rb);
                }
                Err(e)
            }
        }
    }

    fn load_draft(&self, workout_id: &str, user_id: &str) -> StoreResult<Option<DraftView>> {
        let conn = self.conn()?;
        let Some((id, updated_at)) = find_open_draft(&conn, workout_id, user_id)? else {
            return Ok(None);
        };
        let sets = load_sets(&conn, &id)?;
        Ok(Some(DraftView {
            id,
            last_updated: updated_at,
            status: DraftStatus::Draft,
            sets,
        }))
    }

    fn draft_set_count(&self, workout_id: &str, user_id: &str) -> StoreResult<Option<usize>> {
        let conn = self.conn()?;
        match find_open_draft(&conn, workout_id, user_id)? {
            Some((id, _)) => Ok(Some(count_sets(&conn, &id)?)),
            None => Ok(None),
        }
    }

    fn abandon_draft(&self, workout_id: &str, user_id: &str) -> StoreResult<bool> {
        self.set_status(workout_id, user_id, DraftStatus::Abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_workout() -> SqliteDraftStore {
        let store = SqliteDraftStore::open_in_memory().unwrap();
        store
            .put_workout(&Workout {
                id: "w1".into(),
                owner_id: "alice".into(),
                name: "Push day".into(),
                exercise_ids: vec!["bench".into(), "ohp".into()],
            })
            .unwrap();
        store
    }

    #[test]
    fn test_workout_read_model() {
        let store = store_with_workout();
        let w = store.workout("w1").unwrap().unwrap();
        assert_eq!(w.owner_id, "alice");
        assert_eq!(w.exercise_ids, vec!["bench".to_string(), "ohp".to_string()]);
        assert!(store.workout("missing").unwrap().is_none());
    }

    #[test]
    fn test_replace_creates_then_touches() {
        let store = store_with_workout();
        let sets = vec![LoggedSetDraft::new("bench", 1, 8, 135.0)];
        let first = store.replace_sets("w1", "alice", &sets).unwrap();
        assert_eq!(first.previous_count, None);
        assert_eq!(first.applied, 1);

        let second = store.replace_sets("w1", "alice", &sets).unwrap();
        assert_eq!(second.draft_id, first.draft_id);
        assert_eq!(second.previous_count, Some(1));
        assert_eq!(store.draft_set_count("w1", "alice").unwrap(), Some(1));
    }

    #[test]
    fn test_load_draft_orders_sets() {
        let store = store_with_workout();
        let sets = vec![
            LoggedSetDraft::new("ohp", 2, 5, 95.0),
            LoggedSetDraft::new("bench", 2, 8, 135.0),
            LoggedSetDraft::new("ohp", 1, 5, 95.0),
            LoggedSetDraft::new("bench", 1, 8, 135.0).with_rpe(7.5).with_rir(2),
        ];
        store.replace_sets("w1", "alice", &sets).unwrap();
        let view = store.load_draft("w1", "alice").unwrap().unwrap();
        let keys: Vec<_> = view.sets.iter().map(|s| (s.exercise_id.as_str(), s.set_number)).collect();
        assert_eq!(keys, vec![("bench", 1), ("bench", 2), ("ohp", 1), ("ohp", 2)]);
        assert_eq!(view.sets[0].rpe, Some(7.5));
        assert_eq!(view.sets[0].rir, Some(2));
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let store = store_with_workout();
        let original = vec![LoggedSetDraft::new("bench", 1, 8, 135.0), LoggedSetDraft::new("bench", 2, 8, 135.0)];
        store.replace_sets("w1", "alice", &original).unwrap();

        // Duplicate key fails after the delete already ran inside the transaction.
        let broken = vec![LoggedSetDraft::new("ohp", 1, 5, 95.0), LoggedSetDraft::new("ohp", 1, 6, 95.0)];
        assert!(store.replace_sets("w1", "alice", &broken).is_err());

        let view = store.load_draft("w1", "alice").unwrap().unwrap();
        assert_eq!(view.sets, original);
    }

    #[test]
    fn test_completed_is_immutable() {
        let store = store_with_workout();
        let sets = vec![LoggedSetDraft::new("bench", 1, 8, 135.0)];
        store.replace_sets("w1", "alice", &sets).unwrap();
        assert!(store.set_status("w1", "alice", DraftStatus::Completed).unwrap());

        let err = store.replace_sets("w1", "alice", &[]).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyCompleted));
        assert_eq!(store.sets_with_status("w1", "alice", DraftStatus::Completed).unwrap(), sets);
        assert!(store.load_draft("w1", "alice").unwrap().is_none());
    }

    #[test]
    fn test_abandon_then_new_draft() {
        let store = store_with_workout();
        let first = store.replace_sets("w1", "alice", &[LoggedSetDraft::new("bench", 1, 8, 135.0)]).unwrap();
        assert!(store.abandon_draft("w1", "alice").unwrap());
        assert!(!store.abandon_draft("w1", "alice").unwrap());
        assert!(store.load_draft("w1", "alice").unwrap().is_none());

        let second = store.replace_sets("w1", "alice", &[]).unwrap();
        assert_ne!(first.draft_id, second.draft_id);
        assert_eq!(second.previous_count, None);
    }

    #[test]
    fn test_drafts_are_per_user() {
        let store = store_with_workout();
        store.replace_sets("w1", "alice", &[LoggedSetDraft::new("bench", 1, 8, 135.0)]).unwrap();
        store.replace_sets("w1", "bob", &[]).unwrap();
        assert_eq!(store.draft_set_count("w1", "alice").unwrap(), Some(1));
        assert_eq!(store.draft_set_count("w1", "bob").unwrap(), Some(0));
    }

    #[test]
    fn test_file_store_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("drafts.sqlite");
        {
            let store = SqliteDraftStore::open(&path).unwrap();
            store
                .put_workout(&Workout {
                    id: "w1".into(),
                    owner_id: "alice".into(),
                    name: String::new(),
                    exercise_ids: vec!["bench".into()],
                })
                .unwrap();
            store.replace_sets("w1", "alice", &[LoggedSetDraft::new("bench", 1, 8, 135.0)]).unwrap();
        }
        let store = SqliteDraftStore::open(&path).unwrap();
        assert_eq!(store.draft_set_count("w1", "alice").unwrap(), Some(1));
    }
}
