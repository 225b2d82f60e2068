//! Decides when a logging session synchronizes.
//!
//! Every sync ships the full current snapshot, never just the pending sets:
//! the server replaces its draft wholesale, so a delta would delete whatever
//! it left out.

use crate::session::SharedSession;
use crate::transport::{SyncError, SyncOutcome, SyncTrack, SyncTransport};
use draftsync_core::LoggedSetDraft;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Read-only view of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending_count: usize,
    pub is_syncing: bool,
    pub has_retry_scheduled: bool,
}

/// Pending-set queue of one workout session.
pub struct LocalQueue {
    workout_id: String,
    sync_threshold: usize,
    session: SharedSession,
    transport: SyncTransport,
    closed: AtomicBool,
}

impl LocalQueue {
    /// `sync_threshold` pending sets trigger an automatic sync (0 syncs on every call).
    pub fn new(workout_id: impl Into<String>, transport: SyncTransport, sync_threshold: usize) -> Self {
        Self {
            workout_id: workout_id.into(),
            sync_threshold,
            session: SharedSession::new(),
            transport,
            closed: AtomicBool::new(false),
        }
    }

    pub fn workout_id(&self) -> &str {
        &self.workout_id
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Record newly logged sets and the UI's full snapshot.
    ///
    /// Returns `None` when the threshold is not reached. A single call that
    /// jumps past the threshold fires exactly one sync.
    pub async fn add_sets(
        &self,
        new_sets: Vec<LoggedSetDraft>,
        current_snapshot: Vec<LoggedSetDraft>,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        let due = {
            let mut state = self.session.lock();
            state.pending.extend(new_sets);
            state.current = current_snapshot;
            (state.pending.len() >= self.sync_threshold)
                .then(|| (state.current.clone(), state.pending.len(), state.epoch()))
        };

        match due {
            Some((snapshot, submitted_pending, epoch)) => {
                self.sync_automatic(snapshot, submitted_pending, epoch).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Automatic-track sync of whatever is pending, threshold or not.
    /// `None` when nothing is pending.
    pub async fn sync_now(&self) -> Result<Option<SyncOutcome>, SyncError> {
        let (snapshot, submitted_pending, epoch) = {
            let state = self.session.lock();
            if state.pending.is_empty() {
                return Ok(None);
            }
            (state.current.clone(), state.pending.len(), state.epoch())
        };
        self.sync_automatic(snapshot, submitted_pending, epoch).await.map(Some)
    }

    /// Manual-track sync of `snapshot`, which also becomes the current
    /// snapshot. Pending sets are left alone even on success.
    pub async fn sync_current_state(&self, snapshot: Vec<LoggedSetDraft>) -> Result<SyncOutcome, SyncError> {
        self.session.lock().current = snapshot.clone();
        self.transport.sync(&self.workout_id, snapshot, SyncTrack::Manual).await
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            pending_count: self.session.pending_count(),
            is_syncing: self.transport.is_in_flight(&self.workout_id),
            has_retry_scheduled: self.transport.has_retry_scheduled(&self.workout_id),
        }
    }

    /// Drop the backlog and cancel scheduled retries. No network call.
    pub fn clear_queue(&self) {
        self.session.lock().clear_pending();
        self.transport.cancel_retries(&self.workout_id);
    }

    /// Message for the UI when leaving would lose unsynced sets.
    pub fn unsaved_warning(&self) -> Option<String> {
        match self.session.pending_count() {
            0 => None,
            1 => Some("You have 1 unsaved set that has not been synced.".to_string()),
            n => Some(format!("You have {} unsaved sets that have not been synced.", n)),
        }
    }

    /// Cancel this session's retry timers and warn about unsynced sets.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(message) = self.unsaved_warning() {
            warn!("Closing workout {} session: {}", self.workout_id, message);
        }
        self.transport.cancel_retries(&self.workout_id);
    }

    async fn sync_automatic(
        &self,
        snapshot: Vec<LoggedSetDraft>,
        submitted_pending: usize,
        epoch: u64,
    ) -> Result<SyncOutcome, SyncError> {
        let track = SyncTrack::Automatic {
            session: self.session.clone(),
            submitted_pending,
            epoch,
        };
        self.transport.sync(&self.workout_id, snapshot, track).await
    }
}

impl Drop for LocalQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
