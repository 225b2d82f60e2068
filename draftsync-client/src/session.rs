//! Client-side logging session state shared by the queue and the transport.

use draftsync_core::LoggedSetDraft;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sets logged since the last automatic sync, and the full snapshot the UI
/// currently believes in.
#[derive(Debug, Default)]
pub struct SessionState {
    pub pending: Vec<LoggedSetDraft>,
    pub current: Vec<LoggedSetDraft>,
    /// Bumped whenever the pending backlog is discarded.
    epoch: u64,
}

impl SessionState {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drop the backlog. Syncs submitted before this call no longer drain anything.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
        self.epoch += 1;
    }
}

/// Shared handle to a [`SessionState`]. The lock is never held across an await.
#[derive(Debug, Clone, Default)]
pub struct SharedSession(Arc<Mutex<SessionState>>);

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn current(&self) -> Vec<LoggedSetDraft> {
        self.lock().current.clone()
    }

    /// Drop the oldest `count` pending sets after they reached the server.
    /// Sets appended while the request was in flight stay pending, and a
    /// backlog cleared since `epoch` is left alone.
    pub fn drain_pending(&self, count: usize, epoch: u64) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        let count = count.min(state.pending.len());
        state.pending.drain(..count);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_keeps_newer_sets() {
        let session = SharedSession::new();
        {
            let mut state = session.lock();
            state.pending.push(LoggedSetDraft::new("squat", 1, 5, 100.0));
            state.pending.push(LoggedSetDraft::new("squat", 2, 5, 100.0));
            state.pending.push(LoggedSetDraft::new("squat", 3, 5, 100.0));
        }
        assert!(session.drain_pending(2, 0));
        assert_eq!(session.pending_count(), 1);
        assert_eq!(session.lock().pending[0].set_number, 3);

        assert!(session.drain_pending(10, 0));
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_drain_after_clear_is_ignored() {
        let session = SharedSession::new();
        session.lock().pending.push(LoggedSetDraft::new("squat", 1, 5, 100.0));
        let epoch = session.lock().epoch();

        session.lock().clear_pending();
        session.lock().pending.push(LoggedSetDraft::new("squat", 2, 5, 100.0));

        assert!(!session.drain_pending(1, epoch));
        assert_eq!(session.pending_count(), 1);
        assert_eq!(session.lock().epoch(), epoch + 1);
    }
}
