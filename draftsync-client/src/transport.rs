//! Retried, single-flight snapshot submission.
//!
//! One sync walks `Idle → Validating → InFlight` and ends in `Success`,
//! `RetryScheduled` (back to `InFlight` after a backoff) or `Failed`.
//!
//! - Validation is pure and never reaches the network.
//! - At most one request per workout is in flight; requests arriving
//!   meanwhile are dropped, not queued.
//! - 4xx is terminal. Network failures and 5xx are retried with exponential
//!   backoff until `max_retries` is used up.
//! - Retry timers are tokio tasks that can be cancelled per workout or all
//!   at once.

use crate::events::SyncListener;
use crate::remote::{ApiError, DraftApi};
use crate::session::SharedSession;
use draftsync_core::{DraftSummary, LoggedSetDraft, ValidationError, validate_snapshot};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Delay before the first retry; doubles for each further one.
    pub base_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: 2,
        }
    }
}

impl TransportConfig {
    /// `base_delay × 2^retry_index`, `retry_index` counting from 0.
    pub fn backoff(&self, retry_index: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry_index))
    }
}

/// Which bookkeeping a sync belongs to.
#[derive(Debug, Clone)]
pub enum SyncTrack {
    /// Threshold driven. On success the oldest `submitted_pending` sets of
    /// `session` are drained, unless the backlog was cleared after `epoch`.
    Automatic {
        session: SharedSession,
        submitted_pending: usize,
        epoch: u64,
    },
    /// Explicit snapshot push; never touches the pending queue.
    Manual,
}

/// Result of a sync request that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Synced(DraftSummary),
    /// Another request for the same workout was in flight.
    Skipped,
    /// Transient failure; attempt number `attempt` (1-based retry) runs after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server (or the response) said no; retrying would not help.
    #[error(transparent)]
    Rejected(ApiError),

    #[error("Sync failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: ApiError },
}

impl SyncError {
    /// HTTP status of the final response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Validation(_) => None,
            SyncError::Rejected(e) => e.status(),
            SyncError::RetriesExhausted { last, .. } => last.status(),
        }
    }

    /// Exercise ids the server reported as not belonging to the workout.
    pub fn invalid_exercise_ids(&self) -> &[String] {
        match self {
            SyncError::Rejected(ApiError::Status { invalid_exercise_ids, .. }) => invalid_exercise_ids,
            _ => &[],
        }
    }
}

struct ScheduledRetry {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    api: Arc<dyn DraftApi>,
    listener: Arc<dyn SyncListener>,
    config: TransportConfig,
    in_flight: Mutex<HashSet<String>>,
    retries: Mutex<HashMap<String, ScheduledRetry>>,
    next_retry_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Claim on a workout's in-flight flag. Dropping it releases the flag, so
/// every exit path (success, failure, panic, task abort) clears it.
struct InFlightGuard {
    inner: Arc<Inner>,
    workout_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.workout_id);
    }
}

/// Snapshot sync service. Cheap to clone; clones share flags and timers.
#[derive(Clone)]
pub struct SyncTransport {
    inner: Arc<Inner>,
}

impl SyncTransport {
    pub fn new(api: Arc<dyn DraftApi>, listener: Arc<dyn SyncListener>, config: TransportConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                listener,
                config,
                in_flight: Mutex::new(HashSet::new()),
                retries: Mutex::new(HashMap::new()),
                next_retry_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> TransportConfig {
        self.inner.config
    }

    pub fn api(&self) -> &Arc<dyn DraftApi> {
        &self.inner.api
    }

    pub fn is_in_flight(&self, workout_id: &str) -> bool {
        lock(&self.inner.in_flight).contains(workout_id)
    }

    pub fn has_retry_scheduled(&self, workout_id: &str) -> bool {
        lock(&self.inner.retries)
            .get(workout_id)
            .is_some_and(|retry| !retry.handle.is_finished())
    }

    /// Submit `sets` as the complete snapshot of `workout_id`.
    pub async fn sync(&self, workout_id: &str, sets: Vec<LoggedSetDraft>, track: SyncTrack) -> Result<SyncOutcome, SyncError> {
        if let Err(e) = validate_snapshot(workout_id, &sets) {
            warn!("Snapshot for workout {:?} failed validation: {}", workout_id, e);
            self.inner.listener.on_sync_error(&e.to_string(), false);
            return Err(e.into());
        }

        let Some(guard) = self.claim(workout_id) else {
            debug!("Sync for workout {} already in flight, dropping request", workout_id);
            return Ok(SyncOutcome::Skipped);
        };

        // A newer snapshot replaces whatever a pending retry would resend.
        if self.cancel_retries(workout_id) {
            debug!("Superseded scheduled retry for workout {}", workout_id);
        }

        if sets.is_empty() {
            warn!(
                "Submitting empty snapshot for workout {}: server will delete every logged set",
                workout_id
            );
        }

        self.inner.listener.on_sync_start(sets.len());
        self.run_attempt(guard, Arc::new(sets), track, 0).await
    }

    /// Cancel the scheduled retry of one workout. Returns whether one was pending.
    pub fn cancel_retries(&self, workout_id: &str) -> bool {
        match lock(&self.inner.retries).remove(workout_id) {
            Some(retry) => {
                let pending = !retry.handle.is_finished();
                retry.handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Cancel every scheduled retry. In-flight requests run to completion.
    pub fn shutdown(&self) {
        let retries: Vec<_> = lock(&self.inner.retries).drain().collect();
        if !retries.is_empty() {
            info!("Cancelling {} scheduled retries", retries.len());
        }
        for (_, retry) in retries {
            retry.handle.abort();
        }
    }

    /// Wait until no retry is scheduled. Retries scheduled while waiting are
    /// waited for too.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = lock(&self.inner.retries).drain().map(|(_, r)| r.handle).collect();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    fn claim(&self, workout_id: &str) -> Option<InFlightGuard> {
        if !lock(&self.inner.in_flight).insert(workout_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            inner: self.inner.clone(),
            workout_id: workout_id.to_string(),
        })
    }

    fn run_attempt(
        &self,
        guard: InFlightGuard,
        sets: Arc<Vec<LoggedSetDraft>>,
        track: SyncTrack,
        attempt: u32,
    ) -> BoxFuture<'_, Result<SyncOutcome, SyncError>> {
        Box::pin(async move {
            let workout_id = guard.workout_id.clone();
            let result = self.inner.api.submit_snapshot(&workout_id, &sets).await;

            if result.is_ok() {
                if let SyncTrack::Automatic { session, submitted_pending, epoch } = &track {
                    if !session.drain_pending(*submitted_pending, *epoch) {
                        debug!("Pending sets of workout {} were cleared during sync, nothing drained", workout_id);
                    }
                }
            }
            drop(guard);

            match result {
                Ok(summary) => {
                    info!(
                        "Synced {} sets for workout {} (draft {}, attempt {})",
                        sets.len(),
                        workout_id,
                        summary.id,
                        attempt + 1
                    );
                    self.inner.listener.on_sync_success(sets.len());
                    Ok(SyncOutcome::Synced(summary))
                }
                Err(e) if e.is_transient() && attempt < self.inner.config.max_retries => {
                    let delay = self.inner.config.backoff(attempt);
                    warn!(
                        "Sync attempt {} for workout {} failed: {}; retrying in {:?}",
                        attempt + 1,
                        workout_id,
                        e,
                        delay
                    );
                    self.schedule_retry(workout_id, sets, track, attempt + 1, delay);
                    self.inner.listener.on_sync_error(&e.to_string(), true);
                    Ok(SyncOutcome::RetryScheduled { attempt: attempt + 1, delay })
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Sync for workout {} failed after {} attempts: {}",
                        workout_id,
                        attempt + 1,
                        e
                    );
                    self.inner.listener.on_sync_error(&e.to_string(), false);
                    Err(SyncError::RetriesExhausted { attempts: attempt + 1, last: e })
                }
                Err(e) => {
                    warn!("Sync for workout {} rejected: {}", workout_id, e);
                    self.inner.listener.on_sync_error(&e.to_string(), false);
                    Err(SyncError::Rejected(e))
                }
            }
        })
    }

    fn schedule_retry(
        &self,
        workout_id: String,
        sets: Arc<Vec<LoggedSetDraft>>,
        track: SyncTrack,
        attempt: u32,
        delay: Duration,
    ) {
        let id = self.inner.next_retry_id.fetch_add(1, Ordering::Relaxed);
        let key = workout_id.clone();
        let this = self.clone();

        // Registered under the lock so the task cannot finish before its entry exists.
        let mut retries = lock(&self.inner.retries);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.forget_retry(&workout_id, id);

            let Some(guard) = this.claim(&workout_id) else {
                debug!("Retry for workout {} dropped, another sync is in flight", workout_id);
                this.inner
                    .listener
                    .on_sync_error("Retry superseded by another sync in flight", false);
                return;
            };
            this.inner.listener.on_retry_start();
            // The outcome has already been reported to the listener.
            let _ = this.run_attempt(guard, sets, track, attempt).await;
        });
        if let Some(previous) = retries.insert(key, ScheduledRetry { id, handle }) {
            previous.handle.abort();
        }
    }

    fn forget_retry(&self, workout_id: &str, id: u64) {
        let mut retries = lock(&self.inner.retries);
        if retries.get(workout_id).is_some_and(|r| r.id == id) {
            retries.remove(workout_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelListener, SyncEvent};
    use async_trait::async_trait;
    use draftsync_core::DraftView;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingApi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DraftApi for CountingApi {
        async fn submit_snapshot(&self, _workout_id: &str, _sets: &[LoggedSetDraft]) -> Result<DraftSummary, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Network("unreachable".into()))
        }

        async fn fetch_draft(&self, _workout_id: &str) -> Result<Option<DraftView>, ApiError> {
            Ok(None)
        }

        async fn abandon_draft(&self, _workout_id: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_blocked_by_in_flight_sync_reports_final_error() {
        let api = Arc::new(CountingApi::default());
        let (listener, mut rx) = ChannelListener::new();
        let config = TransportConfig {
            base_delay: Duration::from_millis(100),
            max_retries: 2,
        };
        let transport = SyncTransport::new(api.clone(), Arc::new(listener), config);

        let _held = transport.claim("w1");
        let sets = Arc::new(vec![LoggedSetDraft::new("squat", 1, 5, 100.0)]);
        transport.schedule_retry("w1".into(), sets, SyncTrack::Manual, 1, Duration::from_millis(100));
        transport.settle().await;

        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert!(!transport.has_retry_scheduled("w1"));
        match rx.try_recv() {
            Ok(SyncEvent::Failed { will_retry, .. }) => assert!(!will_retry),
            other => panic!("expected a terminal failure event, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let config = TransportConfig {
            base_delay: Duration::from_millis(100),
            max_retries: 4,
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));

        let huge = TransportConfig {
            base_delay: Duration::MAX,
            max_retries: 1,
        };
        assert_eq!(huge.backoff(3), Duration::MAX);
    }

    #[test]
    fn test_sync_error_accessors() {
        let rejected = SyncError::Rejected(ApiError::Status {
            status: 422,
            message: "Invalid exercise ids".into(),
            invalid_exercise_ids: vec!["bench".into()],
        });
        assert_eq!(rejected.status(), Some(422));
        assert_eq!(rejected.invalid_exercise_ids(), ["bench".to_string()]);

        let exhausted = SyncError::RetriesExhausted {
            attempts: 3,
            last: ApiError::Network("timeout".into()),
        };
        assert_eq!(exhausted.status(), None);
        assert!(exhausted.invalid_exercise_ids().is_empty());
        assert!(exhausted.to_string().contains("3 attempts"));
    }
}
