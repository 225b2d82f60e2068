//! Sync progress callbacks.

use tokio::sync::mpsc;

/// Observer of sync progress. Every failure is reported through
/// [`SyncListener::on_sync_error`] with a flag telling whether a retry is
/// already scheduled.
pub trait SyncListener: Send + Sync {
    fn on_sync_start(&self, _count: usize) {}
    fn on_sync_success(&self, _count: usize) {}
    fn on_sync_error(&self, _message: &str, _will_retry: bool) {}
    fn on_retry_start(&self) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SyncListener for NoopListener {}

/// A listener callback as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started { count: usize },
    Succeeded { count: usize },
    Failed { message: String, will_retry: bool },
    RetryStarted,
}

/// Forwards callbacks as [`SyncEvent`]s over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SyncEvent) {
        // Receiver gone means nobody is watching.
        let _ = self.tx.send(event);
    }
}

impl SyncListener for ChannelListener {
    fn on_sync_start(&self, count: usize) {
        self.send(SyncEvent::Started { count });
    }

    fn on_sync_success(&self, count: usize) {
        self.send(SyncEvent::Succeeded { count });
    }

    fn on_sync_error(&self, message: &str, will_retry: bool) {
        self.send(SyncEvent::Failed { message: message.to_string(), will_retry });
    }

    fn on_retry_start(&self) {
        self.send(SyncEvent::RetryStarted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_listener_forwards() {
        let (listener, mut rx) = ChannelListener::new();
        listener.on_sync_start(3);
        listener.on_sync_error("boom", true);
        listener.on_retry_start();
        listener.on_sync_success(3);

        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Started { count: 3 });
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncEvent::Failed { message: "boom".into(), will_retry: true }
        );
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::RetryStarted);
        assert_eq!(rx.try_recv().unwrap(), SyncEvent::Succeeded { count: 3 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_sync_start(1);
    }
}
