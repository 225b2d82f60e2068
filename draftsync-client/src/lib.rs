//! DraftSync client library
//!
//! Client half of the draft protocol:
//! - [`LocalQueue`]: collects logged sets and decides when to sync
//! - [`SyncTransport`]: validated, single-flight, retried snapshot submission
//! - [`HttpDraftApi`]: reqwest client for the draft endpoints
//! - [`SyncListener`]: progress callbacks

pub mod config;
pub mod events;
pub mod queue;
pub mod remote;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use events::{ChannelListener, NoopListener, SyncEvent, SyncListener};
pub use queue::{LocalQueue, QueueStatus};
pub use remote::{ApiError, DraftApi, HttpDraftApi};
pub use session::{SessionState, SharedSession};
pub use transport::{SyncError, SyncOutcome, SyncTrack, SyncTransport, TransportConfig};
