//! DraftSync Core Library
//!
//! Core functionality for DraftSync including:
//! - Logged set model and snapshot validation
//! - Draft records and wire types
//! - Store traits and the SQLite draft store
//! - Identity providers
//! - Draft reconciliation (validate, authorize, replace in one transaction)
//! - Server configuration

pub mod auth;
pub mod config;
pub mod draft;
pub mod reconcile;
pub mod set;
pub mod store;

pub use auth::{AuthResult, IdentityProvider, StaticTokenProvider, TokenFileProvider};
pub use config::ServerConfig;
pub use draft::{DraftEnvelope, DraftStatus, DraftSummary, DraftView, ErrorBody, SyncResponse, Workout};
pub use reconcile::{ChangeKind, DraftReconciler, ReconcileError, ReconcilerOptions};
pub use set::{LoggedSetDraft, ValidationError, validate_snapshot};
pub use store::{DraftStore, ReplaceOutcome, SqliteDraftStore, StoreError, WorkoutCatalog};
