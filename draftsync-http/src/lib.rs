//! DraftSync HTTP Protocol Implementation
//!
//! Routes the draft endpoints onto a [`DraftReconciler`] and renders JSON
//! responses.

pub mod handlers;

pub use handlers::{DraftRoute, bearer_token, handle_draft_request, json_error, json_ok, parse_route};

use bytes::Bytes;
use draftsync_core::{AuthResult, DraftReconciler, DraftStore, IdentityProvider, WorkoutCatalog};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Request, Response};
use std::sync::Arc;

/// HTTP layer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1 MB
        }
    }
}

/// Draft endpoint request handler
pub struct DraftHandler<S> {
    config: Config,
    reconciler: Arc<DraftReconciler<S>>,
    identity: Arc<dyn IdentityProvider>,
}

impl<S: WorkoutCatalog + DraftStore + 'static> DraftHandler<S> {
    /// Create a new handler with default config
    pub fn new(reconciler: DraftReconciler<S>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_config(Config::default(), reconciler, identity)
    }

    /// Create a new handler with custom config
    pub fn with_config(config: Config, reconciler: DraftReconciler<S>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            config,
            reconciler: Arc::new(reconciler),
            identity,
        }
    }

    /// Handle an incoming HTTP request
    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, HttpError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().as_str().to_string();
        let path = req.uri().path().to_string();

        tracing::debug!("Draft request: {} {}", method, path);

        let token = bearer_token(req.headers()).map(str::to_string);
        let user = match token {
            Some(token) => match self.identity.identify(&token).await {
                AuthResult::Success(user) => Some(user),
                AuthResult::Failed => None,
                AuthResult::Error(e) => return Err(HttpError::Identity(e)),
            },
            None => None,
        };

        let body = match Limited::new(req.into_body(), self.config.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                tracing::warn!("Rejected oversized body for {} {}", method, path);
                return Ok(json_error(413, "Request body too large", None));
            }
            Err(e) => {
                tracing::warn!("Failed to read body for {} {}: {}", method, path, e);
                return Ok(json_error(400, "Failed to read request body", None));
            }
        };

        // SQLite transactions block; keep them off the async workers.
        let reconciler = self.reconciler.clone();
        let response = tokio::task::spawn_blocking(move || {
            handle_draft_request(&reconciler, user.as_deref(), &method, &path, &body)
        })
        .await;

        match response {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!("Draft request task failed: {}", e);
                Ok(json_error(500, "Internal server error", None))
            }
        }
    }
}

/// HTTP layer errors
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Identity provider error: {0}")]
    Identity(String),
}
