//! HTTP handlers for the workout draft endpoints.
//!
//! Endpoints:
//!   POST   /api/workouts/{id}/draft   → replace the caller's draft with a snapshot
//!   GET    /api/workouts/{id}/draft   → current draft with its sets (or null)
//!   DELETE /api/workouts/{id}/draft   → abandon the caller's draft
//!
//! Error statuses: 400, 401, 403, 404, 422 and 500, plus 409 when the
//! workout's draft is already completed. Clients treat 409 like any other
//! 4xx: terminal, never retried.

use bytes::Bytes;
use draftsync_core::{
    DraftEnvelope, DraftReconciler, DraftStore, ErrorBody, ReconcileError, SyncResponse, WorkoutCatalog,
};
use http_body_util::Full;
use hyper::Response;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use serde_json::Value;

/// A request path that addresses a workout draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRoute {
    pub workout_id: String,
}

/// Match `/api/workouts/{id}/draft`. The id is percent-decoded.
pub fn parse_route(path: &str) -> Option<DraftRoute> {
    let rest = path.strip_prefix("/api/workouts/")?;
    let id = rest.strip_suffix("/draft").or_else(|| rest.strip_suffix("/draft/"))?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(DraftRoute { workout_id: percent_decode(id) })
}

/// Token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// ─────────────────────────────────────────────────────
// Public dispatch
// ─────────────────────────────────────────────────────

/// Route a draft request. `user` is the identity already resolved from the
/// request, `None` when the caller is anonymous.
pub fn handle_draft_request<S: WorkoutCatalog + DraftStore>(
    reconciler: &DraftReconciler<S>,
    user: Option<&str>,
    method: &str,
    path: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let Some(route) = parse_route(path) else {
        return json_error(404, &format!("Unknown endpoint: {} {}", method, path), None);
    };

    match method {
        "POST" => handle_sync(reconciler, user, &route, body),
        "GET" => handle_get(reconciler, user, &route),
        "DELETE" => handle_abandon(reconciler, user, &route),
        _ => json_error(405, "Method Not Allowed", None),
    }
}

// ─────────────────────────────────────────────────────
// POST /api/workouts/{id}/draft
// ─────────────────────────────────────────────────────

fn handle_sync<S: WorkoutCatalog + DraftStore>(
    reconciler: &DraftReconciler<S>,
    user: Option<&str>,
    route: &DraftRoute,
    body: &[u8],
) -> Response<Full<Bytes>> {
    if user.is_none() {
        return reconcile_error(&ReconcileError::Unauthenticated);
    }
    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return json_error(400, &format!("Invalid JSON body: {}", e), None),
    };

    match reconciler.reconcile(user, &route.workout_id, &payload) {
        Ok(draft) => json_ok(&SyncResponse { success: true, draft }),
        Err(e) => reconcile_error(&e),
    }
}

// ─────────────────────────────────────────────────────
// GET /api/workouts/{id}/draft
// ─────────────────────────────────────────────────────

fn handle_get<S: WorkoutCatalog + DraftStore>(
    reconciler: &DraftReconciler<S>,
    user: Option<&str>,
    route: &DraftRoute,
) -> Response<Full<Bytes>> {
    match reconciler.current_draft(user, &route.workout_id) {
        Ok(draft) => json_ok(&DraftEnvelope { draft }),
        Err(e) => reconcile_error(&e),
    }
}

// ─────────────────────────────────────────────────────
// DELETE /api/workouts/{id}/draft
// ─────────────────────────────────────────────────────

fn handle_abandon<S: WorkoutCatalog + DraftStore>(
    reconciler: &DraftReconciler<S>,
    user: Option<&str>,
    route: &DraftRoute,
) -> Response<Full<Bytes>> {
    match reconciler.abandon(user, &route.workout_id) {
        Ok(()) => {
            #[derive(serde::Serialize)]
            struct Abandoned {
                success: bool,
            }
            json_ok(&Abandoned { success: true })
        }
        Err(e) => reconcile_error(&e),
    }
}

// ─────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────

fn reconcile_error(e: &ReconcileError) -> Response<Full<Bytes>> {
    let status = e.status();
    if status >= 500 {
        tracing::error!("Draft request failed: {}", e);
        return json_error(status, "Internal server error", None);
    }
    tracing::debug!("Draft request rejected ({}): {}", status, e);
    json_error(status, &e.to_string(), e.invalid_exercise_ids().map(<[String]>::to_vec))
}

/// Minimal percent-decoding for path segments.
fn percent_decode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next().unwrap_or(b'0');
            let lo = bytes.next().unwrap_or(b'0');
            out.push(hex_val(hi) << 4 | hex_val(lo));
        } else {
            out.push(b);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

fn build(status: u16, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() =
        hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    resp.headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static("application/json"));
    resp
}

/// 200 response with a JSON body.
pub fn json_ok<T: serde::Serialize>(data: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(data) {
        Ok(body) => build(200, body),
        Err(e) => json_error(500, &format!("Failed to encode response: {}", e), None),
    }
}

/// Error response with `{error, invalidExerciseIds?}`.
pub fn json_error(status: u16, message: &str, invalid_exercise_ids: Option<Vec<String>>) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&ErrorBody {
        error: message.to_string(),
        invalid_exercise_ids,
    })
    .unwrap_or_default();
    build(status, body)
}
