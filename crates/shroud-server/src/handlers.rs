use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{error::ShareError, ids, AppState};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

/// Both fields are optional at the serde level so a missing one is a 400 with
/// a useful message rather than axum's generic 422.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    pub content: Option<String>,
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareResponse {
    pub id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn create_share(
    State(state): State<AppState>,
    body: Result<Json<CreateShareRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection, "rejected create body");
            return bad_request("invalid JSON in request body");
        }
    };

    let (content, expires_at) = match (body.content, body.expires_at) {
        (Some(c), Some(e)) if !c.is_empty() && !e.is_empty() => (c, e),
        _ => return bad_request("missing required fields: content, expiresAt"),
    };
    let expires_at = match DateTime::parse_from_rfc3339(&expires_at) {
        Ok(t) => t.with_timezone(&Utc),
        Err(_) => return bad_request("expiresAt must be an RFC 3339 timestamp"),
    };

    let engine = state.engine.clone();
    match blocking(move || engine.create(&content, expires_at)).await {
        Ok(Ok(created)) => (
            StatusCode::CREATED,
            Json(CreateShareResponse {
                id: created.id,
                url: created.url,
                expires_at: created.expires_at,
            }),
        )
            .into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Get ───────────────────────────────────────────────────────────────────────

pub async fn get_share(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    // Same answer as an unknown id; no need to touch the store.
    if !ids::is_valid_secret_id(&id) {
        return ShareError::NotFoundOrConsumed.into_response();
    }

    let engine = state.engine.clone();
    match blocking(move || engine.retrieve(&id)).await {
        Ok(Ok(opened)) => Json(opened).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Recent ────────────────────────────────────────────────────────────────────

/// Only an id prefix is exposed; the full id is the capability to read.
pub async fn recent_shares(State(state): State<AppState>) -> Response {
    let engine = state.engine.clone();
    match blocking(move || engine.recent()).await {
        Ok(Ok(entries)) => {
            let shares: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "id": e.entry_id,
                        "secretPrefix": e.secret_prefix(),
                        "createdAt": e.created_at,
                    })
                })
                .collect();
            Json(json!({ "shares": shares })).into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Engine calls hash (PBKDF2) and hit redb; keep them off the async workers.
async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": crate::error::MSG_INTERNAL})),
    )
        .into_response()
}
