use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    store::{SecretRecord, SecretStore, StoreError},
    AppState,
};

const MAX_ALIAS_LEN: usize = 256;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub alias: String,
}

/// Store an already-encrypted record. The service never sees a key.
pub async fn create_secret(
    State(state): State<AppState>,
    body: Result<Json<SecretRecord>, JsonRejection>,
) -> Response {
    let Json(record) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(rejection.status(), &rejection.body_text()),
    };
    if record.alias.is_empty() || record.alias.len() > MAX_ALIAS_LEN {
        return bad_request(&format!("alias must be 1–{MAX_ALIAS_LEN} characters"));
    }
    if record.message.is_empty() {
        return bad_request("message must not be empty");
    }
    if record.message.len() > state.max_message_bytes {
        return bad_request(&format!(
            "message exceeds {} byte limit",
            state.max_message_bytes
        ));
    }

    let alias = record.alias.clone();
    let secret_type = record.secret_type;
    let password = record.is_encrypted_with_user_password;
    match state.store.insert(record).await {
        Ok(()) => {
            info!(alias = %alias, secret_type = %secret_type, password, "secret.create");
            (StatusCode::CREATED, Json(CreateResponse { alias })).into_response()
        }
        Err(StoreError::AliasCollision(_)) => {
            error_response(StatusCode::CONFLICT, "alias already in use")
        }
        Err(e) => internal_error(e),
    }
}

// ── Fetch-and-delete ──────────────────────────────────────────────────────────

/// Hand the record over and delete it in the same transaction.
pub async fn take_secret(State(state): State<AppState>, Path(alias): Path<String>) -> Response {
    match state.store.fetch_and_delete(&alias).await {
        Ok(record) => {
            info!(alias = %alias, "secret.burned");
            Json(record).into_response()
        }
        Err(StoreError::NotFound(_)) => {
            debug!(alias = %alias, "secret.read: not found");
            error_response(StatusCode::NOT_FOUND, "secret not found")
        }
        Err(e) => internal_error(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn bad_request(msg: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, msg)
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({"error": msg}))).into_response()
}

fn internal_error(e: StoreError) -> Response {
    tracing::error!(error = %e, "internal error");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}
