//! Management API for the token pool
//!
//! Every route requires `Authorization: Bearer <api key>`. When no key is
//! configured every request is rejected.
//!
//! Endpoints:
//! - POST /v1/token           add a token
//! - PUT  /v1/token           replace one token with another
//! - GET  /v1/token/refresh   run a bulk refresh now
//! - GET  /v1/refresh-status  last refresh result and next scheduled run

use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use common::{Secret, token_preview};
use serde::Deserialize;
use tracing::{info, warn};

use hailuo_pool::{Change, RefreshScheduler, TokenBroker};

use crate::error::ApiError;

/// Shared state for management handlers.
#[derive(Clone)]
pub struct AdminState {
    broker: Arc<TokenBroker>,
    scheduler: Arc<RefreshScheduler>,
    api_key: Option<Arc<Secret<String>>>,
}

impl AdminState {
    pub fn new(
        broker: Arc<TokenBroker>,
        scheduler: Arc<RefreshScheduler>,
        api_key: Option<Secret<String>>,
    ) -> Self {
        Self {
            broker,
            scheduler,
            api_key: api_key.map(Arc::new),
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match (&self.api_key, presented) {
            (Some(key), Some(presented)) if key.matches(presented) => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

/// Build the management router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/v1/token", post(add_token).put(update_token))
        .route("/v1/token/refresh", get(refresh_tokens))
        .route("/v1/refresh-status", get(refresh_status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AddTokenRequest {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTokenRequest {
    #[serde(default)]
    old_token: Option<String>,
    #[serde(default)]
    new_token: Option<String>,
}

/// A blank field counts as missing.
fn required(field: Option<String>) -> Option<String> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn json_ok(body: serde_json::Value) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// POST /v1/token: add a token to the pool and persist it.
async fn add_token(
    State(state): State<AdminState>,
    headers: HeaderMap,
    body: Result<Json<AddTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;

    let token = body
        .ok()
        .and_then(|Json(req)| required(req.token))
        .ok_or_else(|| ApiError::BadRequest("New token is required".into()))?;

    let preview = token_preview(&token);
    let change = state.broker.add_token(token).await?;
    let message = match change {
        Change::Unchanged => "Token already present",
        _ => "Token added",
    };
    info!(token = %preview, ?change, "token added via API");

    Ok(json_ok(serde_json::json!({
        "message": message,
        "tokenCount": state.broker.token_count().await,
    })))
}

/// PUT /v1/token: replace `old_token` with `new_token`. An unknown old token
/// means the new one is added.
async fn update_token(
    State(state): State<AdminState>,
    headers: HeaderMap,
    body: Result<Json<UpdateTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;

    let (old, new) = body
        .ok()
        .and_then(|Json(req)| Some((required(req.old_token)?, required(req.new_token)?)))
        .ok_or_else(|| ApiError::BadRequest("old_token and new_token are required".into()))?;

    let preview = token_preview(&new);
    let change = state.broker.update_token(&old, new).await?;
    let message = match change {
        Change::Replaced => "Token updated",
        Change::Added => "Old token not found, new token added",
        Change::Unchanged => "Token unchanged",
    };
    info!(token = %preview, ?change, "token updated via API");

    Ok(json_ok(serde_json::json!({
        "message": message,
        "tokenCount": state.broker.token_count().await,
    })))
}

/// GET /v1/token/refresh: run a bulk refresh, or join the one in progress.
async fn refresh_tokens(
    State(state): State<AdminState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;

    let status = state.broker.force_refresh_all().await.inspect_err(|e| {
        warn!(error = %e, "manual token refresh failed");
    })?;

    Ok(json_ok(serde_json::json!({
        "message": "Refresh completed",
        "tokenCount": state.broker.token_count().await,
        "status": status,
    })))
}

/// GET /v1/refresh-status: outcome of the last bulk refresh, if any.
async fn refresh_status(
    State(state): State<AdminState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;

    let mut body = match state.broker.status().await {
        Some(status) => serde_json::json!(status),
        None => serde_json::json!({ "message": "No refresh has been performed yet." }),
    };
    body["nextRefreshAt"] = serde_json::json!(state.scheduler.next_scheduled_refresh());
    body["tokenCount"] = serde_json::json!(state.broker.token_count().await);

    Ok(json_ok(body))
}
