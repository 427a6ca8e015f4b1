//! Token API routes: cached lookup, permission check, on-demand refresh,
//! and the internal scheduler-facing endpoints guarded by a static API key.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::service::{TokenAccess, TokenService};
use crate::errors::error_body;
use crate::server::server::AppState;
use crate::store::record::TokenKind;

#[derive(Clone)]
pub struct TokenApiState {
    pub service: TokenService,
    pub internal_api_key: String,
    pub default_within_hours: u64,
}

impl TokenApiState {
    pub fn new(service: TokenService, internal_api_key: String, default_within_hours: u64) -> Self {
        Self {
            service,
            internal_api_key,
            default_within_hours,
        }
    }

    pub fn router(&self) -> Router<AppState> {
        Router::new()
            .route("/tokens/{kind}/{identity}", get(get_token))
            .route("/auth/check-permissions", get(check_permissions))
            .route("/auth/refresh-now", post(refresh_now))
            .route("/internal/scheduled-refresh", post(scheduled_refresh))
            .route("/internal/re-encrypt", post(re_encrypt))
    }
}

async fn get_token(
    State(state): State<AppState>,
    Path((kind, identity)): Path<(String, String)>,
) -> Response {
    let Some(kind) = TokenKind::parse(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body(
                &format!("unknown token kind '{kind}', expected user|page|business"),
                "VALIDATION_ERROR",
            )),
        )
            .into_response();
    };

    match state.token_api.service.get_token(kind, &identity).await {
        TokenAccess::Granted(record) => {
            Json(json!({ "success": true, "token": record })).into_response()
        }
        TokenAccess::AuthRequired {
            message,
            authorization_url,
        } => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "message": message,
                "error_code": "AUTH_REQUIRED",
                "authorization_url": authorization_url,
            })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CheckPermissionsParams {
    token: String,
    required_permissions: String,
}

async fn check_permissions(
    State(state): State<AppState>,
    Query(params): Query<CheckPermissionsParams>,
) -> Response {
    let required: Vec<String> = params
        .required_permissions
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    if required.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body(
                "at least one permission is required",
                "VALIDATION_ERROR",
            )),
        )
            .into_response();
    }

    let result = state
        .token_api
        .service
        .ensure_permissions(&params.token, &required)
        .await;
    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
struct RefreshNowParams {
    token: String,
}

async fn refresh_now(
    State(state): State<AppState>,
    Query(params): Query<RefreshNowParams>,
) -> Response {
    match state.token_api.service.refresh_now(&params.token).await {
        Some(new_token) => Json(json!({
            "success": true,
            "message": "Token refreshed successfully",
            "new_token": new_token,
        }))
        .into_response(),
        None => {
            let url = state
                .token_api
                .service
                .validator()
                .authorization_url(None, None)
                .url;
            Json(json!({
                "success": false,
                "message": "Token could not be refreshed, re-authorization required",
                "authorization_url": url,
            }))
            .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScheduledRefreshParams {
    within_hours: Option<u64>,
}

async fn scheduled_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ScheduledRefreshParams>,
) -> Response {
    if let Err(denied) = check_api_key(&state.token_api, &headers) {
        return denied;
    }

    let within_hours = params.within_hours.unwrap_or(state.token_api.default_within_hours);
    info!("scheduled refresh triggered over internal endpoint, horizon {within_hours}h");
    let results = state.token_api.service.scheduled_refresh(within_hours).await;

    let success_count = results.iter().filter(|r| r.success).count();
    let error_count = results.len() - success_count;
    Json(json!({
        "success": success_count > 0,
        "message": format!("Refreshed {success_count} tokens, {error_count} errors"),
        "total_tokens": results.len(),
        "success_count": success_count,
        "error_count": error_count,
        "results": results,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct ReEncryptParams {
    force: Option<bool>,
}

async fn re_encrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReEncryptParams>,
) -> Response {
    if let Err(denied) = check_api_key(&state.token_api, &headers) {
        return denied;
    }

    let force = params.force.unwrap_or(false);
    info!("token re-encryption triggered over internal endpoint (force={force})");
    match state.token_api.service.re_encrypt(force).await {
        Ok(report) => Json(json!({
            "success": true,
            "message": "Token re-encryption completed",
            "report": report,
        }))
        .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_body(
                &format!("Error re-encrypting tokens: {err}"),
                "INTERNAL_SERVER_ERROR",
            )),
        )
            .into_response(),
    }
}

fn check_api_key(state: &TokenApiState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(provided) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(error_body("API key required", "AUTHENTICATION_ERROR")),
        )
            .into_response());
    };

    if !constant_time_eq(provided.as_bytes(), state.internal_api_key.as_bytes()) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(error_body("Invalid API key", "AUTHENTICATION_ERROR")),
        )
            .into_response());
    }
    Ok(())
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut diff = 0u8;
    for (lhs, rhs) in left.iter().zip(right) {
        diff |= lhs ^ rhs;
    }
    diff == 0
}
