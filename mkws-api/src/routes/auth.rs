//! Login, identity, and logout
//!
//! The OAuth provider is a black box that exchanges an authorization
//! code for `(user_id, guild memberships)`. Its three endpoints come
//! from the environment so deployments can point at their platform's
//! identity service; this service only issues its own signed session
//! tokens on top.

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post};
use axum::{Json, Router};
use mkws_common::db::user_sessions::{self, GuildMembership};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Browser sessions live for a week; the sweep purges stale rows.
const SESSION_TTL_HOURS: i64 = 24 * 7;

fn provider_url(key: &str) -> Result<String, ApiError> {
    std::env::var(key)
        .map_err(|_| ApiError::Internal(format!("{} is not configured", key)))
}

#[derive(Deserialize)]
struct CallbackRequest {
    code: String,
}

#[derive(Serialize)]
struct CallbackResponse {
    session_token: String,
    user_id: i64,
}

#[derive(Deserialize)]
struct ProviderToken {
    access_token: String,
}

#[derive(Deserialize)]
struct ProviderIdentity {
    user_id: i64,
}

#[derive(Deserialize)]
struct ProviderGuild {
    guild_id: i64,
    guild_name: String,
    #[serde(default)]
    is_admin: bool,
    #[serde(default)]
    can_manage: bool,
}

/// GET /auth/login - where the front-end should send the browser.
async fn login(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let authorize = provider_url("MKWS_OAUTH_AUTHORIZE_URL")?;
    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope=identify%20guilds",
        authorize, state.config.oauth_client_id, state.config.oauth_redirect_uri
    );
    Ok(Json(serde_json::json!({ "authorize_url": url })))
}

/// POST /auth/callback - exchange the provider code for a session.
async fn callback(
    State(state): State<AppState>,
    Json(request): Json<CallbackRequest>,
) -> ApiResult<Json<CallbackResponse>> {
    let http = reqwest::Client::new();

    let token: ProviderToken = http
        .post(provider_url("MKWS_OAUTH_TOKEN_URL")?)
        .form(&[
            ("client_id", state.config.oauth_client_id.as_str()),
            ("client_secret", state.config.oauth_client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("redirect_uri", state.config.oauth_redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("token exchange failed: {}", e)))?
        .error_for_status()
        .map_err(|_| ApiError::Unauthorized("authorization code rejected".to_string()))?
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("bad token response: {}", e)))?;

    let identity_url = provider_url("MKWS_OAUTH_IDENTITY_URL")?;
    let identity: ProviderIdentity = http
        .get(&identity_url)
        .header(AUTHORIZATION, format!("Bearer {}", token.access_token))
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("identity lookup failed: {}", e)))?
        .error_for_status()
        .map_err(|_| ApiError::Unauthorized("identity lookup rejected".to_string()))?
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("bad identity response: {}", e)))?;

    let provider_guilds: Vec<ProviderGuild> = http
        .get(format!("{}/guilds", identity_url.trim_end_matches('/')))
        .header(AUTHORIZATION, format!("Bearer {}", token.access_token))
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("membership lookup failed: {}", e)))?
        .error_for_status()
        .map_err(|_| ApiError::Unauthorized("membership lookup rejected".to_string()))?
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("bad membership response: {}", e)))?;

    let guilds: HashMap<i64, GuildMembership> = provider_guilds
        .into_iter()
        .map(|g| {
            (
                g.guild_id,
                GuildMembership {
                    is_admin: g.is_admin,
                    can_manage: g.can_manage || g.is_admin,
                    guild_name: g.guild_name,
                },
            )
        })
        .collect();

    let session_token = user_sessions::issue_session(
        &state.db,
        &state.config.signing_secret,
        identity.user_id,
        &guilds,
        SESSION_TTL_HOURS,
    )
    .await?;

    info!(user_id = identity.user_id, guilds = guilds.len(), "user logged in");
    Ok(Json(CallbackResponse { session_token, user_id: identity.user_id }))
}

#[derive(Serialize)]
struct MeResponse {
    user_id: i64,
    guilds: HashMap<i64, MeGuild>,
}

#[derive(Serialize)]
struct MeGuild {
    is_admin: bool,
    can_manage: bool,
    guild_name: String,
}

/// GET /auth/me
async fn me(Caller(ctx): Caller) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: ctx.user_id,
        guilds: ctx
            .guilds
            .into_iter()
            .map(|(id, m)| {
                (
                    id,
                    MeGuild {
                        is_admin: m.is_admin,
                        can_manage: m.can_manage,
                        guild_name: m.guild_name,
                    },
                )
            })
            .collect(),
    })
}

/// POST /auth/logout
async fn logout(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        user_sessions::revoke(&state.db, bearer).await?;
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", post(callback))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}
