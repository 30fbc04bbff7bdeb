//! Authentication extractors
//!
//! Two credential kinds:
//! - `Authorization: Bearer <token>` - a browser session issued after
//!   the OAuth exchange; carries the user's guild memberships.
//! - `X-Api-Key: <key>` - the shared bot key; trusted for any guild.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use mkws_common::db::user_sessions::{self, AuthContext, GuildMembership};

/// A caller proven to hold the shared API key.
pub struct ApiKey;

#[axum::async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let presented = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing X-Api-Key header".to_string()))?;

        if presented != state.config.api_key {
            return Err(ApiError::Forbidden("invalid API key".to_string()));
        }
        Ok(ApiKey)
    }
}

/// A browser caller with a validated session token.
pub struct Caller(pub AuthContext);

#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let bearer = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let ctx =
            user_sessions::validate_bearer(&state.db, &state.config.signing_secret, bearer).await?;
        Ok(Caller(ctx))
    }
}

/// Either credential. Session read/review endpoints accept both; the
/// API key is trusted for any guild.
pub enum Identity {
    Key,
    User(AuthContext),
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        if parts.headers.contains_key("x-api-key") {
            return ApiKey::from_request_parts(parts, state).await.map(|_| Identity::Key);
        }
        Caller::from_request_parts(parts, state).await.map(|c| Identity::User(c.0))
    }
}

impl Identity {
    /// Require membership in a guild. API-key callers pass.
    pub fn require_member(&self, guild_id: i64) -> Result<(), ApiError> {
        match self {
            Identity::Key => Ok(()),
            Identity::User(ctx) => {
                ctx.membership(guild_id).map(|_| ()).ok_or_else(|| forbidden(guild_id))
            }
        }
    }

    /// Require the manage right in a guild. API-key callers pass.
    pub fn require_manage(&self, guild_id: i64) -> Result<(), ApiError> {
        match self {
            Identity::Key => Ok(()),
            Identity::User(ctx) => match ctx.membership(guild_id) {
                Some(m) if m.can_manage => Ok(()),
                Some(_) => Err(ApiError::Forbidden(format!(
                    "manage permission required in guild {}",
                    guild_id
                ))),
                None => Err(forbidden(guild_id)),
            },
        }
    }

    pub fn membership(&self, guild_id: i64) -> Option<&GuildMembership> {
        match self {
            Identity::Key => None,
            Identity::User(ctx) => ctx.membership(guild_id),
        }
    }
}

fn forbidden(guild_id: i64) -> ApiError {
    ApiError::Forbidden(format!("not a member of guild {}", guild_id))
}
