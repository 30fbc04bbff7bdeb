//! Browser sessions for the review API
//!
//! After the OAuth exchange, the API issues an opaque bearer token:
//! 32 random bytes plus an HMAC-SHA256 signature, both URL-safe
//! base64. The database keeps only the SHA-256 of the token alongside
//! the user's guild-membership snapshot, so a leaked database yields
//! no usable bearer tokens.

use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// One guild's permissions inside a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMembership {
    pub is_admin: bool,
    pub can_manage: bool,
    pub guild_name: String,
}

/// The authenticated caller, as reconstructed from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub guilds: HashMap<i64, GuildMembership>,
}

impl AuthContext {
    pub fn membership(&self, guild_id: i64) -> Option<&GuildMembership> {
        self.guilds.get(&guild_id)
    }
}

fn sign(secret: &str, token: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

fn verify_signature(secret: &str, token: &str, signature: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(token.as_bytes());
    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    mac.verify_slice(&sig_bytes).is_ok()
}

fn token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Create a session row and return the signed bearer token.
pub async fn issue_session(
    pool: &SqlitePool,
    secret: &str,
    user_id: i64,
    guilds: &HashMap<i64, GuildMembership>,
    ttl_hours: i64,
) -> Result<String> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);

    let now = Utc::now();
    sqlx::query(
        "INSERT INTO user_sessions (token_hash, user_id, guilds, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(token_hash(&token))
    .bind(user_id)
    .bind(serde_json::to_string(guilds).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(now.to_rfc3339())
    .bind((now + Duration::hours(ttl_hours)).to_rfc3339())
    .execute(pool)
    .await?;

    Ok(format!("{}.{}", token, sign(secret, &token)))
}

/// Validate a bearer token: signature first (no database hit for
/// garbage), then the stored session row and its expiry.
pub async fn validate_bearer(pool: &SqlitePool, secret: &str, bearer: &str) -> Result<AuthContext> {
    let (token, signature) = bearer
        .split_once('.')
        .ok_or_else(|| Error::PermissionDenied("malformed session token".to_string()))?;

    if !verify_signature(secret, token, signature) {
        return Err(Error::PermissionDenied("invalid session token".to_string()));
    }

    let row = sqlx::query("SELECT user_id, guilds, expires_at FROM user_sessions WHERE token_hash = ?")
        .bind(token_hash(token))
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::PermissionDenied("unknown session token".to_string()))?;

    let expires_at: String = row.get("expires_at");
    if expires_at < Utc::now().to_rfc3339() {
        return Err(Error::PermissionDenied("session has expired".to_string()));
    }

    let guilds: String = row.get("guilds");
    Ok(AuthContext {
        user_id: row.get("user_id"),
        guilds: serde_json::from_str(&guilds)
            .map_err(|e| Error::Internal(format!("corrupt session memberships: {}", e)))?,
    })
}

/// Delete the caller's session (logout).
pub async fn revoke(pool: &SqlitePool, bearer: &str) -> Result<()> {
    if let Some((token, _)) = bearer.split_once('.') {
        sqlx::query("DELETE FROM user_sessions WHERE token_hash = ?")
            .bind(token_hash(token))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Drop expired session rows. Run by the periodic sweep.
pub async fn purge_expired(pool: &SqlitePool) -> Result<u64> {
    Ok(sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?
        .rows_affected())
}
