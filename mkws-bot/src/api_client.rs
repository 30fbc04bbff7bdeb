//! Client for the review API
//!
//! The bot creates bulk sessions through the API's key-gated endpoint
//! so that session issuance stays in one place; result and failure
//! rows are then appended directly to the shared store.

use mkws_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    guild_id: i64,
    created_by_user_id: i64,
    total_images: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    creation_nonce: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    session_token: String,
}

impl ApiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Create a bulk review session. The nonce makes retries after a
    /// dropped response idempotent.
    pub async fn create_session(
        &self,
        guild_id: i64,
        created_by_user_id: i64,
        total_images: i64,
        creation_nonce: Option<&str>,
    ) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/bulk/sessions", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .json(&CreateSessionRequest {
                guild_id,
                created_by_user_id,
                total_images,
                creation_nonce,
            })
            .send()
            .await
            .map_err(|e| Error::Internal(format!("review API unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Internal(format!(
                "review API refused session creation: {}",
                response.status()
            )));
        }

        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("bad session response: {}", e)))?;

        info!(guild_id, total_images, "bulk session created via review API");
        Ok(body.session_token)
    }
}
