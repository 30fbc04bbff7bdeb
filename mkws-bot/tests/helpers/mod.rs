//! Shared test doubles: scripted gateway, scripted OCR backend, state
//! construction.

use async_trait::async_trait;
use mkws_bot::gateway::{ChatGateway, GatewayEvent, ImageEvent};
use mkws_bot::ocr::{OcrBackend, OcrConfig, OcrEngine, TextBox};
use mkws_bot::BotState;
use mkws_common::config::Config;
use mkws_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn test_config(api_base_url: String) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        chat_token: "chat-token".to_string(),
        oauth_client_id: "client-id".to_string(),
        oauth_client_secret: "client-secret".to_string(),
        oauth_redirect_uri: "http://localhost/callback".to_string(),
        signing_secret: "test-signing-secret".to_string(),
        api_key: "test-api-key".to_string(),
        cors_origins: vec![],
        public_web_url: "http://review.example".to_string(),
        api_base_url,
        api_port: 8720,
        db_pool_max: 1,
    }
}

/// OCR backend scripted per image: bytes map to a token line, anything
/// unknown errors like a truncated download would.
pub struct ScriptedBackend {
    outputs: HashMap<Vec<u8>, Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(outputs: &[(&str, &[&str])]) -> Self {
        Self {
            outputs: outputs
                .iter()
                .map(|(image, tokens)| {
                    (
                        image.as_bytes().to_vec(),
                        tokens.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl OcrBackend for ScriptedBackend {
    fn recognize(&self, image: &[u8]) -> std::result::Result<Vec<TextBox>, String> {
        match self.outputs.get(image) {
            Some(tokens) => Ok(tokens
                .iter()
                .enumerate()
                .map(|(i, text)| TextBox {
                    text: text.clone(),
                    bbox: [0.0, 24.0 * i as f32, 120.0, 24.0],
                    confidence: 0.95,
                })
                .collect()),
            None => Err("unrecognized image".to_string()),
        }
    }
}

/// Gateway scripted from fixed channel history. `fetch_image` serves
/// the URL itself as the image bytes, which the scripted backend keys
/// on.
pub struct ScriptedGateway {
    pub images: Vec<ImageEvent>,
    pub approve: bool,
    pub replies: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(images: Vec<ImageEvent>, approve: bool) -> Self {
        Self { images, approve, replies: Mutex::new(Vec::new()), prompts: Mutex::new(Vec::new()) }
    }
}

pub fn image(guild_id: i64, channel_id: i64, url: &str) -> ImageEvent {
    ImageEvent {
        guild_id,
        channel_id,
        user_id: 9,
        message_id: None,
        filename: format!("{}.png", url),
        image_url: url.to_string(),
        timestamp: Some("2026-01-10T18:00:00+00:00".to_string()),
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn next_event(&self) -> Option<GatewayEvent> {
        None
    }

    async fn reply(&self, _guild_id: i64, _channel_id: i64, text: &str) -> Result<()> {
        self.replies.lock().await.push(text.to_string());
        Ok(())
    }

    async fn confirm(&self, _guild_id: i64, _channel_id: i64, prompt: &str) -> Result<bool> {
        self.prompts.lock().await.push(prompt.to_string());
        Ok(self.approve)
    }

    async fn recent_images(
        &self,
        guild_id: i64,
        channel_id: i64,
        limit: usize,
    ) -> Result<Vec<ImageEvent>> {
        Ok(self
            .images
            .iter()
            .rev()
            .filter(|i| i.guild_id == guild_id && i.channel_id == channel_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("missing://") {
            return Err(Error::Ocr("download failed: 404".to_string()));
        }
        Ok(url.as_bytes().to_vec())
    }
}

/// Bot state over an in-memory store, plus the review API served on a
/// loopback port so the bot's session-creation client has something
/// real to talk to.
pub async fn bot_state_with_api(backend: ScriptedBackend) -> (Arc<BotState>, SqlitePool) {
    let pool = mkws_common::db::init_test_database().await.unwrap();

    let api_state = mkws_api::AppState::new(pool.clone(), test_config(String::new()));
    let api_app = mkws_api::build_router(api_state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api_app).await.unwrap();
    });

    let config = test_config(format!("http://{}", addr));
    let ocr_config = OcrConfig { usage_adaptation: false, ..OcrConfig::default() };
    let engine = Arc::new(OcrEngine::new(ocr_config, Arc::new(backend)));
    let state = Arc::new(BotState::new(pool.clone(), config, engine));
    (state, pool)
}
