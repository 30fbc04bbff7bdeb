//! Chat-platform gateway seam
//!
//! The platform client itself (message ingestion, slash-command
//! dispatch, reactions) lives outside this repo. The worker consumes
//! it through [`ChatGateway`]: a stream of image/command events plus an
//! outbound reply surface. The shipped implementation is a webhook
//! bridge: the platform edge POSTs events to a small intake router and
//! receives replies on a configured outbound webhook.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use mkws_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// How many recent images per channel are kept for `bulkscanimage`.
const RECENT_IMAGE_CAP: usize = 100;

/// How long an interactive confirmation waits before defaulting to no.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(300);

/// An image posted in a channel. Only the URL is carried; bytes are
/// fetched on demand and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEvent {
    pub guild_id: i64,
    pub channel_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub message_id: Option<i64>,
    pub filename: String,
    pub image_url: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A slash command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    pub guild_id: i64,
    pub channel_id: i64,
    pub user_id: i64,
    pub command: String,
    #[serde(default)]
    pub args: HashMap<String, String>,
}

#[derive(Debug)]
pub enum GatewayEvent {
    Image(ImageEvent),
    Command(CommandEvent),
}

/// The worker's view of the chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync + 'static {
    /// Next inbound event; None when the gateway shuts down.
    async fn next_event(&self) -> Option<GatewayEvent>;

    /// Post a message to a channel.
    async fn reply(&self, guild_id: i64, channel_id: i64, text: &str) -> Result<()>;

    /// Ask the user an approve/decline question and wait for the
    /// answer. Defaults to declined on timeout.
    async fn confirm(&self, guild_id: i64, channel_id: i64, prompt: &str) -> Result<bool>;

    /// Most recent images posted in a channel, newest first.
    async fn recent_images(&self, guild_id: i64, channel_id: i64, limit: usize)
        -> Result<Vec<ImageEvent>>;

    /// Download image bytes for OCR.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

struct WebhookInner {
    events: mpsc::Sender<GatewayEvent>,
    recent: Mutex<HashMap<(i64, i64), VecDeque<ImageEvent>>>,
    pending_confirms: Mutex<HashMap<Uuid, oneshot::Sender<bool>>>,
    http: reqwest::Client,
    outbound_url: String,
}

/// Webhook-bridge gateway: platform edge -> intake router -> worker,
/// worker -> outbound webhook -> platform edge.
pub struct WebhookGateway {
    inner: Arc<WebhookInner>,
    receiver: Mutex<mpsc::Receiver<GatewayEvent>>,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    guild_id: i64,
    channel_id: i64,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm_id: Option<String>,
}

#[derive(Deserialize)]
struct ConfirmAnswer {
    approved: bool,
}

impl WebhookGateway {
    /// Build the gateway and the intake router the platform edge posts
    /// to. `outbound_url` receives replies and confirmation prompts.
    pub fn new(outbound_url: String) -> (Self, Router) {
        let (tx, rx) = mpsc::channel(256);
        let inner = Arc::new(WebhookInner {
            events: tx,
            recent: Mutex::new(HashMap::new()),
            pending_confirms: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            outbound_url,
        });

        let router = Router::new()
            .route("/intake/image", post(intake_image))
            .route("/intake/command", post(intake_command))
            .route("/intake/confirm/:confirm_id", post(intake_confirm))
            .with_state(Arc::clone(&inner));

        (Self { inner, receiver: Mutex::new(rx) }, router)
    }
}

async fn intake_image(
    State(inner): State<Arc<WebhookInner>>,
    Json(event): Json<ImageEvent>,
) -> axum::http::StatusCode {
    {
        let mut recent = inner.recent.lock().await;
        let ring = recent.entry((event.guild_id, event.channel_id)).or_default();
        if ring.len() == RECENT_IMAGE_CAP {
            ring.pop_front();
        }
        ring.push_back(event.clone());
    }

    if inner.events.send(GatewayEvent::Image(event)).await.is_err() {
        return axum::http::StatusCode::SERVICE_UNAVAILABLE;
    }
    axum::http::StatusCode::ACCEPTED
}

async fn intake_command(
    State(inner): State<Arc<WebhookInner>>,
    Json(event): Json<CommandEvent>,
) -> axum::http::StatusCode {
    if inner.events.send(GatewayEvent::Command(event)).await.is_err() {
        return axum::http::StatusCode::SERVICE_UNAVAILABLE;
    }
    axum::http::StatusCode::ACCEPTED
}

async fn intake_confirm(
    State(inner): State<Arc<WebhookInner>>,
    Path(confirm_id): Path<Uuid>,
    Json(answer): Json<ConfirmAnswer>,
) -> axum::http::StatusCode {
    let sender = inner.pending_confirms.lock().await.remove(&confirm_id);
    match sender {
        Some(sender) => {
            let _ = sender.send(answer.approved);
            axum::http::StatusCode::OK
        }
        None => axum::http::StatusCode::NOT_FOUND,
    }
}

#[async_trait]
impl ChatGateway for WebhookGateway {
    async fn next_event(&self) -> Option<GatewayEvent> {
        self.receiver.lock().await.recv().await
    }

    async fn reply(&self, guild_id: i64, channel_id: i64, text: &str) -> Result<()> {
        self.inner
            .http
            .post(&self.inner.outbound_url)
            .json(&OutboundMessage { guild_id, channel_id, content: text, confirm_id: None })
            .send()
            .await
            .map_err(|e| Error::Internal(format!("outbound webhook failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Internal(format!("outbound webhook rejected: {}", e)))?;
        Ok(())
    }

    async fn confirm(&self, guild_id: i64, channel_id: i64, prompt: &str) -> Result<bool> {
        let confirm_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.inner.pending_confirms.lock().await.insert(confirm_id, tx);

        let sent = self
            .inner
            .http
            .post(&self.inner.outbound_url)
            .json(&OutboundMessage {
                guild_id,
                channel_id,
                content: prompt,
                confirm_id: Some(confirm_id.to_string()),
            })
            .send()
            .await;
        if let Err(e) = sent {
            self.inner.pending_confirms.lock().await.remove(&confirm_id);
            return Err(Error::Internal(format!("confirmation prompt failed: {}", e)));
        }

        match tokio::time::timeout(CONFIRM_TIMEOUT, rx).await {
            Ok(Ok(approved)) => Ok(approved),
            Ok(Err(_)) => Ok(false),
            Err(_) => {
                self.inner.pending_confirms.lock().await.remove(&confirm_id);
                warn!(%confirm_id, "confirmation timed out, treating as declined");
                Ok(false)
            }
        }
    }

    async fn recent_images(
        &self,
        guild_id: i64,
        channel_id: i64,
        limit: usize,
    ) -> Result<Vec<ImageEvent>> {
        let recent = self.inner.recent.lock().await;
        Ok(recent
            .get(&(guild_id, channel_id))
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Ocr(format!("image download failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Ocr(format!("image download rejected: {}", e)))?
            .bytes()
            .await
            .map_err(|e| Error::Ocr(format!("image download truncated: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Serve the intake router.
pub async fn serve_intake(router: Router, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(Error::Io)?;
    info!("gateway intake listening on 127.0.0.1:{}", port);
    axum::serve(listener, router)
        .await
        .map_err(|e| Error::Internal(format!("intake server failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_images_are_ring_buffered_per_channel() {
        let (gateway, _router) = WebhookGateway::new("http://127.0.0.1:1/out".to_string());

        for i in 0..(RECENT_IMAGE_CAP + 5) {
            let event = ImageEvent {
                guild_id: 1,
                channel_id: 7,
                user_id: 9,
                message_id: Some(i as i64),
                filename: format!("war-{}.png", i),
                image_url: format!("http://img/{}", i),
                timestamp: None,
            };
            let mut recent = gateway.inner.recent.lock().await;
            let ring = recent.entry((1, 7)).or_default();
            if ring.len() == RECENT_IMAGE_CAP {
                ring.pop_front();
            }
            ring.push_back(event);
        }

        let newest = gateway.recent_images(1, 7, 3).await.unwrap();
        assert_eq!(newest.len(), 3);
        assert_eq!(newest[0].filename, format!("war-{}.png", RECENT_IMAGE_CAP + 4));

        // Other channels and guilds see nothing.
        assert!(gateway.recent_images(1, 8, 10).await.unwrap().is_empty());
        assert!(gateway.recent_images(2, 7, 10).await.unwrap().is_empty());
    }
}
