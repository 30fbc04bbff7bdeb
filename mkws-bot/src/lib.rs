//! mkws-bot - Bot worker service
//!
//! Bridges the chat platform to the ingestion pipeline:
//! - image events run through the OCR engine at EXPRESS priority and
//!   become wars after interactive confirmation
//! - bulk scans collect recent channel images into a review session
//! - slash commands translate to guild-scoped data-store operations

pub mod api_client;
pub mod commands;
pub mod gateway;
pub mod ocr;
pub mod scan;
pub mod worker;

use mkws_common::config::Config;
use mkws_common::resolver::{RosterCache, RosterSnapshot};
use mkws_common::Result;
use ocr::{OcrConfig, OcrEngine};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state for command handlers and scan pipelines.
pub struct BotState {
    pub pool: SqlitePool,
    pub config: Config,
    pub engine: Arc<OcrEngine>,
    pub api: api_client::ApiClient,
    roster_cache: RosterCache,
}

impl BotState {
    pub fn new(pool: SqlitePool, config: Config, engine: Arc<OcrEngine>) -> Self {
        let api = api_client::ApiClient::new(config.api_base_url.clone(), config.api_key.clone());
        Self { pool, config, engine, api, roster_cache: RosterCache::default() }
    }

    pub fn ocr_config(&self) -> &OcrConfig {
        self.engine.config()
    }

    /// Read-through roster snapshot for the resolver.
    pub async fn roster(&self, guild_id: i64) -> Result<Arc<RosterSnapshot>> {
        if let Some(snapshot) = self.roster_cache.get(guild_id).await {
            return Ok(snapshot);
        }
        let snapshot = mkws_common::db::players::roster_snapshot(&self.pool, guild_id).await?;
        Ok(self.roster_cache.put(guild_id, snapshot).await)
    }

    /// Must be called after any roster mutation in the guild.
    pub async fn invalidate_roster(&self, guild_id: i64) {
        self.roster_cache.invalidate(guild_id).await;
    }
}
