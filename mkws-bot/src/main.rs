//! mkws-bot entry point

use anyhow::{Context, Result};
use mkws_bot::gateway::{self, WebhookGateway};
use mkws_bot::ocr::backend::CommandBackend;
use mkws_bot::ocr::{OcrConfig, OcrEngine};
use mkws_bot::{worker, BotState};
use mkws_common::config::{int_env, Config};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mkws-bot (bot worker)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("configuration")?;
    let pool = mkws_common::db::init_database(&config.database_url, config.db_pool_max)
        .await
        .context("database")?;

    let ocr_command = std::env::var("MKWS_OCR_COMMAND")
        .context("MKWS_OCR_COMMAND is not set (external OCR process command line)")?;
    let backend = CommandBackend::new(&ocr_command)
        .map_err(anyhow::Error::msg)
        .context("OCR backend")?;

    let engine = Arc::new(OcrEngine::new(OcrConfig::from_env(), Arc::new(backend)));
    tokio::spawn(Arc::clone(&engine).run_monitor());

    let outbound_url = std::env::var("MKWS_GATEWAY_OUTBOUND_URL")
        .context("MKWS_GATEWAY_OUTBOUND_URL is not set (platform edge webhook)")?;
    let intake_port = int_env("MKWS_GATEWAY_PORT", 8721, 1, 65535) as u16;

    let (gateway, intake_router) = WebhookGateway::new(outbound_url);
    tokio::spawn(async move {
        if let Err(e) = gateway::serve_intake(intake_router, intake_port).await {
            tracing::error!(error = %e, "gateway intake server failed");
        }
    });

    let state = Arc::new(BotState::new(pool, config, engine));
    worker::run(state, Arc::new(gateway)).await;

    Ok(())
}
