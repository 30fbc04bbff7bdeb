//! Bot worker event loop
//!
//! Every gateway event runs in its own task: interactive confirmations
//! can wait minutes, and a blocked single scan must not stall command
//! handling or other scans.

use crate::commands::Registry;
use crate::gateway::{ChatGateway, GatewayEvent};
use crate::{scan, BotState};
use mkws_common::db::guilds;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(state: Arc<BotState>, gateway: Arc<dyn ChatGateway>) {
    let registry = Arc::new(Registry::standard());
    info!("bot worker running");

    while let Some(event) = gateway.next_event().await {
        let state = Arc::clone(&state);
        let gateway = Arc::clone(&gateway);
        let registry = Arc::clone(&registry);

        tokio::spawn(async move {
            match event {
                GatewayEvent::Command(command) => {
                    let (guild_id, channel_id) = (command.guild_id, command.channel_id);
                    let reply = registry.dispatch(&state, gateway.as_ref(), command).await;
                    if let Err(e) = gateway.reply(guild_id, channel_id, &reply).await {
                        warn!(guild_id, channel_id, error = %e, "failed to deliver reply");
                    }
                }
                GatewayEvent::Image(image) => {
                    // Only the configured OCR channel is auto-scanned.
                    let watched = guilds::get_guild(&state.pool, image.guild_id)
                        .await
                        .ok()
                        .flatten()
                        .and_then(|g| g.ocr_channel_id);
                    if watched != Some(image.channel_id) {
                        return;
                    }

                    let reply = match scan::single_scan(&state, gateway.as_ref(), &image).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!(guild_id = image.guild_id, error = %e, "single scan failed");
                            "Scan failed - the error has been logged.".to_string()
                        }
                    };
                    if let Err(e) = gateway.reply(image.guild_id, image.channel_id, &reply).await {
                        warn!(guild_id = image.guild_id, error = %e, "failed to deliver scan reply");
                    }
                }
            }
        });
    }

    info!("gateway closed, bot worker stopping");
}
