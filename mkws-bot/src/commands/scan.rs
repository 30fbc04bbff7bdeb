//! Scan commands

use super::{CommandCall, HandlerFuture};
use crate::gateway::ChatGateway;
use crate::{scan, BotState};

pub fn scanimage<'a>(
    state: &'a BotState,
    gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let recent = gateway.recent_images(call.guild_id, call.channel_id, 1).await?;
        match recent.first() {
            Some(image) => scan::single_scan(state, gateway, image).await,
            None => Ok("No recent screenshot found in this channel.".to_string()),
        }
    })
}

pub fn bulkscanimage<'a>(
    state: &'a BotState,
    gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        scan::bulk_scan(state, gateway, call.guild_id, call.channel_id, call.user_id).await
    })
}

pub fn debugocr<'a>(
    state: &'a BotState,
    gateway: &'a dyn ChatGateway,
    call: CommandCall,
) -> HandlerFuture<'a> {
    Box::pin(async move {
        let url = call.arg("image_url")?.to_string();
        scan::debug_ocr(state, gateway, call.guild_id, &url).await
    })
}
