//! Scan pipelines
//!
//! Single-image flow: EXPRESS OCR, name resolution, interactive
//! confirmation, then a one-transaction war insert.
//!
//! Bulk flow: collect recent channel images, create a review session,
//! OCR each image at STANDARD or BACKGROUND priority, append results
//! and failures in write batches, then hand back the review URL.

use crate::gateway::{ChatGateway, ImageEvent};
use crate::ocr::{parse, OcrStatus, Priority};
use crate::BotState;
use chrono::Utc;
use futures::stream::StreamExt;
use mkws_common::db::bulk::{self, BulkAppend, NewBulkFailure, NewBulkResult};
use mkws_common::db::models::DetectedPlayer;
use mkws_common::db::wars::{self, NewWarPlayer};
use mkws_common::scores::DEFAULT_RACE_COUNT;
use mkws_common::Result;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Upper bound on images collected by one bulk scan.
const MAX_BULK_IMAGES: usize = 100;

/// Concurrent image downloads in the bulk pipeline. OCR concurrency is
/// governed by the engine's tier permits, not by this.
const BULK_FETCH_CONCURRENCY: usize = 8;

/// Write-batching bounds for OCR completions.
const BATCH_MAX: usize = 10;
const BATCH_FLUSH_AFTER: Duration = Duration::from_millis(500);

const UNREADABLE: &str =
    "Couldn't read this image - try again or enter the scores manually with /addwar.";

fn format_players(players: &[DetectedPlayer]) -> String {
    players
        .iter()
        .map(|p| match &p.raw_name {
            Some(raw) => format!("  {} ({}) - {}", p.name, raw, p.score),
            None => format!("  {} - {}", p.name, p.score),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run the interactive single-image flow and return the final reply.
pub async fn single_scan(
    state: &BotState,
    gateway: &dyn ChatGateway,
    image: &ImageEvent,
) -> Result<String> {
    let bytes = match gateway.fetch_image(&image.image_url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %image.image_url, error = %e, "image download failed");
            return Ok(UNREADABLE.to_string());
        }
    };

    let output = state.engine.submit(Priority::Express, bytes).await;
    if let OcrStatus::Error(message) = &output.status {
        warn!(guild_id = image.guild_id, error = %message, "single scan OCR error");
        return Ok(UNREADABLE.to_string());
    }

    let roster = state.roster(image.guild_id).await?;
    let players = parse::detect_players(&output.boxes, &roster, DEFAULT_RACE_COUNT);
    if players.is_empty() {
        return Ok(UNREADABLE.to_string());
    }

    let entries: Vec<NewWarPlayer> = players
        .iter()
        .map(|p| NewWarPlayer {
            name: p.name.clone(),
            score: p.score,
            races_played: p.races_played,
        })
        .collect();

    let team_score: i64 = entries.iter().map(|e| e.score).sum();
    let mut prompt = format!(
        "Detected war result ({} players, {} total):\n{}\n",
        players.len(),
        team_score,
        format_players(&players)
    );
    if wars::is_duplicate_of_last(&state.pool, image.guild_id, &entries).await? {
        prompt.push_str("Warning: this matches the most recent war.\n");
    }
    prompt.push_str("Save this war?");

    if !gateway.confirm(image.guild_id, image.channel_id, &prompt).await? {
        return Ok("Discarded - nothing was saved.".to_string());
    }

    let war_date = image.timestamp.clone().unwrap_or_else(|| Utc::now().to_rfc3339());
    let submission = wars::submit_war(
        &state.pool,
        image.guild_id,
        &entries,
        DEFAULT_RACE_COUNT,
        &war_date,
        false,
    )
    .await?;

    let verdict = match submission.team_differential.cmp(&0) {
        std::cmp::Ordering::Greater => "win",
        std::cmp::Ordering::Less => "loss",
        std::cmp::Ordering::Equal => "tie",
    };
    Ok(format!(
        "War #{} saved: {} points, differential {:+} ({}).",
        submission.war_id, submission.team_score, submission.team_differential, verdict
    ))
}

/// OCR one bulk image into a result or failure row.
async fn process_bulk_image(
    state: &BotState,
    gateway: &dyn ChatGateway,
    tier: Priority,
    image: ImageEvent,
) -> BulkAppend {
    let failure = |error_message: String| {
        BulkAppend::Failure(NewBulkFailure {
            image_filename: Some(image.filename.clone()),
            image_url: Some(image.image_url.clone()),
            error_message,
            message_timestamp: image.timestamp.clone(),
            chat_message_id: image.message_id,
        })
    };

    let bytes = match gateway.fetch_image(&image.image_url).await {
        Ok(bytes) => bytes,
        Err(e) => return failure(format!("download failed: {}", e)),
    };

    let output = state.engine.submit(tier, bytes).await;
    match output.status {
        OcrStatus::Error(message) => failure(message),
        OcrStatus::Empty => failure("no text detected".to_string()),
        OcrStatus::Ok => {
            let roster = match state.roster(image.guild_id).await {
                Ok(roster) => roster,
                Err(e) => return failure(format!("roster load failed: {}", e)),
            };
            let players = parse::detect_players(&output.boxes, &roster, DEFAULT_RACE_COUNT);
            if players.is_empty() {
                return failure("no roster players recognized".to_string());
            }
            BulkAppend::Result(NewBulkResult {
                image_filename: Some(image.filename.clone()),
                image_url: Some(image.image_url.clone()),
                detected_players: players,
                race_count: DEFAULT_RACE_COUNT,
                message_timestamp: image.timestamp.clone(),
            })
        }
    }
}

/// Run the bulk flow for a channel and return the final reply.
pub async fn bulk_scan(
    state: &BotState,
    gateway: &dyn ChatGateway,
    guild_id: i64,
    channel_id: i64,
    user_id: i64,
) -> Result<String> {
    let images = gateway.recent_images(guild_id, channel_id, MAX_BULK_IMAGES).await?;
    if images.is_empty() {
        return Ok("No recent images found in this channel.".to_string());
    }

    let nonce = Uuid::new_v4().to_string();
    let token = state
        .api
        .create_session(guild_id, user_id, images.len() as i64, Some(&nonce))
        .await?;

    let tier = state.ocr_config().priority_for(images.len());
    info!(
        guild_id,
        images = images.len(),
        tier = tier.as_str(),
        "bulk scan started"
    );

    let mut completions = futures::stream::iter(
        images.into_iter().map(|image| process_bulk_image(state, gateway, tier, image)),
    )
    .buffer_unordered(BULK_FETCH_CONCURRENCY);

    let mut batch: Vec<BulkAppend> = Vec::new();
    let mut results = 0usize;
    let mut failures = 0usize;

    loop {
        tokio::select! {
            completion = completions.next() => match completion {
                Some(append) => {
                    match &append {
                        BulkAppend::Result(_) => results += 1,
                        BulkAppend::Failure(_) => failures += 1,
                    }
                    batch.push(append);
                    if batch.len() >= BATCH_MAX {
                        bulk::append_batch(&state.pool, &token, std::mem::take(&mut batch)).await?;
                    }
                }
                None => {
                    bulk::append_batch(&state.pool, &token, std::mem::take(&mut batch)).await?;
                    break;
                }
            },
            // Flush a partial batch if no completion lands for a while.
            _ = tokio::time::sleep(BATCH_FLUSH_AFTER), if !batch.is_empty() => {
                bulk::append_batch(&state.pool, &token, std::mem::take(&mut batch)).await?;
            }
        }
    }

    info!(guild_id, results, failures, "bulk scan complete");
    Ok(format!(
        "Scanned {} images ({} readable, {} need attention).\nReview and confirm here: {}/bulk/{}",
        results + failures,
        results,
        failures,
        state.config.public_web_url.trim_end_matches('/'),
        token
    ))
}

/// EXPRESS dry run that shows what the OCR engine and parser see.
pub async fn debug_ocr(
    state: &BotState,
    gateway: &dyn ChatGateway,
    guild_id: i64,
    image_url: &str,
) -> Result<String> {
    let bytes = gateway.fetch_image(image_url).await?;
    let output = state.engine.submit(Priority::Express, bytes).await;

    let mut reply = format!(
        "OCR status: {:?} (wait {} ms, processing {} ms)\n",
        output.status,
        output.wait.as_millis(),
        output.processing.as_millis()
    );

    if !output.boxes.is_empty() {
        let tokens: Vec<&str> = output.boxes.iter().map(|b| b.text.as_str()).collect();
        reply.push_str(&format!("Tokens: {}\n", tokens.join(" | ")));

        let roster = state.roster(guild_id).await?;
        let players = parse::detect_players(&output.boxes, &roster, DEFAULT_RACE_COUNT);
        if players.is_empty() {
            reply.push_str("No roster players recognized.");
        } else {
            reply.push_str(&format!("Parsed players:\n{}", format_players(&players)));
        }
    }

    Ok(reply)
}
