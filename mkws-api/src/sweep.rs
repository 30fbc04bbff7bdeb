//! Periodic expiry sweep
//!
//! Every 15 minutes: mark overdue `open` bulk sessions expired and
//! purge stale browser sessions.

use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{error, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub async fn run(pool: SqlitePool) {
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("expiry sweep running every {:?}", SWEEP_INTERVAL);

    loop {
        tick.tick().await;

        match mkws_common::db::bulk::sweep_expired(&pool).await {
            Ok(0) => {}
            Ok(swept) => info!(swept, "bulk sessions expired"),
            Err(e) => error!(error = %e, "bulk session sweep failed"),
        }

        match mkws_common::db::user_sessions::purge_expired(&pool).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "stale user sessions purged"),
            Err(e) => error!(error = %e, "user session purge failed"),
        }
    }
}
