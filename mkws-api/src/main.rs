//! mkws-api entry point

use anyhow::{Context, Result};
use mkws_api::{build_router, sweep, AppState};
use mkws_common::config::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mkws-api (review API)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("configuration")?;
    let pool = mkws_common::db::init_database(&config.database_url, config.db_pool_max)
        .await
        .context("database")?;

    tokio::spawn(sweep::run(pool.clone()));

    let port = config.api_port;
    let state = AppState::new(pool, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on http://0.0.0.0:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;
    Ok(())
}
