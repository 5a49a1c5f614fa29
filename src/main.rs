//! ArthaBot Instrument Engine Service
//!
//! Boots the instrument cache, logs what it loaded, then keeps the cache
//! fresh on an interval until ctrl-c. With INSTRUMENT_DB_PATH set the cache
//! is disk-backed: restarts warm-start from SQLite instead of refetching the
//! feed.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tokio::time::interval;
use tracing::{error, info};

use arthabot_backend::instruments::service::InstrumentService;
use arthabot_backend::models::InstrumentsConfig;

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("🚀 ArthaBot Instrument Engine starting");

    let config = InstrumentsConfig::from_env();
    let check_interval = Duration::from_secs(config.check_interval_secs);
    let service = InstrumentService::new(config).context("construct instrument service")?;

    service
        .initialize()
        .await
        .context("instrument cache bootstrap")?;
    log_stats(&service);

    let mut ticker = interval(check_interval);
    ticker.tick().await; // interval fires immediately, bootstrap just ran

    info!(
        interval_secs = check_interval.as_secs(),
        "⏱ Freshness loop running, ctrl-c to stop"
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = service.ensure_fresh().await {
                    error!(error = %e, "Freshness check failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Shutdown requested");
                break;
            }
        }
    }

    log_stats(&service);
    Ok(())
}

fn log_stats(service: &InstrumentService) {
    let stats = service.stats();
    info!(
        backend = %service.backend(),
        instruments = stats.instrument_count,
        segments = ?stats.segments,
        last_refreshed = ?stats.last_refreshed_at,
        hits = stats.resolve_hits,
        misses = stats.resolve_misses,
        hit_rate = stats.hit_rate,
        "📊 Instrument cache stats"
    );
}

/// Initialize tracing with env-filter control
fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arthabot_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also try the manifest directory, for runs with --manifest-path from
    // elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
