//! Instrument Cache Inspector CLI
//!
//! Diagnostics for the instrument identity engine: resolve symbols to
//! security ids, search the master, print cache statistics, force a refresh.
//!
//! Usage:
//!   cargo run --release --bin instruments_inspect -- resolve TCS RELIANCE
//!   cargo run --release --bin instruments_inspect -- --segment BSE_EQ resolve TATAMOTORS
//!   cargo run --release --bin instruments_inspect -- search TATA
//!   cargo run --release --bin instruments_inspect -- stats
//!   cargo run --release --bin instruments_inspect -- refresh

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use arthabot_backend::instruments::service::InstrumentService;
use arthabot_backend::instruments::types::ExchangeSegment;
use arthabot_backend::models::InstrumentsConfig;

#[derive(Parser, Debug)]
#[command(name = "instruments_inspect")]
#[command(about = "Inspect the instrument identity cache")]
struct Args {
    /// Exchange segment to query
    #[arg(long, default_value = "NSE_EQ")]
    segment: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve symbols to security ids
    Resolve {
        #[arg(required = true)]
        symbols: Vec<String>,

        /// ISIN hint, honored when resolving a single symbol
        #[arg(long)]
        isin: Option<String>,
    },

    /// Substring search over the segment's symbols
    Search {
        query: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Print cache statistics
    Stats {
        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Force a full refresh, ignoring the TTL
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("instruments_inspect=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let segment = ExchangeSegment::new(&args.segment);

    let config = InstrumentsConfig::from_env();
    let service = InstrumentService::new(config).context("construct instrument service")?;
    service
        .initialize()
        .await
        .context("bootstrap instrument cache")?;

    match args.command {
        Commands::Resolve { symbols, isin } => cmd_resolve(&service, &segment, &symbols, isin),
        Commands::Search { query, limit } => cmd_search(&service, &segment, &query, limit),
        Commands::Stats { json } => cmd_stats(&service, json)?,
        Commands::Refresh => cmd_refresh(&service).await,
    }

    Ok(())
}

fn cmd_resolve(
    service: &InstrumentService,
    segment: &ExchangeSegment,
    symbols: &[String],
    isin: Option<String>,
) {
    println!("Segment: {}", segment);
    println!();

    if let [symbol] = symbols {
        match service.resolve_one(symbol, segment, isin.as_deref()) {
            Ok(id) => {
                println!("  {:<16} -> {}", symbol, id);
                if let Some(display) = service.store().lookup_by_id(segment, id) {
                    println!("  {:<16}    provider name: {}", "", display);
                }
            }
            Err(e) => println!("  {:<16} ✗ {}", symbol, e),
        }
        return;
    }

    if isin.is_some() {
        println!("  (--isin ignored for multi-symbol resolve)");
    }
    let resolution = service.resolve_batch(symbols, segment);

    let mut found: Vec<_> = resolution.found.iter().collect();
    found.sort_by(|a, b| a.0.cmp(b.0));
    for (symbol, id) in found {
        println!("  {:<16} -> {}", symbol, id);
    }
    for symbol in &resolution.missing {
        println!("  {:<16} ✗ not found", symbol);
    }
    println!();
    println!(
        "Resolved {}/{} symbols",
        resolution.found.len(),
        symbols.len()
    );
}

fn cmd_search(service: &InstrumentService, segment: &ExchangeSegment, query: &str, limit: usize) {
    let matches = service.search(segment, query, limit);
    if matches.is_empty() {
        println!("No matches for '{}' in {}", query, segment);
        return;
    }

    println!("Matches for '{}' in {}:", query, segment);
    for (symbol, id) in matches {
        println!("  {:<24} {}", symbol, id);
    }
}

fn cmd_stats(service: &InstrumentService, json: bool) -> Result<()> {
    let stats = service.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Instrument cache ({})", service.backend());
    println!("  Instruments:    {}", stats.instrument_count);
    for (segment, count) in &stats.segments {
        println!("    {:<12} {}", segment, count);
    }
    match stats.last_refreshed_at {
        Some(at) => println!("  Last refreshed: {}", at.to_rfc3339()),
        None => println!("  Last refreshed: never"),
    }
    println!(
        "  Lookups:        {} hits / {} misses ({:.1}% hit rate)",
        stats.resolve_hits,
        stats.resolve_misses,
        stats.hit_rate * 100.0
    );
    Ok(())
}

async fn cmd_refresh(service: &InstrumentService) {
    match service.force_refresh().await {
        Ok(outcome) => {
            println!(
                "Refresh complete: {} segments ok, {} failed",
                outcome.segments_ok, outcome.segments_failed
            );
            for failure in &outcome.failures {
                println!("  ✗ {}", failure);
            }
            println!();
            let _ = cmd_stats(service, false);
        }
        Err(e) => println!("Refresh failed: {}", e),
    }
}
