//! VOLSCAN: multi-estimator volatility scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects to the market data provider and runs the periodic scan loop
//! with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use volscan::config;
use volscan::engine::accountant::CycleRecord;
use volscan::engine::orchestrator::ScanOrchestrator;
use volscan::market_data::binance::BinanceFuturesClient;
use volscan::market_data::MarketDataProvider;
use volscan::storage;
use volscan::storage::metrics::MetricsStore;

const BANNER: &str = r#"
 __     _____  _     ____   ____    _    _   _
 \ \   / / _ \| |   / ___| / ___|  / \  | \ | |
  \ \ / / | | | |   \___ \| |     / _ \ |  \| |
   \ V /| |_| | |___ ___) | |___ / ___ \| |\  |
    \_/  \___/|_____|____/ \____/_/   \_\_| \_|

  Multi-estimator volatility scanner
  v0.1.0
"#;

/// Opportunities logged after each cycle.
const TOP_OPPORTUNITIES: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("VOLSCAN_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        scanner = %cfg.scanner.name,
        config = %config_path,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        bar_interval = %cfg.scanner.bar_interval,
        workers = cfg.scanner.worker_pool_size,
        "VOLSCAN starting up"
    );

    // -- Initialise components -------------------------------------------

    let provider: Arc<dyn MarketDataProvider> =
        Arc::new(BinanceFuturesClient::new(&cfg.market_data)?);
    info!(provider = provider.name(), base_url = %cfg.market_data.base_url, "Market data provider ready");

    let mut orchestrator = ScanOrchestrator::new(provider, &cfg)?;

    let metrics_store = match cfg.scanner.metrics_db.as_deref() {
        Some(url) => match MetricsStore::connect(url).await {
            Ok(store) => {
                info!(url, "Cycle metrics persisted to SQLite");
                Some(store)
            }
            Err(e) => {
                warn!(error = %e, "Metrics database unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.scanner.scan_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    orchestrator.set_running(true);
    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Entering scan loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let record = orchestrator.run_cycle().await;

                if let Some(path) = cfg.scanner.export_path.as_deref() {
                    if let Err(e) = storage::save_export(&orchestrator.export(), path) {
                        error!(error = %e, "Failed to save export");
                    }
                }
                if let Some(store) = &metrics_store {
                    if let Err(e) = store.record_cycle(&record).await {
                        error!(error = %e, "Failed to persist cycle metrics");
                    }
                }

                log_top_opportunities(&orchestrator, &record);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    orchestrator.set_running(false);
    if let Some(path) = cfg.scanner.export_path.as_deref() {
        storage::save_export(&orchestrator.export(), path)?;
    }

    let status = orchestrator.status();
    info!(
        cycles = status.scan_count,
        opportunities = status.opportunities_found,
        avg_scan_ms = format!("{:.0}", status.performance.avg_scan_time_ms),
        success_rate = format!("{:.1}%", status.performance.success_rate * 100.0),
        health = %status.health,
        "VOLSCAN shut down cleanly."
    );

    Ok(())
}

/// Log the best live opportunities after a cycle.
fn log_top_opportunities(orchestrator: &ScanOrchestrator, record: &CycleRecord) {
    let top = orchestrator.top_opportunities(TOP_OPPORTUNITIES);
    if top.is_empty() {
        return;
    }
    for (rank, opp) in top.iter().enumerate() {
        info!(
            cycle = record.cycle_number,
            rank = rank + 1,
            symbol = %opp.symbol,
            direction = %opp.direction,
            confidence = format!("{:.2}", opp.confidence),
            expected_move = format!("{:.2}%", opp.expected_move),
            score = format!("{:.1}", opp.profile.opportunity_score),
            expires_at = %opp.expires_at,
            "Top opportunity"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("volscan=info"));

    let json_logging = std::env::var("VOLSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
