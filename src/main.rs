// =============================================================================
// Daybreak — main entry point
// =============================================================================
//
// Starts a single replay session from `session_config.json` (defaults when
// the file is missing). Live wiring swaps the replay provider for a real
// market-data client behind the same traits.
// =============================================================================

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use daybreak_bot::clock::{Clock, SimulatedClock, SystemClock};
use daybreak_bot::execution::MockExecution;
use daybreak_bot::market_data::ReplayMarketData;
use daybreak_bot::notify::LogNotifier;
use daybreak_bot::session::SessionRunner;
use daybreak_bot::session_config::SessionConfig;
use daybreak_bot::storage::MemoryStorage;
use daybreak_bot::types::ExecutionMode;

const CONFIG_PATH: &str = "session_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = SessionConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load session config, using defaults");
        SessionConfig::default()
    });

    if let Ok(symbol) = std::env::var("DAYBREAK_SYMBOL") {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() {
            config.symbol = symbol;
        }
    }

    info!(
        symbol = %config.symbol,
        mode = %config.execution_mode,
        zone_bars = config.zone.zone_bar_count,
        max_break_attempts = config.max_break_attempts,
        "Daybreak starting"
    );

    let clock: Arc<dyn Clock> = match config.execution_mode {
        ExecutionMode::Live => Arc::new(SystemClock),
        // Replay sessions drive time from the bar feed; start from the real
        // clock so the trading date resolves to today.
        ExecutionMode::Replay => Arc::new(SimulatedClock::new(SystemClock.now_ms())),
    };

    // Replay wiring: an empty bar set yields a clean NO_TRADE session. Feed
    // recorded candles here to re-run a day.
    let market_data = Arc::new(ReplayMarketData::new(config.symbol.clone(), Vec::new()));
    let execution = Arc::new(MockExecution::new(clock.clone()));
    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(LogNotifier);

    let mut runner = SessionRunner::new(
        config.clone(),
        clock,
        market_data,
        execution,
        storage,
        notifier,
    );

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, stopping session");
            stop.stop();
        }
    });

    let context = runner.run().await?;

    info!(
        date = %context.date,
        status = %context.status,
        signals = context.signals.len(),
        trades = context.trades.len(),
        outcomes = context.outcomes.len(),
        "session over"
    );

    if let Err(e) = config.save(CONFIG_PATH) {
        warn!(error = %e, "failed to save session config");
    }

    Ok(())
}
