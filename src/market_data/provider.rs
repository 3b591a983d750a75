// =============================================================================
// Market-data provider interface + historical replay implementation
// =============================================================================
//
// The concrete upstream wire protocol lives outside this crate; the engine
// consumes this trait only. `ReplayMarketData` serves pre-loaded candles as
// both backfill history and a raw-bar stream, re-sending each bar as a
// forming snapshot first so the completion buffer is exercised exactly the
// way a live feed would.
// =============================================================================

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::market_data::Candle;

// ---------------------------------------------------------------------------
// Interface types
// ---------------------------------------------------------------------------

/// Upstream connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnecting,
    Reconnecting,
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "CONNECTED"),
            Self::Disconnecting => write!(f, "DISCONNECTING"),
            Self::Reconnecting => write!(f, "RECONNECTING"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}

/// Resolved upstream contract for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    pub symbol: String,
    pub contract_id: String,
    pub exchange: String,
    pub currency: String,
}

/// Error event surfaced by the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderErrorEvent {
    pub code: String,
    pub message: String,
    pub timestamp: i64,
    pub recoverable: bool,
}

/// Raw bar stream: in-progress snapshots in arrival order, with provider
/// errors delivered in-band so the runner's pull loop sees them at the exact
/// point they occurred.
pub type RawBarStream = BoxStream<'static, Result<Candle, ProviderErrorEvent>>;

/// The upstream market-data surface the engine consumes.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn connect(&self) -> Result<(), EngineError>;
    async fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn connection_state(&self) -> ConnectionState;

    /// Resolve the tradeable contract for `symbol`. Failure is fatal for the
    /// session.
    async fn resolve_contract(&self, symbol: &str) -> Result<ContractSpec, EngineError>;

    /// Completed historical bars with `start_utc_ms <= timestamp < end_utc_ms`.
    async fn get_historical_bars(
        &self,
        symbol: &str,
        start_utc_ms: i64,
        end_utc_ms: i64,
    ) -> Result<Vec<Candle>, EngineError>;

    /// Subscribe to the raw (in-progress) bar stream for `symbol`.
    async fn subscribe_bars(&self, symbol: &str) -> Result<RawBarStream, EngineError>;
}

// ---------------------------------------------------------------------------
// ReplayMarketData
// ---------------------------------------------------------------------------

/// Historical replay provider: serves a fixed set of source bars.
///
/// The subscription emits two snapshots per source bar (a forming stub at
/// the open, then the full bar) so the downstream completion buffer performs
/// real same-timestamp replacement and lookahead completion.
pub struct ReplayMarketData {
    symbol: String,
    bars: Vec<Candle>,
    state: RwLock<ConnectionState>,
    /// Injected faults: error events delivered before the snapshot at the
    /// given source-bar index. Test hook for the reconnect path.
    faults: Mutex<Vec<(usize, ProviderErrorEvent)>>,
}

impl ReplayMarketData {
    pub fn new(symbol: impl Into<String>, bars: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
            state: RwLock::new(ConnectionState::Disconnected),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Deliver `event` in-band immediately before the source bar at `index`.
    pub fn inject_error_before(&self, index: usize, event: ProviderErrorEvent) {
        self.faults.lock().push((index, event));
    }

    fn require_connected(&self) -> Result<(), EngineError> {
        if *self.state.read() != ConnectionState::Connected {
            return Err(EngineError::ProviderRecoverable {
                message: format!("replay provider not connected ({})", self.connection_state()),
            });
        }
        Ok(())
    }

    /// Forming stub: the bar as it would first appear, pinned to its open.
    fn forming_snapshot(bar: &Candle) -> Candle {
        Candle {
            open: bar.open,
            high: bar.open,
            low: bar.open,
            close: bar.open,
            volume: bar.volume / 2,
            completed: false,
            ..*bar
        }
    }
}

#[async_trait]
impl MarketDataProvider for ReplayMarketData {
    async fn connect(&self) -> Result<(), EngineError> {
        *self.state.write() = ConnectionState::Connected;
        info!(symbol = %self.symbol, bars = self.bars.len(), "replay provider connected");
        Ok(())
    }

    async fn disconnect(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        debug!(symbol = %self.symbol, "replay provider disconnected");
    }

    fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionState::Connected
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn resolve_contract(&self, symbol: &str) -> Result<ContractSpec, EngineError> {
        if symbol != self.symbol {
            return Err(EngineError::ProviderFatal {
                message: format!("no contract for {symbol} (replay set holds {})", self.symbol),
            });
        }
        Ok(ContractSpec {
            symbol: symbol.to_string(),
            contract_id: format!("{symbol}.SMART"),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
        })
    }

    async fn get_historical_bars(
        &self,
        symbol: &str,
        start_utc_ms: i64,
        end_utc_ms: i64,
    ) -> Result<Vec<Candle>, EngineError> {
        self.require_connected()?;
        if symbol != self.symbol {
            return Err(EngineError::ProviderFatal {
                message: format!("unknown symbol {symbol}"),
            });
        }
        let bars = self
            .bars
            .iter()
            .filter(|b| b.timestamp >= start_utc_ms && b.timestamp < end_utc_ms)
            .map(|b| Candle {
                completed: true,
                ..*b
            })
            .collect();
        Ok(bars)
    }

    async fn subscribe_bars(&self, symbol: &str) -> Result<RawBarStream, EngineError> {
        self.require_connected()?;
        if symbol != self.symbol {
            return Err(EngineError::ProviderFatal {
                message: format!("unknown symbol {symbol}"),
            });
        }

        let faults = std::mem::take(&mut *self.faults.lock());
        let mut items: Vec<Result<Candle, ProviderErrorEvent>> = Vec::new();
        for (idx, bar) in self.bars.iter().enumerate() {
            for (_, event) in faults.iter().filter(|(at, _)| *at == idx) {
                items.push(Err(event.clone()));
            }
            items.push(Ok(Self::forming_snapshot(bar)));
            items.push(Ok(Candle {
                completed: false,
                ..*bar
            }));
        }

        debug!(
            symbol = %self.symbol,
            snapshots = items.len(),
            "replay subscription created"
        );
        Ok(stream::iter(items).boxed())
    }
}
