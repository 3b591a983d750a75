// =============================================================================
// Session context — the aggregated record of one trading day
// =============================================================================
//
// The context owns every child record for a session. Signals, trades, and
// outcomes are append-only; the zone is assigned once; candles are shared by
// value. Uniqueness key for persistence: (date, symbol, is_backtest).
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::strategy::signal::Signal;
use crate::strategy::trade::{Trade, TradeOutcome};
use crate::strategy::zone::DecisionZone;
use crate::types::ExecutionMode;

/// Lifecycle of a session as surfaced to storage and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Waiting,
    BuildingZone,
    Monitoring,
    NoTrade,
    Complete,
    Interrupted,
    Error,
}

impl SessionStatus {
    /// Terminal states absorb all further events.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::NoTrade | Self::Complete | Self::Interrupted | Self::Error
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::BuildingZone => write!(f, "BUILDING_ZONE"),
            Self::Monitoring => write!(f, "MONITORING"),
            Self::NoTrade => write!(f, "NO_TRADE"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Interrupted => write!(f, "INTERRUPTED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One trading day's execution for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// YYYY-MM-DD in Eastern Time.
    pub date: String,
    pub symbol: String,
    pub execution_mode: ExecutionMode,
    pub status: SessionStatus,
    pub zone: Option<DecisionZone>,
    pub signals: Vec<Signal>,
    pub trades: Vec<Trade>,
    pub outcomes: Vec<TradeOutcome>,
    /// Every completed bar the machine saw, in timestamp order.
    pub all_bars: Vec<Candle>,
    /// Break attempts consumed per direction.
    pub long_attempts: u32,
    pub short_attempts: u32,
    /// Reference price captured before the zone build.
    pub premarket_price: Option<i64>,
    pub started_at_ms: Option<i64>,
    pub ended_at_ms: Option<i64>,
    pub error: Option<String>,
}

impl SessionContext {
    pub fn new(date: String, symbol: String, execution_mode: ExecutionMode) -> Self {
        Self {
            date,
            symbol,
            execution_mode,
            status: SessionStatus::Waiting,
            zone: None,
            signals: Vec::new(),
            trades: Vec::new(),
            outcomes: Vec::new(),
            all_bars: Vec::new(),
            long_attempts: 0,
            short_attempts: 0,
            premarket_price: None,
            started_at_ms: None,
            ended_at_ms: None,
            error: None,
        }
    }

    /// Whether the session records are flagged as backtest output.
    pub fn is_backtest(&self) -> bool {
        self.execution_mode == ExecutionMode::Replay
    }
}
