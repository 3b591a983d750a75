// =============================================================================
// Trade lifecycle — entry record, per-bar barrier evaluation, outcome
// =============================================================================
//
// A trade is created only on a confirmation signal and at most one exists
// per session. Exit barriers, checked on every completed bar in this order:
//
//   1. Stop      — pessimistic: the stop is evaluated before any target on
//                  the same bar; the bar may have hit it first.
//   2. 1R touch  — arms breakeven (stop trails to entry when enabled).
//   3. 2R touch  — recorded; the trade continues.
//   4. 3R touch  — full exit at the 3R target.
//
// Session end closes any open trade at the last close.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineError;
use crate::market_data::Candle;
use crate::risk;
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Current status of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Terminal result of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Win3R,
    Win2R,
    BreakevenStop,
    Loss,
    SessionTimeout,
}

impl std::fmt::Display for TradeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win3R => write!(f, "WIN_3R"),
            Self::Win2R => write!(f, "WIN_2R"),
            Self::BreakevenStop => write!(f, "BREAKEVEN_STOP"),
            Self::Loss => write!(f, "LOSS"),
            Self::SessionTimeout => write!(f, "SESSION_TIMEOUT"),
        }
    }
}

/// The entry record. Prices are cents; targets derive from the R-value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: i64,
    /// Initial stop (zone edge opposite the entry).
    pub stop_level: i64,
    /// Effective stop; moves to entry once 1R is reached with trailing on.
    pub current_stop: i64,
    /// `|entry_price - stop_level|`, always positive.
    pub r_value: i64,
    pub target_1r: i64,
    pub target_2r: i64,
    pub target_3r: i64,
    pub entry_timestamp: i64,
    pub status: TradeStatus,
}

/// Terminal record paired 1:1 with its trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: String,
    pub result: TradeResult,
    pub exit_price: i64,
    pub exit_timestamp: i64,
    /// Realized P&L in R units, rounded to 2 decimals.
    pub realized_r: f64,
    pub max_favorable_r: f64,
    pub max_adverse_r: f64,
    pub bars_held: u32,
    /// Highest R threshold touched: 0, 1, 2, or 3.
    pub first_threshold_reached: u8,
    pub timestamp_1r: Option<i64>,
    pub timestamp_2r: Option<i64>,
    pub timestamp_3r: Option<i64>,
    pub timestamp_stop: Option<i64>,
}

// ---------------------------------------------------------------------------
// TradeTracker — live barrier evaluation
// ---------------------------------------------------------------------------

/// Mutable bookkeeping for the open trade.
#[derive(Debug)]
pub struct TradeTracker {
    pub trade: Trade,
    trailing_stop_at_1r: bool,
    reached_1r: bool,
    first_threshold: u8,
    timestamp_1r: Option<i64>,
    timestamp_2r: Option<i64>,
    timestamp_3r: Option<i64>,
    timestamp_stop: Option<i64>,
    /// Bars seen since entry, including the exit bar. MFE/MAE are computed
    /// over these at close time.
    bars: Vec<Candle>,
    last_close: i64,
}

impl TradeTracker {
    /// Open a trade from a confirmation bar. Rejects a zero R-value — a
    /// strategy invariant, the session aborts rather than trade unriskable
    /// size.
    pub fn open(
        symbol: &str,
        direction: Direction,
        entry_price: i64,
        stop_level: i64,
        entry_timestamp: i64,
        trailing_stop_at_1r: bool,
    ) -> Result<Self, EngineError> {
        let r_value = risk::compute_r_value(entry_price, stop_level);
        if r_value == 0 {
            return Err(EngineError::StrategyInvariant {
                message: format!("entry {entry_price} equals stop {stop_level}: rValue == 0"),
            });
        }

        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            direction,
            entry_price,
            stop_level,
            current_stop: stop_level,
            r_value,
            target_1r: risk::compute_target_price(entry_price, r_value, 1, direction),
            target_2r: risk::compute_target_price(entry_price, r_value, 2, direction),
            target_3r: risk::compute_target_price(entry_price, r_value, 3, direction),
            entry_timestamp,
            status: TradeStatus::Open,
        };

        info!(
            id = %trade.id,
            symbol,
            direction = %direction,
            entry_price,
            stop_level,
            r_value,
            target_3r = trade.target_3r,
            "trade opened"
        );

        Ok(Self {
            trade,
            trailing_stop_at_1r,
            reached_1r: false,
            first_threshold: 0,
            timestamp_1r: None,
            timestamp_2r: None,
            timestamp_3r: None,
            timestamp_stop: None,
            bars: Vec::new(),
            last_close: entry_price,
        })
    }

    /// Whether the 1R threshold has been touched.
    pub fn reached_1r(&self) -> bool {
        self.reached_1r
    }

    /// Evaluate one completed bar against the barriers. Returns the outcome
    /// when the trade exits on this bar.
    pub fn on_bar(&mut self, bar: &Candle) -> Option<TradeOutcome> {
        let trade = &self.trade;
        let is_long = trade.direction == Direction::Long;
        self.bars.push(*bar);
        self.last_close = bar.close;

        // ── 1. Stop (checked first, pessimistic intrabar rule) ───────────
        let stop_hit = if is_long {
            bar.low <= trade.current_stop
        } else {
            bar.high >= trade.current_stop
        };
        if stop_hit {
            self.timestamp_stop = Some(bar.timestamp);
            let result = if self.reached_1r {
                TradeResult::BreakevenStop
            } else {
                TradeResult::Loss
            };
            return Some(self.close(trade.current_stop, bar.timestamp, result));
        }

        // ── 2. 1R ────────────────────────────────────────────────────────
        let touched_1r = if is_long {
            bar.high >= trade.target_1r
        } else {
            bar.low <= trade.target_1r
        };
        if touched_1r && !self.reached_1r {
            self.reached_1r = true;
            self.timestamp_1r = Some(bar.timestamp);
            self.first_threshold = self.first_threshold.max(1);
            if self.trailing_stop_at_1r {
                self.trade.current_stop = self.trade.entry_price;
                debug!(
                    id = %self.trade.id,
                    stop = self.trade.current_stop,
                    "1R reached, stop trailed to breakeven"
                );
            }
        }

        // ── 3. 2R ────────────────────────────────────────────────────────
        let trade = &self.trade;
        let touched_2r = if is_long {
            bar.high >= trade.target_2r
        } else {
            bar.low <= trade.target_2r
        };
        if touched_2r {
            if self.timestamp_2r.is_none() {
                self.timestamp_2r = Some(bar.timestamp);
            }
            self.first_threshold = self.first_threshold.max(2);
        }

        // ── 4. 3R: full exit at the target ───────────────────────────────
        let touched_3r = if is_long {
            bar.high >= trade.target_3r
        } else {
            bar.low <= trade.target_3r
        };
        if touched_3r {
            self.timestamp_3r = Some(bar.timestamp);
            self.first_threshold = 3;
            let target = self.trade.target_3r;
            return Some(self.close(target, bar.timestamp, TradeResult::Win3R));
        }

        None
    }

    /// Close the trade at the last seen close because the session ended.
    pub fn close_at_session_end(&mut self, timestamp: i64) -> TradeOutcome {
        let exit_price = self.last_close;
        let realized =
            risk::compute_r_multiple(self.trade.entry_price, exit_price, self.trade.r_value, self.trade.direction);
        let result = if realized >= 2.0 {
            TradeResult::Win2R
        } else {
            TradeResult::SessionTimeout
        };
        self.close(exit_price, timestamp, result)
    }

    fn close(&mut self, exit_price: i64, exit_timestamp: i64, result: TradeResult) -> TradeOutcome {
        self.trade.status = TradeStatus::Closed;

        let realized = risk::compute_r_multiple(
            self.trade.entry_price,
            exit_price,
            self.trade.r_value,
            self.trade.direction,
        );
        // Every exit price sits inside the exit bar's range, so the bars
        // alone bound both excursions.
        let max_favorable_r = risk::compute_mfe(
            &self.bars,
            self.trade.entry_price,
            self.trade.r_value,
            self.trade.direction,
        );
        let max_adverse_r = risk::compute_mae(
            &self.bars,
            self.trade.entry_price,
            self.trade.r_value,
            self.trade.direction,
        );

        let outcome = TradeOutcome {
            trade_id: self.trade.id.clone(),
            result,
            exit_price,
            exit_timestamp,
            realized_r: realized,
            max_favorable_r,
            max_adverse_r,
            bars_held: self.bars.len() as u32,
            first_threshold_reached: self.first_threshold,
            timestamp_1r: self.timestamp_1r,
            timestamp_2r: self.timestamp_2r,
            timestamp_3r: self.timestamp_3r,
            timestamp_stop: self.timestamp_stop,
        };

        info!(
            id = %outcome.trade_id,
            result = %outcome.result,
            exit_price,
            realized_r = outcome.realized_r,
            mfe = outcome.max_favorable_r,
            mae = outcome.max_adverse_r,
            bars_held = outcome.bars_held,
            "trade closed"
        );

        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================
