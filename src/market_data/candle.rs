// =============================================================================
// Candle — immutable 5-minute OHLCV bar in integer cents
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A single OHLCV bar. Prices are integer cents; `timestamp` is the bar's
/// start in UTC milliseconds. Raw bars from the upstream feed arrive with
/// `completed == false` and may be re-sent as they form; the completion
/// buffer marks them completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
    pub completed: bool,
    pub bar_size_minutes: u32,
}

impl Candle {
    /// Check the OHLC invariants: strictly positive prices, `high` at or
    /// above every other price, `low` at or below every other price.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |reason: String| EngineError::Validation {
            timestamp: self.timestamp,
            reason,
        };

        if self.open <= 0 || self.high <= 0 || self.low <= 0 || self.close <= 0 {
            return Err(fail(format!(
                "non-positive price (o={} h={} l={} c={})",
                self.open, self.high, self.low, self.close
            )));
        }
        if self.high < self.open || self.high < self.close || self.high < self.low {
            return Err(fail(format!(
                "high {} below another price (o={} l={} c={})",
                self.high, self.open, self.low, self.close
            )));
        }
        if self.low > self.open || self.low > self.close {
            return Err(fail(format!(
                "low {} above open {} or close {}",
                self.low, self.open, self.close
            )));
        }
        Ok(())
    }

    /// Bullish bar: closed above its open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Bearish bar: closed below its open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}
