// =============================================================================
// Signals — the audit trail of break / retest / confirmation events
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::types::Direction;

/// What a signal records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Break,
    Retest,
    Confirmation,
    BreakFailure,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Break => write!(f, "BREAK"),
            Self::Retest => write!(f, "RETEST"),
            Self::Confirmation => write!(f, "CONFIRMATION"),
            Self::BreakFailure => write!(f, "BREAK_FAILURE"),
        }
    }
}

/// One strategy event, appended to the session in event order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub kind: SignalKind,
    /// Trigger bar start, UTC ms.
    pub timestamp: i64,
    /// Close of the trigger bar, cents.
    pub price: i64,
    pub trigger_candle: Candle,
    /// 1-based attempt this signal belongs to, per direction.
    pub attempt_number: u32,
}

impl Signal {
    pub fn from_bar(
        direction: Direction,
        kind: SignalKind,
        bar: &Candle,
        attempt_number: u32,
    ) -> Self {
        Self {
            direction,
            kind,
            timestamp: bar.timestamp,
            price: bar.close,
            trigger_candle: *bar,
            attempt_number,
        }
    }
}
