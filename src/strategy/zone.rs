// =============================================================================
// Decision zone — the opening range and its validity verdict
// =============================================================================
//
// The zone is the price envelope of the first N completed bars at or after
// the zone-start time (default 6 bars of 5 minutes, the first half hour).
// Verdicts, checked in order:
//
//   DEGENERATE — spread below the cent floor, or wider than the configured
//                percentage of the mid price.
//   CHOPPY     — a source bar closed outside the envelope of the bars that
//                came before it (the range whipsawed while forming).
//   DEFINED    — tradeable.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::market_data::Candle;
use crate::session_config::ZoneParams;

/// Validity verdict for a decision zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneStatus {
    Pending,
    Defined,
    Choppy,
    Degenerate,
}

impl std::fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Defined => write!(f, "DEFINED"),
            Self::Choppy => write!(f, "CHOPPY"),
            Self::Degenerate => write!(f, "DEGENERATE"),
        }
    }
}

/// The assembled decision zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionZone {
    /// Lower bound, cents.
    pub support: i64,
    /// Upper bound, cents.
    pub resistance: i64,
    /// `resistance - support`.
    pub spread: i64,
    pub status: ZoneStatus,
    /// When the verdict was reached (UTC ms).
    pub defined_at: i64,
    /// The bars the zone was built from.
    pub source_bars: Vec<Candle>,
    /// Reference price captured before the zone build, if backfill produced
    /// one.
    pub premarket_price: Option<i64>,
}

impl DecisionZone {
    /// Mid price of the zone in cents.
    pub fn mid_price(&self) -> i64 {
        (self.support + self.resistance) / 2
    }

    /// Whether a close sits strictly inside the zone.
    pub fn contains_close(&self, close: i64) -> bool {
        close > self.support && close < self.resistance
    }
}

// ---------------------------------------------------------------------------
// ZoneBuilder
// ---------------------------------------------------------------------------

/// Accumulates zone bars and tracks the whipsaw flag while the range forms.
#[derive(Debug)]
pub struct ZoneBuilder {
    params: ZoneParams,
    bars: Vec<Candle>,
    support: i64,
    resistance: i64,
    whipsaw: bool,
}

impl ZoneBuilder {
    pub fn new(params: ZoneParams) -> Self {
        Self {
            params,
            bars: Vec::new(),
            support: 0,
            resistance: 0,
            whipsaw: false,
        }
    }

    /// Number of source bars accumulated so far.
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// Whether enough bars have arrived to evaluate the zone.
    pub fn is_complete(&self) -> bool {
        self.bars.len() >= self.params.zone_bar_count
    }

    /// Fold one completed bar into the forming range. Returns `true` once
    /// the zone has all its bars.
    ///
    /// A bar (after the first) closing outside the envelope of the bars
    /// before it marks the zone choppy; the envelope then expands to include
    /// it either way.
    pub fn push(&mut self, bar: Candle) -> bool {
        if self.bars.is_empty() {
            self.support = bar.low;
            self.resistance = bar.high;
        } else {
            if bar.close > self.resistance || bar.close < self.support {
                debug!(
                    close = bar.close,
                    support = self.support,
                    resistance = self.resistance,
                    "zone bar closed outside forming range"
                );
                self.whipsaw = true;
            }
            self.support = self.support.min(bar.low);
            self.resistance = self.resistance.max(bar.high);
        }
        self.bars.push(bar);
        self.is_complete()
    }

    /// Evaluate the accumulated bars into a final zone.
    pub fn evaluate(&self, defined_at: i64, premarket_price: Option<i64>) -> DecisionZone {
        let spread = self.resistance - self.support;
        let mid = (self.support + self.resistance) / 2;
        let spread_pct = if mid > 0 {
            spread as f64 / mid as f64 * 100.0
        } else {
            0.0
        };

        let status = if spread < self.params.min_zone_spread_cents
            || spread_pct > self.params.max_zone_spread_pct
        {
            ZoneStatus::Degenerate
        } else if self.whipsaw {
            ZoneStatus::Choppy
        } else {
            ZoneStatus::Defined
        };

        info!(
            support = self.support,
            resistance = self.resistance,
            spread,
            spread_pct = format!("{spread_pct:.3}"),
            status = %status,
            bars = self.bars.len(),
            "decision zone evaluated"
        );

        DecisionZone {
            support: self.support,
            resistance: self.resistance,
            spread,
            status,
            defined_at,
            source_bars: self.bars.clone(),
            premarket_price,
        }
    }

    /// Drop all accumulated state.
    pub fn reset(&mut self) {
        self.bars.clear();
        self.support = 0;
        self.resistance = 0;
        self.whipsaw = false;
    }
}

// =============================================================================
// Tests
// =============================================================================
