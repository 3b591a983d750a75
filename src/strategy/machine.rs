// =============================================================================
// Strategy machine — session lifecycle from zone build to terminal exit
// =============================================================================
//
// Event-driven and fully synchronous: one `dispatch` runs to completion
// before the next bar is consumed, and every outcome is an explicit state —
// the machine has no exception paths.
//
//   WAITING ──(first bar at/after zone start)──▶ BUILDING_ZONE
//   BUILDING_ZONE ──(N bars)──▶ MONITORING | NO_TRADE (degenerate/choppy)
//   MONITORING ──(break)──▶ AWAITING_RETEST(dir)
//   AWAITING_RETEST ──(retest)──▶ AWAITING_CONFIRMATION(dir)
//   AWAITING_CONFIRMATION ──(confirmation)──▶ IN_TRADE
//                         ──(close back inside)──▶ MONITORING (attempt spent)
//   IN_TRADE ──(stop / 3R / session end)──▶ COMPLETE
//
// Attempts are per-direction, counted when a break fires, and capped; a
// direction at the cap is closed for the rest of the session. An opposite
// break supersedes a pending attempt when that side is still open.
// =============================================================================

use tracing::{debug, info, warn};

use crate::market_data::Candle;
use crate::session::context::{SessionContext, SessionStatus};
use crate::session_config::SessionConfig;
use crate::strategy::signal::{Signal, SignalKind};
use crate::strategy::trade::{Trade, TradeOutcome, TradeTracker};
use crate::strategy::zone::{DecisionZone, ZoneBuilder, ZoneStatus};
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Events and effects
// ---------------------------------------------------------------------------

/// Input to the machine. Bars arrive in strictly increasing timestamp order;
/// time-derived events come from the session runner's scheduler.
#[derive(Debug, Clone)]
pub enum Event {
    BarCompleted(Candle),
    SessionEnd { timestamp: i64 },
    ZoneBuildTimeout { timestamp: i64 },
}

/// Output of a dispatch, in occurrence order. The runner turns these into
/// orders, notifications, and persistence.
#[derive(Debug, Clone)]
pub enum Effect {
    ZoneEvaluated(DecisionZone),
    SignalEmitted(Signal),
    TradeOpened(Trade),
    TradeClosed { trade: Trade, outcome: TradeOutcome },
    SessionFinished(SessionStatus),
}

// ---------------------------------------------------------------------------
// Internal phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Phase {
    Waiting,
    BuildingZone,
    Monitoring,
    AwaitingRetest {
        direction: Direction,
        break_bar: Candle,
        attempt: u32,
    },
    AwaitingConfirmation {
        direction: Direction,
        retest_bar: Candle,
        attempt: u32,
    },
    InTrade,
    Finished,
}

// ---------------------------------------------------------------------------
// StrategyMachine
// ---------------------------------------------------------------------------

pub struct StrategyMachine {
    zone_start_ms: i64,
    max_break_attempts: u32,
    trailing_stop_at_1r: bool,
    phase: Phase,
    builder: ZoneBuilder,
    tracker: Option<TradeTracker>,
    context: SessionContext,
}

impl StrategyMachine {
    pub fn new(config: &SessionConfig, date: String, zone_start_ms: i64) -> Self {
        let context = SessionContext::new(date, config.symbol.clone(), config.execution_mode);
        Self {
            zone_start_ms,
            max_break_attempts: config.max_break_attempts,
            trailing_stop_at_1r: config.trailing_stop_at_1r,
            phase: Phase::Waiting,
            builder: ZoneBuilder::new(config.zone.clone()),
            tracker: None,
            context,
        }
    }

    /// Reference price from the premarket backfill, recorded before the zone
    /// build starts.
    pub fn set_premarket_price(&mut self, price: Option<i64>) {
        self.context.premarket_price = price;
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn into_context(self) -> SessionContext {
        self.context
    }

    pub fn status(&self) -> SessionStatus {
        self.context.status
    }

    pub fn mark_started(&mut self, timestamp: i64) {
        self.context.started_at_ms = Some(timestamp);
    }

    pub fn mark_ended(&mut self, timestamp: i64) {
        self.context.ended_at_ms = Some(timestamp);
    }

    /// Cooperative interruption at an event boundary.
    pub fn interrupt(&mut self) -> Vec<Effect> {
        if self.context.status.is_terminal() {
            return Vec::new();
        }
        warn!(symbol = %self.context.symbol, "session interrupted");
        vec![self.finish(SessionStatus::Interrupted)]
    }

    /// Abort the session with a fatal error message.
    pub fn abort(&mut self, message: impl Into<String>) -> Vec<Effect> {
        if self.context.status.is_terminal() {
            return Vec::new();
        }
        let message = message.into();
        warn!(error = %message, "session aborted");
        self.context.error = Some(message);
        vec![self.finish(SessionStatus::Error)]
    }

    /// Feed one event through the machine.
    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        if self.context.status.is_terminal() {
            return Vec::new();
        }
        match event {
            Event::BarCompleted(bar) => self.on_bar(bar),
            Event::SessionEnd { timestamp } => self.on_session_end(timestamp),
            Event::ZoneBuildTimeout { timestamp } => self.on_zone_timeout(timestamp),
        }
    }

    // -------------------------------------------------------------------------
    // Event handlers
    // -------------------------------------------------------------------------

    fn on_bar(&mut self, bar: Candle) -> Vec<Effect> {
        self.context.all_bars.push(bar);

        match self.phase {
            Phase::Waiting => {
                if bar.timestamp < self.zone_start_ms {
                    // Pre-zone bar; the runner normally filters these out.
                    return Vec::new();
                }
                self.phase = Phase::BuildingZone;
                self.context.status = SessionStatus::BuildingZone;
                debug!(timestamp = bar.timestamp, "zone build started");
                self.build_zone(bar)
            }
            Phase::BuildingZone => self.build_zone(bar),
            Phase::Monitoring => self.monitor(bar),
            Phase::AwaitingRetest {
                direction,
                break_bar,
                attempt,
            } => self.await_retest(bar, direction, break_bar, attempt),
            Phase::AwaitingConfirmation {
                direction,
                retest_bar,
                attempt,
            } => self.await_confirmation(bar, direction, retest_bar, attempt),
            Phase::InTrade => self.manage_trade(bar),
            Phase::Finished => Vec::new(),
        }
    }

    fn on_session_end(&mut self, timestamp: i64) -> Vec<Effect> {
        match self.phase {
            Phase::InTrade => {
                let Some(tracker) = self.tracker.as_mut() else {
                    return vec![self.finish(SessionStatus::Error)];
                };
                let outcome = tracker.close_at_session_end(timestamp);
                let trade = tracker.trade.clone();
                self.record_exit(trade, outcome)
            }
            Phase::Finished => Vec::new(),
            _ => {
                debug!(timestamp, phase = ?self.phase, "session end without a trade");
                vec![self.finish(SessionStatus::NoTrade)]
            }
        }
    }

    fn on_zone_timeout(&mut self, timestamp: i64) -> Vec<Effect> {
        match self.phase {
            Phase::Waiting | Phase::BuildingZone => {
                warn!(
                    timestamp,
                    bars = self.builder.bar_count(),
                    "zone build window elapsed short of bars"
                );
                vec![self.finish(SessionStatus::NoTrade)]
            }
            _ => Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Zone build
    // -------------------------------------------------------------------------

    fn build_zone(&mut self, bar: Candle) -> Vec<Effect> {
        if !self.builder.push(bar) {
            return Vec::new();
        }

        let zone = self
            .builder
            .evaluate(bar.timestamp, self.context.premarket_price);
        let verdict = zone.status;
        let mut effects = vec![Effect::ZoneEvaluated(zone.clone())];
        self.context.zone = Some(zone);

        if verdict == ZoneStatus::Defined {
            self.phase = Phase::Monitoring;
            self.context.status = SessionStatus::Monitoring;
        } else {
            effects.push(self.finish(SessionStatus::NoTrade));
        }
        effects
    }

    // -------------------------------------------------------------------------
    // Break detection
    // -------------------------------------------------------------------------

    fn zone_bounds(&self) -> (i64, i64) {
        let zone = self
            .context
            .zone
            .as_ref()
            .expect("zone bounds read before zone evaluation");
        (zone.support, zone.resistance)
    }

    fn attempts(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Long => self.context.long_attempts,
            Direction::Short => self.context.short_attempts,
        }
    }

    fn side_open(&self, direction: Direction) -> bool {
        self.attempts(direction) < self.max_break_attempts
    }

    /// Direction broken by this close, if any. An engulfing bar (range
    /// crossed both edges) resolves by the bar body; an exact doji is
    /// ignored.
    fn detect_break(&self, bar: &Candle) -> Option<Direction> {
        let (support, resistance) = self.zone_bounds();
        let breaks_up = bar.close > resistance;
        let breaks_down = bar.close < support;
        if !breaks_up && !breaks_down {
            return None;
        }
        if bar.high > resistance && bar.low < support {
            return if bar.is_bullish() {
                Some(Direction::Long)
            } else if bar.is_bearish() {
                Some(Direction::Short)
            } else {
                None
            };
        }
        if breaks_up {
            Some(Direction::Long)
        } else {
            Some(Direction::Short)
        }
    }

    fn monitor(&mut self, bar: Candle) -> Vec<Effect> {
        let Some(direction) = self.detect_break(&bar) else {
            return Vec::new();
        };
        if !self.side_open(direction) {
            debug!(
                direction = %direction,
                attempts = self.attempts(direction),
                "break ignored: side closed for the session"
            );
            return Vec::new();
        }
        self.begin_attempt(direction, bar)
    }

    fn begin_attempt(&mut self, direction: Direction, bar: Candle) -> Vec<Effect> {
        let attempt = match direction {
            Direction::Long => {
                self.context.long_attempts += 1;
                self.context.long_attempts
            }
            Direction::Short => {
                self.context.short_attempts += 1;
                self.context.short_attempts
            }
        };

        info!(
            direction = %direction,
            attempt,
            close = bar.close,
            "zone break detected"
        );

        let signal = Signal::from_bar(direction, SignalKind::Break, &bar, attempt);
        self.context.signals.push(signal.clone());
        self.phase = Phase::AwaitingRetest {
            direction,
            break_bar: bar,
            attempt,
        };
        vec![Effect::SignalEmitted(signal)]
    }

    /// Break in the opposite direction while an attempt is pending: the
    /// pending attempt is superseded if the other side is still open.
    fn try_supersede(&mut self, direction: Direction, bar: &Candle) -> Option<Vec<Effect>> {
        let (support, resistance) = self.zone_bounds();
        let opposite = direction.opposite();
        let opposite_break = match opposite {
            Direction::Long => bar.close > resistance,
            Direction::Short => bar.close < support,
        };
        if opposite_break && self.side_open(opposite) {
            info!(
                superseded = %direction,
                by = %opposite,
                close = bar.close,
                "pending attempt superseded by opposite break"
            );
            return Some(self.begin_attempt(opposite, *bar));
        }
        None
    }

    // -------------------------------------------------------------------------
    // Retest and confirmation
    // -------------------------------------------------------------------------

    fn await_retest(
        &mut self,
        bar: Candle,
        direction: Direction,
        break_bar: Candle,
        attempt: u32,
    ) -> Vec<Effect> {
        let (support, resistance) = self.zone_bounds();

        if bar.close > support && bar.close < resistance {
            return self.fail_attempt(direction, bar, attempt);
        }
        if let Some(effects) = self.try_supersede(direction, &bar) {
            return effects;
        }

        let is_retest = match direction {
            Direction::Long => bar.low <= resistance && bar.close > resistance,
            Direction::Short => bar.high >= support && bar.close < support,
        };
        if !is_retest {
            return Vec::new();
        }

        let signal = Signal::from_bar(direction, SignalKind::Retest, &bar, attempt);
        self.context.signals.push(signal.clone());
        let mut effects = vec![Effect::SignalEmitted(signal)];

        // The retest bar may confirm on its own, measured against the break
        // bar's extreme.
        let confirms = match direction {
            Direction::Long => bar.close > break_bar.high,
            Direction::Short => bar.close < break_bar.low,
        };
        if confirms {
            debug!(direction = %direction, close = bar.close, "retest and confirmation in one bar");
            effects.extend(self.confirm_entry(direction, bar, attempt));
        } else {
            self.phase = Phase::AwaitingConfirmation {
                direction,
                retest_bar: bar,
                attempt,
            };
        }
        effects
    }

    fn await_confirmation(
        &mut self,
        bar: Candle,
        direction: Direction,
        retest_bar: Candle,
        attempt: u32,
    ) -> Vec<Effect> {
        let (support, resistance) = self.zone_bounds();

        if bar.close > support && bar.close < resistance {
            return self.fail_attempt(direction, bar, attempt);
        }
        if let Some(effects) = self.try_supersede(direction, &bar) {
            return effects;
        }

        let confirms = match direction {
            Direction::Long => bar.close > resistance && bar.close > retest_bar.high,
            Direction::Short => bar.close < support && bar.close < retest_bar.low,
        };
        if confirms {
            return self.confirm_entry(direction, bar, attempt);
        }
        Vec::new()
    }

    fn fail_attempt(&mut self, direction: Direction, bar: Candle, attempt: u32) -> Vec<Effect> {
        info!(
            direction = %direction,
            attempt,
            close = bar.close,
            "break failure: close back inside the zone"
        );
        let signal = Signal::from_bar(direction, SignalKind::BreakFailure, &bar, attempt);
        self.context.signals.push(signal.clone());
        let mut effects = vec![Effect::SignalEmitted(signal)];

        if !self.side_open(Direction::Long) && !self.side_open(Direction::Short) {
            info!("both directions exhausted, no trade this session");
            effects.push(self.finish(SessionStatus::NoTrade));
        } else {
            self.phase = Phase::Monitoring;
        }
        effects
    }

    // -------------------------------------------------------------------------
    // Entry and trade management
    // -------------------------------------------------------------------------

    fn confirm_entry(&mut self, direction: Direction, bar: Candle, attempt: u32) -> Vec<Effect> {
        let (support, resistance) = self.zone_bounds();
        let signal = Signal::from_bar(direction, SignalKind::Confirmation, &bar, attempt);
        self.context.signals.push(signal.clone());
        let mut effects = vec![Effect::SignalEmitted(signal)];

        let stop_level = match direction {
            Direction::Long => support,
            Direction::Short => resistance,
        };

        match TradeTracker::open(
            &self.context.symbol,
            direction,
            bar.close,
            stop_level,
            bar.timestamp,
            self.trailing_stop_at_1r,
        ) {
            Ok(tracker) => {
                self.context.trades.push(tracker.trade.clone());
                effects.push(Effect::TradeOpened(tracker.trade.clone()));
                self.tracker = Some(tracker);
                self.phase = Phase::InTrade;
            }
            Err(err) => {
                warn!(error = %err, "entry rejected, aborting session");
                self.context.error = Some(err.to_string());
                effects.push(self.finish(SessionStatus::Error));
            }
        }
        effects
    }

    fn manage_trade(&mut self, bar: Candle) -> Vec<Effect> {
        let Some(tracker) = self.tracker.as_mut() else {
            self.context.error = Some("in trade without a tracker".to_string());
            return vec![self.finish(SessionStatus::Error)];
        };

        match tracker.on_bar(&bar) {
            Some(outcome) => {
                let trade = tracker.trade.clone();
                self.record_exit(trade, outcome)
            }
            None => {
                // Keep the stored trade record's stop in sync for snapshots.
                let trade = tracker.trade.clone();
                if let Some(stored) = self.context.trades.last_mut() {
                    *stored = trade;
                }
                Vec::new()
            }
        }
    }

    fn record_exit(&mut self, trade: Trade, outcome: TradeOutcome) -> Vec<Effect> {
        if let Some(stored) = self.context.trades.last_mut() {
            *stored = trade.clone();
        }
        self.context.outcomes.push(outcome.clone());
        vec![
            Effect::TradeClosed { trade, outcome },
            self.finish(SessionStatus::Complete),
        ]
    }

    fn finish(&mut self, status: SessionStatus) -> Effect {
        self.phase = Phase::Finished;
        self.context.status = status;
        info!(status = %status, "session finished");
        Effect::SessionFinished(status)
    }
}

// =============================================================================
// Tests
// =============================================================================
