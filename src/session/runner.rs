// =============================================================================
// Session runner — drives backfill, bar stream, clock events, and persistence
// =============================================================================
//
// The single driver of a trading session:
//
//   1. Resolve the contract and backfill premarket history through pacing.
//   2. Wait for the zone-start wall clock.
//   3. Pull raw bars through the completion buffer and validator, dispatching
//      each completed bar to the strategy machine in timestamp order.
//   4. Derive `ZoneBuildTimeout` and `SessionEnd` from the session windows.
//   5. Route machine effects to the execution provider and notifier.
//   6. Persist the final session snapshot.
//
// Dispatching is synchronous: one bar runs to completion before the next is
// consumed. `stop()` interrupts cooperatively at the next event boundary and
// cancels any pacing wait in flight.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::calendar::{self, SessionWindows};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::execution::{OrderExecutionProvider, OrderRequest, OrderStatus, OrderType};
use crate::market_data::{Candle, CompletionBuffer, ContractSpec, MarketDataProvider, RawBarStream};
use crate::notify::{Notification, NotificationProvider, NotifyKind};
use crate::pacing::PacingManager;
use crate::session::context::{SessionContext, SessionStatus};
use crate::session_config::SessionConfig;
use crate::storage::{SessionKey, StorageProvider};
use crate::strategy::machine::{Effect, Event, StrategyMachine};
use crate::strategy::signal::SignalKind;
use crate::strategy::trade::{Trade, TradeOutcome, TradeResult};
use crate::strategy::zone::ZoneStatus;

/// Cooperative stop switch for a running session.
#[derive(Clone)]
pub struct StopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    pacing: Arc<PacingManager>,
}

impl StopHandle {
    /// Request interruption at the next event boundary.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
        self.pacing.shutdown();
    }
}

/// Orchestrates one session for one symbol.
pub struct SessionRunner {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    market_data: Arc<dyn MarketDataProvider>,
    execution: Arc<dyn OrderExecutionProvider>,
    storage: Arc<dyn StorageProvider>,
    notifier: Arc<dyn NotificationProvider>,
    pacing: Arc<PacingManager>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl SessionRunner {
    pub fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        market_data: Arc<dyn MarketDataProvider>,
        execution: Arc<dyn OrderExecutionProvider>,
        storage: Arc<dyn StorageProvider>,
        notifier: Arc<dyn NotificationProvider>,
    ) -> Self {
        let pacing = Arc::new(PacingManager::new(config.pacing.clone(), clock.clone()));
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            clock,
            market_data,
            execution,
            storage,
            notifier,
            pacing,
            stop_tx: Arc::new(stop_tx),
        }
    }

    pub fn pacing(&self) -> &PacingManager {
        &self.pacing
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_tx: self.stop_tx.clone(),
            pacing: self.pacing.clone(),
        }
    }

    /// Run the session to its terminal state and return the final record.
    ///
    /// Provider and strategy failures end up encoded in the context status;
    /// only configuration problems surface as `Err`.
    pub async fn run(&mut self) -> Result<SessionContext> {
        let cal = self.config.windows.calendar()?;
        let date = cal.trading_date(self.clock.now_ms());
        let date_str = calendar::date_string(date);

        if !cal.is_trading_day(date) {
            warn!(date = %date_str, "not a trading day");
            let mut machine = StrategyMachine::new(&self.config, date_str, 0);
            machine.mark_started(self.clock.now_ms());
            machine.dispatch(Event::SessionEnd {
                timestamp: self.clock.now_ms(),
            });
            return Ok(self.finalize(machine).await);
        }

        let windows = cal.session_windows(date)?;
        info!(
            date = %date_str,
            symbol = %self.config.symbol,
            mode = %self.config.execution_mode,
            zone_start = windows.zone_start_ms,
            execution_end = windows.execution_end_ms,
            "session starting"
        );

        let mut machine = StrategyMachine::new(&self.config, date_str, windows.zone_start_ms);
        machine.mark_started(self.clock.now_ms());

        // ── Connect and resolve the contract ─────────────────────────────
        if let Err(err) = self.market_data.connect().await {
            self.fail(&mut machine, err).await;
            return Ok(self.finalize(machine).await);
        }
        let contract = match self.market_data.resolve_contract(&self.config.symbol).await {
            Ok(contract) => contract,
            Err(err) => {
                self.fail(&mut machine, err).await;
                return Ok(self.finalize(machine).await);
            }
        };

        // ── Premarket backfill through pacing ────────────────────────────
        match self.backfill_premarket(&contract, &windows).await {
            Ok(price) => machine.set_premarket_price(price),
            Err(EngineError::Interrupted { .. }) => {
                let effects = machine.interrupt();
                self.apply_effects(effects).await;
                return Ok(self.finalize(machine).await);
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "premarket backfill unavailable, continuing without it");
            }
            Err(err) => {
                self.fail(&mut machine, err).await;
                return Ok(self.finalize(machine).await);
            }
        }

        // ── Wait for the zone-start wall clock ───────────────────────────
        self.clock.wait_until(windows.zone_start_ms).await;

        // ── Stream bars through buffer + validator + machine ─────────────
        match self.market_data.subscribe_bars(&self.config.symbol).await {
            Ok(stream) => self.pump(&mut machine, stream, &windows).await,
            Err(err) => self.fail(&mut machine, err).await,
        }

        self.market_data.disconnect().await;
        Ok(self.finalize(machine).await)
    }

    // -------------------------------------------------------------------------
    // Backfill
    // -------------------------------------------------------------------------

    async fn backfill_premarket(
        &self,
        contract: &ContractSpec,
        windows: &SessionWindows,
    ) -> Result<Option<i64>, EngineError> {
        let request_key = format!(
            "{}:{}:{}:{}m",
            self.config.symbol,
            windows.premarket_open_ms,
            windows.zone_start_ms,
            self.config.bar_size_minutes
        );
        self.pacing.acquire(&contract.contract_id, &request_key).await?;

        let bars = self
            .market_data
            .get_historical_bars(
                &self.config.symbol,
                windows.premarket_open_ms,
                windows.zone_start_ms,
            )
            .await?;

        let premarket_price = bars.last().map(|bar| bar.close);
        debug!(
            bars = bars.len(),
            premarket_price = ?premarket_price,
            "premarket backfill complete"
        );
        Ok(premarket_price)
    }

    // -------------------------------------------------------------------------
    // Bar pump
    // -------------------------------------------------------------------------

    async fn pump(
        &self,
        machine: &mut StrategyMachine,
        mut stream: RawBarStream,
        windows: &SessionWindows,
    ) {
        let mut buffer = CompletionBuffer::new();
        let mut stop_rx = self.stop_tx.subscribe();
        let mut recovering_since: Option<i64> = None;

        loop {
            if *stop_rx.borrow() {
                let effects = machine.interrupt();
                self.apply_effects(effects).await;
                return;
            }

            let item = tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    let effects = machine.interrupt();
                    self.apply_effects(effects).await;
                    return;
                }
                item = stream.next() => item,
            };

            let Some(item) = item else {
                // Feed exhausted: the session is over.
                self.complete_session(machine, &mut buffer, windows).await;
                return;
            };

            let raw = match item {
                Ok(raw) => raw,
                Err(event) if event.recoverable => {
                    let now = self.clock.now_ms();
                    let since = *recovering_since.get_or_insert(now);
                    if now - since > self.config.reconnect_grace_ms {
                        warn!(code = %event.code, "reconnect grace period exhausted");
                        let effects = machine.interrupt();
                        self.apply_effects(effects).await;
                        return;
                    }
                    warn!(
                        code = %event.code,
                        message = %event.message,
                        "recoverable provider error, awaiting reconnect"
                    );
                    continue;
                }
                Err(event) => {
                    let effects =
                        machine.abort(format!("provider error {}: {}", event.code, event.message));
                    self.apply_effects(effects).await;
                    return;
                }
            };
            recovering_since = None;

            // Session bounds: premarket snapshots are skipped; the first bar
            // at or past the execution end closes the session.
            if raw.timestamp < windows.zone_start_ms {
                continue;
            }
            if raw.timestamp >= windows.execution_end_ms {
                self.complete_session(machine, &mut buffer, windows).await;
                return;
            }

            match buffer.push(raw) {
                Ok(Some(done)) => {
                    self.deliver(machine, done, windows).await;
                    if machine.status().is_terminal() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(code = err.code(), error = %err, "raw bar rejected");
                }
            }
        }
    }

    /// Validate and dispatch one completed bar, deriving the zone-build
    /// timeout when the bar's time has passed the zone end.
    async fn deliver(&self, machine: &mut StrategyMachine, bar: Candle, windows: &SessionWindows) {
        if let Err(err) = bar.validate() {
            warn!(code = err.code(), error = %err, "completed bar dropped");
            return;
        }

        if bar.timestamp >= windows.zone_end_ms
            && matches!(
                machine.status(),
                SessionStatus::Waiting | SessionStatus::BuildingZone
            )
        {
            let effects = machine.dispatch(Event::ZoneBuildTimeout {
                timestamp: windows.zone_end_ms,
            });
            self.apply_effects(effects).await;
            if machine.status().is_terminal() {
                return;
            }
        }

        let effects = machine.dispatch(Event::BarCompleted(bar));
        self.apply_effects(effects).await;
    }

    /// Flush the buffer and send the session-end event.
    async fn complete_session(
        &self,
        machine: &mut StrategyMachine,
        buffer: &mut CompletionBuffer,
        windows: &SessionWindows,
    ) {
        if let Some(last) = buffer.flush() {
            if last.timestamp < windows.execution_end_ms && !machine.status().is_terminal() {
                self.deliver(machine, last, windows).await;
            }
        }
        if !machine.status().is_terminal() {
            let effects = machine.dispatch(Event::SessionEnd {
                timestamp: windows.execution_end_ms,
            });
            self.apply_effects(effects).await;
        }
    }

    // -------------------------------------------------------------------------
    // Effects
    // -------------------------------------------------------------------------

    async fn fail(&self, machine: &mut StrategyMachine, err: EngineError) {
        error!(code = err.code(), error = %err, "session failed");
        let effects = machine.abort(err.to_string());
        self.apply_effects(effects).await;
    }

    async fn apply_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ZoneEvaluated(zone) => {
                    if zone.status == ZoneStatus::Defined {
                        self.notify(
                            NotifyKind::ZoneDefined,
                            format!(
                                "zone defined: support {} resistance {}",
                                zone.support, zone.resistance
                            ),
                            Some(serde_json::json!({
                                "support": zone.support,
                                "resistance": zone.resistance,
                                "spread": zone.spread,
                            })),
                        );
                    }
                }
                Effect::SignalEmitted(signal) => match signal.kind {
                    SignalKind::Break => self.notify(
                        NotifyKind::BreakDetected,
                        format!(
                            "{} break at {} (attempt {})",
                            signal.direction, signal.price, signal.attempt_number
                        ),
                        None,
                    ),
                    SignalKind::Confirmation => self.notify(
                        NotifyKind::EntrySignal,
                        format!("{} entry confirmed at {}", signal.direction, signal.price),
                        None,
                    ),
                    SignalKind::Retest | SignalKind::BreakFailure => {}
                },
                Effect::TradeOpened(trade) => self.submit_entry(&trade).await,
                Effect::TradeClosed { trade, outcome } => self.submit_exit(&trade, &outcome).await,
                Effect::SessionFinished(status) => {
                    if status == SessionStatus::Error {
                        self.notify(
                            NotifyKind::SessionError,
                            "session aborted with an error".to_string(),
                            None,
                        );
                    }
                }
            }
        }
    }

    async fn submit_entry(&self, trade: &Trade) {
        let request = OrderRequest {
            symbol: trade.symbol.clone(),
            direction: trade.direction,
            quantity: 1,
            order_type: OrderType::Limit,
            limit_price: Some(trade.entry_price),
            stop_price: None,
        };
        match self.execution.place_order(request).await {
            Ok(receipt) if receipt.status == OrderStatus::Rejected => {
                warn!(reason = ?receipt.reason, "entry order rejected");
            }
            Ok(receipt) => {
                debug!(order_id = %receipt.order_id, "entry order placed");
            }
            Err(err) => warn!(error = %err, "entry order failed"),
        }
    }

    async fn submit_exit(&self, trade: &Trade, outcome: &TradeOutcome) {
        // Flatten the unit position at the exit price.
        let request = OrderRequest {
            symbol: trade.symbol.clone(),
            direction: trade.direction.opposite(),
            quantity: 1,
            order_type: OrderType::Limit,
            limit_price: Some(outcome.exit_price),
            stop_price: None,
        };
        if let Err(err) = self.execution.place_order(request).await {
            warn!(error = %err, "exit order failed");
        }

        match outcome.result {
            TradeResult::Win3R | TradeResult::Win2R => self.notify(
                NotifyKind::TargetHit,
                format!("{} at {} ({}R)", outcome.result, outcome.exit_price, outcome.realized_r),
                None,
            ),
            TradeResult::Loss | TradeResult::BreakevenStop => self.notify(
                NotifyKind::StopHit,
                format!("{} at {}", outcome.result, outcome.exit_price),
                None,
            ),
            TradeResult::SessionTimeout => {}
        }
    }

    fn notify(&self, kind: NotifyKind, message: String, data: Option<serde_json::Value>) {
        self.notifier.notify(Notification {
            kind,
            symbol: self.config.symbol.clone(),
            timestamp: self.clock.now_ms(),
            message,
            data,
        });
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    async fn finalize(&self, mut machine: StrategyMachine) -> SessionContext {
        machine.mark_ended(self.clock.now_ms());
        let context = machine.into_context();
        let key = SessionKey::of(&context);

        // A cancelled session leaves no partial record behind unless a trade
        // was already created.
        if context.status == SessionStatus::Interrupted && context.trades.is_empty() {
            debug!(date = %context.date, "interrupted before any trade, nothing persisted");
            return context;
        }

        let persisted: Result<(), EngineError> = async {
            self.storage.save_session(&context).await?;
            self.storage.save_signals(&key, &context.signals).await?;
            self.storage.save_bars(&key, &context.all_bars).await?;
            if let (Some(trade), Some(outcome)) = (context.trades.last(), context.outcomes.last())
            {
                self.storage.save_trade_with_outcome(&key, trade, outcome).await?;
            }
            Ok(())
        }
        .await;

        if let Err(err) = persisted {
            // The returned context is the in-memory record; the caller may
            // retry persistence.
            error!(code = err.code(), error = %err, "failed to persist session record");
        }

        info!(
            date = %context.date,
            status = %context.status,
            signals = context.signals.len(),
            trades = context.trades.len(),
            "session finalized"
        );
        context
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::clock::SimulatedClock;
    use crate::execution::MockExecution;
    use crate::market_data::{ProviderErrorEvent, ReplayMarketData};
    use crate::notify::MemoryNotifier;
    use crate::storage::MemoryStorage;
    use crate::types::Direction;

    const BAR_MS: i64 = 300_000;

    fn candle(timestamp: i64, open: i64, high: i64, low: i64, close: i64) -> Candle {
        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 1_000,
            completed: true,
            bar_size_minutes: 5,
        }
    }

    struct Harness {
        runner: SessionRunner,
        provider: Arc<ReplayMarketData>,
        execution: Arc<MockExecution>,
        storage: Arc<MemoryStorage>,
        notifier: Arc<MemoryNotifier>,
    }

    /// Windows for the fixed replay date 2024-07-10 (a Wednesday).
    fn test_windows(config: &SessionConfig) -> SessionWindows {
        let cal = config.windows.calendar().unwrap();
        cal.session_windows(NaiveDate::from_ymd_opt(2024, 7, 10).unwrap())
            .unwrap()
    }

    fn harness(config: SessionConfig, bars: Vec<Candle>, start_ms: i64) -> Harness {
        let clock = Arc::new(SimulatedClock::new(start_ms));
        let provider = Arc::new(ReplayMarketData::new(config.symbol.clone(), bars));
        let execution = Arc::new(MockExecution::new(clock.clone()));
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let runner = SessionRunner::new(
            config,
            clock,
            provider.clone(),
            execution.clone(),
            storage.clone(),
            notifier.clone(),
        );
        Harness {
            runner,
            provider,
            execution,
            storage,
            notifier,
        }
    }

    /// Six quiet zone bars spanning 17000..17500 starting at `z`.
    fn zone_bars(z: i64) -> Vec<Candle> {
        vec![
            candle(z, 17_200, 17_500, 17_000, 17_300),
            candle(z + BAR_MS, 17_300, 17_450, 17_150, 17_250),
            candle(z + 2 * BAR_MS, 17_250, 17_400, 17_100, 17_200),
            candle(z + 3 * BAR_MS, 17_200, 17_350, 17_050, 17_150),
            candle(z + 4 * BAR_MS, 17_150, 17_300, 17_100, 17_250),
            candle(z + 5 * BAR_MS, 17_250, 17_400, 17_200, 17_350),
        ]
    }

    #[tokio::test]
    async fn replay_session_long_win_3r_end_to_end() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let mut bars = vec![
            // Premarket bars feed the backfill and are skipped by the pump.
            candle(z - 2 * BAR_MS, 17_150, 17_220, 17_100, 17_180),
            candle(z - BAR_MS, 17_180, 17_210, 17_150, 17_190),
        ];
        bars.extend(zone_bars(z));
        bars.extend([
            // Break, retest+confirm, 1R/2R run, 3R bar.
            candle(z + 6 * BAR_MS, 17_480, 17_525, 17_450, 17_520),
            candle(z + 7 * BAR_MS, 17_510, 17_535, 17_490, 17_530),
            candle(z + 8 * BAR_MS, 17_600, 18_600, 17_550, 18_400),
            candle(z + 9 * BAR_MS, 18_400, 19_200, 18_300, 19_050),
        ]);

        let mut h = harness(config, bars, w.premarket_open_ms);
        let context = h.runner.run().await.unwrap();

        assert_eq!(context.date, "2024-07-10");
        assert_eq!(context.status, SessionStatus::Complete);
        assert_eq!(context.premarket_price, Some(17_190));
        assert_eq!(context.all_bars.len(), 10);
        assert_eq!(context.trades.len(), 1);

        let trade = &context.trades[0];
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.entry_price, 17_530);
        assert_eq!(trade.r_value, 530);

        let outcome = &context.outcomes[0];
        assert_eq!(outcome.result, TradeResult::Win3R);
        assert_eq!(outcome.exit_price, 19_120);
        assert_eq!(outcome.trade_id, trade.id);

        // Entry + exit orders through the mock broker.
        let orders = h.execution.order_log();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].1.direction, Direction::Long);
        assert_eq!(orders[0].1.limit_price, Some(17_530));
        assert_eq!(orders[1].1.direction, Direction::Short);
        assert_eq!(orders[1].1.limit_price, Some(19_120));

        // Milestone notifications in session order.
        let kinds: Vec<NotifyKind> = h.notifier.received().iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotifyKind::ZoneDefined,
                NotifyKind::BreakDetected,
                NotifyKind::EntrySignal,
                NotifyKind::TargetHit,
            ]
        );

        // Persisted snapshot matches the returned record.
        let key = SessionKey::of(&context);
        let stored = h.storage.get_session(&key).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Complete);
        assert!(h.storage.has_completed_session(&key).await.unwrap());
        let trades = h
            .storage
            .get_trades_by_date_range("2024-07-10", "2024-07-10")
            .await
            .unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn empty_stream_is_no_trade() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let mut h = harness(config, Vec::new(), w.premarket_open_ms);

        let context = h.runner.run().await.unwrap();
        assert_eq!(context.status, SessionStatus::NoTrade);
        assert!(context.zone.is_none());
        assert!(context.trades.is_empty());
        assert_eq!(context.premarket_price, None);
        assert!(h.execution.order_log().is_empty());

        let key = SessionKey::of(&context);
        assert!(h.storage.has_completed_session(&key).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_bar_is_dropped_and_session_continues() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let mut bars = zone_bars(z);
        // Corrupt the third zone bar: high below open/close.
        bars[2] = candle(z + 2 * BAR_MS, 17_250, 17_100, 17_050, 17_200);

        let mut h = harness(config, bars, w.premarket_open_ms);
        let context = h.runner.run().await.unwrap();

        // Five valid bars never complete the zone; the session ends clean.
        assert_eq!(context.status, SessionStatus::NoTrade);
        assert_eq!(context.all_bars.len(), 5);
        assert!(context.signals.is_empty());
    }

    #[tokio::test]
    async fn gap_past_zone_end_times_out_the_build() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let bars = vec![
            candle(z, 17_200, 17_500, 17_000, 17_300),
            candle(z + BAR_MS, 17_300, 17_450, 17_150, 17_250),
            candle(z + 2 * BAR_MS, 17_250, 17_400, 17_100, 17_200),
            candle(z + 3 * BAR_MS, 17_200, 17_350, 17_050, 17_150),
            // Feed resumes only after the zone window has closed.
            candle(z + 7 * BAR_MS, 17_300, 17_400, 17_250, 17_350),
        ];

        let mut h = harness(config, bars, w.premarket_open_ms);
        let context = h.runner.run().await.unwrap();
        assert_eq!(context.status, SessionStatus::NoTrade);
        assert!(context.zone.is_none());
    }

    #[tokio::test]
    async fn fatal_provider_error_aborts_session() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let mut h = harness(config, zone_bars(z), w.premarket_open_ms);
        h.provider.inject_error_before(
            3,
            ProviderErrorEvent {
                code: "AUTH".into(),
                message: "token expired".into(),
                timestamp: z,
                recoverable: false,
            },
        );

        let context = h.runner.run().await.unwrap();
        assert_eq!(context.status, SessionStatus::Error);
        assert!(context.error.as_deref().unwrap().contains("AUTH"));
        assert!(h
            .notifier
            .received()
            .iter()
            .any(|n| n.kind == NotifyKind::SessionError));
    }

    #[tokio::test]
    async fn recoverable_provider_error_is_survived() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let mut h = harness(config, zone_bars(z), w.premarket_open_ms);
        h.provider.inject_error_before(
            3,
            ProviderErrorEvent {
                code: "DISCONNECT".into(),
                message: "socket reset".into(),
                timestamp: z,
                recoverable: true,
            },
        );

        let context = h.runner.run().await.unwrap();
        // The zone still defines; the quiet session ends without a trade.
        assert_eq!(context.status, SessionStatus::NoTrade);
        assert!(context.zone.is_some());
        assert_eq!(context.all_bars.len(), 6);
    }

    #[tokio::test]
    async fn stop_interrupts_the_session() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let mut h = harness(config, zone_bars(z), w.premarket_open_ms);
        h.runner.stop_handle().stop();

        let context = h.runner.run().await.unwrap();
        assert_eq!(context.status, SessionStatus::Interrupted);
        assert!(context.trades.is_empty());

        // Cancellation before a trade persists nothing.
        let key = SessionKey::of(&context);
        assert!(h.storage.get_session(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn weekend_is_not_a_trading_day() {
        use chrono::TimeZone;
        // Saturday 2024-07-13, 12:00 UTC (08:00 ET).
        let start = chrono::Utc
            .with_ymd_and_hms(2024, 7, 13, 12, 0, 0)
            .unwrap()
            .timestamp_millis();

        let mut h = harness(SessionConfig::default(), Vec::new(), start);
        let context = h.runner.run().await.unwrap();
        assert_eq!(context.status, SessionStatus::NoTrade);
        assert_eq!(context.date, "2024-07-13");
    }

    #[tokio::test]
    async fn session_timeout_closes_open_trade_at_last_close() {
        let config = SessionConfig::default();
        let w = test_windows(&config);
        let z = w.zone_start_ms;

        let mut bars = zone_bars(z);
        bars.extend([
            candle(z + 6 * BAR_MS, 17_480, 17_525, 17_450, 17_520),
            candle(z + 7 * BAR_MS, 17_510, 17_535, 17_490, 17_530),
            // Drifts up but never reaches 1R (18060); feed ends here.
            candle(z + 8 * BAR_MS, 17_540, 17_900, 17_530, 17_850),
        ]);

        let mut h = harness(config, bars, w.premarket_open_ms);
        let context = h.runner.run().await.unwrap();

        assert_eq!(context.status, SessionStatus::Complete);
        let outcome = &context.outcomes[0];
        assert_eq!(outcome.result, TradeResult::SessionTimeout);
        assert_eq!(outcome.exit_price, 17_850);
        assert_eq!(outcome.exit_timestamp, w.execution_end_ms);
        // 320 cents over a 530-cent R.
        assert_eq!(outcome.realized_r, 0.6);
    }
}

