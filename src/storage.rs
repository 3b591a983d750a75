// =============================================================================
// Storage — persistence interface for session records
// =============================================================================
//
// The SQLite layer lives outside this crate; the engine emits through this
// trait only. Session uniqueness key: (date, symbol, is_backtest).
// `MemoryStorage` is the in-repo implementation — it also keeps the record
// available for retry when a real backend fails downstream.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::market_data::Candle;
use crate::session::context::SessionContext;
use crate::strategy::signal::Signal;
use crate::strategy::trade::{Trade, TradeOutcome};

/// Uniqueness key for one session record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub date: String,
    pub symbol: String,
    pub is_backtest: bool,
}

impl SessionKey {
    pub fn of(context: &SessionContext) -> Self {
        Self {
            date: context.date.clone(),
            symbol: context.symbol.clone(),
            is_backtest: context.is_backtest(),
        }
    }
}

/// Persistence surface the session runner emits to.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn save_session(&self, context: &SessionContext) -> Result<(), EngineError>;
    async fn save_trade(&self, key: &SessionKey, trade: &Trade) -> Result<(), EngineError>;
    async fn save_trade_outcome(
        &self,
        key: &SessionKey,
        outcome: &TradeOutcome,
    ) -> Result<(), EngineError>;
    async fn save_trade_with_outcome(
        &self,
        key: &SessionKey,
        trade: &Trade,
        outcome: &TradeOutcome,
    ) -> Result<(), EngineError>;
    async fn save_signals(&self, key: &SessionKey, signals: &[Signal]) -> Result<(), EngineError>;
    async fn save_bars(&self, key: &SessionKey, bars: &[Candle]) -> Result<(), EngineError>;

    async fn get_session(&self, key: &SessionKey) -> Result<Option<SessionContext>, EngineError>;
    async fn has_completed_session(&self, key: &SessionKey) -> Result<bool, EngineError>;
    async fn get_sessions_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<SessionContext>, EngineError>;
    async fn get_trades_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Trade>, EngineError>;
    async fn get_outcomes_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<TradeOutcome>, EngineError>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionKey, SessionContext>,
    trades: HashMap<SessionKey, Vec<Trade>>,
    outcomes: HashMap<SessionKey, Vec<TradeOutcome>>,
    signals: HashMap<SessionKey, Vec<Signal>>,
    bars: HashMap<SessionKey, Vec<Candle>>,
}

/// In-memory storage keyed by (date, symbol, is_backtest).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn save_session(&self, context: &SessionContext) -> Result<(), EngineError> {
        let key = SessionKey::of(context);
        debug!(date = %key.date, symbol = %key.symbol, backtest = key.is_backtest, "session saved");
        self.tables.write().sessions.insert(key, context.clone());
        Ok(())
    }

    async fn save_trade(&self, key: &SessionKey, trade: &Trade) -> Result<(), EngineError> {
        self.tables
            .write()
            .trades
            .entry(key.clone())
            .or_default()
            .push(trade.clone());
        Ok(())
    }

    async fn save_trade_outcome(
        &self,
        key: &SessionKey,
        outcome: &TradeOutcome,
    ) -> Result<(), EngineError> {
        self.tables
            .write()
            .outcomes
            .entry(key.clone())
            .or_default()
            .push(outcome.clone());
        Ok(())
    }

    async fn save_trade_with_outcome(
        &self,
        key: &SessionKey,
        trade: &Trade,
        outcome: &TradeOutcome,
    ) -> Result<(), EngineError> {
        self.save_trade(key, trade).await?;
        self.save_trade_outcome(key, outcome).await
    }

    async fn save_signals(&self, key: &SessionKey, signals: &[Signal]) -> Result<(), EngineError> {
        self.tables
            .write()
            .signals
            .entry(key.clone())
            .or_default()
            .extend_from_slice(signals);
        Ok(())
    }

    async fn save_bars(&self, key: &SessionKey, bars: &[Candle]) -> Result<(), EngineError> {
        self.tables
            .write()
            .bars
            .entry(key.clone())
            .or_default()
            .extend_from_slice(bars);
        Ok(())
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<SessionContext>, EngineError> {
        Ok(self.tables.read().sessions.get(key).cloned())
    }

    async fn has_completed_session(&self, key: &SessionKey) -> Result<bool, EngineError> {
        Ok(self
            .tables
            .read()
            .sessions
            .get(key)
            .map(|s| s.status.is_terminal())
            .unwrap_or(false))
    }

    async fn get_sessions_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<SessionContext>, EngineError> {
        let tables = self.tables.read();
        let mut sessions: Vec<SessionContext> = tables
            .sessions
            .iter()
            .filter(|(k, _)| k.date.as_str() >= start_date && k.date.as_str() <= end_date)
            .map(|(_, v)| v.clone())
            .collect();
        sessions.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(sessions)
    }

    async fn get_trades_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<Trade>, EngineError> {
        let tables = self.tables.read();
        let mut keys: Vec<&SessionKey> = tables
            .trades
            .keys()
            .filter(|k| k.date.as_str() >= start_date && k.date.as_str() <= end_date)
            .collect();
        keys.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(keys
            .into_iter()
            .flat_map(|k| tables.trades[k].clone())
            .collect())
    }

    async fn get_outcomes_by_date_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<TradeOutcome>, EngineError> {
        let tables = self.tables.read();
        let mut keys: Vec<&SessionKey> = tables
            .outcomes
            .keys()
            .filter(|k| k.date.as_str() >= start_date && k.date.as_str() <= end_date)
            .collect();
        keys.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(keys
            .into_iter()
            .flat_map(|k| tables.outcomes[k].clone())
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
