// =============================================================================
// Strategy — decision zone, signals, trade lifecycle, and the state machine
// =============================================================================

pub mod machine;
pub mod signal;
pub mod trade;
pub mod zone;

pub use machine::{Effect, Event, StrategyMachine};
pub use signal::{Signal, SignalKind};
pub use trade::{Trade, TradeOutcome, TradeResult, TradeStatus, TradeTracker};
pub use zone::{DecisionZone, ZoneBuilder, ZoneStatus};
