// =============================================================================
// Error taxonomy — every failure mode the core can surface
// =============================================================================
//
// Recovery policy:
//   - Validation         -> drop the bar, warn, session continues
//   - ProviderRecoverable -> runner enters RECONNECTING; INTERRUPTED if the
//                            grace period expires
//   - ProviderFatal      -> session ERROR
//   - StrategyInvariant  -> session ERROR, trade not created
//   - Storage            -> surfaced to the caller; the session record stays
//                            in memory for retry
//   - Interrupted        -> cooperative stop() or cancelled pacing wait
// =============================================================================

use thiserror::Error;

/// Engine-level error covering the taxonomy above.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A bar failed OHLC validation. Carries the provider error code
    /// `INVALID_BAR`.
    #[error("bar validation failed at {timestamp}: {reason}")]
    Validation { timestamp: i64, reason: String },

    /// A raw bar arrived with a timestamp earlier than the buffered
    /// in-progress bar.
    #[error("out-of-order bar: incoming {incoming} < buffered {buffered}")]
    OutOfOrderBar { incoming: i64, buffered: i64 },

    /// Transient upstream failure (disconnect, timeout). The runner may
    /// reconnect within the grace period.
    #[error("provider error (recoverable): {message}")]
    ProviderRecoverable { message: String },

    /// Unrecoverable upstream failure (auth, contract resolution).
    #[error("provider error (fatal): {message}")]
    ProviderFatal { message: String },

    /// A pacing wait exceeded the configured cap. Not raised with the
    /// default configuration (waits are always honored).
    #[error("pacing wait exceeded {cap_ms}ms for key {request_key}")]
    PacingExhausted { request_key: String, cap_ms: u64 },

    /// An internal strategy invariant was violated (e.g. entry with a zero
    /// R-value).
    #[error("strategy invariant violated: {message}")]
    StrategyInvariant { message: String },

    /// Persistence failed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// The session was cooperatively stopped, or a pacing wait was
    /// cancelled by shutdown.
    #[error("interrupted: {context}")]
    Interrupted { context: String },
}

impl EngineError {
    /// Short machine-readable code, mirrored into provider error events and
    /// session records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "INVALID_BAR",
            Self::OutOfOrderBar { .. } => "OUT_OF_ORDER_BAR",
            Self::ProviderRecoverable { .. } => "PROVIDER_RECOVERABLE",
            Self::ProviderFatal { .. } => "PROVIDER_FATAL",
            Self::PacingExhausted { .. } => "PACING_EXHAUSTED",
            Self::StrategyInvariant { .. } => "STRATEGY_INVARIANT",
            Self::Storage { .. } => "STORAGE",
            Self::Interrupted { .. } => "INTERRUPTED",
        }
    }

    /// Whether the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::OutOfOrderBar { .. }
                | Self::ProviderRecoverable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = EngineError::Validation {
            timestamp: 0,
            reason: "high < low".into(),
        };
        assert_eq!(err.code(), "INVALID_BAR");
        assert!(err.is_recoverable());

        let err = EngineError::StrategyInvariant {
            message: "rValue == 0".into(),
        };
        assert_eq!(err.code(), "STRATEGY_INVARIANT");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn display_includes_context() {
        let err = EngineError::OutOfOrderBar {
            incoming: 100,
            buffered: 200,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("200"));
    }
}
