// =============================================================================
// Session configuration — engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Daybreak engine. Persistence uses an
// atomic tmp + rename pattern to prevent corruption on crash. All fields
// carry `#[serde(default)]` so that adding new fields never breaks loading an
// older config file.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calendar::{parse_date, TradingCalendar, WindowPreset};
use crate::types::ExecutionMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "SPY".to_string()
}

fn default_zone_bar_count() -> usize {
    6
}

fn default_min_zone_spread_cents() -> i64 {
    10
}

fn default_max_zone_spread_pct() -> f64 {
    5.0
}

fn default_max_break_attempts() -> u32 {
    3
}

fn default_bar_size_minutes() -> u32 {
    5
}

fn default_reconnect_grace_ms() -> i64 {
    30_000
}

fn default_identity_window_ms() -> i64 {
    15_000
}

fn default_burst_limit() -> usize {
    6
}

fn default_burst_window_ms() -> i64 {
    2_000
}

fn default_global_limit() -> usize {
    60
}

fn default_global_window_ms() -> i64 {
    600_000
}

fn default_premarket_open() -> String {
    "04:30".to_string()
}

fn default_zone_start() -> String {
    "09:30".to_string()
}

fn default_zone_end() -> String {
    "10:00".to_string()
}

fn default_execution_end() -> String {
    "12:00".to_string()
}

fn default_early_close() -> String {
    "13:00".to_string()
}

// =============================================================================
// ZoneParams
// =============================================================================

/// Tunable parameters for decision-zone construction and break handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneParams {
    /// Number of completed bars used to build the zone (6 bars of 5 minutes
    /// covers the first half hour).
    #[serde(default = "default_zone_bar_count")]
    pub zone_bar_count: usize,

    /// Zones narrower than this are DEGENERATE.
    #[serde(default = "default_min_zone_spread_cents")]
    pub min_zone_spread_cents: i64,

    /// Zones wider than this percentage of the mid price are DEGENERATE.
    #[serde(default = "default_max_zone_spread_pct")]
    pub max_zone_spread_pct: f64,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            zone_bar_count: default_zone_bar_count(),
            min_zone_spread_cents: default_min_zone_spread_cents(),
            max_zone_spread_pct: default_max_zone_spread_pct(),
        }
    }
}

// =============================================================================
// PacingParams
// =============================================================================

/// Limits for the three-tier historical-data pacing manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingParams {
    /// Minimum spacing between identical request keys.
    #[serde(default = "default_identity_window_ms")]
    pub identity_window_ms: i64,

    /// Maximum admissions per contract within the burst window.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: usize,

    /// Sliding per-contract burst window.
    #[serde(default = "default_burst_window_ms")]
    pub burst_window_ms: i64,

    /// Maximum admissions across all contracts within the global window.
    #[serde(default = "default_global_limit")]
    pub global_limit: usize,

    /// Sliding global window.
    #[serde(default = "default_global_window_ms")]
    pub global_window_ms: i64,

    /// Optional cap on a single admission wait. `None` (the default) means
    /// waits are always honored.
    #[serde(default)]
    pub max_wait_ms: Option<i64>,
}

impl Default for PacingParams {
    fn default() -> Self {
        Self {
            identity_window_ms: default_identity_window_ms(),
            burst_limit: default_burst_limit(),
            burst_window_ms: default_burst_window_ms(),
            global_limit: default_global_limit(),
            global_window_ms: default_global_window_ms(),
            max_wait_ms: None,
        }
    }
}

// =============================================================================
// WindowConfig — Eastern-Time session times as "HH:MM" strings
// =============================================================================

/// Session window preset, kept as "HH:MM" strings in the config file and
/// parsed once into a [`WindowPreset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_premarket_open")]
    pub premarket_open: String,

    #[serde(default = "default_zone_start")]
    pub zone_start: String,

    #[serde(default = "default_zone_end")]
    pub zone_end: String,

    #[serde(default = "default_execution_end")]
    pub execution_end: String,

    #[serde(default = "default_early_close")]
    pub early_close: String,

    /// Full-day market holidays (YYYY-MM-DD, Eastern).
    #[serde(default)]
    pub holidays: Vec<String>,

    /// Shortened days on which the execution end is truncated.
    #[serde(default)]
    pub early_close_dates: Vec<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            premarket_open: default_premarket_open(),
            zone_start: default_zone_start(),
            zone_end: default_zone_end(),
            execution_end: default_execution_end(),
            early_close: default_early_close(),
            holidays: Vec::new(),
            early_close_dates: Vec::new(),
        }
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .with_context(|| format!("invalid session time {s:?} (expected HH:MM)"))
}

impl WindowConfig {
    /// Parse the configured strings into a calendar-ready preset.
    pub fn preset(&self) -> Result<WindowPreset> {
        Ok(WindowPreset {
            premarket_open: parse_hhmm(&self.premarket_open)?,
            zone_start: parse_hhmm(&self.zone_start)?,
            zone_end: parse_hhmm(&self.zone_end)?,
            execution_end: parse_hhmm(&self.execution_end)?,
            early_close: parse_hhmm(&self.early_close)?,
        })
    }

    fn date_set(dates: &[String]) -> Result<HashSet<NaiveDate>> {
        dates.iter().map(|s| parse_date(s)).collect()
    }

    /// Build the trading calendar from this window configuration.
    pub fn calendar(&self) -> Result<TradingCalendar> {
        Ok(TradingCalendar::new(
            self.preset()?,
            Self::date_set(&self.holidays)?,
            Self::date_set(&self.early_close_dates)?,
        ))
    }
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Top-level configuration for a Daybreak trading session.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The single symbol this session trades.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Live feed or historical replay.
    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Bar interval consumed from the upstream provider.
    #[serde(default = "default_bar_size_minutes")]
    pub bar_size_minutes: u32,

    /// Per-direction cap on break attempts.
    #[serde(default = "default_max_break_attempts")]
    pub max_break_attempts: u32,

    /// Move the stop to breakeven once the trade reaches 1R.
    #[serde(default = "default_true")]
    pub trailing_stop_at_1r: bool,

    /// How long a recoverable provider outage may last before the session is
    /// interrupted.
    #[serde(default = "default_reconnect_grace_ms")]
    pub reconnect_grace_ms: i64,

    /// Decision-zone construction parameters.
    #[serde(default)]
    pub zone: ZoneParams,

    /// Historical-data pacing limits.
    #[serde(default)]
    pub pacing: PacingParams,

    /// Eastern-Time session windows.
    #[serde(default)]
    pub windows: WindowConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            execution_mode: ExecutionMode::default(),
            bar_size_minutes: default_bar_size_minutes(),
            max_break_attempts: default_max_break_attempts(),
            trailing_stop_at_1r: true,
            reconnect_grace_ms: default_reconnect_grace_ms(),
            zone: ZoneParams::default(),
            pacing: PacingParams::default(),
            windows: WindowConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Whether session records should carry the backtest flag.
    pub fn is_backtest(&self) -> bool {
        self.execution_mode == ExecutionMode::Replay
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse session config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            mode = %config.execution_mode,
            "session config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise session config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "session config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.symbol, "SPY");
        assert_eq!(cfg.execution_mode, ExecutionMode::Replay);
        assert_eq!(cfg.bar_size_minutes, 5);
        assert_eq!(cfg.max_break_attempts, 3);
        assert!(cfg.trailing_stop_at_1r);
        assert_eq!(cfg.zone.zone_bar_count, 6);
        assert_eq!(cfg.zone.min_zone_spread_cents, 10);
        assert_eq!(cfg.pacing.identity_window_ms, 15_000);
        assert_eq!(cfg.pacing.burst_limit, 6);
        assert_eq!(cfg.pacing.global_limit, 60);
        assert!(cfg.is_backtest());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol, "SPY");
        assert_eq!(cfg.zone.zone_bar_count, 6);
        assert_eq!(cfg.pacing.burst_window_ms, 2_000);
        assert_eq!(cfg.windows.zone_start, "09:30");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol": "QQQ", "max_break_attempts": 2 }"#;
        let cfg: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "QQQ");
        assert_eq!(cfg.max_break_attempts, 2);
        assert_eq!(cfg.zone.min_zone_spread_cents, 10);
        assert!(cfg.trailing_stop_at_1r);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = SessionConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbol, cfg2.symbol);
        assert_eq!(cfg.zone.zone_bar_count, cfg2.zone.zone_bar_count);
        assert_eq!(cfg.pacing.global_window_ms, cfg2.pacing.global_window_ms);
    }

    #[test]
    fn window_config_parses_into_preset() {
        let cfg = SessionConfig::default();
        let preset = cfg.windows.preset().unwrap();
        assert_eq!(preset.zone_start, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(
            preset.execution_end,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn bad_window_string_is_rejected() {
        let mut cfg = SessionConfig::default();
        cfg.windows.zone_start = "9:3pm".to_string();
        assert!(cfg.windows.preset().is_err());
    }

    #[test]
    fn calendar_honours_config_dates() {
        let mut cfg = SessionConfig::default();
        cfg.windows.holidays.push("2024-07-04".to_string());
        let cal = cfg.windows.calendar().unwrap();
        assert!(!cal.is_trading_day(NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()));
    }
}
