// =============================================================================
// Notifications — session milestones surfaced to the operator
// =============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Milestone kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyKind {
    ZoneDefined,
    BreakDetected,
    EntrySignal,
    StopHit,
    TargetHit,
    SessionError,
}

impl std::fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZoneDefined => write!(f, "ZONE_DEFINED"),
            Self::BreakDetected => write!(f, "BREAK_DETECTED"),
            Self::EntrySignal => write!(f, "ENTRY_SIGNAL"),
            Self::StopHit => write!(f, "STOP_HIT"),
            Self::TargetHit => write!(f, "TARGET_HIT"),
            Self::SessionError => write!(f, "SESSION_ERROR"),
        }
    }
}

/// One notification event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotifyKind,
    pub symbol: String,
    pub timestamp: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Sink for notifications; concrete delivery (push, chat, mail) lives
/// outside this crate.
pub trait NotificationProvider: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationProvider for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotifyKind::SessionError => error!(
                kind = %notification.kind,
                symbol = %notification.symbol,
                timestamp = notification.timestamp,
                message = %notification.message,
                "session notification"
            ),
            _ => info!(
                kind = %notification.kind,
                symbol = %notification.symbol,
                timestamp = notification.timestamp,
                message = %notification.message,
                "session notification"
            ),
        }
    }
}

/// Test sink that records everything it receives.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    received: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }
}

impl NotificationProvider for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.received.lock().push(notification);
    }
}
