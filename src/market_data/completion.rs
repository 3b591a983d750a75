// =============================================================================
// Bar-completion buffer — one-bar lookahead over a raw update stream
// =============================================================================
//
// The upstream feed re-sends the in-progress bar as it forms and never says
// "this bar is closed". The only reliable completion signal is the arrival
// of a bar with a later start timestamp, so the buffer holds exactly one
// candidate and emits it the moment a newer bar supersedes it.
// =============================================================================

use tracing::debug;

use crate::error::EngineError;
use crate::market_data::Candle;

/// Holds at most one in-progress candidate bar per session.
#[derive(Debug, Default)]
pub struct CompletionBuffer {
    candidate: Option<Candle>,
}

impl CompletionBuffer {
    pub fn new() -> Self {
        Self { candidate: None }
    }

    /// Feed one raw bar. Returns the bar completed by this update, if any.
    ///
    /// * Empty buffer: the bar is stored as in-progress, nothing emitted.
    /// * Same timestamp: the stored bar is replaced with the newer snapshot.
    /// * Later timestamp: the stored bar is emitted `completed == true` and
    ///   the incoming bar takes its place.
    /// * Earlier timestamp: rejected as out-of-order.
    pub fn push(&mut self, incoming: Candle) -> Result<Option<Candle>, EngineError> {
        match self.candidate {
            None => {
                self.candidate = Some(Candle {
                    completed: false,
                    ..incoming
                });
                Ok(None)
            }
            Some(buffered) if incoming.timestamp == buffered.timestamp => {
                self.candidate = Some(Candle {
                    completed: false,
                    ..incoming
                });
                Ok(None)
            }
            Some(buffered) if incoming.timestamp > buffered.timestamp => {
                let done = Candle {
                    completed: true,
                    ..buffered
                };
                debug!(
                    timestamp = done.timestamp,
                    close = done.close,
                    next = incoming.timestamp,
                    "bar completed by lookahead"
                );
                self.candidate = Some(Candle {
                    completed: false,
                    ..incoming
                });
                Ok(Some(done))
            }
            Some(buffered) => Err(EngineError::OutOfOrderBar {
                incoming: incoming.timestamp,
                buffered: buffered.timestamp,
            }),
        }
    }

    /// Emit the buffered bar (if any) as completed. Called at session end —
    /// no later bar will ever arrive to supersede it.
    pub fn flush(&mut self) -> Option<Candle> {
        self.candidate.take().map(|bar| {
            debug!(timestamp = bar.timestamp, "bar completed by flush");
            Candle {
                completed: true,
                ..bar
            }
        })
    }

    /// Discard the buffered bar without emitting. Used when restarting a
    /// session.
    pub fn reset(&mut self) {
        self.candidate = None;
    }

    /// The in-progress bar currently held, if any.
    pub fn pending(&self) -> Option<&Candle> {
        self.candidate.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(timestamp: i64, close: i64) -> Candle {
        Candle {
            timestamp,
            open: close,
            high: close + 10,
            low: close - 10,
            close,
            volume: 500,
            completed: false,
            bar_size_minutes: 5,
        }
    }

    #[test]
    fn first_bar_is_buffered_not_emitted() {
        let mut buf = CompletionBuffer::new();
        assert_eq!(buf.push(raw(0, 10_000)).unwrap(), None);
        assert_eq!(buf.pending().unwrap().timestamp, 0);
    }

    #[test]
    fn same_timestamp_replaces_snapshot() {
        let mut buf = CompletionBuffer::new();
        buf.push(raw(0, 10_000)).unwrap();
        assert_eq!(buf.push(raw(0, 10_040)).unwrap(), None);
        assert_eq!(buf.pending().unwrap().close, 10_040);

        // The replacement snapshot, not the first, is what completes.
        let done = buf.push(raw(300_000, 10_050)).unwrap().unwrap();
        assert_eq!(done.close, 10_040);
        assert!(done.completed);
    }

    #[test]
    fn later_timestamp_emits_previous() {
        let mut buf = CompletionBuffer::new();
        buf.push(raw(0, 10_000)).unwrap();
        let done = buf.push(raw(300_000, 10_100)).unwrap().unwrap();
        assert_eq!(done.timestamp, 0);
        assert!(done.completed);
        assert_eq!(buf.pending().unwrap().timestamp, 300_000);
        assert!(!buf.pending().unwrap().completed);
    }

    #[test]
    fn out_of_order_is_rejected_and_buffer_unchanged() {
        let mut buf = CompletionBuffer::new();
        buf.push(raw(300_000, 10_100)).unwrap();
        let err = buf.push(raw(0, 10_000)).unwrap_err();
        assert_eq!(err.code(), "OUT_OF_ORDER_BAR");
        assert_eq!(buf.pending().unwrap().timestamp, 300_000);
    }

    #[test]
    fn flush_emits_pending_as_completed() {
        let mut buf = CompletionBuffer::new();
        buf.push(raw(0, 10_000)).unwrap();
        let done = buf.flush().unwrap();
        assert!(done.completed);
        assert_eq!(done.timestamp, 0);
        assert!(buf.pending().is_none());
        assert!(buf.flush().is_none());
    }

    #[test]
    fn reset_discards_without_emitting() {
        let mut buf = CompletionBuffer::new();
        buf.push(raw(0, 10_000)).unwrap();
        buf.reset();
        assert!(buf.pending().is_none());
        assert!(buf.flush().is_none());
    }

    #[test]
    fn stream_of_updates_completes_in_order() {
        let mut buf = CompletionBuffer::new();
        let mut completed = Vec::new();

        for bar in [
            raw(0, 10_000),
            raw(0, 10_010),
            raw(300_000, 10_020),
            raw(300_000, 10_030),
            raw(600_000, 10_040),
        ] {
            if let Some(done) = buf.push(bar).unwrap() {
                completed.push(done);
            }
        }
        completed.extend(buf.flush());

        let stamps: Vec<i64> = completed.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![0, 300_000, 600_000]);
        assert!(completed.iter().all(|c| c.completed));
        assert_eq!(completed[0].close, 10_010);
        assert_eq!(completed[1].close, 10_030);
    }
}
