//! Pipeline status events and cooperative cancellation.
//!
//! Events are one-way notifications for an external observer (a UI, a log
//! tail, a test harness). The pipeline never waits on a subscriber; a sink
//! that drops events must not stall a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Observable pipeline status. Serialized form is the external contract for
/// subscribers on the other side of a channel or socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    DiscoveryProgress {
        scanned: u64,
        total: u64,
    },
    DiscoveryComplete {
        new_records: u64,
        skipped: u64,
        duration_ms: u64,
    },
    /// Host memory exceeded the ceiling; batch admission is blocked.
    MemoryThrottled {
        used_fraction: f64,
        ceiling: f64,
    },
    BatchStarted {
        batch_id: String,
        window_count: usize,
    },
    BatchCompleted {
        batch_id: String,
        facts: usize,
        duration_ms: u64,
    },
    BatchError {
        batch_id: String,
        retry: u32,
        error: String,
    },
    /// A completion could not be parsed into the minimum fact shape.
    ParseError {
        fingerprint: String,
        window_index: usize,
    },
    FileSkipped {
        path: String,
        reason: String,
    },
    FatalError {
        error: String,
    },
    /// Run finished; checkpoint cleared.
    EngineIdle {
        processed: u64,
        total_facts: u64,
    },
}

/// One-way event receiver. Implementations must be cheap and non-blocking.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Discards everything. Default for headless library use.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Forwards events onto an mpsc channel; a disconnected receiver is ignored
/// so a dead subscriber never aborts a multi-hour run.
pub struct ChannelSink {
    tx: Sender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Shared cooperative-cancellation flag, checked at stage boundaries.
///
/// Cancellation is never preemptive: a stage already inside an inference
/// call runs to completion before the flag is observed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_sink_delivers_events() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        sink.emit(PipelineEvent::MemoryThrottled {
            used_fraction: 0.92,
            ceiling: 0.85,
        });

        match rx.recv().unwrap() {
            PipelineEvent::MemoryThrottled { used_fraction, ceiling } => {
                assert!((used_fraction - 0.92).abs() < f64::EPSILON);
                assert!((ceiling - 0.85).abs() < f64::EPSILON);
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        // Must not panic.
        sink.emit(PipelineEvent::EngineIdle {
            processed: 1,
            total_facts: 0,
        });
    }

    #[test]
    fn cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn event_serde_tags_by_type() {
        let event = PipelineEvent::BatchError {
            batch_id: "b1".to_string(),
            retry: 2,
            error: "timeout".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"BatchError\""));
        assert!(json.contains("\"retry\":2"));
    }
}
