//! Memory-pressure gate for batch admission.
//!
//! The gate is the only component allowed to admit new work against the
//! configured ceiling. It blocks with a fixed poll delay and emits a
//! throttling event per poll; in-flight work is never dropped.

use std::time::Duration;

use crate::events::{CancelToken, EventSink, PipelineEvent};

/// Host memory usage probe. Behind a trait so tests can simulate pressure.
pub trait MemoryProbe: Send + Sync {
    /// Used fraction of host memory in `[0, 1]`, or `None` when the
    /// platform gives no answer (the gate then admits best-effort).
    fn used_fraction(&self) -> Option<f64>;
}

/// Best-effort `/proc/meminfo` reader; other platforms report `None`.
pub struct ProcMeminfo;

impl MemoryProbe for ProcMeminfo {
    fn used_fraction(&self) -> Option<f64> {
        let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&contents)
    }
}

fn parse_meminfo(contents: &str) -> Option<f64> {
    let mut total_kb: Option<u64> = None;
    let mut available_kb: Option<u64> = None;
    for line in contents.lines() {
        let line = line.trim_start();
        let value = |l: &str| {
            l.split_whitespace()
                .nth(1)
                .and_then(|v| v.parse::<u64>().ok())
        };
        if line.starts_with("MemTotal:") {
            total_kb = value(line);
        } else if line.starts_with("MemAvailable:") {
            available_kb = value(line);
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }
    let total = total_kb? as f64;
    if total <= 0.0 {
        return None;
    }
    let available = available_kb? as f64;
    Some((1.0 - available / total).clamp(0.0, 1.0))
}

/// Blocks batch admission while used memory exceeds the ceiling.
pub struct MemoryGate<'a> {
    probe: &'a dyn MemoryProbe,
    ceiling: f64,
    poll: Duration,
}

impl<'a> MemoryGate<'a> {
    pub fn new(probe: &'a dyn MemoryProbe, ceiling: f64, poll: Duration) -> Self {
        Self {
            probe,
            ceiling,
            poll,
        }
    }

    /// Wait until used memory is under the ceiling. Returns `false` when
    /// cancelled while waiting, `true` once admission is allowed.
    pub fn wait_for_headroom(&self, cancel: &CancelToken, sink: &dyn EventSink) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            match self.probe.used_fraction() {
                Some(used) if used > self.ceiling => {
                    tracing::warn!(used, ceiling = self.ceiling, "Memory critical, throttling batch admission");
                    sink.emit(PipelineEvent::MemoryThrottled {
                        used_fraction: used,
                        ceiling: self.ceiling,
                    });
                    std::thread::sleep(self.poll);
                }
                _ => return true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Replays a scripted usage sequence; repeats the last value.
    struct ScriptedProbe {
        readings: Mutex<Vec<f64>>,
    }

    impl ScriptedProbe {
        fn new(readings: &[f64]) -> Self {
            let mut readings: Vec<f64> = readings.to_vec();
            readings.reverse();
            Self {
                readings: Mutex::new(readings),
            }
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn used_fraction(&self) -> Option<f64> {
            let mut readings = self.readings.lock().unwrap();
            if readings.len() > 1 {
                readings.pop()
            } else {
                readings.last().copied()
            }
        }
    }

    #[test]
    fn parses_meminfo_fractions() {
        let contents = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\n";
        let used = parse_meminfo(contents).unwrap();
        assert!((used - 0.75).abs() < 1e-9);
    }

    #[test]
    fn malformed_meminfo_is_none() {
        assert_eq!(parse_meminfo("garbage"), None);
        assert_eq!(parse_meminfo("MemTotal: x kB"), None);
    }

    #[test]
    fn admits_immediately_under_ceiling() {
        let probe = ScriptedProbe::new(&[0.40]);
        let gate = MemoryGate::new(&probe, 0.85, Duration::from_millis(1));
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);

        assert!(gate.wait_for_headroom(&CancelToken::new(), &sink));
        assert!(rx.try_recv().is_err(), "No throttle event expected");
    }

    #[test]
    fn blocks_until_pressure_drops_and_emits_throttle_events() {
        let probe = ScriptedProbe::new(&[0.95, 0.90, 0.50]);
        let gate = MemoryGate::new(&probe, 0.85, Duration::from_millis(1));
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);

        assert!(gate.wait_for_headroom(&CancelToken::new(), &sink));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, PipelineEvent::MemoryThrottled { .. })));
    }

    #[test]
    fn unknown_usage_admits_best_effort() {
        struct BlindProbe;
        impl MemoryProbe for BlindProbe {
            fn used_fraction(&self) -> Option<f64> {
                None
            }
        }
        let gate = MemoryGate::new(&BlindProbe, 0.85, Duration::from_millis(1));
        assert!(gate.wait_for_headroom(&CancelToken::new(), &crate::events::NullSink));
    }

    #[test]
    fn cancellation_unblocks_the_gate() {
        let probe = ScriptedProbe::new(&[0.99]);
        let gate = MemoryGate::new(&probe, 0.85, Duration::from_millis(1));
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(!gate.wait_for_headroom(&cancel, &crate::events::NullSink));
    }
}
