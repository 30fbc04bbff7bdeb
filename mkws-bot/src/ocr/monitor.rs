//! Usage monitoring and adaptive mode selection
//!
//! Records per-submission samples into a bounded ring buffer (append
//! only, lossy, single consumer) and aggregates a rolling window of
//! EXPRESS vs batch submissions. Mode switches are hysteretic: the
//! triggering ratio must hold for two consecutive windows before the
//! engine re-balances, so bursty traffic cannot make the limits
//! oscillate.

use crate::ocr::config::{OcrMode, Priority};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

const RING_CAPACITY: usize = 1024;

/// Minimum submissions in a window before its ratios mean anything.
const MIN_WINDOW_SAMPLES: u64 = 10;

/// One completed submission.
#[derive(Debug, Clone)]
pub struct Sample {
    pub priority: Priority,
    pub wait: Duration,
    pub processing: Duration,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct WindowStats {
    express_count: u64,
    batch_count: u64,
    express_wait: Duration,
    batch_wait: Duration,
}

impl WindowStats {
    fn total(&self) -> u64 {
        self.express_count + self.batch_count
    }
}

struct AdaptiveState {
    window: WindowStats,
    window_start: Instant,
    current_mode: OcrMode,
    /// Candidate mode seen at the last window boundary, if it differed
    /// from the current mode.
    pending: Option<OcrMode>,
}

pub struct Monitor {
    ring: Mutex<VecDeque<Sample>>,
    state: Mutex<AdaptiveState>,
    window_length: Duration,
    switch_threshold: f64,
}

impl Monitor {
    pub fn new(window_length: Duration, switch_threshold: f64, initial_mode: OcrMode) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            state: Mutex::new(AdaptiveState {
                window: WindowStats::default(),
                window_start: Instant::now(),
                current_mode: initial_mode,
                pending: None,
            }),
            window_length,
            switch_threshold,
        }
    }

    /// Record one completed submission.
    pub fn record(&self, priority: Priority, wait: Duration, processing: Duration) {
        let mut ring = self.ring.lock().expect("monitor ring poisoned");
        if ring.len() == RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(Sample { priority, wait, processing, at: Instant::now() });
        drop(ring);

        let mut state = self.state.lock().expect("monitor state poisoned");
        match priority {
            Priority::Express => {
                state.window.express_count += 1;
                state.window.express_wait += wait;
            }
            Priority::Standard | Priority::Background => {
                state.window.batch_count += 1;
                state.window.batch_wait += wait;
            }
        }
    }

    /// Drain up to `max` recent samples (lossy read for diagnostics).
    pub fn drain_samples(&self, max: usize) -> Vec<Sample> {
        let mut ring = self.ring.lock().expect("monitor ring poisoned");
        let take = ring.len().min(max);
        ring.drain(..take).collect()
    }

    pub fn current_mode(&self) -> OcrMode {
        self.state.lock().expect("monitor state poisoned").current_mode
    }

    /// Evaluate the rolling window. Returns a mode the engine should
    /// switch to, or None. Only acts at window boundaries, requires a
    /// minimum sample count, and demands the same verdict in two
    /// consecutive windows.
    pub fn evaluate(&self) -> Option<OcrMode> {
        let mut state = self.state.lock().expect("monitor state poisoned");
        if state.window_start.elapsed() < self.window_length {
            return None;
        }

        let total = state.window.total();
        let express_ratio = state.window.express_count as f64 / total.max(1) as f64;
        let batch_ratio = state.window.batch_count as f64 / total.max(1) as f64;

        // Reset the window regardless of the verdict.
        let enough_samples = total >= MIN_WINDOW_SAMPLES;
        state.window = WindowStats::default();
        state.window_start = Instant::now();

        if !enough_samples {
            state.pending = None;
            return None;
        }

        let candidate = if batch_ratio > self.switch_threshold {
            OcrMode::BulkHeavy
        } else if express_ratio > self.switch_threshold {
            OcrMode::SingleFocused
        } else {
            OcrMode::Balanced
        };

        if candidate == state.current_mode {
            state.pending = None;
            return None;
        }

        match state.pending {
            Some(pending) if pending == candidate => {
                info!(
                    from = state.current_mode.as_str(),
                    to = candidate.as_str(),
                    express_ratio = format!("{:.2}", express_ratio),
                    batch_ratio = format!("{:.2}", batch_ratio),
                    "usage pattern held for two windows, switching mode"
                );
                state.current_mode = candidate;
                state.pending = None;
                Some(candidate)
            }
            _ => {
                state.pending = Some(candidate);
                None
            }
        }
    }
}
