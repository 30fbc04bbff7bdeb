//! Priority-scheduled OCR execution
//!
//! Each tier owns a counting semaphore. A submission waits on its
//! tier's semaphore; when the tier is saturated and borrowing is
//! enabled, it may take an unused permit from a lower tier whose
//! utilization is at or below the borrowing threshold. A borrowed
//! permit is an owned permit from the donor's semaphore, so releasing
//! it returns capacity to the donor, not the borrower.
//!
//! Holding a tier permit never depends on acquiring another tier's
//! permit, so disabling borrowing cannot deadlock.

use crate::ocr::backend::{OcrBackend, OcrStatus, TextBox};
use crate::ocr::config::{OcrConfig, OcrMode, Priority};
use crate::ocr::monitor::Monitor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Completed OCR submission. The status tag is returned verbatim to
/// the caller; the engine never retries.
#[derive(Debug)]
pub struct OcrOutput {
    pub status: OcrStatus,
    pub boxes: Vec<TextBox>,
    pub wait: Duration,
    pub processing: Duration,
    pub borrowed: bool,
}

struct Tier {
    semaphore: Arc<Semaphore>,
    /// Intended permit count for this tier.
    target: AtomicUsize,
    /// Permits actually granted to the semaphore. Lowering a limit is
    /// best-effort: permits in flight are forgotten as they free up on
    /// later adjustment passes.
    granted: AtomicUsize,
    borrowed_in: AtomicUsize,
    lent_out: AtomicUsize,
}

impl Tier {
    fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            target: AtomicUsize::new(limit),
            granted: AtomicUsize::new(limit),
            borrowed_in: AtomicUsize::new(0),
            lent_out: AtomicUsize::new(0),
        }
    }

    fn in_use(&self) -> usize {
        self.granted
            .load(Ordering::Relaxed)
            .saturating_sub(self.semaphore.available_permits())
    }

    fn utilization(&self) -> f64 {
        self.in_use() as f64 / self.target.load(Ordering::Relaxed).max(1) as f64
    }

    fn adjust(&self, target: usize) {
        self.target.store(target, Ordering::Relaxed);
        let granted = self.granted.load(Ordering::Relaxed);
        if target > granted {
            self.semaphore.add_permits(target - granted);
            self.granted.store(target, Ordering::Relaxed);
        } else if target < granted {
            let forgotten = self.semaphore.forget_permits(granted - target);
            self.granted.store(granted - forgotten, Ordering::Relaxed);
        }
    }
}

/// Permit handed to a running submission. Dropping it returns the
/// permit to whichever tier it was taken from.
struct Acquired {
    _permit: OwnedSemaphorePermit,
    borrowed_from: Option<Priority>,
}

pub struct OcrEngine {
    config: OcrConfig,
    backend: Arc<dyn OcrBackend>,
    express: Tier,
    standard: Tier,
    background: Tier,
    pub monitor: Monitor,
}

impl OcrEngine {
    pub fn new(config: OcrConfig, backend: Arc<dyn OcrBackend>) -> Self {
        let (express, standard, background) = config.limits_for(config.mode);
        let monitor = Monitor::new(
            config.usage_window,
            config.mode_switch_threshold,
            config.mode,
        );
        info!(
            mode = config.mode.as_str(),
            express, standard, background,
            borrowing = config.priority_borrowing,
            adaptation = config.usage_adaptation,
            "OCR engine initialized"
        );
        Self {
            backend,
            express: Tier::new(express),
            standard: Tier::new(standard),
            background: Tier::new(background),
            monitor,
            config,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn tier(&self, priority: Priority) -> &Tier {
        match priority {
            Priority::Express => &self.express,
            Priority::Standard => &self.standard,
            Priority::Background => &self.background,
        }
    }

    /// Current utilization of a tier (permits in use over its limit).
    pub fn utilization(&self, priority: Priority) -> f64 {
        self.tier(priority).utilization()
    }

    /// Permits currently available to a tier.
    pub fn available(&self, priority: Priority) -> usize {
        self.tier(priority).semaphore.available_permits()
    }

    /// Total permits borrowed into a tier since startup.
    pub fn borrowed_in(&self, priority: Priority) -> usize {
        self.tier(priority).borrowed_in.load(Ordering::Relaxed)
    }

    async fn acquire(&self, priority: Priority) -> Option<Acquired> {
        let own = self.tier(priority);

        // Fast path: a permit of our own.
        if let Ok(permit) = Arc::clone(&own.semaphore).try_acquire_owned() {
            return Some(Acquired { _permit: permit, borrowed_from: None });
        }

        // Saturated: try to borrow an unused permit from a lower tier.
        if self.config.priority_borrowing {
            for &donor in priority.donors() {
                let donor_tier = self.tier(donor);
                if donor_tier.utilization() <= self.config.borrowing_threshold {
                    if let Ok(permit) = Arc::clone(&donor_tier.semaphore).try_acquire_owned() {
                        own.borrowed_in.fetch_add(1, Ordering::Relaxed);
                        donor_tier.lent_out.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            tier = priority.as_str(),
                            donor = donor.as_str(),
                            "borrowed a permit"
                        );
                        return Some(Acquired { _permit: permit, borrowed_from: Some(donor) });
                    }
                }
            }
        }

        // Queue on our own tier. Cancellation while waiting here (the
        // submission future being dropped) leaves no permit held.
        match Arc::clone(&own.semaphore).acquire_owned().await {
            Ok(permit) => Some(Acquired { _permit: permit, borrowed_from: None }),
            Err(_) => None,
        }
    }

    /// Run OCR on one image at the given priority.
    ///
    /// The submission carries a wall-clock budget covering both queue
    /// wait and processing. On expiry the output status is an error and
    /// any held permit is released; an already started backend call
    /// runs to completion on its blocking thread and is discarded.
    pub async fn submit(&self, priority: Priority, image: Vec<u8>) -> OcrOutput {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.submit_timeout;

        let acquired = match tokio::time::timeout_at(deadline, self.acquire(priority)).await {
            Ok(Some(acquired)) => acquired,
            Ok(None) => {
                return OcrOutput {
                    status: OcrStatus::Error("engine is shutting down".to_string()),
                    boxes: Vec::new(),
                    wait: started.elapsed(),
                    processing: Duration::ZERO,
                    borrowed: false,
                }
            }
            Err(_) => {
                warn!(tier = priority.as_str(), "submission timed out waiting for a permit");
                return OcrOutput {
                    status: OcrStatus::Error("timeout".to_string()),
                    boxes: Vec::new(),
                    wait: started.elapsed(),
                    processing: Duration::ZERO,
                    borrowed: false,
                };
            }
        };

        let wait = started.elapsed();
        let borrowed = acquired.borrowed_from.is_some();
        let backend = Arc::clone(&self.backend);
        let handle = tokio::task::spawn_blocking(move || backend.recognize(&image));

        let output = match tokio::time::timeout_at(deadline, handle).await {
            Err(_) => {
                warn!(tier = priority.as_str(), "OCR exceeded its budget, discarding result");
                OcrOutput {
                    status: OcrStatus::Error("timeout".to_string()),
                    boxes: Vec::new(),
                    wait,
                    processing: started.elapsed() - wait,
                    borrowed,
                }
            }
            Ok(Err(join_error)) => OcrOutput {
                status: OcrStatus::Error(format!("OCR worker panicked: {}", join_error)),
                boxes: Vec::new(),
                wait,
                processing: started.elapsed() - wait,
                borrowed,
            },
            Ok(Ok(Err(message))) => OcrOutput {
                status: OcrStatus::Error(message),
                boxes: Vec::new(),
                wait,
                processing: started.elapsed() - wait,
                borrowed,
            },
            Ok(Ok(Ok(boxes))) => {
                let status = if boxes.is_empty() { OcrStatus::Empty } else { OcrStatus::Ok };
                OcrOutput { status, boxes, wait, processing: started.elapsed() - wait, borrowed }
            }
        };

        self.monitor.record(priority, output.wait, output.processing);
        output
    }

    /// Re-balance tier limits for a mode.
    pub fn apply_mode(&self, mode: OcrMode) {
        let (express, standard, background) = self.config.limits_for(mode);
        self.express.adjust(express);
        self.standard.adjust(standard);
        self.background.adjust(background);
        info!(mode = mode.as_str(), express, standard, background, "tier limits re-balanced");
    }

    fn log_snapshot(&self) {
        debug!(
            express_util = format!("{:.2}", self.express.utilization()),
            standard_util = format!("{:.2}", self.standard.utilization()),
            background_util = format!("{:.2}", self.background.utilization()),
            express_borrowed = self.express.borrowed_in.load(Ordering::Relaxed),
            standard_borrowed = self.standard.borrowed_in.load(Ordering::Relaxed),
            standard_lent = self.standard.lent_out.load(Ordering::Relaxed),
            background_lent = self.background.lent_out.load(Ordering::Relaxed),
            "OCR utilization"
        );
    }

    /// Periodic monitoring loop: logs utilization and, when usage
    /// adaptation is on, applies hysteretic mode switches.
    pub async fn run_monitor(self: Arc<Self>) {
        let mut tick = tokio::time::interval(self.config.metrics_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.log_snapshot();
            if self.config.usage_adaptation {
                if let Some(mode) = self.monitor.evaluate() {
                    self.apply_mode(mode);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::FixedBackend;

    fn engine_with_limits(
        express: usize,
        standard: usize,
        background: usize,
        borrowing: bool,
    ) -> OcrEngine {
        let config = OcrConfig {
            express_limit: express,
            standard_limit: standard,
            background_limit: background,
            priority_borrowing: borrowing,
            usage_adaptation: false,
            ..OcrConfig::default()
        };
        OcrEngine::new(config, Arc::new(FixedBackend::new(&["Alpha", "95"])))
    }

    #[tokio::test]
    async fn submit_returns_boxes_and_status() {
        let engine = engine_with_limits(1, 1, 1, true);
        let output = engine.submit(Priority::Express, vec![1, 2, 3]).await;
        assert_eq!(output.status, OcrStatus::Ok);
        assert_eq!(output.boxes.len(), 2);
        assert!(!output.borrowed);
    }

    #[tokio::test]
    async fn empty_output_is_tagged_not_errored() {
        let config = OcrConfig { usage_adaptation: false, ..OcrConfig::default() };
        let engine = OcrEngine::new(config, Arc::new(FixedBackend::empty()));
        let output = engine.submit(Priority::Express, vec![0]).await;
        assert_eq!(output.status, OcrStatus::Empty);
        assert!(output.boxes.is_empty());
    }

    #[tokio::test]
    async fn express_borrows_from_idle_standard() {
        let engine = Arc::new(engine_with_limits(1, 1, 1, true));

        // Occupy BACKGROUND's only permit.
        let bg_permit = Arc::clone(&engine.background.semaphore).try_acquire_owned().unwrap();
        // Occupy EXPRESS's only permit.
        let ex_permit = Arc::clone(&engine.express.semaphore).try_acquire_owned().unwrap();

        // STANDARD is idle (utilization 0.0 <= 0.8), so EXPRESS borrows
        // from it and runs immediately.
        let output = engine.submit(Priority::Express, vec![1]).await;
        assert_eq!(output.status, OcrStatus::Ok);
        assert!(output.borrowed);
        assert_eq!(engine.borrowed_in(Priority::Express), 1);

        // The borrowed permit went back to STANDARD.
        assert_eq!(engine.available(Priority::Standard), 1);
        drop(bg_permit);
        drop(ex_permit);
    }

    #[tokio::test]
    async fn saturated_donors_are_not_borrowed_from() {
        let engine = Arc::new(engine_with_limits(1, 1, 1, true));

        // Saturate every tier: all donors are above the threshold.
        let _ex = Arc::clone(&engine.express.semaphore).try_acquire_owned().unwrap();
        let _st = Arc::clone(&engine.standard.semaphore).try_acquire_owned().unwrap();
        let _bg = Arc::clone(&engine.background.semaphore).try_acquire_owned().unwrap();

        let engine2 = Arc::clone(&engine);
        let pending = tokio::spawn(async move { engine2.submit(Priority::Express, vec![1]).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(engine.borrowed_in(Priority::Express), 0);

        drop(_ex);
        let output = pending.await.unwrap();
        assert_eq!(output.status, OcrStatus::Ok);
        assert!(!output.borrowed);
    }

    #[tokio::test]
    async fn strict_tiers_when_borrowing_disabled() {
        let engine = Arc::new(engine_with_limits(1, 1, 1, false));

        let _ex = Arc::clone(&engine.express.semaphore).try_acquire_owned().unwrap();

        // STANDARD is idle but strict tiers must not touch it.
        let engine2 = Arc::clone(&engine);
        let pending = tokio::spawn(async move { engine2.submit(Priority::Express, vec![1]).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(engine.available(Priority::Standard), 1);

        drop(_ex);
        assert_eq!(pending.await.unwrap().status, OcrStatus::Ok);
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_permit_held() {
        let engine = Arc::new(engine_with_limits(1, 1, 1, false));
        let _ex = Arc::clone(&engine.express.semaphore).try_acquire_owned().unwrap();

        let engine2 = Arc::clone(&engine);
        let pending = tokio::spawn(async move { engine2.submit(Priority::Express, vec![1]).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        pending.abort();
        let _ = pending.await;

        drop(_ex);
        // The aborted waiter must not have consumed the permit.
        assert_eq!(engine.available(Priority::Express), 1);
    }

    #[tokio::test]
    async fn timeout_resolves_with_error_and_releases_permit() {
        let config = OcrConfig {
            express_limit: 1,
            priority_borrowing: false,
            usage_adaptation: false,
            submit_timeout: Duration::from_millis(50),
            ..OcrConfig::default()
        };
        let engine = Arc::new(OcrEngine::new(config, Arc::new(FixedBackend::new(&["x"]))));

        // Hold the only permit past the budget of a queued submission.
        let holder = Arc::clone(&engine.express.semaphore).try_acquire_owned().unwrap();
        let output = engine.submit(Priority::Express, vec![1]).await;
        assert_eq!(output.status, OcrStatus::Error("timeout".to_string()));
        drop(holder);

        assert_eq!(engine.available(Priority::Express), 1);
        // The engine still works after the timeout.
        let output = engine.submit(Priority::Express, vec![1]).await;
        assert_eq!(output.status, OcrStatus::Ok);
    }

    #[tokio::test]
    async fn mode_changes_rebalance_limits() {
        let engine = engine_with_limits(4, 2, 1, true);
        engine.apply_mode(OcrMode::BulkHeavy);
        assert_eq!(engine.available(Priority::Background), 3);
        engine.apply_mode(OcrMode::Balanced);
        assert_eq!(engine.available(Priority::Background), 1);
        engine.apply_mode(OcrMode::SingleFocused);
        assert_eq!(engine.available(Priority::Express), 6);
    }

    #[tokio::test]
    async fn permit_accounting_respects_limits() {
        let engine = Arc::new(engine_with_limits(2, 1, 1, true));
        let mut permits = Vec::new();
        for _ in 0..2 {
            permits.push(Arc::clone(&engine.express.semaphore).try_acquire_owned().unwrap());
        }
        // EXPRESS holds exactly its configured permits.
        assert_eq!(engine.available(Priority::Express), 0);
        assert!(engine.utilization(Priority::Express) >= 1.0);
        drop(permits);
        assert_eq!(engine.available(Priority::Express), 2);
    }
}
