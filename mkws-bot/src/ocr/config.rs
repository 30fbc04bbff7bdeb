//! OCR engine configuration
//!
//! Tuning comes from the environment with clamped defaults; everything
//! here is optional, unlike the core service configuration.

use mkws_common::config::{bool_env, float_env, int_env};
use std::time::Duration;

/// Usage pattern the engine is currently optimized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    BulkHeavy,
    SingleFocused,
    Balanced,
}

impl OcrMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bulk_heavy" => Some(OcrMode::BulkHeavy),
            "single_focused" => Some(OcrMode::SingleFocused),
            "balanced" => Some(OcrMode::Balanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMode::BulkHeavy => "bulk_heavy",
            OcrMode::SingleFocused => "single_focused",
            OcrMode::Balanced => "balanced",
        }
    }
}

/// Priority tier of one OCR submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Single-image interactive scans.
    Express,
    /// Small bulk scans.
    Standard,
    /// Large bulk scans.
    Background,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Express => "express",
            Priority::Standard => "standard",
            Priority::Background => "background",
        }
    }

    /// Tiers this one may borrow from, highest preference first.
    /// BACKGROUND never borrows.
    pub fn donors(&self) -> &'static [Priority] {
        match self {
            Priority::Express => &[Priority::Standard, Priority::Background],
            Priority::Standard => &[Priority::Background],
            Priority::Background => &[],
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub mode: OcrMode,
    pub express_limit: usize,
    pub standard_limit: usize,
    pub background_limit: usize,
    pub priority_borrowing: bool,
    pub borrowing_threshold: f64,
    pub usage_adaptation: bool,
    pub usage_window: Duration,
    pub mode_switch_threshold: f64,
    /// Image count at or above which a bulk scan runs at BACKGROUND.
    pub bulk_threshold: usize,
    /// Wall-clock budget for one submission, waiting included.
    pub submit_timeout: Duration,
    pub metrics_interval: Duration,
    /// Per-operation resource hints passed to the backend.
    pub memory_limit_mb: usize,
    pub cpu_threads: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            mode: OcrMode::Balanced,
            express_limit: 4,
            standard_limit: 2,
            background_limit: 1,
            priority_borrowing: true,
            borrowing_threshold: 0.8,
            usage_adaptation: true,
            usage_window: Duration::from_secs(60 * 60),
            mode_switch_threshold: 0.7,
            bulk_threshold: 10,
            submit_timeout: Duration::from_secs(60),
            metrics_interval: Duration::from_secs(30),
            memory_limit_mb: 2048,
            cpu_threads: 4,
        }
    }
}

impl OcrConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mode: std::env::var("MKWS_OCR_MODE")
                .ok()
                .and_then(|m| OcrMode::parse(&m))
                .unwrap_or(defaults.mode),
            express_limit: int_env("MKWS_OCR_EXPRESS_CONCURRENCY", 4, 1, 8) as usize,
            standard_limit: int_env("MKWS_OCR_STANDARD_CONCURRENCY", 2, 1, 6) as usize,
            background_limit: int_env("MKWS_OCR_BACKGROUND_CONCURRENCY", 1, 1, 4) as usize,
            priority_borrowing: bool_env("MKWS_OCR_PRIORITY_BORROWING", true),
            borrowing_threshold: float_env("MKWS_OCR_BORROWING_THRESHOLD", 0.8, 0.5, 0.95),
            usage_adaptation: bool_env("MKWS_OCR_USAGE_ADAPTATION", true),
            usage_window: Duration::from_secs(
                int_env("MKWS_OCR_USAGE_WINDOW_MINUTES", 60, 15, 240) as u64 * 60,
            ),
            mode_switch_threshold: float_env("MKWS_OCR_MODE_SWITCH_THRESHOLD", 0.7, 0.5, 0.9),
            bulk_threshold: int_env("MKWS_OCR_BULK_THRESHOLD", 10, 2, 50) as usize,
            submit_timeout: Duration::from_secs(int_env("MKWS_OCR_SUBMIT_TIMEOUT_SECS", 60, 5, 600) as u64),
            metrics_interval: Duration::from_secs(
                int_env("MKWS_OCR_METRICS_INTERVAL_SECS", 30, 5, 600) as u64,
            ),
            memory_limit_mb: int_env("MKWS_OCR_MEMORY_LIMIT_MB", 2048, 512, 8192) as usize,
            cpu_threads: int_env("MKWS_OCR_CPU_THREADS", 4, 1, 16) as usize,
        }
    }

    /// Priority tier for an operation over `image_count` images.
    pub fn priority_for(&self, image_count: usize) -> Priority {
        if image_count <= 1 {
            Priority::Express
        } else if image_count < self.bulk_threshold {
            Priority::Standard
        } else {
            Priority::Background
        }
    }

    /// Tier limits for a mode: `single_focused` raises EXPRESS and
    /// floors BACKGROUND, `bulk_heavy` raises BACKGROUND, `balanced`
    /// uses the configured values.
    pub fn limits_for(&self, mode: OcrMode) -> (usize, usize, usize) {
        match mode {
            OcrMode::Balanced => (self.express_limit, self.standard_limit, self.background_limit),
            OcrMode::SingleFocused => (self.express_limit + 2, self.standard_limit, 1),
            OcrMode::BulkHeavy => {
                (self.express_limit, self.standard_limit, self.background_limit + 2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_thresholds() {
        let config = OcrConfig::default();
        assert_eq!(config.priority_for(1), Priority::Express);
        assert_eq!(config.priority_for(2), Priority::Standard);
        assert_eq!(config.priority_for(9), Priority::Standard);
        assert_eq!(config.priority_for(10), Priority::Background);
        assert_eq!(config.priority_for(100), Priority::Background);
    }

    #[test]
    fn background_never_borrows() {
        assert!(Priority::Background.donors().is_empty());
        assert_eq!(Priority::Express.donors(), &[Priority::Standard, Priority::Background]);
    }

    #[test]
    fn mode_limits() {
        let config = OcrConfig::default();
        assert_eq!(config.limits_for(OcrMode::Balanced), (4, 2, 1));
        assert_eq!(config.limits_for(OcrMode::SingleFocused), (6, 2, 1));
        assert_eq!(config.limits_for(OcrMode::BulkHeavy), (4, 2, 3));
    }
}
