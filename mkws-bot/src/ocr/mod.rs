//! OCR execution engine
//!
//! Runs the pluggable OCR backend under strict concurrency bounds,
//! prioritizing interactive requests over batch ones:
//! - Three priority tiers (EXPRESS / STANDARD / BACKGROUND), each with
//!   its own counting semaphore
//! - Saturated tiers may borrow unused permits from lower tiers
//! - A monitor tracks usage and adaptively re-balances tier limits
//! - Token-level parsing of OCR text into detected players

pub mod backend;
pub mod config;
pub mod engine;
pub mod monitor;
pub mod parse;

pub use backend::{OcrBackend, OcrStatus, TextBox};
pub use config::{OcrConfig, OcrMode, Priority};
pub use engine::{OcrEngine, OcrOutput};
