//! # MKWS Common Library
//!
//! Shared code for the MKWS services including:
//! - Database models and queries (single SQLite source of truth)
//! - Name resolution against per-guild rosters
//! - Score-line grammar and war arithmetic
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod resolver;
pub mod scores;

pub use error::{Error, Result};
