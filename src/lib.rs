//! # LLM Spend
//!
//! Cost tracking for large-language-model API calls.
//!
//! ## Overview
//!
//! Application code wraps its LLM calls with a [`Tracker`]. After each
//! successful call the token usage is read from the response, priced from a
//! static per-model table and appended to a local SQLite log. The `llm-spend`
//! binary reads that log back:
//! - Grouped cost reports by model, source file, function or label
//! - Totals with the most expensive file and model
//! - Raw CSV / JSON export
//! - Bulk purges by age
//!
//! ```ignore
//! use llm_spend::{SpendStore, Tracker};
//!
//! let tracker = Tracker::new(SpendStore::open_default()?, "gpt-4o").with_label("summarize");
//! let response: serde_json::Value = llm_spend::track!(tracker, || client.chat(&request))?;
//!
//! let mut scope = llm_spend::spending!(tracker);
//! let reply = anthropic.messages(&request)?;
//! scope.observe(&reply)?;
//! scope.finish()?;
//! ```
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// Command-line argument parsing
pub mod cli;

/// SQLite call log
pub mod db;

/// Text and JSON rendering for the CLI
pub mod display;

/// Error types
pub mod error;

/// Raw record export
pub mod export;

/// Call record data model
pub mod models;

/// Model pricing and cost calculation
pub mod pricing;

/// Grouped aggregation
pub mod report;

/// Decorator-style and scoped instrumentation
pub mod tracker;

/// Token usage extraction from provider responses
pub mod usage;

/// Store location and number formatting
pub mod utils;

pub use db::{RecordFilter, SpendStore, TimeWindow};
pub use error::{Result, SpendError};
pub use models::{CallRecord, CallSite};
pub use tracker::{SpendScope, Tracked, Tracker};
pub use usage::{ReportsUsage, TokenUsage};
