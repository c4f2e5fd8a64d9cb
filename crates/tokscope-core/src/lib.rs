//! # tokscope-core
//!
//! Core types, errors, and utilities shared by the tokscope crates.
//!
//! This crate provides:
//! - [`TokscopeError`] - Error type for directory-level and configuration failures
//! - [`logging`] - Tracing setup and log file locations
//! - [`types`] - The normalized data model: queries, sessions, prompt groups,
//!   buckets, insights and the aggregate report
//!
//! ## Example
//!
//! ```no_run
//! use tokscope_core::{logging, TokenUsage};
//!
//! fn main() -> tokscope_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let usage = TokenUsage::new(1_000, 0, 4_000, 200);
//!     tracing::info!(total = usage.total_tokens(), "usage parsed");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use error::{Result, TokscopeError};
pub use logging::{LogGuard, init_logging};
pub use types::{
    CostDriver, DailyBucket, DriverKind, Insight, ModelBucket, ProjectBucket, PromptGroup,
    PromptQuality, Query, Report, Session, Severity, TokenUsage, Tool, ToolCall, Totals,
    Transcript, is_sentinel_model,
};
