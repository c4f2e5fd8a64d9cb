//! # tokscope-analysis
//!
//! Turns normalized transcripts into the aggregate [`Report`](tokscope_core::Report).
//!
//! This crate provides:
//! - [`SessionBuilder`] - Prices a transcript and corrects its project name
//! - [`group_prompts`] - Splits a session into per-prompt groups
//! - [`quality`] - Prompt specificity and cost-driver scoring
//! - [`insights`] - The fixed-order rule registry
//! - [`build_report`] - Sessions, buckets, totals and insights in one pass
//! - [`MetricsSnapshot`] - The exported instruments for one report
//!
//! ## Example
//!
//! ```
//! use tokscope_analysis::build_report;
//! use tokscope_cost::PricingResolver;
//!
//! let report = build_report(Vec::new(), &PricingResolver::new(), |_| None);
//! assert_eq!(report.totals.total_sessions, 0);
//! ```

pub mod aggregate;
pub mod grouper;
pub mod insights;
pub mod metrics;
pub mod quality;
pub mod session;

pub use aggregate::build_report;
pub use grouper::group_prompts;
pub use insights::{RULES, Rule, Snapshot, evaluate};
pub use metrics::{ExportError, Instrument, InstrumentKind, MetricsSnapshot, probe_endpoint};
pub use session::{SessionBuilder, UNKNOWN_DATE, correct_project};
