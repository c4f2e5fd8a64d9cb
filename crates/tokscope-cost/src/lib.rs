//! # tokscope-cost
//!
//! Model pricing and cache-aware cost accounting for tokscope.
//!
//! This crate provides:
//! - [`PricingResolver`] - Resolve a model id to per-million-token rates
//! - [`CostSummary`] - Actual and without-cache cost of some usage
//! - [`refresh_if_stale`] - Refresh the rate table from a published pricing page
//!
//! ## Resolution
//!
//! Model ids are reduced to a `(family, major, minor)` key and matched against
//! the tier table: an exact tier first, then the newest tier of the family,
//! then [`DEFAULT_RATES`]. An unknown model is therefore never free.
//!
//! ## Example
//!
//! ```
//! use tokscope_core::TokenUsage;
//! use tokscope_cost::PricingResolver;
//!
//! let resolver = PricingResolver::new();
//! let usage = TokenUsage::new(1_000, 0, 9_000, 500);
//! let summary = resolver.price("claude-sonnet-4-5-20250929", &usage);
//! assert!(summary.savings() > 0.0);
//! ```

pub mod accountant;
pub mod error;
pub mod pricing;
pub mod remote;

pub use accountant::{CostSummary, cache_hit_rate, cost, cost_without_cache};
pub use error::{CostError, Result};
pub use pricing::{DEFAULT_RATES, ModelKey, PricingResolver, PricingTier, Rates, Resolution};
pub use remote::{
    PricingCache, RefreshSettings, load_overrides, parse_rate_table, refresh_if_stale,
    spawn_refresh,
};
