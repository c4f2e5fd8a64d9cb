//! Cache-aware cost accounting.
//!
//! `cost = (fresh·in + cache_write·write + cache_read·read + output·out) / 1e6`.
//! The without-cache counterfactual bills every input-side token at the fresh
//! input rate and keeps output cost unchanged. Savings are the difference and
//! are not clamped: a tier whose cache rates exceed its input rate yields
//! negative savings.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::Serialize;
use tokscope_core::TokenUsage;

use crate::pricing::{PricingResolver, Rates};

const PER_MILLION: f64 = 1_000_000.0;

/// Actual and counterfactual cost of some usage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub cost: f64,
    pub without_cache: f64,
}

impl CostSummary {
    /// Price usage at the given rates.
    pub fn for_usage(usage: &TokenUsage, rates: &Rates) -> Self {
        Self {
            cost: cost(usage, rates),
            without_cache: cost_without_cache(usage, rates),
        }
    }

    pub fn savings(&self) -> f64 {
        self.without_cache - self.cost
    }
}

impl Add for CostSummary {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cost: self.cost + rhs.cost,
            without_cache: self.without_cache + rhs.without_cache,
        }
    }
}

impl AddAssign for CostSummary {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for CostSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Cost in USD with cache pricing applied.
pub fn cost(usage: &TokenUsage, rates: &Rates) -> f64 {
    (usage.fresh_input as f64 * rates.input
        + usage.cache_write as f64 * rates.cache_write
        + usage.cache_read as f64 * rates.cache_read
        + usage.output as f64 * rates.output)
        / PER_MILLION
}

/// Cost in USD if every input token had been fresh.
pub fn cost_without_cache(usage: &TokenUsage, rates: &Rates) -> f64 {
    (usage.input_tokens() as f64 * rates.input + usage.output as f64 * rates.output) / PER_MILLION
}

/// Share of input tokens served from cache; 0 when there is no input.
pub fn cache_hit_rate(usage: &TokenUsage) -> f64 {
    let input = usage.input_tokens();
    if input == 0 {
        return 0.0;
    }
    usage.cache_read as f64 / input as f64
}

impl PricingResolver {
    /// Price one model's usage.
    pub fn price(&self, model: &str, usage: &TokenUsage) -> CostSummary {
        CostSummary::for_usage(usage, &self.rates(model))
    }
}
