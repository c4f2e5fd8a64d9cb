//! Model pricing lookup.
//!
//! A model id is reduced to a canonical [`ModelKey`] by trying an ordered list
//! of patterns, then looked up in an ordered tier table:
//! exact version, then the family default, then [`DEFAULT_RATES`].
//!
//! Supported id shapes:
//! - Modern Claude: `claude-opus-4-5-20251101`, `claude-sonnet-4-20250514`
//! - Legacy Claude: `claude-3-5-sonnet-20241022`, `claude-3-opus-20240229`
//! - Vendor prefixed: `anthropic/claude-...`, `us.anthropic.claude-...-v1:0`
//! - OpenAI: `gpt-5-codex`, `gpt-5.1-codex-mini`, `gpt-4o`, `o3`, `o4-mini`
//! - Gemini: `gemini-2.5-pro`, `gemini-2.5-flash-lite`

use std::sync::LazyLock;

use regex::{Captures, Match, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-million-token rates in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rates {
    pub input: f64,
    pub cache_write: f64,
    pub cache_read: f64,
    pub output: f64,
}

impl Rates {
    pub const fn new(input: f64, cache_write: f64, cache_read: f64, output: f64) -> Self {
        Self {
            input,
            cache_write,
            cache_read,
            output,
        }
    }
}

/// Rates for models no pattern or family recognizes (Sonnet-class).
pub const DEFAULT_RATES: Rates = Rates::new(3.0, 3.75, 0.30, 15.0);

/// Canonical `{family, major, minor}` identity of a model id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub family: String,
    pub major: u32,
    pub minor: Option<u32>,
}

impl ModelKey {
    fn new(family: impl Into<String>, major: u32, minor: Option<u32>) -> Self {
        Self {
            family: family.into(),
            major,
            minor,
        }
    }

    /// Extract a key by trying each pattern in order.
    pub fn parse(model: &str) -> Option<Self> {
        let model = model.trim().to_lowercase();
        PATTERNS
            .iter()
            .find_map(|(pattern, build)| pattern.captures(&model).and_then(|caps| build(&caps)))
    }
}

type KeyBuilder = fn(&Captures<'_>) -> Option<ModelKey>;

static PATTERNS: LazyLock<Vec<(Regex, KeyBuilder)>> = LazyLock::new(|| {
    let patterns: [(&str, KeyBuilder); 5] = [
        (r"claude-(opus|sonnet|haiku)-(\d+)(?:[-.](\d+))?", |c| {
            Some(ModelKey::new(&c[1], number(c.get(2))?, version_minor(c.get(3))))
        }),
        (r"claude-(\d+)(?:[-.](\d+))?-(opus|sonnet|haiku)", |c| {
            Some(ModelKey::new(&c[3], number(c.get(1))?, version_minor(c.get(2))))
        }),
        (r"gpt-(\d+)(?:\.(\d+))?(o)?(?:-codex)?(?:-(mini|nano))?", |c| {
            let family = match (c.get(4).map(|m| m.as_str()), c.get(3)) {
                (Some(size), _) => format!("gpt-{size}"),
                (None, Some(_)) => "gpt-o".to_string(),
                (None, None) => "gpt".to_string(),
            };
            Some(ModelKey::new(family, number(c.get(1))?, version_minor(c.get(2))))
        }),
        (r"\bo(\d+)(?:-(mini))?", |c| {
            let family = if c.get(2).is_some() { "o-mini" } else { "o" };
            Some(ModelKey::new(family, number(c.get(1))?, None))
        }),
        (r"gemini-(\d+)(?:\.(\d+))?-(pro|flash-lite|flash)", |c| {
            let family = format!("gemini-{}", &c[3]);
            Some(ModelKey::new(family, number(c.get(1))?, version_minor(c.get(2))))
        }),
    ];
    patterns
        .into_iter()
        .filter_map(|(source, build)| Regex::new(source).ok().map(|re| (re, build)))
        .collect()
});

fn number(m: Option<Match<'_>>) -> Option<u32> {
    m?.as_str().parse().ok()
}

/// A trailing group of six or more digits is a release date, not a version.
fn version_minor(m: Option<Match<'_>>) -> Option<u32> {
    let m = m?;
    if m.as_str().len() >= 6 {
        return None;
    }
    m.as_str().parse().ok()
}

/// One row of the rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    pub family: String,
    pub major: u32,
    /// `None` matches every minor version of `major`
    pub minor: Option<u32>,
    pub rates: Rates,
}

impl PricingTier {
    pub fn new(family: &str, major: u32, minor: Option<u32>, rates: Rates) -> Self {
        Self {
            family: family.to_string(),
            major,
            minor,
            rates,
        }
    }

    /// Exact version match; a key without a minor is version `.0`.
    pub fn matches(&self, key: &ModelKey) -> bool {
        self.family == key.family
            && self.major == key.major
            && self
                .minor
                .is_none_or(|minor| minor == key.minor.unwrap_or(0))
    }
}

/// How a rate lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Exact,
    Family,
    Default,
}

/// Model id to rates.
#[derive(Debug, Clone)]
pub struct PricingResolver {
    tiers: Vec<PricingTier>,
}

impl PricingResolver {
    /// Resolver over the built-in table.
    pub fn new() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }

    /// Resolver that tries `overrides` (e.g. a refreshed remote table) before
    /// the built-in table.
    pub fn with_overrides(overrides: Vec<PricingTier>) -> Self {
        let mut tiers = overrides;
        tiers.extend(default_tiers());
        Self { tiers }
    }

    pub fn tiers(&self) -> &[PricingTier] {
        &self.tiers
    }

    /// Rates for a model id. Never fails.
    pub fn rates(&self, model: &str) -> Rates {
        self.lookup(model).0
    }

    /// Rates plus which lookup step produced them.
    pub fn lookup(&self, model: &str) -> (Rates, Resolution) {
        let Some(key) = ModelKey::parse(model) else {
            debug!(model, "unrecognized model id, using default pricing");
            return (DEFAULT_RATES, Resolution::Default);
        };

        if let Some(tier) = self.tiers.iter().find(|tier| tier.matches(&key)) {
            return (tier.rates, Resolution::Exact);
        }

        // The first tier listed for a family is its newest release
        if let Some(tier) = self.tiers.iter().find(|tier| tier.family == key.family) {
            debug!(model, family = %key.family, "no exact tier, using family default");
            return (tier.rates, Resolution::Family);
        }

        debug!(model, family = %key.family, "unknown family, using default pricing");
        (DEFAULT_RATES, Resolution::Default)
    }
}

impl Default for PricingResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in rate table, newest tier of each family first.
pub fn default_tiers() -> Vec<PricingTier> {
    const OPUS_45: Rates = Rates::new(5.0, 6.25, 0.50, 25.0);
    const OPUS_4: Rates = Rates::new(15.0, 18.75, 1.50, 75.0);
    const SONNET: Rates = Rates::new(3.0, 3.75, 0.30, 15.0);

    vec![
        // Anthropic
        PricingTier::new("opus", 4, Some(6), OPUS_45),
        PricingTier::new("opus", 4, Some(5), OPUS_45),
        PricingTier::new("opus", 4, Some(1), OPUS_4),
        PricingTier::new("opus", 4, Some(0), OPUS_4),
        PricingTier::new("opus", 3, Some(0), OPUS_4),
        PricingTier::new("sonnet", 4, Some(5), SONNET),
        PricingTier::new("sonnet", 4, Some(0), SONNET),
        PricingTier::new("sonnet", 3, Some(7), SONNET),
        PricingTier::new("sonnet", 3, Some(5), SONNET),
        PricingTier::new("haiku", 4, Some(5), Rates::new(1.0, 1.25, 0.10, 5.0)),
        PricingTier::new("haiku", 3, Some(5), Rates::new(0.80, 1.0, 0.08, 4.0)),
        PricingTier::new("haiku", 3, Some(0), Rates::new(0.25, 0.30, 0.03, 1.25)),
        // OpenAI (no separate cache-write price)
        PricingTier::new("gpt", 5, None, Rates::new(1.25, 1.25, 0.125, 10.0)),
        PricingTier::new("gpt", 4, Some(1), Rates::new(2.0, 2.0, 0.50, 8.0)),
        PricingTier::new("gpt-o", 4, None, Rates::new(2.5, 2.5, 1.25, 10.0)),
        PricingTier::new("gpt-mini", 5, None, Rates::new(0.25, 0.25, 0.025, 2.0)),
        PricingTier::new("gpt-nano", 5, None, Rates::new(0.05, 0.05, 0.005, 0.40)),
        PricingTier::new("o", 3, None, Rates::new(2.0, 2.0, 0.50, 8.0)),
        PricingTier::new("o-mini", 4, None, Rates::new(1.10, 1.10, 0.275, 4.40)),
        // Google
        PricingTier::new("gemini-pro", 2, Some(5), Rates::new(1.25, 1.25, 0.31, 10.0)),
        PricingTier::new("gemini-flash", 2, Some(5), Rates::new(0.30, 0.30, 0.075, 2.50)),
        PricingTier::new("gemini-flash-lite", 2, Some(5), Rates::new(0.10, 0.10, 0.025, 0.40)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(family: &str, major: u32, minor: Option<u32>) -> Option<ModelKey> {
        Some(ModelKey::new(family, major, minor))
    }

    #[test]
    fn test_parse_modern_claude() {
        assert_eq!(ModelKey::parse("claude-opus-4-5-20251101"), key("opus", 4, Some(5)));
        assert_eq!(ModelKey::parse("claude-haiku-4-5"), key("haiku", 4, Some(5)));
        assert_eq!(ModelKey::parse("Claude-Opus-4.1"), key("opus", 4, Some(1)));
    }

    #[test]
    fn test_parse_date_suffix_is_not_minor() {
        assert_eq!(ModelKey::parse("claude-sonnet-4-20250514"), key("sonnet", 4, None));
        assert_eq!(ModelKey::parse("claude-opus-4-202505"), key("opus", 4, None));
    }

    #[test]
    fn test_parse_legacy_claude() {
        assert_eq!(ModelKey::parse("claude-3-5-sonnet-20241022"), key("sonnet", 3, Some(5)));
        assert_eq!(ModelKey::parse("claude-3-opus-20240229"), key("opus", 3, None));
    }

    #[test]
    fn test_parse_vendor_prefixes() {
        assert_eq!(
            ModelKey::parse("us.anthropic.claude-sonnet-4-5-20250929-v1:0"),
            key("sonnet", 4, Some(5))
        );
        assert_eq!(ModelKey::parse("anthropic/claude-opus-4-6"), key("opus", 4, Some(6)));
    }

    #[test]
    fn test_parse_openai_and_gemini() {
        assert_eq!(ModelKey::parse("gpt-5-codex"), key("gpt", 5, None));
        assert_eq!(ModelKey::parse("gpt-5.1-codex-mini"), key("gpt-mini", 5, Some(1)));
        assert_eq!(ModelKey::parse("gpt-4o"), key("gpt-o", 4, None));
        assert_eq!(ModelKey::parse("gpt-4.1"), key("gpt", 4, Some(1)));
        assert_eq!(ModelKey::parse("o3"), key("o", 3, None));
        assert_eq!(ModelKey::parse("o4-mini"), key("o-mini", 4, None));
        assert_eq!(ModelKey::parse("gemini-2.5-flash-lite"), key("gemini-flash-lite", 2, Some(5)));
        assert_eq!(ModelKey::parse("gemini-2.5-pro"), key("gemini-pro", 2, Some(5)));
        assert_eq!(ModelKey::parse("mistral-large"), None);
    }

    #[test]
    fn test_exact_lookup() {
        let resolver = PricingResolver::new();
        let (rates, how) = resolver.lookup("claude-opus-4-5-20251101");
        assert_eq!(how, Resolution::Exact);
        assert_eq!(rates.input, 5.0);
        assert_eq!(rates.output, 25.0);

        let (rates, how) = resolver.lookup("claude-opus-4-20250514");
        assert_eq!(how, Resolution::Exact);
        assert_eq!(rates.input, 15.0);

        let (rates, how) = resolver.lookup("gpt-5.2-codex");
        assert_eq!(how, Resolution::Exact);
        assert_eq!(rates.output, 10.0);
    }

    #[test]
    fn test_family_fallback_uses_newest_tier() {
        let resolver = PricingResolver::new();
        let (rates, how) = resolver.lookup("claude-opus-5-0");
        assert_eq!(how, Resolution::Family);
        assert_eq!(rates, resolver.rates("claude-opus-4-6"));
    }

    #[test]
    fn test_unrecognized_model_uses_default() {
        let resolver = PricingResolver::new();
        let (rates, how) = resolver.lookup("some-local-llama");
        assert_eq!(how, Resolution::Default);
        assert_eq!(rates, DEFAULT_RATES);
        assert!(rates.input > 0.0 && rates.output > 0.0);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let cheap = Rates::new(1.0, 1.0, 0.1, 2.0);
        let resolver = PricingResolver::with_overrides(vec![PricingTier::new(
            "sonnet",
            4,
            Some(5),
            cheap,
        )]);
        assert_eq!(resolver.rates("claude-sonnet-4-5-20250929"), cheap);
        // Untouched versions still resolve from the built-in table
        assert_eq!(resolver.rates("claude-sonnet-4-20250514"), DEFAULT_RATES);
    }

    #[test]
    fn test_default_tiers_are_monotonic() {
        // output > input > cache_write >= ... > cache_read is assumed by savings math
        for tier in default_tiers() {
            let r = tier.rates;
            assert!(r.output > r.input, "{tier:?}");
            assert!(r.input > r.cache_read, "{tier:?}");
            assert!(r.cache_write >= r.input, "{tier:?}");
        }
    }
}
