//! Best-effort refresh of the rate table from a published pricing page.
//!
//! The page is fetched at most once per cache TTL. Rows are read from an HTML
//! `<table>` or a markdown pipe table whose first column names the model and
//! whose remaining columns hold `$N / MTok` amounts:
//!
//! | columns with amounts | meaning |
//! |---|---|
//! | 5 | input, 5m cache write, 1h cache write, cache read, output |
//! | 4 | input, cache write, cache read, output |
//!
//! The parsed tiers are written to a JSON cache file and layered in front of
//! the built-in table by [`load_overrides`]. Nothing here ever blocks pricing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CostError, Result};
use crate::pricing::{ModelKey, PricingTier, Rates};

/// User agent for rate table requests
const USER_AGENT: &str = concat!("tokscope/", env!("CARGO_PKG_VERSION"));

static HTML_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap());
static HTML_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());
static DOLLARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([0-9]+(?:\.[0-9]+)?)").unwrap());
static SEPARATOR_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^:?-{3,}:?$").unwrap());

/// Settings for one refresh attempt.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub url: String,
    pub cache_file: PathBuf,
    pub ttl_days: u32,
    pub timeout: Duration,
}

/// On-disk cache of the last successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingCache {
    pub fetched_at: DateTime<Utc>,
    pub source_url: String,
    pub tiers: Vec<PricingTier>,
}

impl PricingCache {
    /// Read a cache file; an absent or corrupt file is `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable pricing cache");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn is_fresh(&self, ttl_days: u32, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) < chrono::Duration::days(i64::from(ttl_days))
    }
}

/// Cached remote tiers of any age, for [`crate::PricingResolver::with_overrides`].
pub fn load_overrides(cache_file: &Path) -> Vec<PricingTier> {
    PricingCache::load(cache_file)
        .map(|cache| cache.tiers)
        .unwrap_or_default()
}

/// Fetch and cache the remote table unless the cache is still fresh.
///
/// Returns `Ok(true)` when a new table was written.
pub async fn refresh_if_stale(settings: &RefreshSettings) -> Result<bool> {
    let now = Utc::now();
    if let Some(cache) = PricingCache::load(&settings.cache_file)
        && cache.is_fresh(settings.ttl_days, now)
    {
        debug!(fetched_at = %cache.fetched_at, "pricing cache is fresh");
        return Ok(false);
    }

    let tiers = fetch_rate_table(&settings.url, settings.timeout).await?;
    let cache = PricingCache {
        fetched_at: now,
        source_url: settings.url.clone(),
        tiers,
    };
    cache.save(&settings.cache_file)?;
    info!(count = cache.tiers.len(), url = %settings.url, "refreshed remote pricing");
    Ok(true)
}

/// Run [`refresh_if_stale`] in the background; failures are logged only.
pub fn spawn_refresh(settings: RefreshSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = refresh_if_stale(&settings).await {
            warn!(url = %settings.url, error = %e, "pricing refresh failed; keeping current table");
        }
    })
}

/// Download and parse a rate table page.
pub async fn fetch_rate_table(url: &str, timeout: Duration) -> Result<Vec<PricingTier>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;

    // The client timeout covers each request; this bounds the whole exchange
    let body = tokio::time::timeout(timeout, fetch_body(&client, url))
        .await
        .map_err(|_| CostError::Timeout {
            secs: timeout.as_secs(),
        })??;

    let tiers = parse_rate_table(&body);
    if tiers.is_empty() {
        return Err(CostError::EmptyTable {
            url: url.to_string(),
        });
    }
    Ok(tiers)
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CostError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}

/// Extract pricing tiers from an HTML or markdown table.
pub fn parse_rate_table(body: &str) -> Vec<PricingTier> {
    let rows = if HTML_ROW.is_match(body) {
        html_rows(body)
    } else {
        markdown_rows(body)
    };

    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|cells| tier_from_row(cells))
        .filter(|tier| seen.insert((tier.family.clone(), tier.major, tier.minor)))
        .collect()
}

fn html_rows(body: &str) -> Vec<Vec<String>> {
    HTML_ROW
        .captures_iter(body)
        .map(|row| {
            HTML_CELL
                .captures_iter(&row[1])
                .map(|cell| decode_entities(&HTML_TAG.replace_all(&cell[1], " ")))
                .collect()
        })
        .collect()
}

fn markdown_rows(body: &str) -> Vec<Vec<String>> {
    body.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|'))
        .map(|line| {
            line.trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.iter().all(|cell| SEPARATOR_CELL.is_match(cell)))
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#36;", "$")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tier_from_row(cells: &[String]) -> Option<PricingTier> {
    let (name, rest) = cells.split_first()?;
    let key = ModelKey::parse(&model_slug(name))?;

    let amounts: Vec<f64> = rest
        .iter()
        .filter_map(|cell| DOLLARS.captures(cell))
        .filter_map(|caps| caps[1].parse().ok())
        .collect();

    let rates = match amounts.as_slice() {
        [input, write_5m, _write_1h, read, output] => Rates::new(*input, *write_5m, *read, *output),
        [input, write, read, output] => Rates::new(*input, *write, *read, *output),
        _ => return None,
    };

    Some(PricingTier {
        family: key.family,
        major: key.major,
        minor: Some(key.minor.unwrap_or(0)),
        rates,
    })
}

/// "Claude Opus 4.5 (deprecated)" -> "claude-opus-4-5"
fn model_slug(name: &str) -> String {
    PARENTHETICAL
        .replace_all(name, "")
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
