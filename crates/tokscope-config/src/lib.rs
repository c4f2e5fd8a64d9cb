//! # tokscope-config
//!
//! Configuration for tokscope, read from `~/.tokscope/config.yaml`.
//!
//! The file is optional and every section falls back to defaults, so an empty
//! file and a missing file behave the same. Command-line flags are layered on
//! top with [`Config::apply_overrides`].
//!
//! ```yaml
//! refresh_interval_secs: 60
//! sources:
//!   codex_sessions_dir: /srv/codex/sessions
//!   gemini_enabled: false
//! pricing:
//!   cache_ttl_days: 7
//! telemetry:
//!   endpoint: http://localhost:4318
//!   headers:
//!     Authorization: Basic dXNlcjpwYXNz
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokscope_core::{Result, TokscopeError};
use tracing::debug;

/// Default rate table scraped by the pricing refresh.
pub const DEFAULT_PRICING_URL: &str = "https://docs.anthropic.com/en/docs/about-claude/pricing";

/// Default port of the dashboard layer.
pub const DEFAULT_PORT: u16 = 3456;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Seconds between report rebuilds in watch mode
    pub refresh_interval_secs: u64,
    pub sources: SourcesConfig,
    pub pricing: PricingConfig,
    pub serve: ServeConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            sources: SourcesConfig::default(),
            pricing: PricingConfig::default(),
            serve: ServeConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Where each tool keeps its transcripts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourcesConfig {
    pub claude_projects_dir: PathBuf,
    pub claude_history_file: PathBuf,
    pub codex_sessions_dir: PathBuf,
    pub gemini_tmp_dir: PathBuf,
    pub claude_enabled: bool,
    pub codex_enabled: bool,
    pub gemini_enabled: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        let claude_home = claude_home();
        Self {
            claude_projects_dir: claude_home.join("projects"),
            claude_history_file: claude_home.join("history.jsonl"),
            codex_sessions_dir: codex_home().join("sessions"),
            gemini_tmp_dir: home_dir().join(".gemini").join("tmp"),
            claude_enabled: true,
            codex_enabled: true,
            gemini_enabled: true,
        }
    }
}

/// Remote rate-table refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    pub remote_url: String,
    pub refresh_enabled: bool,
    /// Cached tables younger than this are not refetched
    pub cache_ttl_days: u32,
    pub timeout_secs: u64,
    pub cache_file: PathBuf,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            remote_url: DEFAULT_PRICING_URL.to_string(),
            refresh_enabled: true,
            cache_ttl_days: 7,
            timeout_secs: 10,
            cache_file: state_dir().join("pricing-cache.json"),
        }
    }
}

/// Settings handed to the dashboard layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServeConfig {
    pub port: u16,
    pub open_browser: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            open_browser: true,
        }
    }
}

/// Telemetry sink settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub endpoint: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub no_open: bool,
    pub otel_endpoint: Option<String>,
    /// Raw `Key: Value,Key=Value` list
    pub otel_headers: Option<String>,
}

impl Config {
    /// Load from an explicit path, or from the default path when `None`.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_yaml(&path)
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TokscopeError::io("reading config", path, e))?;
        let config = Self::parse(&content).map_err(|e| match e {
            TokscopeError::ConfigInvalid { message, .. } => {
                TokscopeError::config_invalid(path, message)
            }
            other => other,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn parse(content: &str) -> Result<Self> {
        // serde_yaml rejects an empty document for a struct
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| TokscopeError::config_invalid("<inline>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs < 5 {
            return Err(TokscopeError::config_validation(format!(
                "refresh_interval_secs must be >= 5, got {}",
                self.refresh_interval_secs
            )));
        }
        if self.pricing.timeout_secs == 0 {
            return Err(TokscopeError::config_validation(
                "pricing.timeout_secs must be >= 1",
            ));
        }
        if self.pricing.cache_ttl_days == 0 {
            return Err(TokscopeError::config_validation(
                "pricing.cache_ttl_days must be >= 1",
            ));
        }
        Ok(())
    }

    /// Layer command-line values over the file.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.serve.port = port;
        }
        if overrides.no_open {
            self.serve.open_browser = false;
        }
        if let Some(endpoint) = &overrides.otel_endpoint {
            self.telemetry.endpoint = Some(endpoint.clone());
        }
        if let Some(raw) = &overrides.otel_headers {
            self.telemetry.headers.extend(parse_headers(raw));
        }
    }
}

/// Parse a comma-separated header list.
///
/// Each entry is `Key: Value` or `Key=Value`. The split happens at whichever
/// of `:` or `=` comes first, so base64 padding and colons inside a value
/// survive. Entries with an empty key are dropped.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let at = entry.find([':', '='])?;
            let (key, value) = (&entry[..at], &entry[at + 1..]);
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// `~/.tokscope/config.yaml`
pub fn default_config_path() -> PathBuf {
    state_dir().join("config.yaml")
}

fn state_dir() -> PathBuf {
    home_dir().join(".tokscope")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn claude_home() -> PathBuf {
    match std::env::var("CLAUDE_CONFIG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => home_dir().join(".claude"),
    }
}

fn codex_home() -> PathBuf {
    match std::env::var("CODEX_HOME") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => home_dir().join(".codex"),
    }
}
