//! tokscope - token spend analytics for AI coding-assistant transcripts
//!
//! Reads Claude Code, Codex and Gemini CLI transcripts from their home
//! directories and reports tokens, cost, cache savings and insights.
//!
//! ## Usage
//!
//! ```bash
//! # Print grand totals and exit
//! tokscope --summary
//!
//! # Print the full report as JSON
//! tokscope --json
//!
//! # Rebuild the report every refresh interval, exporting metrics
//! tokscope --otel-endpoint http://localhost:4318 --otel-headers "Authorization=Basic dXNlcjpwYXNz"
//!
//! # With verbose logging
//! tokscope -v
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokscope_analysis::{MetricsSnapshot, build_report, insights::thousands, probe_endpoint};
use tokscope_config::{Config, Overrides};
use tokscope_core::{LogGuard, Report, init_logging};
use tokscope_cost::{PricingResolver, RefreshSettings, load_overrides, spawn_refresh};
use tokscope_ingest::{ClaudeReader, CodexReader, GeminiReader, HistoryIndex, LogReader, read_all};
use tracing::{debug, error, info, warn};

/// Token spend analytics for AI coding-assistant transcripts
#[derive(Parser, Debug)]
#[command(name = "tokscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port for the dashboard server
    #[arg(long)]
    port: Option<u16>,

    /// Do not open a browser on start
    #[arg(long)]
    no_open: bool,

    /// Print grand totals and exit
    #[arg(long, conflicts_with = "json")]
    summary: bool,

    /// Print the full report as JSON and exit
    #[arg(long)]
    json: bool,

    /// OTLP/HTTP collector base URL
    #[arg(long)]
    otel_endpoint: Option<String>,

    /// Collector headers, `Key: Value` or `Key=Value`, comma-separated
    #[arg(long)]
    otel_headers: Option<String>,

    /// Config file (defaults to ~/.tokscope/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.tokscope/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            no_open: self.no_open,
            otel_endpoint: self.otel_endpoint.clone(),
            otel_headers: self.otel_headers.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "tokscope failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn setup_logging(cli: &Cli) -> tokscope_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    config.apply_overrides(&cli.overrides());

    let refresh = refresh_settings(&config).map(spawn_refresh);

    if cli.summary || cli.json {
        // One-shot modes never wait on the network
        if let Some(handle) = refresh {
            handle.abort();
        }
        let report = scan(&config).await;
        if cli.json {
            let out = serde_json::to_string_pretty(&report).context("serializing report")?;
            println!("{out}");
        } else {
            print_summary(&report);
        }
        return Ok(());
    }

    watch(&config, refresh, tokio::signal::ctrl_c()).await
}

fn refresh_settings(config: &Config) -> Option<RefreshSettings> {
    let pricing = &config.pricing;
    pricing.refresh_enabled.then(|| RefreshSettings {
        url: pricing.remote_url.clone(),
        cache_file: pricing.cache_file.clone(),
        ttl_days: pricing.cache_ttl_days,
        timeout: Duration::from_secs(pricing.timeout_secs),
    })
}

/// How often the watch loop re-checks the pricing cache: four times per TTL.
fn pricing_check_period(ttl_days: u32) -> Duration {
    Duration::from_secs(u64::from(ttl_days.max(1)) * 86_400 / 4)
}

/// One full parse pass over every enabled source.
async fn scan(config: &Config) -> Report {
    let sources = &config.sources;
    let mut readers: Vec<Box<dyn LogReader>> = Vec::new();
    if sources.claude_enabled {
        readers.push(Box::new(ClaudeReader::new(&sources.claude_projects_dir)));
    }
    if sources.codex_enabled {
        readers.push(Box::new(CodexReader::new(&sources.codex_sessions_dir)));
    }
    if sources.gemini_enabled {
        readers.push(Box::new(GeminiReader::new(&sources.gemini_tmp_dir)));
    }

    let transcripts = read_all(readers).await;
    let history = if sources.claude_enabled {
        HistoryIndex::load(&sources.claude_history_file)
    } else {
        HistoryIndex::default()
    };
    let resolver = PricingResolver::with_overrides(load_overrides(&config.pricing.cache_file));
    debug!(transcripts = transcripts.len(), history = history.len(), "sources read");

    build_report(transcripts, &resolver, |id| history.label(id).map(str::to_string))
}

/// Rebuild the report every refresh interval until `shutdown` resolves.
///
/// `refresh` is the pricing refresh already started at launch, if any.
async fn watch(
    config: &Config,
    mut refresh: Option<JoinHandle<()>>,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> anyhow::Result<()> {
    let headers: Vec<(String, String)> = config
        .telemetry
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let endpoint = config.telemetry.endpoint.as_deref();
    let settings = refresh_settings(config);

    tokio::pin!(shutdown);

    if let Some(endpoint) = endpoint {
        tokio::select! {
            result = probe_endpoint(endpoint, &headers, Duration::from_secs(5)) => match result {
                Ok(()) => info!(endpoint, "telemetry endpoint reachable"),
                Err(e) => warn!(
                    endpoint,
                    error = %e,
                    guidance = e.guidance(),
                    "telemetry endpoint check failed"
                ),
            },
            signal = &mut shutdown => return stop(signal),
        }
    }

    info!(
        port = config.serve.port,
        open_browser = config.serve.open_browser,
        interval_secs = config.refresh_interval_secs,
        "watching transcripts"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    let period = pricing_check_period(config.pricing.cache_ttl_days);
    let mut pricing_check = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = tokio::select! {
                    report = scan(config) => report,
                    signal = &mut shutdown => return stop(signal),
                };
                log_cycle(&report, endpoint.is_some());
            }
            _ = pricing_check.tick(), if settings.is_some() => {
                if refresh.as_ref().is_some_and(|handle| !handle.is_finished()) {
                    debug!("pricing refresh still running");
                } else if let Some(settings) = &settings {
                    refresh = Some(spawn_refresh(settings.clone()));
                }
            }
            signal = &mut shutdown => return stop(signal),
        }
    }
}

fn log_cycle(report: &Report, export: bool) {
    let totals = &report.totals;
    info!(
        sessions = totals.total_sessions,
        tokens = totals.total_tokens(),
        cost = totals.total_cost,
        cache_savings = totals.cache_savings,
        "report refreshed"
    );
    if export {
        let snapshot = MetricsSnapshot::from_report(report);
        debug!(
            instruments = snapshot.instruments.len(),
            points = snapshot.point_count(),
            "metrics snapshot built"
        );
    }
}

fn stop(signal: std::io::Result<()>) -> anyhow::Result<()> {
    signal.context("waiting for ctrl-c")?;
    info!("shutting down");
    Ok(())
}

fn print_summary(report: &Report) {
    let totals = &report.totals;
    println!("Sessions:        {}", thousands(totals.total_sessions as u64));
    println!("Queries:         {}", thousands(totals.total_queries as u64));
    println!("Total tokens:    {}", thousands(totals.total_tokens()));
    println!("  Input:         {}", thousands(totals.usage.input_tokens()));
    println!("  Output:        {}", thousands(totals.usage.output_tokens()));
    println!("  Cache read:    {}", thousands(totals.usage.cache_read));
    println!("  Cache write:   {}", thousands(totals.usage.cache_write));
    println!("Avg per session: {}", thousands(totals.avg_tokens_per_session));
    println!("Cost:            ${:.2}", totals.total_cost);
    println!("Without cache:   ${:.2}", totals.cost_without_cache);
    println!("Cache savings:   ${:.2}", totals.cache_savings);
    println!("Cache hit rate:  {:.1}%", totals.cache_hit_rate * 100.0);

    if !report.insights.is_empty() {
        println!();
        for insight in &report.insights {
            println!("[{:?}] {}: {}", insight.severity, insight.title, insight.description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.sources.claude_projects_dir = root.join("projects");
        config.sources.claude_history_file = root.join("history.jsonl");
        config.sources.codex_sessions_dir = root.join("sessions");
        config.sources.gemini_tmp_dir = root.join("tmp");
        config.pricing.refresh_enabled = false;
        config.pricing.cache_file = root.join("pricing.json");
        config.telemetry.endpoint = None;
        config
    }

    #[test]
    fn test_pricing_check_period_scales_with_ttl() {
        assert_eq!(pricing_check_period(1), Duration::from_secs(6 * 3600));
        assert_eq!(pricing_check_period(4), Duration::from_secs(86_400));
        assert_eq!(pricing_check_period(0), pricing_check_period(1));
    }

    #[test]
    fn test_refresh_settings_follow_config() {
        let root = tempfile::tempdir().unwrap();
        let mut config = quiet_config(root.path());
        assert!(refresh_settings(&config).is_none());

        config.pricing.refresh_enabled = true;
        config.pricing.timeout_secs = 7;
        let settings = refresh_settings(&config).unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(7));
        assert_eq!(settings.cache_file, root.path().join("pricing.json"));
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let config = quiet_config(root.path());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            watch(&config, None, async { Ok(()) }),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_watch_stops_between_cycles() {
        let root = tempfile::tempdir().unwrap();
        let mut config = quiet_config(root.path());
        config.refresh_interval_secs = 3600;

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        };
        let result =
            tokio::time::timeout(Duration::from_secs(5), watch(&config, None, shutdown)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_watch_reports_signal_errors() {
        let root = tempfile::tempdir().unwrap();
        let config = quiet_config(root.path());

        let shutdown = async { Err(std::io::Error::other("no signal handler")) };
        let result = watch(&config, None, shutdown).await;
        assert!(result.is_err());
    }
}
