//! Metrics export contract.
//!
//! [`MetricsSnapshot::from_report`] turns a report into the twelve
//! `tokscope.*` instruments as plain data. The sink that ships them is
//! outside this crate; [`probe_endpoint`] only checks that a collector is
//! reachable and says precisely why when it is not.

use std::collections::BTreeMap;
use std::error::Error as _;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use thiserror::Error;
use tokscope_core::{Report, is_sentinel_model};
use tracing::debug;

pub const TOKENS_INPUT: &str = "tokscope.tokens.input";
pub const TOKENS_OUTPUT: &str = "tokscope.tokens.output";
pub const QUERIES: &str = "tokscope.queries";
pub const SESSIONS: &str = "tokscope.sessions";
pub const SESSION_TOKENS: &str = "tokscope.session.tokens";
pub const SESSION_QUERIES: &str = "tokscope.session.queries";
pub const DAILY_TOKENS_INPUT: &str = "tokscope.daily.tokens.input";
pub const DAILY_TOKENS_OUTPUT: &str = "tokscope.daily.tokens.output";
pub const DAILY_SESSIONS: &str = "tokscope.daily.sessions";
pub const MODEL_TOKENS_INPUT: &str = "tokscope.model.tokens.input";
pub const MODEL_TOKENS_OUTPUT: &str = "tokscope.model.tokens.output";
pub const MODEL_QUERIES: &str = "tokscope.model.queries";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Counter,
    Histogram,
    Gauge,
}

/// One recorded value and the attributes it is keyed by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub attributes: BTreeMap<&'static str, String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub name: &'static str,
    pub kind: InstrumentKind,
    pub unit: &'static str,
    pub points: Vec<DataPoint>,
}

impl Instrument {
    fn new(name: &'static str, kind: InstrumentKind, unit: &'static str) -> Self {
        Self {
            name,
            kind,
            unit,
            points: Vec::new(),
        }
    }

    /// Sum of all points; for histograms, the sum of observations.
    pub fn total(&self) -> u64 {
        self.points.iter().map(|p| p.value).sum()
    }
}

/// All instruments for one export cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub instruments: Vec<Instrument>,
}

type UsageKey = (String, String, String);

impl MetricsSnapshot {
    pub fn from_report(report: &Report) -> Self {
        // (model, project, date) -> (input, output, queries)
        let mut per_query: BTreeMap<UsageKey, (u64, u64, u64)> = BTreeMap::new();
        let mut per_project: BTreeMap<&str, u64> = BTreeMap::new();
        let mut session_tokens =
            Instrument::new(SESSION_TOKENS, InstrumentKind::Histogram, "{token}");
        let mut session_queries =
            Instrument::new(SESSION_QUERIES, InstrumentKind::Histogram, "{query}");

        for session in &report.sessions {
            *per_project.entry(&session.project).or_default() += 1;
            let attributes =
                usage_attributes(&session.primary_model, &session.project, &session.date);
            session_tokens.points.push(DataPoint {
                attributes: attributes.clone(),
                value: session.total_tokens(),
            });
            session_queries.points.push(DataPoint {
                attributes,
                value: session.query_count as u64,
            });

            for query in session.queries.iter().filter(|q| !is_sentinel_model(&q.model)) {
                let key = (query.model.clone(), session.project.clone(), session.date.clone());
                let entry = per_query.entry(key).or_default();
                entry.0 += query.usage.input_tokens();
                entry.1 += query.usage.output_tokens();
                entry.2 += 1;
            }
        }

        let mut tokens_input = Instrument::new(TOKENS_INPUT, InstrumentKind::Counter, "{token}");
        let mut tokens_output = Instrument::new(TOKENS_OUTPUT, InstrumentKind::Counter, "{token}");
        let mut queries = Instrument::new(QUERIES, InstrumentKind::Counter, "{query}");
        for ((model, project, date), (input, output, count)) in per_query {
            let attributes = usage_attributes(&model, &project, &date);
            tokens_input.points.push(point(attributes.clone(), input));
            tokens_output.points.push(point(attributes.clone(), output));
            queries.points.push(point(attributes, count));
        }

        let mut sessions = Instrument::new(SESSIONS, InstrumentKind::Counter, "{session}");
        for (project, count) in per_project {
            sessions
                .points
                .push(point(BTreeMap::from([("project", project.to_string())]), count));
        }

        let mut daily_input = Instrument::new(DAILY_TOKENS_INPUT, InstrumentKind::Gauge, "{token}");
        let mut daily_output =
            Instrument::new(DAILY_TOKENS_OUTPUT, InstrumentKind::Gauge, "{token}");
        let mut daily_sessions =
            Instrument::new(DAILY_SESSIONS, InstrumentKind::Gauge, "{session}");
        for day in &report.daily {
            let attributes = BTreeMap::from([("date", day.date.clone())]);
            daily_input.points.push(point(attributes.clone(), day.usage.input_tokens()));
            daily_output.points.push(point(attributes.clone(), day.usage.output_tokens()));
            daily_sessions.points.push(point(attributes, day.sessions as u64));
        }

        let mut model_input = Instrument::new(MODEL_TOKENS_INPUT, InstrumentKind::Gauge, "{token}");
        let mut model_output =
            Instrument::new(MODEL_TOKENS_OUTPUT, InstrumentKind::Gauge, "{token}");
        let mut model_queries = Instrument::new(MODEL_QUERIES, InstrumentKind::Gauge, "{query}");
        for model in &report.models {
            let attributes = BTreeMap::from([("model", model.model.clone())]);
            model_input.points.push(point(attributes.clone(), model.usage.input_tokens()));
            model_output.points.push(point(attributes.clone(), model.usage.output_tokens()));
            model_queries.points.push(point(attributes, model.queries as u64));
        }

        Self {
            instruments: vec![
                tokens_input,
                tokens_output,
                queries,
                sessions,
                session_tokens,
                session_queries,
                daily_input,
                daily_output,
                daily_sessions,
                model_input,
                model_output,
                model_queries,
            ],
        }
    }

    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.name == name)
    }

    pub fn point_count(&self) -> usize {
        self.instruments.iter().map(|i| i.points.len()).sum()
    }
}

fn usage_attributes(model: &str, project: &str, date: &str) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("model", model.to_string()),
        ("project", project.to_string()),
        ("date", date.to_string()),
    ])
}

fn point(attributes: BTreeMap<&'static str, String>, value: u64) -> DataPoint {
    DataPoint { attributes, value }
}

/// Why a telemetry endpoint could not be reached.
#[derive(Debug, Error, PartialEq)]
pub enum ExportError {
    #[error("connection refused by {0}; is the collector running?")]
    ConnectionRefused(String),

    #[error("could not resolve host for {0}")]
    Dns(String),

    #[error("no response from {endpoint} within {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    #[error("collector answered HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("export failed: {0}")]
    Other(String),
}

impl ExportError {
    /// Suggested fix shown next to the diagnosis.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::ConnectionRefused(_) => "Start the collector or fix the port in --otel-endpoint.",
            Self::Dns(_) => "Check the host name in --otel-endpoint.",
            Self::Timeout { .. } => "Check that the endpoint is reachable from this machine.",
            Self::HttpStatus { status: 401 | 403 } => "Check the credentials in --otel-headers.",
            Self::HttpStatus { status: 404 } => "The endpoint should be the collector base URL.",
            Self::HttpStatus { .. } | Self::Other(_) => "Check the collector logs.",
        }
    }

    fn from_reqwest(err: &reqwest::Error, endpoint: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                endpoint: endpoint.to_string(),
                secs: timeout.as_secs(),
            };
        }

        let mut messages = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>()
                && io.kind() == std::io::ErrorKind::ConnectionRefused
            {
                return Self::ConnectionRefused(endpoint.to_string());
            }
            messages.push(cause.to_string());
            source = cause.source();
        }
        classify_message(&messages.join(": "), endpoint)
    }
}

/// Diagnosis from the text of an error chain.
pub fn classify_message(message: &str, endpoint: &str) -> ExportError {
    let lower = message.to_lowercase();
    if lower.contains("connection refused") {
        ExportError::ConnectionRefused(endpoint.to_string())
    } else if lower.contains("dns error")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
        || lower.contains("no such host")
    {
        ExportError::Dns(endpoint.to_string())
    } else if lower.contains("timed out") {
        ExportError::Timeout {
            endpoint: endpoint.to_string(),
            secs: 0,
        }
    } else {
        ExportError::Other(message.to_string())
    }
}

/// POST an empty OTLP/HTTP metrics payload to `{endpoint}/v1/metrics`.
pub async fn probe_endpoint(
    endpoint: &str,
    headers: &[(String, String)],
    timeout: Duration,
) -> Result<(), ExportError> {
    let url = format!("{}/v1/metrics", endpoint.trim_end_matches('/'));

    let mut header_map = HeaderMap::new();
    header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ExportError::Other(format!("invalid header name {key:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ExportError::Other(format!("invalid value for header {key:?}: {e}")))?;
        header_map.insert(name, value);
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ExportError::Other(e.to_string()))?;

    debug!(url = %url, "probing telemetry endpoint");
    let response = client
        .post(&url)
        .headers(header_map)
        .body(r#"{"resourceMetrics":[]}"#)
        .send()
        .await
        .map_err(|e| ExportError::from_reqwest(&e, endpoint, timeout))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ExportError::HttpStatus {
            status: status.as_u16(),
        })
    }
}
