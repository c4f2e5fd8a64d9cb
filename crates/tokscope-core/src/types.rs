//! Shared type definitions used across tokscope crates.
//!
//! Every type here is rebuilt from scratch on each parse pass. Output types
//! serialize with camelCase keys because the dashboard reads the report as JSON.

use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Model labels that never get a per-model bucket.
const SENTINEL_MODELS: &[&str] = &["<synthetic>", "unknown"];

/// Returns true for placeholder model ids emitted by tools for synthetic turns.
pub fn is_sentinel_model(model: &str) -> bool {
    let model = model.trim();
    model.is_empty() || SENTINEL_MODELS.contains(&model)
}

/// The assistant CLI that produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    /// Anthropic Claude Code
    ClaudeCode,
    /// OpenAI Codex CLI
    Codex,
    /// Google Gemini CLI
    Gemini,
}

impl Tool {
    /// Stable label used in output and metric attributes.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Token counts for one or more model invocations.
///
/// Input is split into three disjoint buckets; input and total are derived so
/// `total == input + output` and `input == fresh + cache_write + cache_read`
/// always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    /// Input tokens processed without touching the prompt cache
    pub fresh_input: u64,
    /// Input tokens written into the prompt cache
    pub cache_write: u64,
    /// Input tokens served from the prompt cache
    pub cache_read: u64,
    /// Output tokens (including reasoning output where reported)
    pub output: u64,
}

impl TokenUsage {
    pub fn new(fresh_input: u64, cache_write: u64, cache_read: u64, output: u64) -> Self {
        Self {
            fresh_input,
            cache_write,
            cache_read,
            output,
        }
    }

    /// All input-side tokens.
    pub fn input_tokens(&self) -> u64 {
        self.fresh_input + self.cache_write + self.cache_read
    }

    pub fn output_tokens(&self) -> u64 {
        self.output
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens() + self.output
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            fresh_input: self.fresh_input + rhs.fresh_input,
            cache_write: self.cache_write + rhs.cache_write,
            cache_read: self.cache_read + rhs.cache_read,
            output: self.output + rhs.output,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a TokenUsage> for TokenUsage {
    fn sum<I: Iterator<Item = &'a TokenUsage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenUsageRepr {
    fresh_input_tokens: u64,
    cache_write_tokens: u64,
    cache_read_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
}

// Serialized with the derived totals so consumers never recompute them.
impl Serialize for TokenUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TokenUsageRepr {
            fresh_input_tokens: self.fresh_input,
            cache_write_tokens: self.cache_write,
            cache_read_tokens: self.cache_read,
            input_tokens: self.input_tokens(),
            output_tokens: self.output,
            total_tokens: self.total_tokens(),
        }
        .serialize(serializer)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// String argument lookup, e.g. `file_path`.
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// One normalized model-invocation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// User-authored text that triggered this turn, if it was the first usage
    /// record after that text
    pub user_prompt: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub model: String,
    pub usage: TokenUsage,
    pub tools: Vec<ToolCall>,
}

impl Query {
    pub fn new(model: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            user_prompt: None,
            timestamp: None,
            model: model.into(),
            usage,
            tools: Vec::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.user_prompt = Some(prompt.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolCall>) -> Self {
        self.tools = tools;
        self
    }

    pub fn input_tokens(&self) -> u64 {
        self.usage.input_tokens()
    }

    pub fn output_tokens(&self) -> u64 {
        self.usage.output_tokens()
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens()
    }
}

/// Raw output of reading one transcript file, before session building.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub tool: Tool,
    pub path: PathBuf,
    pub session_id: String,
    /// Project name derived from the filesystem layout
    pub project: String,
    pub queries: Vec<Query>,
    /// Working-directory paths seen inside the transcript, in file order
    pub cwd_markers: Vec<String>,
}

/// One transcript, aggregated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub tool: Tool,
    pub project: String,
    /// `YYYY-MM-DD` of the first timestamp, or `"unknown"`
    pub date: String,
    /// First user prompt, or the history-file label
    pub label: String,
    pub primary_model: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub query_count: usize,
    pub user_messages: usize,
    pub tool_calls: usize,
    pub cost: f64,
    pub cost_without_cache: f64,
    #[serde(skip)]
    pub queries: Vec<Query>,
}

impl Session {
    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens()
    }
}

/// Which cause a cost driver attributes spend to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    ContextDepth,
    ToolFanout,
    Rework,
    VaguePrompt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostDriver {
    pub kind: DriverKind,
    pub impact: f64,
}

/// Prompt-quality analysis attached to a prompt group.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptQuality {
    /// 0.0 (vague) to 1.0 (precise)
    pub specificity: f64,
    pub search_attempts: usize,
    pub rework_loops: usize,
    /// Ranked by descending impact
    pub drivers: Vec<CostDriver>,
    pub tip: Option<String>,
}

/// Merged accounting of consecutive turns answering one user message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptGroup {
    pub session_id: String,
    pub project: String,
    pub tool: Tool,
    /// Model of the first absorbed query
    pub model: String,
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub cost: f64,
    pub query_count: usize,
    /// Absorbed turns that carried no prompt of their own
    pub continuations: usize,
    /// Session input tokens consumed before this group started
    pub context_depth: u64,
    pub tool_counts: BTreeMap<String, usize>,
    pub file_writes: BTreeMap<String, usize>,
    pub quality: PromptQuality,
}

impl PromptGroup {
    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens()
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_counts.values().sum()
    }

    /// True when some file was written more than once within this group.
    pub fn has_rework(&self) -> bool {
        self.file_writes.values().any(|&count| count > 1)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    pub date: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub sessions: usize,
    pub queries: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBucket {
    pub model: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub sessions: usize,
    pub queries: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBucket {
    pub project: String,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub sessions: usize,
    pub queries: usize,
    pub cost: f64,
    pub models: Vec<ModelBucket>,
    pub top_prompts: Vec<PromptGroup>,
}

/// Grand totals across every session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub total_sessions: usize,
    pub total_queries: usize,
    pub avg_tokens_per_session: u64,
    pub total_cost: f64,
    pub cost_without_cache: f64,
    pub cache_savings: f64,
    pub cache_hit_rate: f64,
    pub cost_per_query: f64,
    pub output_ratio: f64,
}

impl Totals {
    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Info,
    Positive,
    Neutral,
}

/// A templated, data-driven observation about usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub action: Option<String>,
}

impl Insight {
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            title: title.into(),
            description: description.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// The aggregate result of one parse pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Descending total tokens
    pub sessions: Vec<Session>,
    /// Ascending date
    pub daily: Vec<DailyBucket>,
    pub models: Vec<ModelBucket>,
    pub projects: Vec<ProjectBucket>,
    /// Global most expensive prompts
    pub top_prompts: Vec<PromptGroup>,
    pub totals: Totals,
    pub insights: Vec<Insight>,
}
