//! Codex CLI rollout files.
//!
//! Layout: `<sessions_dir>/YYYY/MM/DD/rollout-<ts>-<uuid>.jsonl`. Records
//! are `{timestamp, type, payload}` envelopes:
//!
//! - `session_meta`: session `id` and `cwd`
//! - `turn_context`: `cwd` and the active `model`
//! - `event_msg` / `user_message`: what the user typed
//! - `response_item` / `function_call` or `custom_tool_call`: tool use
//! - `event_msg` / `token_count`: usage of the last model call
//!
//! Codex reports cached tokens as a subset of `input_tokens`.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokscope_core::{Query, TokenUsage, Tool, ToolCall, Transcript};
use tracing::debug;
use walkdir::WalkDir;

use crate::json::{file_stem, find_str, parse_timestamp, u64_field};
use crate::reader::{LogReader, PromptTracker, for_each_record};

const META_PREFIXES: &[&str] = &["<environment_context>", "<user_instructions>", "<turn_aborted>"];

/// Project label when a rollout never names its working directory.
const FALLBACK_PROJECT: &str = "codex";

/// Reader for `$CODEX_HOME/sessions`.
#[derive(Debug, Clone)]
pub struct CodexReader {
    sessions_dir: PathBuf,
}

impl CodexReader {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    /// All rollout files under the sessions directory, sorted.
    fn rollout_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.sessions_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort();
        files
    }

    /// Parse one rollout file. `None` when it holds no usage records.
    pub fn read_file(&self, path: &Path) -> Option<Transcript> {
        let mut state = FileState::default();
        for_each_record(path, |record| state.visit(record))?;

        if state.queries.is_empty() {
            debug!(path = %path.display(), "no token counts");
            return None;
        }
        let project = state
            .cwd_markers
            .first()
            .and_then(|cwd| basename(cwd))
            .unwrap_or_else(|| FALLBACK_PROJECT.to_string());

        Some(Transcript {
            tool: Tool::Codex,
            path: path.to_path_buf(),
            session_id: state.session_id.unwrap_or_else(|| file_stem(path)),
            project,
            queries: state.queries,
            cwd_markers: state.cwd_markers,
        })
    }
}

impl LogReader for CodexReader {
    fn tool(&self) -> Tool {
        Tool::Codex
    }

    fn read(&self) -> Vec<Transcript> {
        self.rollout_files()
            .iter()
            .filter_map(|path| self.read_file(path))
            .collect()
    }
}

fn basename(path: &str) -> Option<String> {
    Path::new(path.trim_end_matches(['/', '\\']))
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[derive(Default)]
struct FileState {
    tracker: PromptTracker,
    queries: Vec<Query>,
    cwd_markers: Vec<String>,
    session_id: Option<String>,
    model: Option<String>,
    pending_tools: Vec<ToolCall>,
    last_total: Option<u64>,
}

impl FileState {
    fn visit(&mut self, record: &Value) {
        let Some(payload) = record.get("payload") else {
            return;
        };
        match record.get("type").and_then(Value::as_str) {
            Some("session_meta") => {
                if self.session_id.is_none() {
                    self.session_id = find_str(payload, &[&["id"]]).map(str::to_string);
                }
                self.visit_context(payload);
            }
            Some("turn_context") => self.visit_context(payload),
            Some("response_item") => self.visit_response_item(payload),
            Some("event_msg") => match payload.get("type").and_then(Value::as_str) {
                Some("user_message") => {
                    if let Some(message) = find_str(payload, &[&["message"]]) {
                        self.tracker.observe(message, META_PREFIXES);
                    }
                }
                Some("token_count") => self.visit_token_count(record, payload),
                _ => {}
            },
            _ => {}
        }
    }

    fn visit_context(&mut self, payload: &Value) {
        if let Some(cwd) = find_str(payload, &[&["cwd"]]) {
            self.cwd_markers.push(cwd.to_string());
        }
        if let Some(model) = find_str(payload, &[&["model"]]) {
            self.model = Some(model.to_string());
        }
    }

    fn visit_response_item(&mut self, payload: &Value) {
        let kind = payload.get("type").and_then(Value::as_str);
        if !matches!(kind, Some("function_call" | "custom_tool_call")) {
            return;
        }
        let Some(name) = find_str(payload, &[&["name"]]) else {
            return;
        };
        let arguments = payload
            .get("arguments")
            .or_else(|| payload.get("input"))
            .map(decode_arguments)
            .unwrap_or(Value::Null);
        self.pending_tools.push(ToolCall::new(name, arguments));
    }

    fn visit_token_count(&mut self, record: &Value, payload: &Value) {
        let Some(info) = payload.get("info").filter(|info| !info.is_null()) else {
            return;
        };
        let Some(last) = info.get("last_token_usage").filter(|last| !last.is_null()) else {
            return;
        };

        // Codex re-emits the same cumulative count on rate-limit updates
        let total = info
            .get("total_token_usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64);
        if total.is_some() && total == self.last_total {
            return;
        }
        self.last_total = total;

        let input = u64_field(last, "input_tokens");
        let cached = u64_field(last, "cached_input_tokens").min(input);
        let usage = TokenUsage::new(input - cached, 0, cached, u64_field(last, "output_tokens"));

        let model = self.model.as_deref().unwrap_or("unknown");
        let mut query =
            Query::new(model, usage).with_tools(std::mem::take(&mut self.pending_tools));
        if let Some(prompt) = self.tracker.take() {
            query = query.with_prompt(prompt);
        }
        if let Some(ts) = parse_timestamp(record) {
            query = query.with_timestamp(ts);
        }
        self.queries.push(query);
    }
}

/// `arguments` is usually a JSON document inside a string.
fn decode_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| raw.clone()),
        other => other.clone(),
    }
}
