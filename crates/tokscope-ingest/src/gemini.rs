//! Gemini CLI chat files.
//!
//! Layout: `<tmp_dir>/<project-hash>/chats/session-*.json`. Unlike the other
//! tools a session is one JSON document:
//!
//! ```json
//! {"sessionId":"4c1e…","messages":[
//!   {"type":"user","timestamp":"2026-03-02T10:15:00Z","content":"why is CI red?"},
//!   {"type":"gemini","model":"gemini-2.5-pro","tokens":{"input":9000,"output":120,"cached":6000,"thoughts":300},
//!    "toolCalls":[{"name":"read_file","args":{"absolute_path":"/w/ci.yml"}}]}
//! ]}
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tokscope_core::{Query, TokenUsage, Tool, ToolCall, Transcript};
use tracing::warn;

use crate::json::file_stem;
use crate::reader::{LogReader, PromptTracker, list_dirs, list_files};

/// Characters of the project hash kept as the project label.
const PROJECT_HASH_LEN: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatFile {
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    #[serde(rename = "type", default)]
    kind: String,
    timestamp: Option<String>,
    #[serde(default)]
    content: Value,
    model: Option<String>,
    tokens: Option<ChatTokens>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatTokens {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    output: u64,
    #[serde(default)]
    cached: u64,
    #[serde(default)]
    thoughts: u64,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Value,
}

/// Reader for `~/.gemini/tmp`.
#[derive(Debug, Clone)]
pub struct GeminiReader {
    tmp_dir: PathBuf,
}

impl GeminiReader {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Parse one chat file. `None` when it is illegible or has no usage.
    pub fn read_file(&self, path: &Path, project: &str) -> Option<Transcript> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| warn!(path = %path.display(), error = %e, "cannot read chat file"))
            .ok()?;
        let chat: ChatFile = serde_json::from_str(&content)
            .map_err(|e| warn!(path = %path.display(), error = %e, "skipping illegible chat file"))
            .ok()?;

        let mut tracker = PromptTracker::new();
        let mut queries = Vec::new();
        for message in chat.messages {
            match message.kind.as_str() {
                "user" => {
                    if let Some(text) = content_text(&message.content) {
                        tracker.observe(&text, &[]);
                    }
                }
                "gemini" => {
                    if let Some(query) = to_query(message, &mut tracker) {
                        queries.push(query);
                    }
                }
                _ => {}
            }
        }

        if queries.is_empty() {
            return None;
        }
        Some(Transcript {
            tool: Tool::Gemini,
            path: path.to_path_buf(),
            session_id: chat.session_id.unwrap_or_else(|| file_stem(path)),
            project: project.to_string(),
            queries,
            cwd_markers: Vec::new(),
        })
    }
}

impl LogReader for GeminiReader {
    fn tool(&self) -> Tool {
        Tool::Gemini
    }

    fn read(&self) -> Vec<Transcript> {
        list_dirs(&self.tmp_dir)
            .iter()
            .flat_map(|dir| {
                let project: String = dir_name(dir).chars().take(PROJECT_HASH_LEN).collect();
                list_files(&dir.join("chats"), "json")
                    .into_iter()
                    .filter_map(move |file| self.read_file(&file, &project))
            })
            .collect()
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn to_query(message: ChatMessage, tracker: &mut PromptTracker) -> Option<Query> {
    let tokens = message.tokens?;
    let cached = tokens.cached.min(tokens.input);
    let usage = TokenUsage::new(
        tokens.input - cached,
        0,
        cached,
        tokens.output + tokens.thoughts,
    );
    let tools = message
        .tool_calls
        .into_iter()
        .filter(|call| !call.name.is_empty())
        .map(|call| ToolCall::new(call.name, call.args))
        .collect();

    let mut query = Query::new(message.model.unwrap_or_else(|| "unknown".into()), usage)
        .with_tools(tools);
    if let Some(prompt) = tracker.take() {
        query = query.with_prompt(prompt);
    }
    if let Some(ts) = message
        .timestamp
        .as_deref()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
    {
        query = query.with_timestamp(ts.with_timezone(&chrono::Utc));
    }
    Some(query)
}

/// `content` is a string, or a list of `{text}` parts.
fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        _ => None,
    }
}
