//! Claude Code transcripts.
//!
//! Layout: `<projects_dir>/<encoded-cwd>/<session-id>.jsonl`, where the
//! directory name is the working directory with `/` replaced by `-`
//! (`-Users-alice-code-my-repo`). Each line is one record:
//!
//! ```json
//! {"type":"user","cwd":"/Users/alice/code/my-repo","message":{"role":"user","content":"fix the test"}}
//! {"type":"assistant","timestamp":"2026-03-02T10:15:00Z","message":{"id":"msg_01","model":"claude-sonnet-4-5-20250929",
//!  "content":[{"type":"tool_use","name":"Read","input":{"file_path":"src/lib.rs"}}],
//!  "usage":{"input_tokens":12,"cache_creation_input_tokens":800,"cache_read_input_tokens":14000,"output_tokens":90}}}
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokscope_core::{Query, TokenUsage, Tool, ToolCall, Transcript};
use tracing::debug;

use crate::json::{file_stem, find_str, parse_timestamp, u64_field};
use crate::reader::{LogReader, PromptTracker, for_each_record, list_dirs, list_files};

/// User text with these prefixes is generated by the CLI, not typed.
const META_PREFIXES: &[&str] = &[
    "<command-name>",
    "<command-message>",
    "<command-args>",
    "<local-command-stdout>",
    "<local-command-stderr>",
    "<system-reminder>",
    "Caveat:",
    "[Request interrupted",
];

/// Reader for `~/.claude/projects`.
#[derive(Debug, Clone)]
pub struct ClaudeReader {
    projects_dir: PathBuf,
}

impl ClaudeReader {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    /// Parse one session file. `None` when it holds no usage records.
    pub fn read_file(&self, path: &Path, project: &str) -> Option<Transcript> {
        let mut state = FileState::default();
        for_each_record(path, |record| state.visit(record))?;

        if state.queries.is_empty() {
            debug!(path = %path.display(), "no usage records");
            return None;
        }
        Some(Transcript {
            tool: Tool::ClaudeCode,
            path: path.to_path_buf(),
            session_id: file_stem(path),
            project: project.to_string(),
            queries: state.queries,
            cwd_markers: state.cwd_markers,
        })
    }
}

impl LogReader for ClaudeReader {
    fn tool(&self) -> Tool {
        Tool::ClaudeCode
    }

    fn read(&self) -> Vec<Transcript> {
        list_dirs(&self.projects_dir)
            .iter()
            .flat_map(|dir| {
                let project = project_from_dir(dir);
                list_files(dir, "jsonl")
                    .into_iter()
                    .filter_map(move |file| self.read_file(&file, &project))
            })
            .collect()
    }
}

/// `-Users-alice-code-tokscope` -> `tokscope`
fn project_from_dir(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.rsplit('-')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or(name)
}

#[derive(Default)]
struct FileState {
    tracker: PromptTracker,
    queries: Vec<Query>,
    cwd_markers: Vec<String>,
    /// `message.id` of the last emitted query, while it can still merge
    open_message: Option<String>,
}

impl FileState {
    fn visit(&mut self, record: &Value) {
        if let Some(cwd) = record.get("cwd").and_then(Value::as_str) {
            self.cwd_markers.push(cwd.to_string());
        }

        match record.get("type").and_then(Value::as_str) {
            Some("user") => self.visit_user(record),
            Some("assistant") => self.visit_assistant(record),
            _ => {}
        }
    }

    fn visit_user(&mut self, record: &Value) {
        if record.get("isMeta").and_then(Value::as_bool) == Some(true) {
            return;
        }
        let Some(text) = record.get("message").and_then(|m| user_text(m.get("content")?)) else {
            return;
        };
        if self.tracker.observe(&text, META_PREFIXES) {
            self.open_message = None;
        }
    }

    fn visit_assistant(&mut self, record: &Value) {
        let Some(message) = record.get("message") else {
            return;
        };
        let Some(usage) = message.get("usage") else {
            return;
        };
        let usage = TokenUsage::new(
            u64_field(usage, "input_tokens"),
            u64_field(usage, "cache_creation_input_tokens"),
            u64_field(usage, "cache_read_input_tokens"),
            u64_field(usage, "output_tokens"),
        );
        let tools = tool_uses(message);
        let message_id = find_str(message, &[&["id"]]).map(str::to_string);

        // Streamed messages repeat their usage on every content-block line
        if message_id.is_some()
            && message_id == self.open_message
            && let Some(last) = self.queries.last_mut()
        {
            last.usage = usage;
            last.tools.extend(tools);
            return;
        }

        let model = find_str(message, &[&["model"]]).unwrap_or("unknown");
        let mut query = Query::new(model, usage).with_tools(tools);
        if let Some(prompt) = self.tracker.take() {
            query = query.with_prompt(prompt);
        }
        if let Some(ts) = parse_timestamp(record) {
            query = query.with_timestamp(ts);
        }
        self.queries.push(query);
        self.open_message = message_id;
    }
}

/// User-typed text of a message: a plain string, or its `text` blocks.
fn user_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        _ => None,
    }
}

fn tool_uses(message: &Value) -> Vec<ToolCall> {
    message
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(|block| {
            let name = block.get("name")?.as_str()?;
            let input = block.get("input").cloned().unwrap_or(Value::Null);
            Some(ToolCall::new(name, input))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_session(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn test_project_from_dir() {
        assert_eq!(project_from_dir(Path::new("/x/-Users-alice-code-tokscope")), "tokscope");
        assert_eq!(project_from_dir(Path::new("/x/plain")), "plain");
        assert_eq!(project_from_dir(Path::new("/x/trailing-")), "trailing");
    }

    #[test]
    fn test_prompt_attaches_to_next_usage_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "s1.jsonl",
            &[
                r#"{"type":"user","cwd":"/work/api","message":{"content":"add retries"}}"#,
                r#"{"type":"assistant","message":{"id":"m1","model":"claude-sonnet-4-5","usage":{"input_tokens":10,"output_tokens":5}}}"#,
                r#"{"type":"assistant","message":{"id":"m2","model":"claude-sonnet-4-5","usage":{"input_tokens":20,"output_tokens":7}}}"#,
            ],
        );

        let transcript = ClaudeReader::new(dir.path()).read_file(&path, "api").unwrap();
        assert_eq!(transcript.session_id, "s1");
        assert_eq!(transcript.queries.len(), 2);
        assert_eq!(transcript.queries[0].user_prompt.as_deref(), Some("add retries"));
        assert_eq!(transcript.queries[1].user_prompt, None);
        assert_eq!(transcript.cwd_markers, vec!["/work/api".to_string()]);
    }

    #[test]
    fn test_streamed_blocks_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "s2.jsonl",
            &[
                r#"{"type":"user","message":{"content":[{"type":"text","text":"read it"}]}}"#,
                r#"{"type":"assistant","message":{"id":"m1","model":"claude-opus-4-5","content":[{"type":"tool_use","name":"Read","input":{"file_path":"a.rs"}}],"usage":{"input_tokens":3,"output_tokens":1}}}"#,
                r#"{"type":"assistant","message":{"id":"m1","model":"claude-opus-4-5","content":[{"type":"tool_use","name":"Grep","input":{"pattern":"x"}}],"usage":{"input_tokens":3,"output_tokens":40}}}"#,
            ],
        );

        let transcript = ClaudeReader::new(dir.path()).read_file(&path, "p").unwrap();
        assert_eq!(transcript.queries.len(), 1);
        let query = &transcript.queries[0];
        assert_eq!(query.usage.output, 40);
        let names: Vec<&str> = query.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Read", "Grep"]);
    }

    #[test]
    fn test_meta_and_tool_results_are_not_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "s3.jsonl",
            &[
                r#"{"type":"user","message":{"content":"<command-name>/clear</command-name>"}}"#,
                r#"{"type":"user","isMeta":true,"message":{"content":"expanded skill text"}}"#,
                r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"ok"}]}}"#,
                r#"{"type":"assistant","message":{"id":"m1","model":"claude-haiku-4-5","usage":{"input_tokens":1,"output_tokens":1}}}"#,
            ],
        );

        let transcript = ClaudeReader::new(dir.path()).read_file(&path, "p").unwrap();
        assert_eq!(transcript.queries[0].user_prompt, None);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "s4.jsonl",
            &[
                r#"{"type":"assistant","message":{"id":"m1","usage":{"input_tokens":1,"output_tokens":1}}}"#,
                r#"{"type":"assistant","message":{"#,
                r#"{"type":"assistant","message":{"id":"m2","usage":{"input_tokens":2,"output_tokens":2}}}"#,
            ],
        );

        let transcript = ClaudeReader::new(dir.path()).read_file(&path, "p").unwrap();
        assert_eq!(transcript.queries.len(), 2);
        assert_eq!(transcript.queries[0].model, "unknown");
    }

    #[test]
    fn test_file_without_usage_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "s5.jsonl",
            &[r#"{"type":"user","message":{"content":"hello?"}}"#],
        );
        assert!(ClaudeReader::new(dir.path()).read_file(&path, "p").is_none());
    }
}
