//! `~/.claude/history.jsonl`: one `{display, sessionId, ...}` per prompt typed.
//!
//! Only used to label sessions whose transcript has no surviving user prompt.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::json::find_str;
use crate::reader::for_each_record;

/// First displayed prompt per session id.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    labels: HashMap<String, String>,
}

impl HistoryIndex {
    /// Load the history file; a missing file gives an empty index.
    pub fn load(path: &Path) -> Self {
        let mut labels = HashMap::new();
        if path.exists() {
            for_each_record(path, |record| {
                if let (Some(session), Some(display)) = (
                    find_str(record, &[&["sessionId"]]),
                    record.get("display").and_then(Value::as_str),
                ) && !display.trim().is_empty()
                {
                    labels
                        .entry(session.to_string())
                        .or_insert_with(|| display.trim().to_string());
                }
            });
        }
        Self { labels }
    }

    pub fn label(&self, session_id: &str) -> Option<&str> {
        self.labels.get(session_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_display_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"display":"set up the repo","sessionId":"s1"}"#, "\n",
                "garbage\n",
                r#"{"display":"second thought","sessionId":"s1"}"#, "\n",
                r#"{"display":"   ","sessionId":"s2"}"#, "\n",
            ),
        )
        .unwrap();

        let index = HistoryIndex::load(&path);
        assert_eq!(index.label("s1"), Some("set up the repo"));
        assert_eq!(index.label("s2"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HistoryIndex::load(&dir.path().join("none.jsonl")).is_empty());
    }
}
