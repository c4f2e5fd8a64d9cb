//! # tokscope-ingest
//!
//! Readers that turn AI coding-assistant transcripts into normalized
//! [`Transcript`](tokscope_core::Transcript) records.
//!
//! This crate provides:
//! - [`ClaudeReader`] - `~/.claude/projects/<project>/<session>.jsonl`
//! - [`CodexReader`] - `~/.codex/sessions/**/rollout-*.jsonl`
//! - [`GeminiReader`] - `~/.gemini/tmp/<hash>/chats/*.json`
//! - [`HistoryIndex`] - Fallback session labels from `~/.claude/history.jsonl`
//! - [`read_all`] - Run every reader concurrently and concatenate the results
//!
//! Readers never fail as a whole. A missing directory yields no transcripts
//! and an unparseable line or file is skipped.
//!
//! ## Example
//!
//! ```no_run
//! use tokscope_ingest::{ClaudeReader, CodexReader, LogReader, read_all};
//!
//! # async fn run() {
//! let readers: Vec<Box<dyn LogReader>> = vec![
//!     Box::new(ClaudeReader::new("/home/me/.claude/projects")),
//!     Box::new(CodexReader::new("/home/me/.codex/sessions")),
//! ];
//! let transcripts = read_all(readers).await;
//! println!("{} transcripts", transcripts.len());
//! # }
//! ```

pub mod claude;
pub mod codex;
pub mod gemini;
pub mod history;
mod json;
pub mod reader;

pub use claude::ClaudeReader;
pub use codex::CodexReader;
pub use gemini::GeminiReader;
pub use history::HistoryIndex;
pub use reader::{LogReader, PromptTracker, read_all};
