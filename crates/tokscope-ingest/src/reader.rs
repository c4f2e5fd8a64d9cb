//! The reader seam and the concurrent fan-out over all readers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use futures_util::future::join_all;
use serde_json::Value;
use tokscope_core::{Tool, Transcript};
use tracing::{debug, info, trace, warn};

use crate::json::is_meta;

/// One tool's transcript source.
pub trait LogReader: Send + Sync + 'static {
    fn tool(&self) -> Tool;

    /// Read every transcript of this source, in sorted path order.
    ///
    /// A missing or unreadable source returns an empty list.
    fn read(&self) -> Vec<Transcript>;
}

/// Remembers the latest user-authored text until a usage record claims it.
#[derive(Debug, Default)]
pub struct PromptTracker {
    pending: Option<String>,
}

impl PromptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record user text unless it is blank or a meta envelope.
    ///
    /// Returns true when the text became the pending prompt.
    pub fn observe(&mut self, text: &str, meta_prefixes: &[&str]) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() || is_meta(trimmed, meta_prefixes) {
            return false;
        }
        self.pending = Some(trimmed.to_string());
        true
    }

    /// Hand the pending prompt to the next query and clear it.
    pub fn take(&mut self) -> Option<String> {
        self.pending.take()
    }
}

/// Run every reader on the blocking pool and concatenate in reader order.
///
/// A reader whose task panics contributes nothing.
pub async fn read_all(readers: Vec<Box<dyn LogReader>>) -> Vec<Transcript> {
    let tools: Vec<Tool> = readers.iter().map(|reader| reader.tool()).collect();
    let tasks = readers
        .into_iter()
        .map(|reader| tokio::task::spawn_blocking(move || reader.read()));

    let mut transcripts = Vec::new();
    for (tool, result) in tools.into_iter().zip(join_all(tasks).await) {
        match result {
            Ok(batch) => {
                info!(tool = %tool, count = batch.len(), "read transcripts");
                transcripts.extend(batch);
            }
            Err(e) => warn!(tool = %tool, error = %e, "reader task failed"),
        }
    }
    transcripts
}

/// Stream a JSONL file, handing each parseable object to `visit`.
///
/// Unparseable lines are skipped. Returns `None` if the file cannot be opened.
pub(crate) fn for_each_record(path: &Path, mut visit: impl FnMut(&Value)) -> Option<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open transcript");
            return None;
        }
    };

    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(record) => visit(&record),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        trace!(path = %path.display(), skipped, "skipped malformed lines");
    }
    Some(())
}

/// Sorted files with `extension` directly inside `dir`.
pub(crate) fn list_files(dir: &Path, extension: &str) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = list_entries(dir)
        .into_iter()
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    files
}

/// Sorted sub-directories of `dir`.
pub(crate) fn list_dirs(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut dirs: Vec<_> = list_entries(dir)
        .into_iter()
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn list_entries(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect(),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "source directory unavailable");
            Vec::new()
        }
    }
}
