//! Builds sessions from transcripts.

use std::collections::HashMap;
use std::path::Path;

use tokscope_core::{PromptGroup, Session, Transcript, is_sentinel_model};
use tokscope_cost::{CostSummary, PricingResolver};
use tracing::debug;

use crate::grouper::group_prompts;

/// Date of a session without any timestamp.
pub const UNKNOWN_DATE: &str = "unknown";

/// Model label of a session whose turns all carry sentinel models.
const UNKNOWN_MODEL: &str = "unknown";

/// Longest label kept from a prompt, in characters.
const LABEL_CHARS: usize = 100;

/// Turns transcripts into priced sessions and their prompt groups.
pub struct SessionBuilder<'a> {
    resolver: &'a PricingResolver,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(resolver: &'a PricingResolver) -> Self {
        Self { resolver }
    }

    /// Build one session. `fallback_label` is used when no query has a prompt.
    pub fn build(
        &self,
        transcript: Transcript,
        fallback_label: Option<String>,
    ) -> (Session, Vec<PromptGroup>) {
        let project = correct_project(&transcript);
        if project != transcript.project {
            debug!(
                session = %transcript.session_id,
                from = %transcript.project,
                to = %project,
                "corrected project from working directory"
            );
        }

        let usage = transcript.queries.iter().map(|q| q.usage).sum();
        let costs: CostSummary = transcript
            .queries
            .iter()
            .map(|q| self.resolver.price(&q.model, &q.usage))
            .sum();
        let date = transcript
            .queries
            .iter()
            .find_map(|q| q.timestamp)
            .map(|ts| ts.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string());
        let primary_model = plurality(
            transcript
                .queries
                .iter()
                .map(|q| q.model.as_str())
                .filter(|model| !is_sentinel_model(model)),
        )
        .unwrap_or(UNKNOWN_MODEL)
        .to_string();
        let label = transcript
            .queries
            .iter()
            .find_map(|q| q.user_prompt.as_deref())
            .map(short_label)
            .or(fallback_label)
            .unwrap_or_else(|| transcript.session_id.clone());
        let tool_calls = transcript.queries.iter().map(|q| q.tools.len()).sum();

        let mut session = Session {
            id: transcript.session_id,
            tool: transcript.tool,
            project,
            date,
            label,
            primary_model,
            usage,
            query_count: transcript.queries.len(),
            user_messages: 0,
            tool_calls,
            cost: costs.cost,
            cost_without_cache: costs.without_cache,
            queries: transcript.queries,
        };

        let groups = group_prompts(&session, self.resolver);
        session.user_messages = groups.iter().filter(|g| g.prompt.is_some()).count();
        (session, groups)
    }
}

/// Project name after the working-directory majority vote.
///
/// When the most frequent marker's directory name differs from the
/// filesystem-derived project, the directory name wins.
pub fn correct_project(transcript: &Transcript) -> String {
    plurality(transcript.cwd_markers.iter().map(String::as_str))
        .and_then(|cwd| {
            Path::new(cwd.trim_end_matches(['/', '\\']))
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| transcript.project.clone())
}

/// Most frequent value; on a tie, the first value to reach the top count.
fn plurality<'v>(values: impl Iterator<Item = &'v str>) -> Option<&'v str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut best: Option<(&str, usize)> = None;
    for value in values {
        let count = counts.entry(value).or_default();
        *count += 1;
        if best.is_none_or(|(_, top)| *count > top) {
            best = Some((value, *count));
        }
    }
    best.map(|(value, _)| value)
}

fn short_label(prompt: &str) -> String {
    let line = prompt.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= LABEL_CHARS {
        return line.to_string();
    }
    let mut label: String = line.chars().take(LABEL_CHARS).collect();
    label.push_str("...");
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tokscope_core::{Query, TokenUsage, Tool};

    fn transcript(queries: Vec<Query>, markers: &[&str]) -> Transcript {
        Transcript {
            tool: Tool::ClaudeCode,
            path: "/x/s1.jsonl".into(),
            session_id: "s1".into(),
            project: "repo".into(),
            queries,
            cwd_markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_correct_project_majority() {
        let t = transcript(vec![], &["/w/my-repo", "/w/other", "/w/my-repo/"]);
        assert_eq!(correct_project(&t), "my-repo");
    }

    #[test]
    fn test_correct_project_tie_goes_to_first() {
        let t = transcript(vec![], &["/w/alpha", "/w/beta", "/w/beta", "/w/alpha"]);
        assert_eq!(correct_project(&t), "beta");

        let t = transcript(vec![], &["/w/alpha", "/w/beta"]);
        assert_eq!(correct_project(&t), "alpha");
    }

    #[test]
    fn test_correct_project_without_markers() {
        assert_eq!(correct_project(&transcript(vec![], &[])), "repo");
        assert_eq!(correct_project(&transcript(vec![], &["/"])), "repo");
    }

    #[test]
    fn test_build_sums_and_primary_model() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 23, 59, 0).unwrap();
        let queries = vec![
            Query::new("<synthetic>", TokenUsage::new(1, 0, 0, 1)),
            Query::new("claude-opus-4-5", TokenUsage::new(10, 0, 0, 5))
                .with_prompt("plan the migration")
                .with_timestamp(ts),
            Query::new("claude-haiku-4-5", TokenUsage::new(20, 0, 0, 5)),
            Query::new("claude-haiku-4-5", TokenUsage::new(30, 0, 0, 5)),
        ];
        let resolver = PricingResolver::new();
        let (session, groups) =
            SessionBuilder::new(&resolver).build(transcript(queries, &[]), None);

        assert_eq!(session.total_tokens(), 77);
        assert_eq!(session.query_count, 4);
        assert_eq!(session.primary_model, "claude-haiku-4-5");
        assert_eq!(session.date, "2026-03-02");
        assert_eq!(session.label, "plan the migration");
        assert_eq!(session.user_messages, 1);
        assert_eq!(groups.len(), 2);
        assert!(session.cost > 0.0);
    }

    #[test]
    fn test_unknown_date_and_fallback_label() {
        let queries = vec![Query::new("unknown", TokenUsage::new(5, 0, 0, 1))];
        let resolver = PricingResolver::new();
        let (session, _) = SessionBuilder::new(&resolver)
            .build(transcript(queries, &[]), Some("from history".into()));
        assert_eq!(session.date, UNKNOWN_DATE);
        assert_eq!(session.label, "from history");
        assert_eq!(session.primary_model, "unknown");
    }

    #[test]
    fn test_long_label_is_shortened() {
        let label = short_label(&format!("{}\nsecond line", "a".repeat(150)));
        assert_eq!(label.chars().count(), 103);
        assert!(label.ends_with("..."));
    }
}
