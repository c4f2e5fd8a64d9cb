//! Rolls sessions up into the report.

use std::collections::{BTreeMap, HashSet};

use tokscope_core::{
    DailyBucket, ModelBucket, ProjectBucket, PromptGroup, Report, Session, TokenUsage, Totals,
    Transcript, is_sentinel_model,
};
use tokscope_cost::{PricingResolver, cache_hit_rate};
use tracing::info;

use crate::insights::{self, Snapshot};
use crate::session::SessionBuilder;

/// Prompts kept per project.
const PROJECT_TOP_PROMPTS: usize = 10;
/// Prompts kept in the global list.
const TOP_PROMPTS: usize = 20;

/// Build the full report from one parse pass.
///
/// `fallback_label` supplies a label for sessions whose transcript has no
/// surviving prompt.
pub fn build_report(
    transcripts: Vec<Transcript>,
    resolver: &PricingResolver,
    fallback_label: impl Fn(&str) -> Option<String>,
) -> Report {
    let builder = SessionBuilder::new(resolver);
    let mut sessions = Vec::with_capacity(transcripts.len());
    let mut groups = Vec::new();
    for transcript in transcripts {
        let label = fallback_label(&transcript.session_id);
        let (session, session_groups) = builder.build(transcript, label);
        sessions.push(session);
        groups.extend(session_groups);
    }

    // Stable: equal totals keep reader order
    sessions.sort_by(|a, b| b.total_tokens().cmp(&a.total_tokens()));

    let totals = totals(&sessions);
    let insights = insights::evaluate(&Snapshot {
        sessions: &sessions,
        groups: &groups,
        totals: &totals,
    });

    let report = Report {
        daily: daily_buckets(&sessions),
        models: model_buckets(sessions.iter(), resolver),
        projects: project_buckets(&sessions, &groups, resolver),
        top_prompts: top_prompts(groups.iter(), TOP_PROMPTS),
        sessions,
        totals,
        insights,
    };
    info!(
        sessions = report.totals.total_sessions,
        tokens = report.totals.total_tokens(),
        cost = report.totals.total_cost,
        insights = report.insights.len(),
        "report built"
    );
    report
}

fn totals(sessions: &[Session]) -> Totals {
    let usage: TokenUsage = sessions.iter().map(|s| s.usage).sum();
    let total_cost: f64 = sessions.iter().map(|s| s.cost).sum();
    let cost_without_cache: f64 = sessions.iter().map(|s| s.cost_without_cache).sum();
    let total_queries: usize = sessions.iter().map(|s| s.query_count).sum();
    let total_tokens = usage.total_tokens();

    Totals {
        usage,
        total_sessions: sessions.len(),
        total_queries,
        avg_tokens_per_session: total_tokens.checked_div(sessions.len() as u64).unwrap_or(0),
        total_cost,
        cost_without_cache,
        cache_savings: cost_without_cache - total_cost,
        cache_hit_rate: cache_hit_rate(&usage),
        cost_per_query: ratio(total_cost, total_queries as f64),
        output_ratio: ratio(usage.output_tokens() as f64, total_tokens as f64),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

fn daily_buckets(sessions: &[Session]) -> Vec<DailyBucket> {
    let mut days: BTreeMap<&str, DailyBucket> = BTreeMap::new();
    for session in sessions {
        let bucket = days.entry(&session.date).or_insert_with(|| DailyBucket {
            date: session.date.clone(),
            usage: TokenUsage::default(),
            sessions: 0,
            queries: 0,
            cost: 0.0,
        });
        bucket.usage += session.usage;
        bucket.sessions += 1;
        bucket.queries += session.query_count;
        bucket.cost += session.cost;
    }
    days.into_values().collect()
}

/// Per-model buckets over the queries of `sessions`, sentinels excluded.
fn model_buckets<'s>(
    sessions: impl Iterator<Item = &'s Session>,
    resolver: &PricingResolver,
) -> Vec<ModelBucket> {
    let mut models: BTreeMap<&str, (ModelBucket, HashSet<&str>)> = BTreeMap::new();
    for session in sessions {
        for query in session.queries.iter().filter(|q| !is_sentinel_model(&q.model)) {
            let (bucket, seen) = models.entry(&query.model).or_insert_with(|| {
                (
                    ModelBucket {
                        model: query.model.clone(),
                        usage: TokenUsage::default(),
                        sessions: 0,
                        queries: 0,
                        cost: 0.0,
                    },
                    HashSet::new(),
                )
            });
            bucket.usage += query.usage;
            bucket.queries += 1;
            bucket.cost += resolver.price(&query.model, &query.usage).cost;
            if seen.insert(&session.id) {
                bucket.sessions += 1;
            }
        }
    }

    let mut buckets: Vec<ModelBucket> = models.into_values().map(|(bucket, _)| bucket).collect();
    buckets.sort_by(|a, b| b.usage.total_tokens().cmp(&a.usage.total_tokens()));
    buckets
}

fn project_buckets(
    sessions: &[Session],
    groups: &[PromptGroup],
    resolver: &PricingResolver,
) -> Vec<ProjectBucket> {
    let mut by_project: BTreeMap<&str, Vec<&Session>> = BTreeMap::new();
    for session in sessions {
        by_project.entry(&session.project).or_default().push(session);
    }

    let mut buckets: Vec<ProjectBucket> = by_project
        .into_iter()
        .map(|(project, members)| ProjectBucket {
            project: project.to_string(),
            usage: members.iter().map(|s| s.usage).sum(),
            sessions: members.len(),
            queries: members.iter().map(|s| s.query_count).sum(),
            cost: members.iter().map(|s| s.cost).sum(),
            models: model_buckets(members.iter().copied(), resolver),
            top_prompts: top_prompts(
                groups.iter().filter(|g| g.project == project),
                PROJECT_TOP_PROMPTS,
            ),
        })
        .collect();
    buckets.sort_by(|a, b| b.usage.total_tokens().cmp(&a.usage.total_tokens()));
    buckets
}

/// Most expensive prompted groups, by cost then tokens.
fn top_prompts<'g>(
    groups: impl Iterator<Item = &'g PromptGroup>,
    limit: usize,
) -> Vec<PromptGroup> {
    let mut prompted: Vec<&PromptGroup> = groups.filter(|g| g.prompt.is_some()).collect();
    prompted.sort_by(|a, b| {
        b.cost
            .total_cmp(&a.cost)
            .then_with(|| b.total_tokens().cmp(&a.total_tokens()))
    });
    prompted.into_iter().take(limit).cloned().collect()
}
