//! Rule-based observations over one report.
//!
//! Every rule is a pure function of the [`Snapshot`] and yields at most one
//! insight. [`RULES`] is evaluated top to bottom and the output keeps that
//! order.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use tokscope_core::{Insight, PromptGroup, Session, Severity, Tool, Totals};

use crate::session::UNKNOWN_DATE;

/// What the rules look at.
pub struct Snapshot<'a> {
    pub sessions: &'a [Session],
    pub groups: &'a [PromptGroup],
    pub totals: &'a Totals,
}

/// A registered rule.
pub struct Rule {
    pub id: &'static str,
    pub eval: fn(&Snapshot<'_>) -> Option<Insight>,
}

/// The registry, in output order.
pub const RULES: &[Rule] = &[
    Rule { id: "vague-prompts", eval: vague_prompts },
    Rule { id: "context-growth", eval: context_growth },
    Rule { id: "marathon-sessions", eval: marathon_sessions },
    Rule { id: "input-heavy", eval: input_heavy },
    Rule { id: "day-of-week-pattern", eval: day_of_week_pattern },
    Rule { id: "model-mismatch", eval: model_mismatch },
    Rule { id: "tool-heavy", eval: tool_heavy },
    Rule { id: "project-dominance", eval: project_dominance },
    Rule { id: "conversation-efficiency", eval: conversation_efficiency },
    Rule { id: "heavy-context-start", eval: heavy_context_start },
    Rule { id: "cache-savings", eval: cache_benefit },
    Rule { id: "high-rework", eval: high_rework },
    Rule { id: "multi-tool", eval: multi_tool },
];

/// Run every rule in registry order.
pub fn evaluate(snapshot: &Snapshot<'_>) -> Vec<Insight> {
    RULES.iter().filter_map(|rule| (rule.eval)(snapshot)).collect()
}

/// Cache savings below this many dollars are not worth reporting.
const MATERIAL_SAVINGS_USD: f64 = 1.0;

fn vague_prompts(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let vague: Vec<&PromptGroup> = snapshot
        .groups
        .iter()
        .filter(|g| {
            g.prompt
                .as_deref()
                .is_some_and(|p| p.trim().chars().count() < 30)
                && g.total_tokens() > 100_000
        })
        .collect();
    if vague.is_empty() {
        return None;
    }
    let wasted: u64 = vague.iter().map(|g| g.total_tokens()).sum();
    Some(
        Insight::new(
            "vague-prompts",
            Severity::Warning,
            "Short prompts, expensive answers",
            format!(
                "{} prompt(s) under 30 characters used {} tokens between them. Vague requests make the model explore before it acts.",
                vague.len(),
                thousands(wasted)
            ),
        )
        .with_action("Include the file, function or error message you mean in the first message."),
    )
}

fn context_growth(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let mut growing: Vec<(&Session, f64)> = Vec::new();
    for session in snapshot.sessions.iter().filter(|s| s.query_count > 50) {
        let inputs: Vec<u64> = session.queries.iter().map(|q| q.input_tokens()).collect();
        let first = mean_u64(&inputs[..5]);
        let last = mean_u64(&inputs[inputs.len() - 5..]);
        if first == 0.0 {
            continue;
        }
        let ratio = last / first;
        if ratio > 2.0 {
            growing.push((session, ratio));
        }
    }
    if growing.is_empty() {
        return None;
    }

    let mean = growing.iter().map(|(_, r)| r).sum::<f64>() / growing.len() as f64;
    let (worst, worst_ratio) = growing
        .iter()
        .copied()
        .fold(growing[0], |best, item| if item.1 > best.1 { item } else { best });
    Some(
        Insight::new(
            "context-growth",
            Severity::Warning,
            "Context keeps growing",
            format!(
                "In {} long session(s) the last turns read {:.1}x more input than the first ones. The worst, \"{}\", grew {:.1}x.",
                growing.len(),
                mean,
                worst.label,
                worst_ratio
            ),
        )
        .with_action("Start a fresh session or compact the conversation when you switch tasks."),
    )
}

fn marathon_sessions(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let marathons: Vec<&Session> = snapshot
        .sessions
        .iter()
        .filter(|s| s.query_count > 200)
        .collect();
    if marathons.len() < 3 {
        return None;
    }
    let tokens: u64 = marathons.iter().map(|s| s.total_tokens()).sum();
    let share = percent(tokens as f64, snapshot.totals.total_tokens() as f64);
    Some(
        Insight::new(
            "marathon-sessions",
            Severity::Warning,
            "Marathon sessions",
            format!(
                "{} sessions ran past 200 turns and account for {:.0}% of all tokens.",
                marathons.len(),
                share
            ),
        )
        .with_action("Break long efforts into focused sessions with a short written handoff."),
    )
}

fn input_heavy(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let total = snapshot.totals.total_tokens();
    if total == 0 {
        return None;
    }
    let share = percent(snapshot.totals.usage.output_tokens() as f64, total as f64);
    if share >= 2.0 {
        return None;
    }
    Some(Insight::new(
        "input-heavy",
        Severity::Info,
        "Almost all tokens are input",
        format!(
            "Only {share:.1}% of tokens are model output. Most spend goes to re-reading context."
        ),
    ))
}

fn day_of_week_pattern(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let dated: Vec<(Weekday, u64)> = snapshot
        .sessions
        .iter()
        .filter(|s| s.date != UNKNOWN_DATE)
        .filter_map(|s| {
            let day = NaiveDate::parse_from_str(&s.date, "%Y-%m-%d").ok()?;
            Some((day.weekday(), s.total_tokens()))
        })
        .collect();
    if dated.len() < 10 {
        return None;
    }

    let mut by_day: BTreeMap<u32, (Weekday, u64, usize)> = BTreeMap::new();
    for (day, tokens) in dated {
        let entry = by_day
            .entry(day.num_days_from_monday())
            .or_insert((day, 0, 0));
        entry.1 += tokens;
        entry.2 += 1;
    }
    if by_day.len() < 3 {
        return None;
    }

    let averages: Vec<(Weekday, f64)> = by_day
        .into_values()
        .map(|(day, tokens, count)| (day, tokens as f64 / count as f64))
        .collect();
    let busiest = averages
        .iter()
        .copied()
        .fold(averages[0], |best, item| if item.1 > best.1 { item } else { best });
    let quietest = averages
        .iter()
        .copied()
        .fold(averages[0], |best, item| if item.1 < best.1 { item } else { best });

    Some(Insight::new(
        "day-of-week-pattern",
        Severity::Neutral,
        "Weekly rhythm",
        format!(
            "{} sessions average {} tokens, against {} on {}.",
            weekday_name(busiest.0),
            thousands(busiest.1.round() as u64),
            thousands(quietest.1.round() as u64),
            weekday_name(quietest.0)
        ),
    ))
}

fn model_mismatch(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let small_opus: Vec<&Session> = snapshot
        .sessions
        .iter()
        .filter(|s| {
            s.primary_model.to_lowercase().contains("opus")
                && s.query_count < 10
                && s.total_tokens() < 200_000
        })
        .collect();
    if small_opus.len() < 3 {
        return None;
    }
    let tokens: u64 = small_opus.iter().map(|s| s.total_tokens()).sum();
    Some(
        Insight::new(
            "model-mismatch",
            Severity::Warning,
            "Premium model on small tasks",
            format!(
                "{} short sessions ran on Opus and used {} tokens. A smaller model would likely have done.",
                small_opus.len(),
                thousands(tokens)
            ),
        )
        .with_action("Switch to Sonnet or Haiku for quick questions and small edits."),
    )
}

fn tool_heavy(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let heavy: Vec<&Session> = snapshot
        .sessions
        .iter()
        .filter(|s| s.user_messages > 0 && s.tool_calls > 3 * s.user_messages)
        .collect();
    if heavy.len() < 3 {
        return None;
    }
    let mean_ratio = heavy
        .iter()
        .map(|s| s.tool_calls as f64 / s.user_messages as f64)
        .sum::<f64>()
        / heavy.len() as f64;
    let tokens: u64 = heavy.iter().map(|s| s.total_tokens()).sum();
    Some(Insight::new(
        "tool-heavy",
        Severity::Info,
        "Tool-heavy sessions",
        format!(
            "{} sessions averaged {:.1} tool calls per message and used {} tokens.",
            heavy.len(),
            mean_ratio,
            thousands(tokens)
        ),
    ))
}

fn project_dominance(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let mut projects: Vec<(&str, u64)> = Vec::new();
    for session in snapshot.sessions {
        match projects.iter_mut().find(|(name, _)| *name == session.project) {
            Some((_, tokens)) => *tokens += session.total_tokens(),
            None => projects.push((session.project.as_str(), session.total_tokens())),
        }
    }
    if projects.len() < 2 {
        return None;
    }
    let (name, tokens) = projects
        .iter()
        .copied()
        .fold(projects[0], |best, item| if item.1 > best.1 { item } else { best });
    let share = percent(tokens as f64, snapshot.totals.total_tokens() as f64);
    if share < 60.0 {
        return None;
    }
    Some(Insight::new(
        "project-dominance",
        Severity::Info,
        "One project dominates",
        format!(
            "{name} accounts for {share:.0}% of all tokens across {} projects.",
            projects.len()
        ),
    ))
}

fn conversation_efficiency(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let per_turn = |keep: fn(usize) -> bool| -> Vec<f64> {
        snapshot
            .sessions
            .iter()
            .filter(|s| keep(s.query_count))
            .map(|s| s.cost / s.query_count as f64)
            .collect()
    };
    let long = per_turn(|turns| turns > 80);
    let short = per_turn(|turns| (3..=15).contains(&turns));
    if long.len() < 2 || short.len() < 3 {
        return None;
    }
    let long_mean = mean(&long);
    let short_mean = mean(&short);
    if short_mean <= 0.0 {
        return None;
    }
    let ratio = long_mean / short_mean;
    if ratio < 2.0 {
        return None;
    }
    Some(
        Insight::new(
            "conversation-efficiency",
            Severity::Warning,
            "Long conversations cost more per turn",
            format!(
                "Each turn in sessions over 80 turns costs {ratio:.1}x a turn in 3 to 15 turn sessions (${long_mean:.3} vs ${short_mean:.3})."
            ),
        )
        .with_action("Restart with a summary once a conversation passes a few dozen turns."),
    )
}

fn heavy_context_start(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let openings: Vec<u64> = snapshot
        .sessions
        .iter()
        .filter_map(|s| s.queries.first().map(|q| q.input_tokens()))
        .filter(|&input| input > 50_000)
        .collect();
    if openings.len() < 5 {
        return None;
    }
    let total: u64 = openings.iter().sum();
    let average = total / openings.len() as u64;
    Some(
        Insight::new(
            "heavy-context-start",
            Severity::Info,
            "Sessions start heavy",
            format!(
                "{} sessions opened with more than 50,000 input tokens, {} on average and {} in total.",
                openings.len(),
                thousands(average),
                thousands(total)
            ),
        )
        .with_action("Trim always-loaded instructions and memory files."),
    )
}

/// `cache-savings` or `no-cache-benefit`, never both.
fn cache_benefit(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let totals = snapshot.totals;
    if totals.cache_savings > MATERIAL_SAVINGS_USD {
        return Some(Insight::new(
            "cache-savings",
            Severity::Positive,
            "Prompt caching is paying off",
            format!(
                "Cache reads saved ${:.2}: you paid ${:.2} instead of ${:.2}, with {:.0}% of input served from cache.",
                totals.cache_savings,
                totals.total_cost,
                totals.cost_without_cache,
                totals.cache_hit_rate * 100.0
            ),
        ));
    }
    if totals.total_tokens() > 100_000 && totals.cache_hit_rate < 0.05 {
        return Some(Insight::new(
            "no-cache-benefit",
            Severity::Neutral,
            "Little cache reuse",
            format!(
                "Only {:.1}% of input tokens came from the prompt cache.",
                totals.cache_hit_rate * 100.0
            ),
        ));
    }
    None
}

fn high_rework(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let reworked = snapshot.groups.iter().filter(|g| g.has_rework()).count();
    if reworked <= 5 {
        return None;
    }
    Some(
        Insight::new(
            "high-rework",
            Severity::Warning,
            "Files rewritten within a prompt",
            format!("{reworked} prompts wrote the same file more than once before finishing."),
        )
        .with_action("State acceptance criteria up front so the first edit can be the last."),
    )
}

fn multi_tool(snapshot: &Snapshot<'_>) -> Option<Insight> {
    let mut by_tool: BTreeMap<Tool, (usize, u64)> = BTreeMap::new();
    for session in snapshot.sessions {
        let entry = by_tool.entry(session.tool).or_default();
        entry.0 += 1;
        entry.1 += session.total_tokens();
    }
    if by_tool.len() < 2 {
        return None;
    }
    let breakdown: Vec<String> = by_tool
        .iter()
        .map(|(tool, (sessions, tokens))| {
            format!("{tool}: {sessions} sessions, {} tokens", thousands(*tokens))
        })
        .collect();
    Some(Insight::new(
        "multi-tool",
        Severity::Neutral,
        "Several assistants in use",
        breakdown.join("; "),
    ))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_u64(values: &[u64]) -> f64 {
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// `1234567` -> `1,234,567`
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokscope_core::{PromptQuality, Query, TokenUsage};

    fn session(id: &str, turns: usize, input: u64, output: u64) -> Session {
        let queries: Vec<Query> = (0..turns)
            .map(|_| Query::new("claude-sonnet-4-5", TokenUsage::new(input, 0, 0, output)))
            .collect();
        Session {
            id: id.into(),
            tool: Tool::ClaudeCode,
            project: "api".into(),
            date: "2026-03-02".into(),
            label: id.into(),
            primary_model: "claude-sonnet-4-5".into(),
            usage: queries.iter().map(|q| q.usage).sum(),
            query_count: turns,
            user_messages: 1,
            tool_calls: 0,
            cost: 0.0,
            cost_without_cache: 0.0,
            queries,
        }
    }

    fn group(prompt: &str, tokens: u64) -> PromptGroup {
        PromptGroup {
            session_id: "s".into(),
            project: "api".into(),
            tool: Tool::ClaudeCode,
            model: "claude-sonnet-4-5".into(),
            prompt: Some(prompt.into()),
            usage: TokenUsage::new(tokens, 0, 0, 0),
            cost: 0.0,
            query_count: 1,
            continuations: 0,
            context_depth: 0,
            tool_counts: BTreeMap::new(),
            file_writes: BTreeMap::new(),
            quality: PromptQuality::default(),
        }
    }

    fn totals_of(sessions: &[Session]) -> Totals {
        Totals {
            usage: sessions.iter().map(|s| s.usage).sum(),
            total_sessions: sessions.len(),
            ..Totals::default()
        }
    }

    fn run(
        rule: fn(&Snapshot<'_>) -> Option<Insight>,
        sessions: &[Session],
        groups: &[PromptGroup],
    ) -> Option<Insight> {
        let totals = totals_of(sessions);
        rule(&Snapshot { sessions, groups, totals: &totals })
    }

    #[test]
    fn test_registry_order_and_ids() {
        let ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 13);
        assert_eq!(ids[0], "vague-prompts");
        assert_eq!(ids[12], "multi-tool");
    }

    #[test]
    fn test_vague_prompts_reports_wasted_tokens() {
        let groups = vec![group("fix", 150_000), group("fix the flaky retry test in api", 500_000)];
        let insight = run(vague_prompts, &[], &groups).unwrap();
        assert_eq!(insight.severity, Severity::Warning);
        assert!(insight.description.contains("150,000"));
        assert!(insight.description.starts_with("1 prompt"));

        assert!(run(vague_prompts, &[], &[group("fix", 100_000)]).is_none());
    }

    #[test]
    fn test_marathon_boundary() {
        let at_limit: Vec<Session> = (0..3).map(|i| session(&format!("s{i}"), 200, 1, 1)).collect();
        assert!(run(marathon_sessions, &at_limit, &[]).is_none());

        let over: Vec<Session> = (0..3).map(|i| session(&format!("s{i}"), 201, 1, 1)).collect();
        let insight = run(marathon_sessions, &over, &[]).unwrap();
        assert!(insight.description.contains("100%"));
    }

    #[test]
    fn test_context_growth() {
        let mut s = session("grower", 60, 1_000, 10);
        for q in s.queries.iter_mut().skip(55) {
            q.usage.fresh_input = 10_000;
        }
        let insight = run(context_growth, &[s], &[]).unwrap();
        assert!(insight.description.contains("10.0x"));

        let flat = session("flat", 60, 1_000, 10);
        assert!(run(context_growth, &[flat], &[]).is_none());
        let zero = session("zero", 60, 0, 10);
        assert!(run(context_growth, &[zero], &[]).is_none());
    }

    #[test]
    fn test_input_heavy() {
        assert!(run(input_heavy, &[session("a", 1, 1_000, 10)], &[]).is_some());
        assert!(run(input_heavy, &[session("a", 1, 1_000, 100)], &[]).is_none());
        assert!(run(input_heavy, &[], &[]).is_none());
    }

    #[test]
    fn test_day_of_week_pattern() {
        // 2026-03-02 is a Monday
        let mut sessions = Vec::new();
        let days = ["2026-03-02", "2026-03-03", "2026-03-04"];
        for (i, date) in days.iter().cycle().take(12).enumerate() {
            let input = if *date == "2026-03-04" { 9_000 } else { 1_000 };
            let mut s = session(&format!("s{i}"), 1, input, 0);
            s.date = date.to_string();
            sessions.push(s);
        }
        let insight = run(day_of_week_pattern, &sessions, &[]).unwrap();
        assert!(insight.description.starts_with("Wednesday"));
        assert!(insight.description.ends_with("on Monday."));

        let mut unknown = sessions.clone();
        for s in unknown.iter_mut().skip(3) {
            s.date = UNKNOWN_DATE.into();
        }
        assert!(run(day_of_week_pattern, &unknown, &[]).is_none());
    }

    #[test]
    fn test_model_mismatch() {
        let sessions: Vec<Session> = (0..3)
            .map(|i| {
                let mut s = session(&format!("s{i}"), 5, 1_000, 100);
                s.primary_model = "claude-opus-4-5-20251101".into();
                s
            })
            .collect();
        assert!(run(model_mismatch, &sessions, &[]).is_some());
        assert!(run(model_mismatch, &sessions[..2], &[]).is_none());
    }

    #[test]
    fn test_tool_heavy_ignores_silent_sessions() {
        let mut sessions: Vec<Session> = (0..3)
            .map(|i| {
                let mut s = session(&format!("s{i}"), 5, 10, 1);
                s.tool_calls = 4;
                s
            })
            .collect();
        assert!(run(tool_heavy, &sessions, &[]).is_some());
        sessions[0].user_messages = 0;
        assert!(run(tool_heavy, &sessions, &[]).is_none());
    }

    #[test]
    fn test_project_dominance() {
        let mut web = session("w", 1, 300, 0);
        web.project = "web".into();
        let api = session("a", 1, 700, 0);
        let insight = run(project_dominance, &[api.clone(), web], &[]).unwrap();
        assert!(insight.description.starts_with("api accounts for 70%"));
        assert!(run(project_dominance, &[api], &[]).is_none());
    }

    #[test]
    fn test_conversation_efficiency() {
        let mut sessions = Vec::new();
        for i in 0..2 {
            let mut s = session(&format!("long{i}"), 100, 1, 1);
            s.cost = 10.0;
            sessions.push(s);
        }
        for i in 0..3 {
            let mut s = session(&format!("short{i}"), 10, 1, 1);
            s.cost = 0.2;
            sessions.push(s);
        }
        let insight = run(conversation_efficiency, &sessions, &[]).unwrap();
        assert!(insight.description.contains("5.0x"));

        sessions.pop();
        assert!(run(conversation_efficiency, &sessions, &[]).is_none());
    }

    #[test]
    fn test_heavy_context_start() {
        let sessions: Vec<Session> = (0..5)
            .map(|i| session(&format!("s{i}"), 1, 60_000, 1))
            .collect();
        assert!(run(heavy_context_start, &sessions, &[]).is_some());
        assert!(run(heavy_context_start, &sessions[..4], &[]).is_none());
    }

    #[test]
    fn test_cache_rules_are_exclusive() {
        let mut totals = Totals {
            usage: TokenUsage::new(200_000, 0, 0, 1_000),
            cache_savings: 12.5,
            cache_hit_rate: 0.01,
            ..Totals::default()
        };
        let snapshot = Snapshot { sessions: &[], groups: &[], totals: &totals };
        assert_eq!(cache_benefit(&snapshot).unwrap().id, "cache-savings");

        totals.cache_savings = 0.5;
        let snapshot = Snapshot { sessions: &[], groups: &[], totals: &totals };
        assert_eq!(cache_benefit(&snapshot).unwrap().id, "no-cache-benefit");

        totals.cache_hit_rate = 0.5;
        let snapshot = Snapshot { sessions: &[], groups: &[], totals: &totals };
        assert!(cache_benefit(&snapshot).is_none());
    }

    #[test]
    fn test_high_rework() {
        let reworked: Vec<PromptGroup> = (0..6)
            .map(|_| {
                let mut g = group("edit", 10);
                g.file_writes.insert("a.rs".into(), 2);
                g
            })
            .collect();
        assert!(run(high_rework, &[], &reworked).is_some());
        assert!(run(high_rework, &[], &reworked[..5]).is_none());
    }

    #[test]
    fn test_multi_tool_breakdown() {
        let mut codex = session("c", 1, 2_000, 0);
        codex.tool = Tool::Codex;
        let insight = run(multi_tool, &[session("a", 1, 1_000, 0), codex], &[]).unwrap();
        assert_eq!(
            insight.description,
            "claude-code: 1 sessions, 1,000 tokens; codex: 1 sessions, 2,000 tokens"
        );
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(150_000), "150,000");
        assert_eq!(thousands(12_345_678), "12,345,678");
    }
}
