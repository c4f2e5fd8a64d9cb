//! Prompt-quality analysis.
//!
//! Scores how precisely a prompt pins down its target, recognizes search and
//! write tool calls across the three CLIs, and ranks the likely reasons a
//! prompt group was expensive.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tokscope_core::{CostDriver, DriverKind, PromptGroup, PromptQuality, ToolCall};

/// Scores below this count as vague.
pub const LOW_SPECIFICITY: f64 = 0.3;

const PATH_WEIGHT: f64 = 0.25;
const LINE_WEIGHT: f64 = 0.25;
const IDENTIFIER_WEIGHT: f64 = 0.20;
const LENGTH_WEIGHT: f64 = 0.15;
const ERROR_WEIGHT: f64 = 0.15;

const LONG_PROMPT_CHARS: usize = 100;
const LONG_IDENTIFIER_CHARS: usize = 20;
const SHORT_PROMPT_CHARS: usize = 20;

/// Context depth at which the context driver saturates.
const DEEP_CONTEXT_TOKENS: f64 = 200_000.0;
const FANOUT_CALLS: f64 = 20.0;
const REWORK_LOOPS: f64 = 3.0;

const SEARCH_TOOLS: &[&str] = &[
    "Grep",
    "Glob",
    "LS",
    "WebSearch",
    "search_file_content",
    "glob",
    "list_directory",
    "google_web_search",
];
const SHELL_TOOLS: &[&str] = &["shell", "exec_command", "Bash", "run_shell_command"];
const SEARCH_COMMANDS: &[&str] = &["rg", "grep", "find", "ls", "fd"];

static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:[\w.-]*/[\w.-]+)|\b[\w-]+\.(?:rs|ts|tsx|js|jsx|mjs|py|go|java|kt|rb|php|c|h|cc|cpp|hpp|cs|swift|md|json|ya?ml|toml|sh|sql|html|css|scss|vue|lock)\b",
    )
    .unwrap()
});
static LINE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blines?\s+\d+|\.\w+:\d+|#L\d+").unwrap());
static ERROR_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:error|errors|exception|panics?|panicked|traceback|stack ?trace|fails?|failed|failing|failure|crash(?:es|ed)?|segfault|undefined|nullpointer)\b",
    )
    .unwrap()
});
static PATCH_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\*\*\* (?:Add|Update) File: (.+?)\s*$").unwrap());

/// Specificity of a prompt in `[0, 1]`.
pub fn specificity(prompt: &str) -> f64 {
    let prompt = prompt.trim();
    let mut score = 0.0;
    if PATH_TOKEN.is_match(prompt) {
        score += PATH_WEIGHT;
    }
    if LINE_REFERENCE.is_match(prompt) {
        score += LINE_WEIGHT;
    }
    if has_long_identifier(prompt) {
        score += IDENTIFIER_WEIGHT;
    }
    if prompt.chars().count() > LONG_PROMPT_CHARS {
        score += LENGTH_WEIGHT;
    }
    if ERROR_KEYWORD.is_match(prompt) {
        score += ERROR_WEIGHT;
    }
    f64::min(score, 1.0)
}

/// `handleRetryBackoffForUpstream` style tokens.
fn has_long_identifier(prompt: &str) -> bool {
    prompt
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| {
            token.chars().count() > LONG_IDENTIFIER_CHARS
                && token.chars().any(char::is_uppercase)
                && token.chars().any(char::is_lowercase)
        })
}

/// True for calls that look for code rather than change it.
pub fn is_search(call: &ToolCall) -> bool {
    if SEARCH_TOOLS.contains(&call.name.as_str()) {
        return true;
    }
    if SHELL_TOOLS.contains(&call.name.as_str()) {
        return shell_command(&call.arguments)
            .and_then(|command| command.split_whitespace().next().map(str::to_string))
            .is_some_and(|program| SEARCH_COMMANDS.contains(&program.as_str()));
    }
    false
}

/// Files a call writes. Codex patches can touch several at once.
pub fn written_paths(call: &ToolCall) -> Vec<String> {
    match call.name.as_str() {
        "Write" | "Edit" | "MultiEdit" | "write_file" | "replace" => {
            call.argument_str("file_path").map(str::to_string).into_iter().collect()
        }
        "NotebookEdit" => call
            .argument_str("notebook_path")
            .or_else(|| call.argument_str("file_path"))
            .map(str::to_string)
            .into_iter()
            .collect(),
        "apply_patch" => patch_text(&call.arguments).map(patch_paths).unwrap_or_default(),
        name if SHELL_TOOLS.contains(&name) => shell_argv(&call.arguments)
            .filter(|argv| argv.first().map(String::as_str) == Some("apply_patch"))
            .and_then(|argv| argv.get(1).cloned())
            .map(|patch| patch_paths(&patch))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn patch_text(arguments: &Value) -> Option<&str> {
    arguments
        .as_str()
        .or_else(|| arguments.get("input").and_then(Value::as_str))
        .or_else(|| arguments.get("patch").and_then(Value::as_str))
}

fn patch_paths(patch: &str) -> Vec<String> {
    PATCH_FILE
        .captures_iter(patch)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn shell_argv(arguments: &Value) -> Option<Vec<String>> {
    let argv = arguments.get("command")?.as_array()?;
    Some(
        argv.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

/// The command line a shell call runs, unwrapping `bash -lc "<cmd>"`.
fn shell_command(arguments: &Value) -> Option<String> {
    if let Some(argv) = shell_argv(arguments) {
        return match argv.as_slice() {
            [shell, flag, command] if is_shell(shell) && flag.starts_with('-') => {
                Some(command.clone())
            }
            _ => Some(argv.join(" ")),
        };
    }
    arguments
        .get("command")
        .or_else(|| arguments.get("cmd"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn is_shell(program: &str) -> bool {
    matches!(
        program.rsplit('/').next(),
        Some("bash" | "sh" | "zsh" | "fish")
    )
}

/// Analyze a finished group. `searches` is how many search calls it made.
pub fn analyze(group: &PromptGroup, searches: usize) -> PromptQuality {
    let prompt = group.prompt.as_deref().map(str::trim);
    let specificity = prompt.map(specificity).unwrap_or(0.0);
    let search_attempts = searches.saturating_sub(1);
    let rework_loops: usize = group
        .file_writes
        .values()
        .filter(|&&writes| writes > 1)
        .map(|writes| writes - 1)
        .sum();

    let drivers = rank_drivers(group, specificity, rework_loops);

    let tip = if specificity < LOW_SPECIFICITY && search_attempts > 2 {
        Some(format!(
            "Name the file path or line number up front: this prompt needed {search_attempts} extra searches to find its target."
        ))
    } else if rework_loops > 0 {
        Some(format!(
            "Spell out acceptance criteria before asking for changes: files were rewritten {rework_loops} extra time(s) here."
        ))
    } else if prompt.is_some_and(|p| p.chars().count() < SHORT_PROMPT_CHARS) {
        Some(
            "Say what outcome you want: very short prompts leave the model guessing at intent."
                .to_string(),
        )
    } else {
        None
    };

    PromptQuality {
        specificity,
        search_attempts,
        rework_loops,
        drivers,
        tip,
    }
}

fn rank_drivers(group: &PromptGroup, specificity: f64, rework_loops: usize) -> Vec<CostDriver> {
    let candidates = [
        (
            DriverKind::ContextDepth,
            0.35 * f64::min(1.0, group.context_depth as f64 / DEEP_CONTEXT_TOKENS),
        ),
        (
            DriverKind::ToolFanout,
            0.25 * f64::min(1.0, group.tool_calls() as f64 / FANOUT_CALLS),
        ),
        (
            DriverKind::Rework,
            0.25 * f64::min(1.0, rework_loops as f64 / REWORK_LOOPS),
        ),
        (DriverKind::VaguePrompt, 0.15 * (1.0 - specificity)),
    ];

    let mut drivers: Vec<CostDriver> = candidates
        .into_iter()
        .filter(|(_, impact)| *impact > 0.0)
        .map(|(kind, impact)| CostDriver { kind, impact })
        .collect();
    // Stable: equal impacts keep the candidate order
    drivers.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    drivers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tokscope_core::{TokenUsage, Tool};

    fn group(prompt: Option<&str>) -> PromptGroup {
        PromptGroup {
            session_id: "s".into(),
            project: "p".into(),
            tool: Tool::ClaudeCode,
            model: "claude-sonnet-4-5".into(),
            prompt: prompt.map(str::to_string),
            usage: TokenUsage::default(),
            cost: 0.0,
            query_count: 1,
            continuations: 0,
            context_depth: 0,
            tool_counts: BTreeMap::new(),
            file_writes: BTreeMap::new(),
            quality: PromptQuality::default(),
        }
    }

    #[test]
    fn test_static_patterns_compile() {
        for pattern in [&PATH_TOKEN, &LINE_REFERENCE, &ERROR_KEYWORD, &PATCH_FILE] {
            LazyLock::force(pattern);
        }
    }

    #[test]
    fn test_specificity_signals() {
        assert_eq!(specificity("fix it"), 0.0);
        assert!((specificity("look at src/lib.rs") - 0.25).abs() < 1e-9);
        assert!((specificity("src/lib.rs:42 panics") - 0.65).abs() < 1e-9);
        assert!((specificity("rename handleRetryBackoffForUpstream") - 0.20).abs() < 1e-9);

        let everything = format!(
            "the test in crates/api/src/retry.rs line 88 fails with an error from handleRetryBackoffForUpstream {}",
            "x".repeat(40)
        );
        assert!((specificity(&everything) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_search_detection() {
        assert!(is_search(&ToolCall::new("Grep", json!({"pattern": "x"}))));
        assert!(is_search(&ToolCall::new(
            "shell",
            json!({"command": ["bash", "-lc", "rg --files | head"]})
        )));
        assert!(is_search(&ToolCall::new("exec_command", json!({"cmd": "find . -name '*.rs'"}))));
        assert!(!is_search(&ToolCall::new("shell", json!({"command": ["cargo", "test"]}))));
        assert!(!is_search(&ToolCall::new("Read", json!({"file_path": "a"}))));
    }

    #[test]
    fn test_written_paths() {
        let edit = ToolCall::new("Edit", json!({"file_path": "src/a.rs"}));
        assert_eq!(written_paths(&edit), vec!["src/a.rs"]);

        let patch =
            "*** Begin Patch\n*** Update File: src/a.rs\n@@\n-x\n+y\n*** Add File: src/b.rs\n+z\n*** End Patch";
        let custom = ToolCall::new("apply_patch", json!(patch));
        assert_eq!(written_paths(&custom), vec!["src/a.rs", "src/b.rs"]);

        let via_shell = ToolCall::new("shell", json!({"command": ["apply_patch", patch]}));
        assert_eq!(written_paths(&via_shell).len(), 2);

        assert!(written_paths(&ToolCall::new("Read", json!({"file_path": "x"}))).is_empty());
    }

    #[test]
    fn test_rework_tip_and_drivers() {
        let mut g = group(Some("make the retry loop configurable via the config file please"));
        g.file_writes.insert("src/retry.rs".into(), 3);
        g.file_writes.insert("src/lib.rs".into(), 1);
        g.tool_counts.insert("Edit".into(), 4);
        g.context_depth = 400_000;

        let quality = analyze(&g, 0);
        assert_eq!(quality.rework_loops, 2);
        assert!(quality.tip.unwrap().contains("acceptance criteria"));

        let kinds: Vec<DriverKind> = quality.drivers.iter().map(|d| d.kind).collect();
        assert_eq!(kinds[0], DriverKind::ContextDepth);
        assert!((quality.drivers[0].impact - 0.35).abs() < 1e-9);
        assert_eq!(kinds[1], DriverKind::Rework);
    }

    #[test]
    fn test_search_tip_beats_rework_tip() {
        let mut g = group(Some("where is auth handled"));
        g.file_writes.insert("a".into(), 2);
        let quality = analyze(&g, 5);
        assert_eq!(quality.search_attempts, 4);
        assert!(quality.tip.unwrap().contains("file path or line number"));
    }

    #[test]
    fn test_short_prompt_tip_and_anonymous_group() {
        assert!(analyze(&group(Some("continue")), 0).tip.unwrap().contains("outcome"));
        assert!(analyze(&group(None), 0).tip.is_none());
    }

    #[test]
    fn test_driver_ties_keep_order() {
        let mut g = group(Some("x"));
        // fanout 0.25 * 12/20 = 0.15 ties with vague 0.15 * (1 - 0)
        g.tool_counts.insert("Read".into(), 12);
        let drivers = analyze(&g, 0).drivers;
        assert_eq!(drivers[0].kind, DriverKind::ToolFanout);
        assert_eq!(drivers[1].kind, DriverKind::VaguePrompt);
    }
}
