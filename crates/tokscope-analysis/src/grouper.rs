//! Re-segments a session's query stream into prompt groups.

use std::collections::BTreeMap;

use tokscope_core::{PromptGroup, PromptQuality, Query, Session, TokenUsage};
use tokscope_cost::PricingResolver;

use crate::quality;

/// A group still absorbing queries.
struct OpenGroup {
    group: PromptGroup,
    searches: usize,
}

impl OpenGroup {
    fn start(session: &Session, query: &Query, context_depth: u64) -> Self {
        Self {
            group: PromptGroup {
                session_id: session.id.clone(),
                project: session.project.clone(),
                tool: session.tool,
                model: query.model.clone(),
                prompt: query.user_prompt.clone(),
                usage: TokenUsage::default(),
                cost: 0.0,
                query_count: 0,
                continuations: 0,
                context_depth,
                tool_counts: BTreeMap::new(),
                file_writes: BTreeMap::new(),
                quality: PromptQuality::default(),
            },
            searches: 0,
        }
    }

    fn absorb(&mut self, query: &Query, resolver: &PricingResolver) {
        let group = &mut self.group;
        group.usage += query.usage;
        group.cost += resolver.price(&query.model, &query.usage).cost;
        group.query_count += 1;

        for call in &query.tools {
            *group.tool_counts.entry(call.name.clone()).or_default() += 1;
            for path in quality::written_paths(call) {
                *group.file_writes.entry(path).or_default() += 1;
            }
            if quality::is_search(call) {
                self.searches += 1;
            }
        }
    }

    fn finish(mut self) -> PromptGroup {
        self.group.quality = quality::analyze(&self.group, self.searches);
        self.group
    }
}

/// Group a session's queries by the user message that started them.
///
/// Groups come out in query order and together absorb every query exactly once.
pub fn group_prompts(session: &Session, resolver: &PricingResolver) -> Vec<PromptGroup> {
    let mut groups = Vec::new();
    let mut open: Option<OpenGroup> = None;
    // Input consumed so far in this session; only grows
    let mut running_input = 0u64;

    for query in &session.queries {
        let mut current = match open.take() {
            Some(mut current) if query.user_prompt.is_none() => {
                current.group.continuations += 1;
                current
            }
            Some(current) if current.group.prompt == query.user_prompt => current,
            previous => {
                if let Some(previous) = previous {
                    groups.push(previous.finish());
                }
                OpenGroup::start(session, query, running_input)
            }
        };
        current.absorb(query, resolver);
        open = Some(current);
        running_input += query.input_tokens();
    }

    if let Some(last) = open {
        groups.push(last.finish());
    }
    groups
}
